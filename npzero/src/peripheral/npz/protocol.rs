//! nPZero register map and transaction formatting.
//!
//! The address table here is the single source of truth for where every
//! register lives. Per-peripheral registers are looked up through
//! [`Slot::registers`], never computed from a stride, so each slot's block
//! can be checked against the datasheet entry by entry.

use std::fmt;

use super::error::NpzError;

/// Default 7-bit I2C address (0x7A on the wire once shifted).
pub const DEFAULT_ADDRESS: u8 = 0x3D;

/// Value of the ID register on a genuine part.
pub const EXPECTED_CHIP_ID: u8 = 0x60;

/// Size of the command arena in bytes.
pub const ARENA_SIZE: usize = 128;

/// Global register addresses.
pub mod regs {
    pub const SLEEP_RST: u8 = 0x00;
    pub const ID: u8 = 0x01;
    pub const STA1: u8 = 0x02;
    pub const STA2: u8 = 0x03;
    pub const PSWCTL: u8 = 0x04;
    pub const SYSCFG1: u8 = 0x05;
    pub const SYSCFG2: u8 = 0x06;
    pub const SYSCFG3: u8 = 0x07;
    pub const TOUT_L: u8 = 0x08;
    pub const TOUT_H: u8 = 0x09;
    pub const INTCFG: u8 = 0x0A;

    /// Internal (VBAT) ADC over-threshold.
    pub const THROVA1: u8 = 0x44;
    /// Internal (VBAT) ADC under-threshold.
    pub const THRUNA1: u8 = 0x45;
    /// External (ADC_IN) ADC over-threshold.
    pub const THROVA2: u8 = 0x46;
    /// External (ADC_IN) ADC under-threshold.
    pub const THRUNA2: u8 = 0x47;

    pub const ADC_CORE: u8 = 0x58;
    pub const ADC_EXT: u8 = 0x59;

    /// First byte of the command arena.
    pub const SRAM_START: u8 = 0x80;
}

/// Commands accepted by the SLEEP_RST register.
pub mod sleep_rst {
    /// Enter sleep and hand bus control to the device.
    pub const SLEEP: u8 = 0xFF;
    /// Soft reset.
    pub const SOFT_RESET: u8 = 0xA5;
}

/// One of the four peripheral power-switch slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    P1,
    P2,
    P3,
    P4,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::P1, Slot::P2, Slot::P3, Slot::P4];

    /// Zero-based position, for indexing per-slot arrays.
    pub const fn index(self) -> usize {
        match self {
            Slot::P1 => 0,
            Slot::P2 => 1,
            Slot::P3 => 2,
            Slot::P4 => 3,
        }
    }

    /// Slot number as printed on the datasheet (1..=4).
    pub const fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Register block for this slot.
    pub fn registers(self) -> &'static SlotRegisters {
        &SLOT_REGISTERS[self.index()]
    }
}

impl TryFrom<u8> for Slot {
    type Error = NpzError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            1 => Ok(Slot::P1),
            2 => Ok(Slot::P2),
            3 => Ok(Slot::P3),
            4 => Ok(Slot::P4),
            other => Err(NpzError::InvalidSlot(other)),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.number())
    }
}

/// Register addresses belonging to one peripheral slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRegisters {
    pub cfgp: u8,
    pub modp: u8,
    pub perp_l: u8,
    pub perp_h: u8,
    pub ncmdp: u8,
    pub addrp: u8,
    pub rregp: u8,
    pub throvp_l: u8,
    pub throvp_h: u8,
    pub thrunp_l: u8,
    pub thrunp_h: u8,
    pub twtp: u8,
    pub tcfgp: u8,
    pub valp_l: u8,
    pub valp_h: u8,
}

impl SlotRegisters {
    /// Every address in the block paired with its datasheet name stem.
    pub fn named(&self) -> [(&'static str, u8); 15] {
        [
            ("CFGP", self.cfgp),
            ("MODP", self.modp),
            ("PERP_L", self.perp_l),
            ("PERP_H", self.perp_h),
            ("NCMDP", self.ncmdp),
            ("ADDRP", self.addrp),
            ("RREGP", self.rregp),
            ("THROVP_L", self.throvp_l),
            ("THROVP_H", self.throvp_h),
            ("THRUNP_L", self.thrunp_l),
            ("THRUNP_H", self.thrunp_h),
            ("TWTP", self.twtp),
            ("TCFGP", self.tcfgp),
            ("VALP_L", self.valp_l),
            ("VALP_H", self.valp_h),
        ]
    }
}

/// Per-slot register blocks, indexed by [`Slot::index`].
pub const SLOT_REGISTERS: [SlotRegisters; 4] = [
    SlotRegisters {
        cfgp: 0x10,
        modp: 0x11,
        perp_l: 0x12,
        perp_h: 0x13,
        ncmdp: 0x14,
        addrp: 0x15,
        rregp: 0x16,
        throvp_l: 0x17,
        throvp_h: 0x18,
        thrunp_l: 0x19,
        thrunp_h: 0x1A,
        twtp: 0x1B,
        tcfgp: 0x1C,
        valp_l: 0x50,
        valp_h: 0x51,
    },
    SlotRegisters {
        cfgp: 0x1D,
        modp: 0x1E,
        perp_l: 0x1F,
        perp_h: 0x20,
        ncmdp: 0x21,
        addrp: 0x22,
        rregp: 0x23,
        throvp_l: 0x24,
        throvp_h: 0x25,
        thrunp_l: 0x26,
        thrunp_h: 0x27,
        twtp: 0x28,
        tcfgp: 0x29,
        valp_l: 0x52,
        valp_h: 0x53,
    },
    SlotRegisters {
        cfgp: 0x2A,
        modp: 0x2B,
        perp_l: 0x2C,
        perp_h: 0x2D,
        ncmdp: 0x2E,
        addrp: 0x2F,
        rregp: 0x30,
        throvp_l: 0x31,
        throvp_h: 0x32,
        thrunp_l: 0x33,
        thrunp_h: 0x34,
        twtp: 0x35,
        tcfgp: 0x36,
        valp_l: 0x54,
        valp_h: 0x55,
    },
    SlotRegisters {
        cfgp: 0x37,
        modp: 0x38,
        perp_l: 0x39,
        perp_h: 0x3A,
        ncmdp: 0x3B,
        addrp: 0x3C,
        rregp: 0x3D,
        throvp_l: 0x3E,
        throvp_h: 0x3F,
        thrunp_l: 0x40,
        thrunp_h: 0x41,
        twtp: 0x42,
        tcfgp: 0x43,
        valp_l: 0x56,
        valp_h: 0x57,
    },
];

/// Get register name from address
pub fn register_name(addr: u8) -> String {
    match addr {
        regs::SLEEP_RST => "SLEEP_RST".to_string(),
        regs::ID => "ID".to_string(),
        regs::STA1 => "STA1".to_string(),
        regs::STA2 => "STA2".to_string(),
        regs::PSWCTL => "PSWCTL".to_string(),
        regs::SYSCFG1 => "SYSCFG1".to_string(),
        regs::SYSCFG2 => "SYSCFG2".to_string(),
        regs::SYSCFG3 => "SYSCFG3".to_string(),
        regs::TOUT_L => "TOUT_L".to_string(),
        regs::TOUT_H => "TOUT_H".to_string(),
        regs::INTCFG => "INTCFG".to_string(),
        regs::THROVA1 => "THROVA1".to_string(),
        regs::THRUNA1 => "THRUNA1".to_string(),
        regs::THROVA2 => "THROVA2".to_string(),
        regs::THRUNA2 => "THRUNA2".to_string(),
        regs::ADC_CORE => "ADC_CORE".to_string(),
        regs::ADC_EXT => "ADC_EXT".to_string(),
        addr if addr >= regs::SRAM_START => format!("SRAM[0x{:02x}]", addr - regs::SRAM_START),
        addr => Slot::ALL
            .iter()
            .find_map(|slot| {
                slot.registers()
                    .named()
                    .into_iter()
                    .find(|&(_, a)| a == addr)
                    .map(|(stem, _)| slot_register_name(stem, *slot))
            })
            .unwrap_or_else(|| format!("UNKNOWN[0x{:02x}]", addr)),
    }
}

// Datasheet names put the slot number after the stem: PERP_L -> PERP3_L.
fn slot_register_name(stem: &str, slot: Slot) -> String {
    match stem.split_once('_') {
        Some((base, half)) => format!("{}{}_{}", base, slot.number(), half),
        None => format!("{}{}", stem, slot.number()),
    }
}

/// Format an nPZero I2C transaction for logs and dry-run listings.
///
/// `data` excludes the leading register-address byte.
pub fn format_transaction(reg: u8, data: Option<&[u8]>, is_read: bool) -> String {
    let reg_name = register_name(reg);

    match (is_read, data) {
        (true, Some([value])) => {
            let decoded = match reg {
                regs::ID if *value == EXPECTED_CHIP_ID => format!("0x{:02x} (nPZero)", value),
                regs::ID => format!("0x{:02x} (unknown part)", value),
                _ => format!("0x{:02x}", value),
            };
            format!("-> READ {}={}", reg_name, decoded)
        }
        (true, Some(data)) => format!("-> READ {}={:02x?}", reg_name, data),
        (true, None) => format!("-> READ {}", reg_name),
        (false, Some([value])) => {
            let decoded = match (reg, *value) {
                (regs::SLEEP_RST, sleep_rst::SLEEP) => "SLEEP".to_string(),
                (regs::SLEEP_RST, sleep_rst::SOFT_RESET) => "SOFT_RESET".to_string(),
                (_, value) => format!("0x{:02x}", value),
            };
            format!("<- WRITE {}={}", reg_name, decoded)
        }
        (false, Some(data)) => format!("<- WRITE {}={:02x?}", reg_name, data),
        (false, None) => format!("<- WRITE REG[0x{:02x}]", reg),
    }
}
