//! Register codec.
//!
//! Each register family has a typed value with an `encode` that packs it
//! into the byte the device expects and a `decode` that unpacks a byte read
//! back. Field positions are declared once per register as bit ranges,
//! least-significant bit first as in the datasheet, and packed with
//! `bitvec`. Bits without a meaning are written as zero and ignored when
//! decoding.
//!
//! Encoding never fails. Decoding fails only when an enumerated field holds
//! a pattern the datasheet leaves undefined.

use std::ops::Range;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::FieldError;
use super::protocol::{Slot, regs};

macro_rules! field_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl $name {
            /// Every legal value, in datasheet order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Raw field value.
            pub const fn bits(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(raw: u8) -> Result<Self, u8> {
                match raw {
                    $($value => Ok($name::$variant),)+
                    other => Err(other),
                }
            }
        }
    };
}

field_enum! {
    /// How the host power switch drives the host supply.
    pub enum HostPowerMode {
        /// Switch outputs VBAT or is open.
        Switch = 1,
        /// Logic high while the host is enabled.
        LogicOutput = 2,
        /// Logic low while the host is enabled.
        LogicOutputInverted = 3,
    }
}

field_enum! {
    pub enum WakePolicy {
        /// Wake on any enabled source.
        Any = 0,
        /// Wake only once every enabled source has triggered.
        All = 1,
    }
}

field_enum! {
    pub enum ClockSource {
        /// Internal 10 Hz oscillator.
        Lf10Hz = 0,
        /// 32.768 kHz crystal.
        Xo32Khz = 1,
    }
}

field_enum! {
    /// System clock divider. Bit 0 is the enable, bits 1-2 the selector.
    pub enum ClockDivider {
        Disabled = 0,
        Div2 = 1,
        Div4 = 3,
        Div8 = 5,
        Div16 = 7,
    }
}

field_enum! {
    pub enum AdcClock {
        SystemClock = 0,
        Hz64 = 1,
        Hz256 = 2,
        Hz1024 = 3,
    }
}

field_enum! {
    pub enum IoStrength {
        Normal = 0,
        High = 1,
    }
}

field_enum! {
    /// I2C pull-up policy. Bit 0 enables the pull-ups, bit 1 drops them in sleep.
    pub enum I2cPull {
        Disabled = 0,
        AlwaysOn = 1,
        Auto = 3,
    }
}

field_enum! {
    pub enum SpiPins {
        AlwaysOn = 0,
        /// High impedance while asleep.
        AutoDisable = 1,
    }
}

field_enum! {
    /// Crystal clock output divider.
    pub enum ClockOut {
        Off = 0,
        Khz32 = 1,
        Khz16 = 2,
        Khz8 = 3,
        Khz4 = 4,
        Khz2 = 5,
        Khz1 = 6,
    }
}

field_enum! {
    /// Interrupt pin pull-up policy. Bit 0 enables the pull, bit 1 selects strength.
    pub enum IntPinPull {
        Disabled = 0,
        PulledLow = 1,
        PulledHigh = 3,
    }
}

field_enum! {
    pub enum PowerMode {
        Disabled = 0,
        Periodic = 1,
        AlwaysOn = 3,
    }
}

field_enum! {
    pub enum PollingMode {
        /// Power up periodically, read and compare against the thresholds.
        PeriodicReadCompareThreshold = 0,
        /// Power up periodically, wait for the interrupt, then read and compare.
        PeriodicWaitInterruptCompareThreshold = 1,
        /// Power up periodically and wait for the interrupt.
        PeriodicWaitInterrupt = 2,
        /// Wait for an asynchronous interrupt.
        AsyncWaitInterrupt = 3,
    }
}

impl PollingMode {
    /// Modes in which the device addresses the peripheral over its bus.
    pub const fn uses_address(self) -> bool {
        !matches!(self, PollingMode::AsyncWaitInterrupt)
    }

    /// Modes in which the device reads a value and compares it to thresholds.
    pub const fn compares_threshold(self) -> bool {
        matches!(
            self,
            PollingMode::PeriodicReadCompareThreshold
                | PollingMode::PeriodicWaitInterruptCompareThreshold
        )
    }
}

field_enum! {
    pub enum PowerSwitchMode {
        /// Switch with output voltage rise detection.
        VoltageDetection = 0,
        Standard = 1,
        LogicOutputHigh = 2,
        LogicOutputLow = 3,
    }
}

field_enum! {
    pub enum InterruptPinMode {
        InputActiveHigh = 0,
        InputActiveLow = 1,
        TriggerOutputHigh = 2,
        TriggerOutputLow = 3,
    }
}

field_enum! {
    pub enum ComparisonMode {
        InsideThreshold = 0,
        OutsideThreshold = 1,
    }
}

field_enum! {
    pub enum DataType {
        Uint16 = 0,
        Int16 = 1,
        Uint8 = 2,
    }
}

field_enum! {
    pub enum Endianness {
        Little = 0,
        Big = 1,
    }
}

field_enum! {
    pub enum SpiMode {
        /// CPOL 0, CPHA 0.
        Mode0 = 0,
        /// CPOL 0, CPHA 1.
        Mode1 = 1,
        /// CPOL 1, CPHA 0.
        Mode2 = 2,
        /// CPOL 1, CPHA 1.
        Mode3 = 3,
    }
}

field_enum! {
    /// Downstream bus used for a peripheral.
    pub enum Protocol {
        I2c = 0,
        Spi = 1,
    }
}

field_enum! {
    /// Wait-time extension. Bit 0 enables the wait, bit 1 selects ×4096.
    pub enum WaitExtension {
        Disabled = 0,
        X256 = 1,
        X4096 = 3,
    }
}

field_enum! {
    pub enum ResetSource {
        None = 0,
        PowerOn = 1,
        /// RST pin.
        External = 2,
        /// SLEEP_RST command.
        Soft = 4,
    }
}

/// A single-byte register value.
pub trait Register: Sized {
    /// Datasheet name, used in errors and logs.
    const NAME: &'static str;

    fn encode(&self) -> u8;

    fn decode(raw: u8) -> Result<Self, FieldError>;
}

/// A register at one fixed address.
pub trait GlobalRegister: Register {
    const ADDRESS: u8;
}

/// A register repeated in every peripheral slot.
pub trait SlotRegister: Register {
    fn address(slot: Slot) -> u8;
}

/// A 16-bit value split into a low and a high byte register.
pub trait WordRegister: Copy {
    const NAME: &'static str;

    fn from_word(word: u16) -> Self;

    fn word(self) -> u16;

    /// Bytes in write order: low, then high.
    fn encode(self) -> [u8; 2] {
        self.word().to_le_bytes()
    }

    fn decode(bytes: [u8; 2]) -> Self {
        Self::from_word(u16::from_le_bytes(bytes))
    }
}

/// A 16-bit register pair at fixed addresses.
pub trait GlobalWordRegister: WordRegister {
    /// Low and high byte addresses.
    const ADDRESSES: (u8, u8);
}

/// A 16-bit register pair repeated in every peripheral slot.
pub trait SlotWordRegister: WordRegister {
    /// Low and high byte addresses for `slot`.
    fn addresses(slot: Slot) -> (u8, u8);
}

fn put(byte: &mut u8, bits: Range<usize>, value: u8) {
    byte.view_bits_mut::<Lsb0>()[bits].store(value);
}

fn put_flag(byte: &mut u8, bit: usize, value: bool) {
    byte.view_bits_mut::<Lsb0>().set(bit, value);
}

fn get(byte: u8, bits: Range<usize>) -> u8 {
    byte.view_bits::<Lsb0>()[bits].load::<u8>()
}

fn flag(byte: u8, bit: usize) -> bool {
    byte.view_bits::<Lsb0>()[bit]
}

fn field<E: TryFrom<u8, Error = u8>>(
    register: &'static str,
    field: &'static str,
    byte: u8,
    bits: Range<usize>,
) -> Result<E, FieldError> {
    E::try_from(get(byte, bits)).map_err(|raw| FieldError {
        register,
        field,
        raw,
    })
}

/// PSWCTL field layout.
mod pswctl {
    use std::ops::Range;
    pub const NORMAL_MODE: usize = 0; // one bit per slot, bits 0-3
    pub const HOST_MODE: Range<usize> = 4..6;
    pub const GATE_BOOST: usize = 6;
    pub const GATE_BOOST_ACTIVE: usize = 7;
}

/// Power switch control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pswctl {
    /// Per-slot power switch state while the host is awake.
    pub normal_mode: [bool; 4],
    pub host_mode: HostPowerMode,
    pub gate_boost: bool,
    /// Status bit; ignored on write.
    pub gate_boost_active: bool,
}

impl Register for Pswctl {
    const NAME: &'static str = "PSWCTL";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        for (i, on) in self.normal_mode.iter().enumerate() {
            put_flag(&mut byte, pswctl::NORMAL_MODE + i, *on);
        }
        put(&mut byte, pswctl::HOST_MODE, self.host_mode.bits());
        put_flag(&mut byte, pswctl::GATE_BOOST, self.gate_boost);
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self {
            normal_mode: std::array::from_fn(|i| flag(raw, pswctl::NORMAL_MODE + i)),
            host_mode: field(Self::NAME, "host_mode", raw, pswctl::HOST_MODE)?,
            gate_boost: flag(raw, pswctl::GATE_BOOST),
            gate_boost_active: flag(raw, pswctl::GATE_BOOST_ACTIVE),
        })
    }
}

impl GlobalRegister for Pswctl {
    const ADDRESS: u8 = regs::PSWCTL;
}

/// SYSCFG1 field layout.
mod syscfg1 {
    pub const WAKE_UP: usize = 0; // one bit per slot, bits 0-3
    pub const ADC_INTERNAL_WAKE: usize = 4;
    pub const ADC_EXTERNAL_WAKE: usize = 5;
    pub const WAKE_POLICY: usize = 6;
}

/// Wake-up source enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syscfg1 {
    pub wake_up: [bool; 4],
    pub adc_internal_wake: bool,
    pub adc_external_wake: bool,
    pub wake_policy: WakePolicy,
}

impl Register for Syscfg1 {
    const NAME: &'static str = "SYSCFG1";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        for (i, on) in self.wake_up.iter().enumerate() {
            put_flag(&mut byte, syscfg1::WAKE_UP + i, *on);
        }
        put_flag(&mut byte, syscfg1::ADC_INTERNAL_WAKE, self.adc_internal_wake);
        put_flag(&mut byte, syscfg1::ADC_EXTERNAL_WAKE, self.adc_external_wake);
        put(
            &mut byte,
            syscfg1::WAKE_POLICY..syscfg1::WAKE_POLICY + 1,
            self.wake_policy.bits(),
        );
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        let wake_policy = if flag(raw, syscfg1::WAKE_POLICY) {
            WakePolicy::All
        } else {
            WakePolicy::Any
        };
        Ok(Self {
            wake_up: std::array::from_fn(|i| flag(raw, syscfg1::WAKE_UP + i)),
            adc_internal_wake: flag(raw, syscfg1::ADC_INTERNAL_WAKE),
            adc_external_wake: flag(raw, syscfg1::ADC_EXTERNAL_WAKE),
            wake_policy,
        })
    }
}

impl GlobalRegister for Syscfg1 {
    const ADDRESS: u8 = regs::SYSCFG1;
}

/// SYSCFG2 field layout.
mod syscfg2 {
    use std::ops::Range;
    pub const DIV_EN: usize = 0;
    pub const DIV_SEL: Range<usize> = 1..3;
    pub const CLOCK_SOURCE: Range<usize> = 3..4;
    pub const ADC_EXT_ON: usize = 4;
    pub const ADC_CLOCK: Range<usize> = 5..7;
}

/// Clocking and ADC sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syscfg2 {
    pub clock_divider: ClockDivider,
    pub clock_source: ClockSource,
    pub adc_external_sampling: bool,
    pub adc_clock: AdcClock,
}

impl Register for Syscfg2 {
    const NAME: &'static str = "SYSCFG2";

    fn encode(&self) -> u8 {
        let divider = self.clock_divider.bits();
        let mut byte = 0;
        put_flag(&mut byte, syscfg2::DIV_EN, divider & 1 != 0);
        put(&mut byte, syscfg2::DIV_SEL, divider >> 1);
        put(&mut byte, syscfg2::CLOCK_SOURCE, self.clock_source.bits());
        put_flag(&mut byte, syscfg2::ADC_EXT_ON, self.adc_external_sampling);
        put(&mut byte, syscfg2::ADC_CLOCK, self.adc_clock.bits());
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        // The selector is don't-care while the divider is disabled.
        let clock_divider = if flag(raw, syscfg2::DIV_EN) {
            match get(raw, syscfg2::DIV_SEL) {
                0 => ClockDivider::Div2,
                1 => ClockDivider::Div4,
                2 => ClockDivider::Div8,
                _ => ClockDivider::Div16,
            }
        } else {
            ClockDivider::Disabled
        };
        Ok(Self {
            clock_divider,
            clock_source: field(Self::NAME, "clock_source", raw, syscfg2::CLOCK_SOURCE)?,
            adc_external_sampling: flag(raw, syscfg2::ADC_EXT_ON),
            adc_clock: field(Self::NAME, "adc_clock", raw, syscfg2::ADC_CLOCK)?,
        })
    }
}

impl GlobalRegister for Syscfg2 {
    const ADDRESS: u8 = regs::SYSCFG2;
}

/// SYSCFG3 field layout.
mod syscfg3 {
    use std::ops::Range;
    pub const IO_STRENGTH: Range<usize> = 0..1;
    pub const I2C_PULL: Range<usize> = 1..3; // enable, auto
    pub const SPI_PINS: Range<usize> = 3..4;
    pub const CLOCK_OUT: Range<usize> = 4..7;
    pub const CLOCK_SOURCE_STATUS: Range<usize> = 7..8;
}

/// Pad configuration and clock output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syscfg3 {
    pub io_strength: IoStrength,
    pub i2c_pull: I2cPull,
    pub spi_pins: SpiPins,
    pub clock_out: ClockOut,
    /// Clock the device is actually running from; ignored on write.
    pub clock_source_status: ClockSource,
}

impl Register for Syscfg3 {
    const NAME: &'static str = "SYSCFG3";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        put(&mut byte, syscfg3::IO_STRENGTH, self.io_strength.bits());
        put(&mut byte, syscfg3::I2C_PULL, self.i2c_pull.bits());
        put(&mut byte, syscfg3::SPI_PINS, self.spi_pins.bits());
        put(&mut byte, syscfg3::CLOCK_OUT, self.clock_out.bits());
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self {
            io_strength: field(Self::NAME, "io_strength", raw, syscfg3::IO_STRENGTH)?,
            i2c_pull: field(Self::NAME, "i2c_pull", raw, syscfg3::I2C_PULL)?,
            spi_pins: field(Self::NAME, "spi_pins", raw, syscfg3::SPI_PINS)?,
            clock_out: field(Self::NAME, "clock_out", raw, syscfg3::CLOCK_OUT)?,
            clock_source_status: field(
                Self::NAME,
                "clock_source_status",
                raw,
                syscfg3::CLOCK_SOURCE_STATUS,
            )?,
        })
    }
}

impl GlobalRegister for Syscfg3 {
    const ADDRESS: u8 = regs::SYSCFG3;
}

/// Interrupt pin pull-ups. Pin n uses bits 2(n-1) (enable) and 2(n-1)+1 (strength).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intcfg {
    pub pins: [IntPinPull; 4],
}

impl Register for Intcfg {
    const NAME: &'static str = "INTCFG";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        for (i, pull) in self.pins.iter().enumerate() {
            put(&mut byte, 2 * i..2 * i + 2, pull.bits());
        }
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        const FIELDS: [&str; 4] = ["pin1", "pin2", "pin3", "pin4"];
        let mut pins = [IntPinPull::Disabled; 4];
        for (i, pin) in pins.iter_mut().enumerate() {
            *pin = field(Self::NAME, FIELDS[i], raw, 2 * i..2 * i + 2)?;
        }
        Ok(Self { pins })
    }
}

impl GlobalRegister for Intcfg {
    const ADDRESS: u8 = regs::INTCFG;
}

/// Global timeout in system clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tout(pub u16);

impl WordRegister for Tout {
    const NAME: &'static str = "TOUT";

    fn from_word(word: u16) -> Self {
        Self(word)
    }

    fn word(self) -> u16 {
        self.0
    }
}

impl GlobalWordRegister for Tout {
    const ADDRESSES: (u8, u8) = (regs::TOUT_L, regs::TOUT_H);
}

/// STA1 field layout.
mod sta1 {
    use std::ops::Range;
    pub const RESET_SOURCE: Range<usize> = 0..3;
    pub const EXTERNAL_ADC: usize = 5;
    pub const INTERNAL_ADC: usize = 6;
    pub const GLOBAL_TIMEOUT: usize = 7;
}

/// Reset cause and global wake flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sta1 {
    /// `None` if the field holds anything but a single known flag, as
    /// after two resets in quick succession.
    pub reset_source: Option<ResetSource>,
    pub external_adc_triggered: bool,
    pub internal_adc_triggered: bool,
    pub global_timeout: bool,
}

impl Register for Sta1 {
    const NAME: &'static str = "STA1";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        put(
            &mut byte,
            sta1::RESET_SOURCE,
            self.reset_source.map_or(0, ResetSource::bits),
        );
        put_flag(&mut byte, sta1::EXTERNAL_ADC, self.external_adc_triggered);
        put_flag(&mut byte, sta1::INTERNAL_ADC, self.internal_adc_triggered);
        put_flag(&mut byte, sta1::GLOBAL_TIMEOUT, self.global_timeout);
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self {
            reset_source: ResetSource::try_from(get(raw, sta1::RESET_SOURCE)).ok(),
            external_adc_triggered: flag(raw, sta1::EXTERNAL_ADC),
            internal_adc_triggered: flag(raw, sta1::INTERNAL_ADC),
            global_timeout: flag(raw, sta1::GLOBAL_TIMEOUT),
        })
    }
}

impl GlobalRegister for Sta1 {
    const ADDRESS: u8 = regs::STA1;
}

/// Per-slot wake flags. Slot n uses bits 2(n-1) (triggered) and 2(n-1)+1 (timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sta2 {
    pub triggered: [bool; 4],
    pub timed_out: [bool; 4],
}

impl Register for Sta2 {
    const NAME: &'static str = "STA2";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        for i in 0..4 {
            put_flag(&mut byte, 2 * i, self.triggered[i]);
            put_flag(&mut byte, 2 * i + 1, self.timed_out[i]);
        }
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self {
            triggered: std::array::from_fn(|i| flag(raw, 2 * i)),
            timed_out: std::array::from_fn(|i| flag(raw, 2 * i + 1)),
        })
    }
}

impl GlobalRegister for Sta2 {
    const ADDRESS: u8 = regs::STA2;
}

/// CFGP field layout.
mod cfgp {
    use std::ops::Range;
    pub const POWER_MODE: Range<usize> = 0..2;
    pub const POLLING_MODE: Range<usize> = 2..4;
    pub const POWER_SWITCH_MODE: Range<usize> = 4..6;
    pub const INTERRUPT_PIN_MODE: Range<usize> = 6..8;
}

/// Peripheral power, polling, switch and interrupt modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cfgp {
    pub power_mode: PowerMode,
    pub polling_mode: PollingMode,
    pub power_switch_mode: PowerSwitchMode,
    pub interrupt_pin_mode: InterruptPinMode,
}

impl Register for Cfgp {
    const NAME: &'static str = "CFGP";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        put(&mut byte, cfgp::POWER_MODE, self.power_mode.bits());
        put(&mut byte, cfgp::POLLING_MODE, self.polling_mode.bits());
        put(&mut byte, cfgp::POWER_SWITCH_MODE, self.power_switch_mode.bits());
        put(&mut byte, cfgp::INTERRUPT_PIN_MODE, self.interrupt_pin_mode.bits());
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self {
            power_mode: field(Self::NAME, "power_mode", raw, cfgp::POWER_MODE)?,
            polling_mode: field(Self::NAME, "polling_mode", raw, cfgp::POLLING_MODE)?,
            power_switch_mode: field(
                Self::NAME,
                "power_switch_mode",
                raw,
                cfgp::POWER_SWITCH_MODE,
            )?,
            interrupt_pin_mode: field(
                Self::NAME,
                "interrupt_pin_mode",
                raw,
                cfgp::INTERRUPT_PIN_MODE,
            )?,
        })
    }
}

impl SlotRegister for Cfgp {
    fn address(slot: Slot) -> u8 {
        slot.registers().cfgp
    }
}

/// MODP field layout.
mod modp {
    use std::ops::Range;
    pub const COMPARISON_MODE: Range<usize> = 0..1;
    pub const DATA_TYPE: Range<usize> = 1..3;
    pub const MULTI_BYTE: usize = 3;
    pub const WAKE_ON_NAK: usize = 4;
    pub const ENDIANNESS: Range<usize> = 5..6;
    pub const SPI_MODE: Range<usize> = 6..8;
}

/// Peripheral data handling and bus sub-mode.
///
/// `wake_on_nak` only means something for I2C peripherals and `spi_mode`
/// only for SPI ones; the device ignores whichever does not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modp {
    pub comparison_mode: ComparisonMode,
    pub data_type: DataType,
    pub multi_byte: bool,
    pub wake_on_nak: bool,
    pub endianness: Endianness,
    pub spi_mode: SpiMode,
}

impl Register for Modp {
    const NAME: &'static str = "MODP";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        put(&mut byte, modp::COMPARISON_MODE, self.comparison_mode.bits());
        put(&mut byte, modp::DATA_TYPE, self.data_type.bits());
        put_flag(&mut byte, modp::MULTI_BYTE, self.multi_byte);
        put_flag(&mut byte, modp::WAKE_ON_NAK, self.wake_on_nak);
        put(&mut byte, modp::ENDIANNESS, self.endianness.bits());
        put(&mut byte, modp::SPI_MODE, self.spi_mode.bits());
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self {
            comparison_mode: field(Self::NAME, "comparison_mode", raw, modp::COMPARISON_MODE)?,
            data_type: field(Self::NAME, "data_type", raw, modp::DATA_TYPE)?,
            multi_byte: flag(raw, modp::MULTI_BYTE),
            wake_on_nak: flag(raw, modp::WAKE_ON_NAK),
            endianness: field(Self::NAME, "endianness", raw, modp::ENDIANNESS)?,
            spi_mode: field(Self::NAME, "spi_mode", raw, modp::SPI_MODE)?,
        })
    }
}

impl SlotRegister for Modp {
    fn address(slot: Slot) -> u8 {
        slot.registers().modp
    }
}

/// Polling period in system clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perp(pub u16);

impl WordRegister for Perp {
    const NAME: &'static str = "PERP";

    fn from_word(word: u16) -> Self {
        Self(word)
    }

    fn word(self) -> u16 {
        self.0
    }
}

impl SlotWordRegister for Perp {
    fn addresses(slot: Slot) -> (u8, u8) {
        let regs = slot.registers();
        (regs.perp_l, regs.perp_h)
    }
}

/// Number of initialization commands (I2C) or bytes (SPI) in the arena. 7 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ncmdp(pub u8);

impl Ncmdp {
    pub const MAX: u8 = 0x7F;
}

impl Register for Ncmdp {
    const NAME: &'static str = "NCMDP";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        put(&mut byte, 0..7, self.0);
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self(get(raw, 0..7)))
    }
}

impl SlotRegister for Ncmdp {
    fn address(slot: Slot) -> u8 {
        slot.registers().ncmdp
    }
}

/// ADDRP field layout.
mod addrp {
    use std::ops::Range;
    pub const VALUE: Range<usize> = 0..7;
    pub const PROTOCOL: Range<usize> = 7..8;
}

/// Peripheral bus address (I2C) or read-sequence byte count (SPI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addrp {
    pub value: u8,
    pub protocol: Protocol,
}

impl Addrp {
    pub const MAX_VALUE: u8 = 0x7F;
}

impl Register for Addrp {
    const NAME: &'static str = "ADDRP";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        put(&mut byte, addrp::VALUE, self.value);
        put(&mut byte, addrp::PROTOCOL, self.protocol.bits());
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self {
            value: get(raw, addrp::VALUE),
            protocol: field(Self::NAME, "protocol", raw, addrp::PROTOCOL)?,
        })
    }
}

impl SlotRegister for Addrp {
    fn address(slot: Slot) -> u8 {
        slot.registers().addrp
    }
}

/// Register the device reads from an I2C peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rregp(pub u8);

impl Register for Rregp {
    const NAME: &'static str = "RREGP";

    fn encode(&self) -> u8 {
        self.0
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self(raw))
    }
}

impl SlotRegister for Rregp {
    fn address(slot: Slot) -> u8 {
        slot.registers().rregp
    }
}

/// Peripheral over-threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throvp(pub u16);

impl WordRegister for Throvp {
    const NAME: &'static str = "THROVP";

    fn from_word(word: u16) -> Self {
        Self(word)
    }

    fn word(self) -> u16 {
        self.0
    }
}

impl SlotWordRegister for Throvp {
    fn addresses(slot: Slot) -> (u8, u8) {
        let regs = slot.registers();
        (regs.throvp_l, regs.throvp_h)
    }
}

/// Peripheral under-threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thrunp(pub u16);

impl WordRegister for Thrunp {
    const NAME: &'static str = "THRUNP";

    fn from_word(word: u16) -> Self {
        Self(word)
    }

    fn word(self) -> u16 {
        self.0
    }
}

impl SlotWordRegister for Thrunp {
    fn addresses(slot: Slot) -> (u8, u8) {
        let regs = slot.registers();
        (regs.thrunp_l, regs.thrunp_h)
    }
}

/// Time to wait, in system clock ticks, before and after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Twtp(pub u8);

impl Register for Twtp {
    const NAME: &'static str = "TWTP";

    fn encode(&self) -> u8 {
        self.0
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self(raw))
    }
}

impl SlotRegister for Twtp {
    fn address(slot: Slot) -> u8 {
        slot.registers().twtp
    }
}

/// TCFGP field layout.
mod tcfgp {
    use std::ops::Range;
    pub const PRE_WAIT: Range<usize> = 0..2; // twt_en, twt_ext
    pub const POST_WAIT: Range<usize> = 2..4; // tinit_en, tinit_ext
    pub const RETRIES: Range<usize> = 4..6;
}

/// Wait-time extensions and I2C NAK retry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tcfgp {
    pub pre_wait: WaitExtension,
    pub post_wait: WaitExtension,
    /// I2C only. 0-3.
    pub retries: u8,
}

impl Tcfgp {
    pub const MAX_RETRIES: u8 = 3;
}

impl Register for Tcfgp {
    const NAME: &'static str = "TCFGP";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        put(&mut byte, tcfgp::PRE_WAIT, self.pre_wait.bits());
        put(&mut byte, tcfgp::POST_WAIT, self.post_wait.bits());
        put(&mut byte, tcfgp::RETRIES, self.retries);
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self {
            pre_wait: field(Self::NAME, "pre_wait", raw, tcfgp::PRE_WAIT)?,
            post_wait: field(Self::NAME, "post_wait", raw, tcfgp::POST_WAIT)?,
            retries: get(raw, tcfgp::RETRIES),
        })
    }
}

impl SlotRegister for Tcfgp {
    fn address(slot: Slot) -> u8 {
        slot.registers().tcfgp
    }
}

/// Last value read from a peripheral. Read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valp(pub u16);

impl WordRegister for Valp {
    const NAME: &'static str = "VALP";

    fn from_word(word: u16) -> Self {
        Self(word)
    }

    fn word(self) -> u16 {
        self.0
    }
}

impl SlotWordRegister for Valp {
    fn addresses(slot: Slot) -> (u8, u8) {
        let regs = slot.registers();
        (regs.valp_l, regs.valp_h)
    }
}

/// One of the two ADC channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdcChannel {
    /// Supply voltage (VBAT).
    Internal,
    /// ADC_IN pin.
    External,
}

impl AdcChannel {
    pub const fn over_threshold_address(self) -> u8 {
        match self {
            AdcChannel::Internal => regs::THROVA1,
            AdcChannel::External => regs::THROVA2,
        }
    }

    pub const fn under_threshold_address(self) -> u8 {
        match self {
            AdcChannel::Internal => regs::THRUNA1,
            AdcChannel::External => regs::THRUNA2,
        }
    }

    /// Register holding the last conversion result.
    pub const fn value_address(self) -> u8 {
        match self {
            AdcChannel::Internal => regs::ADC_CORE,
            AdcChannel::External => regs::ADC_EXT,
        }
    }
}

impl std::fmt::Display for AdcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdcChannel::Internal => write!(f, "internal ADC"),
            AdcChannel::External => write!(f, "external ADC"),
        }
    }
}

/// ADC threshold, 5 bits. Used for all four THROVAx/THRUNAx registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcThreshold(pub u8);

impl AdcThreshold {
    pub const MAX: u8 = 0x1F;
}

impl Register for AdcThreshold {
    const NAME: &'static str = "THRA";

    fn encode(&self) -> u8 {
        let mut byte = 0;
        put(&mut byte, 0..5, self.0);
        byte
    }

    fn decode(raw: u8) -> Result<Self, FieldError> {
        Ok(Self(get(raw, 0..5)))
    }
}
