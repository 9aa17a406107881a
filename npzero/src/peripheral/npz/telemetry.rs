//! ADC code and peripheral value interpretation.
//!
//! The ADC codes are not linear. Each channel has a small calibration table
//! of the codes the device actually produces; anything else is reported as
//! unknown rather than interpolated.

use std::fmt;

use super::codec::{AdcChannel, DataType};

/// External channel code reported when ADC_IN is left floating.
pub const ADC_IN_DISCONNECTED: u8 = 0x1F;

/// VBAT channel, (code, millivolts), sorted by code.
const INTERNAL: &[(u8, u16)] = &[
    (0x24, 1500),
    (0x26, 1600),
    (0x28, 1700),
    (0x29, 1800),
    (0x2A, 1900),
    (0x2B, 2000),
    (0x2C, 2100),
    (0x2D, 2200),
    (0x2E, 2300),
    (0x2F, 2400),
    (0x30, 2600),
    (0x31, 2800),
    (0x32, 3000),
    (0x33, 3200),
    (0x34, 3400),
];

/// ADC_IN channel, (code, millivolts), sorted by code.
const EXTERNAL: &[(u8, u16)] = &[
    (0x00, 600),
    (0x08, 700),
    (0x0F, 800),
    (0x15, 900),
    (0x19, 1000),
    (0x1C, 1100),
    (0x1F, 1200),
    (0x22, 1300),
    (0x23, 1400),
    (0x24, 1500),
    (0x26, 1600),
    (0x28, 1700),
    (0x29, 1800),
    (0x2A, 1900),
    (0x2B, 2000),
    (0x2C, 2100),
    (0x2D, 2200),
    (0x2E, 2300),
    (0x2F, 2400),
    // Out of sequence with its neighbours, but this is what the part reports.
    (0x30, 3600),
    (0x31, 2700),
    (0x32, 2900),
    (0x33, 3100),
    (0x34, 3400),
];

/// Look `code` up in the channel's table.
///
/// `None` means the code is not calibrated, which is not an error.
pub fn millivolts(channel: AdcChannel, code: u8) -> Option<u16> {
    let table = match channel {
        AdcChannel::Internal => INTERNAL,
        AdcChannel::External => EXTERNAL,
    };
    table
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|i| table[i].1)
}

/// A raw conversion result from one ADC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcReading {
    pub channel: AdcChannel,
    pub code: u8,
}

impl AdcReading {
    /// True for the external channel's floating-pin code.
    pub fn is_disconnected(&self) -> bool {
        self.channel == AdcChannel::External && self.code == ADC_IN_DISCONNECTED
    }

    /// Voltage in millivolts, if the pin is connected and the code is known.
    pub fn millivolts(&self) -> Option<u16> {
        if self.is_disconnected() {
            return None;
        }
        millivolts(self.channel, self.code)
    }
}

impl fmt::Display for AdcReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} code 0x{:02X}", self.channel, self.code)?;
        if self.is_disconnected() {
            return write!(f, " (ADC_IN not connected)");
        }
        match self.millivolts() {
            Some(mv) => write!(f, " ({}.{:03} V)", mv / 1000, mv % 1000),
            None => write!(f, " (uncalibrated)"),
        }
    }
}

/// A peripheral value register interpreted with its configured data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralValue {
    Unsigned(u16),
    Signed(i16),
    Byte(u8),
}

impl PeripheralValue {
    /// Interpret the raw 16-bit VALP contents. 8-bit values live in the low byte.
    pub fn interpret(raw: u16, data_type: DataType) -> Self {
        match data_type {
            DataType::Uint16 => PeripheralValue::Unsigned(raw),
            DataType::Int16 => PeripheralValue::Signed(raw as i16),
            DataType::Uint8 => PeripheralValue::Byte(raw as u8),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            PeripheralValue::Unsigned(v) => v.into(),
            PeripheralValue::Signed(v) => v.into(),
            PeripheralValue::Byte(v) => v.into(),
        }
    }
}

impl fmt::Display for PeripheralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}
