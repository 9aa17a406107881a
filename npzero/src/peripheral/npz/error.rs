use thiserror::Error;

use crate::hw_trait::HwError;

use super::arena::ArenaExhausted;

/// A register byte whose bit pattern has no meaning for one of its fields.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{register}.{field}: undefined value {raw:#04x}")]
pub struct FieldError {
    pub register: &'static str,
    pub field: &'static str,
    pub raw: u8,
}

/// nPZero driver errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NpzError {
    #[error(transparent)]
    Bus(#[from] HwError),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid peripheral slot {0}, expected 1-4")]
    InvalidSlot(u8),

    #[error(transparent)]
    ArenaExhausted(#[from] ArenaExhausted),

    #[error(transparent)]
    Decode(#[from] FieldError),

    #[error("Unexpected chip ID 0x{found:02X}, expected 0x{expected:02X}")]
    UnexpectedChipId { found: u8, expected: u8 },
}

impl NpzError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        NpzError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NpzError>;
