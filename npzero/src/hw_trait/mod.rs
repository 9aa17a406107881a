//! Hardware abstraction traits.
//!
//! Drivers in this crate are generic over these traits so the same driver
//! code runs against a board's bus adapter or the simulated bus in
//! [`crate::transport::sim`].

pub mod i2c;

pub use i2c::{I2c, I2cError};

use std::time::Duration;

use thiserror::Error;

/// Errors reported by hardware interfaces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HwError {
    #[error("I2C error: {0}")]
    I2c(#[from] I2cError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Bus operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, HwError>;
