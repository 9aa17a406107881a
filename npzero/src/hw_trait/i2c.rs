//! I2C bus interface.

use async_trait::async_trait;
use thiserror::Error;

use super::Result;

/// Failures at the byte-transfer level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum I2cError {
    #[error("No acknowledge from device 0x{0:02x}")]
    Nak(u8),

    #[error("{0}")]
    Other(String),
}

/// An I2C bus controller.
///
/// Addresses are 7-bit; implementations shift in the R/W bit themselves.
/// Each call is one complete transaction. Implementations must not retry;
/// callers decide what a failure means.
#[async_trait]
pub trait I2c: Send {
    /// Prepare the bus for use. Most controllers need nothing here.
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write `data` to the device at `addr`.
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()>;

    /// Read `buffer.len()` bytes from the device at `addr`.
    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()>;

    /// Write `write`, then read into `read` with a repeated start.
    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()>;

    /// Set the bus clock.
    async fn set_frequency(&mut self, hz: u32) -> Result<()>;
}
