//! Bus implementations.
//!
//! Board adapters implement [`crate::hw_trait::I2c`] where they live. This
//! module carries the simulated register-file bus used by the tests and by
//! `npzctl plan`.

pub mod sim;

pub use sim::{SimBus, Transaction};
