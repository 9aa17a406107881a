//! Peripheral chip drivers.
//!
//! Drivers are generic over the hw_trait interfaces, so the same code runs
//! against a board's bus adapter or the simulated bus.

pub mod npz;
