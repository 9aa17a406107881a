//! Driver and configuration planner for the nPZero power-management
//! companion chip.

pub mod hw_trait;
pub mod peripheral;
pub mod tracing;
pub mod transport;
