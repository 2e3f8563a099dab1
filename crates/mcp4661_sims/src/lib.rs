//!Simulated hardware. These stand in for real chips on the i2c bus, so device modules can run
//!without a Raspberry Pi attached and can be tested against bus faults.

pub mod mcp4661;

pub use mcp4661::{SimError, SimMcp4661};
