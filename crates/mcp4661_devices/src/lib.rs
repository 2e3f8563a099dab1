//!I2C device drivers that plug into the `mcp4661_core` input/output model.

pub mod error;

pub mod devices;
