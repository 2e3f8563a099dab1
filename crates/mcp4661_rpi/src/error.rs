use std::fmt::{Debug, Formatter};

use mcp4661_core::error::BuildError;

pub struct BusError {
    pub bus: u8,
    pub message: String,
}

impl Debug for BusError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_fmt(format_args!("i2c bus {}: {}", self.bus, self.message))
    }
}

impl BusError {
    pub fn from_rppal(bus: u8, err: rppal::i2c::Error) -> Self {
        Self {
            bus,
            message: format!("RpiI2cError - Cause: {}", err),
        }
    }
}

impl From<BusError> for BuildError {
    fn from(err: BusError) -> Self {
        BuildError::from_string(format!("{:?}", err))
    }
}
