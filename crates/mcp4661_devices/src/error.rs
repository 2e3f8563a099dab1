use std::fmt::{self, Debug, Display};

use mcp4661_core::error::BuildError;

///A device or channel was set up with parameters the chip cannot honour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn message(s: &str) -> Self {
        Self {
            message: s.to_string(),
        }
    }

    pub fn new(s: String) -> Self {
        Self { message: s }
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConfigurationError {}

impl From<ConfigurationError> for BuildError {
    fn from(err: ConfigurationError) -> Self {
        BuildError::from_string(err.message)
    }
}

///Error from a single register operation. `I2c` carries the bus error; the operation can be retried.
#[derive(Debug)]
pub enum DeviceError<E> {
    Configuration(ConfigurationError),
    I2c(E),
}

impl<E> DeviceError<E> {
    pub fn is_io(&self) -> bool {
        matches!(self, DeviceError::I2c(_))
    }
}

impl<E> From<ConfigurationError> for DeviceError<E> {
    fn from(err: ConfigurationError) -> Self {
        DeviceError::Configuration(err)
    }
}

impl<E: Debug> Display for DeviceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Configuration(err) => write!(f, "configuration error: {}", err),
            DeviceError::I2c(err) => write!(f, "i2c transaction failed: {:?}", err),
        }
    }
}

impl<E: Debug> std::error::Error for DeviceError<E> {}

impl<E: Debug> From<DeviceError<E>> for BuildError {
    fn from(err: DeviceError<E>) -> Self {
        BuildError::from_string(err.to_string())
    }
}
