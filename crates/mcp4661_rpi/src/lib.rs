//!Raspberry Pi i2c access through the rppal library.
//!
//! `get_bus` opens a bus that can be handed to the MCP4661 module builder in `mcp4661_devices`.

//internal error type for rpi i2c
pub mod error;

use error::BusError;
use mcp4661_core::error::BuildError;
pub use rppal::i2c::I2c;
use tracing::debug;

//get i2c bus by id
pub fn get_bus(bus: u8) -> Result<I2c, BuildError> {
    let i2c = I2c::with_bus(bus).map_err(|err| BusError::from_rppal(bus, err))?;
    debug!("opened i2c bus {}", bus);
    Ok(i2c)
}

