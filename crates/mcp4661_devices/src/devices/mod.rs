///The MCP4661 is an i2c device from Microchip with two 7 or 8 bit digital potentiometers.
///
/// Each wiper has a volatile register and a non-volatile copy loaded at power-up. The chip also has
/// a terminal control register, a status register and ten words of general purpose EEPROM.
pub mod mcp4661;
