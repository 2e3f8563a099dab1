use embedded_hal::i2c;
use tracing::{debug, info};

use super::registers::{
    command_byte, decode_value, wiper_address, Command, MemoryLocation, Resolution, Status,
    Terminals,
};
use crate::error::{ConfigurationError, DeviceError};

///Address with A2, A1 and A0 tied low. The address pins select 0x28 through 0x2F.
pub const DEFAULT_ADDRESS: u8 = 0x28;
const VALID_I2C_ADDRESSES: std::ops::RangeInclusive<u8> = 0x28..=0x2F;

///Register level access to one MCP4661. Every call is exactly one blocking i2c transaction and
///nothing is cached, so reads always reflect the chip.
pub struct Mcp4661<I2C> {
    i2c: I2C,
    address: u8,
    resolution: Resolution,
    wipers: u8,
}

impl<I2C> Mcp4661<I2C>
where
    I2C: i2c::I2c,
{
    pub fn new(i2c: I2C, address: u8, bits: u8, wipers: u8) -> Result<Self, ConfigurationError> {
        if !VALID_I2C_ADDRESSES.contains(&address) {
            return Err(ConfigurationError::new(format!(
                "Invalid I2C address {:#04x} for MCP4661, expected 0x28 to 0x2F.",
                address
            )));
        }
        let resolution = Resolution::try_from(bits)?;
        if !(1..=2).contains(&wipers) {
            return Err(ConfigurationError::new(format!(
                "MCP4661 has 1 or 2 wipers, got {}",
                wipers
            )));
        }
        Ok(Self {
            i2c,
            address,
            resolution,
            wipers,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn wipers(&self) -> u8 {
        self.wipers
    }

    ///Fails unless `channel` names one of this chip's wipers.
    pub fn check_channel(&self, channel: u8) -> Result<(), ConfigurationError> {
        if channel < self.wipers {
            Ok(())
        } else {
            Err(ConfigurationError::new(format!(
                "MCP4661 at {:#04x} has {} wiper(s), channel {} is out of range",
                self.address, self.wipers, channel
            )))
        }
    }

    fn read_register(&mut self, address: u8) -> Result<u16, I2C::Error> {
        let mut buffer = [0u8; 2];
        self.i2c.write_read(
            self.address,
            &[command_byte(address, Command::Read, 0)],
            &mut buffer,
        )?;
        Ok(decode_value(buffer))
    }

    fn write_register(&mut self, address: u8, value: u16) -> Result<(), I2C::Error> {
        let command = command_byte(address, Command::Write, value);
        let data = (value & 0xFF) as u8;
        debug!(
            "writing bytes {:02x} {:02x} to {:#04x}, register {:#04x}, value {:#05x}",
            command, data, self.address, address, value
        );
        self.i2c.write(self.address, &[command, data])
    }

    ///Writes `value`, clamped to the resolution, to a wiper. Returns the code actually written.
    pub fn write_wiper(
        &mut self,
        channel: u8,
        value: u16,
        is_volatile: bool,
    ) -> Result<u16, DeviceError<I2C::Error>> {
        self.check_channel(channel)?;
        let code = value.min(self.resolution.max_code());
        self.write_register(wiper_address(channel, is_volatile), code)
            .map_err(DeviceError::I2c)?;
        Ok(code)
    }

    pub fn read_wiper(&mut self, channel: u8, is_volatile: bool) -> Result<u16, DeviceError<I2C::Error>> {
        self.check_channel(channel)?;
        self.read_register(wiper_address(channel, is_volatile))
            .map_err(DeviceError::I2c)
    }

    ///Raw 9 bit contents of a memory map location.
    pub fn read_location(&mut self, location: MemoryLocation) -> Result<u16, DeviceError<I2C::Error>> {
        self.read_register(location.address()).map_err(DeviceError::I2c)
    }

    pub fn write_location(
        &mut self,
        location: MemoryLocation,
        value: u16,
    ) -> Result<(), DeviceError<I2C::Error>> {
        if !location.is_writable() {
            return Err(ConfigurationError::new(format!("{} is read-only", location)).into());
        }
        if value > 0x1FF {
            return Err(ConfigurationError::new(format!(
                "{:#x} does not fit in the 9 bit {} register",
                value, location
            ))
            .into());
        }
        self.write_register(location.address(), value)
            .map_err(DeviceError::I2c)
    }

    fn step_wiper(&mut self, channel: u8, command: Command) -> Result<(), DeviceError<I2C::Error>> {
        self.check_channel(channel)?;
        self.i2c
            .write(
                self.address,
                &[command_byte(wiper_address(channel, true), command, 0)],
            )
            .map_err(DeviceError::I2c)
    }

    ///Moves a volatile wiper one step up. The chip saturates at full scale.
    pub fn increment_wiper(&mut self, channel: u8) -> Result<(), DeviceError<I2C::Error>> {
        self.step_wiper(channel, Command::Increment)
    }

    ///Moves a volatile wiper one step down. The chip saturates at zero.
    pub fn decrement_wiper(&mut self, channel: u8) -> Result<(), DeviceError<I2C::Error>> {
        self.step_wiper(channel, Command::Decrement)
    }

    pub fn read_status(&mut self) -> Result<Status, DeviceError<I2C::Error>> {
        self.read_location(MemoryLocation::Status).map(Status::from)
    }

    pub fn read_terminals(&mut self, channel: u8) -> Result<Terminals, DeviceError<I2C::Error>> {
        self.check_channel(channel)?;
        let tcon = self.read_location(MemoryLocation::Tcon)?;
        Ok(Terminals::from_tcon(tcon, channel))
    }

    ///Read-modify-write of TCON for one wiper's resistor network.
    pub fn set_terminals(
        &mut self,
        channel: u8,
        terminals: Terminals,
    ) -> Result<(), DeviceError<I2C::Error>> {
        self.check_channel(channel)?;
        let tcon = self.read_location(MemoryLocation::Tcon)?;
        self.write_location(MemoryLocation::Tcon, terminals.apply_to_tcon(tcon, channel))
    }

    pub fn dump_config(&self) {
        info!("MCP4661 at {:#04x}:", self.address);
        info!(
            "  bits = {}, wiper_value_max = {}",
            self.resolution.bits(),
            self.resolution.max_code()
        );
        info!("  wiper channels = {}", self.wipers);
    }

    ///Gives the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp4661_sims::SimMcp4661;

    fn setup(bits: u8, wipers: u8) -> (Mcp4661<SimMcp4661>, SimMcp4661) {
        let sim = SimMcp4661::new(DEFAULT_ADDRESS, bits);
        (
            Mcp4661::new(sim.clone(), DEFAULT_ADDRESS, bits, wipers).unwrap(),
            sim,
        )
    }

    #[test]
    fn initialize_validates_bits_and_wipers() {
        for bits in [7, 8] {
            for wipers in [1, 2] {
                let sim = SimMcp4661::new(DEFAULT_ADDRESS, bits);
                assert!(Mcp4661::new(sim, DEFAULT_ADDRESS, bits, wipers).is_ok());
            }
        }
        for (bits, wipers) in [(0, 1), (6, 2), (9, 1), (16, 2), (8, 0), (7, 3), (8, 255)] {
            let sim = SimMcp4661::new(DEFAULT_ADDRESS, 8);
            assert!(
                Mcp4661::new(sim, DEFAULT_ADDRESS, bits, wipers).is_err(),
                "bits={} wipers={} should be rejected",
                bits,
                wipers
            );
        }
    }

    #[test]
    fn initialize_validates_address() {
        let sim = SimMcp4661::new(DEFAULT_ADDRESS, 8);
        assert!(Mcp4661::new(sim.clone(), 0x2F, 8, 2).is_ok());
        assert!(Mcp4661::new(sim, 0x50, 8, 2).is_err());
    }

    #[test]
    fn release_returns_the_bus() {
        let (chip, _sim) = setup(8, 2);
        assert_eq!(chip.address(), DEFAULT_ADDRESS);
        assert_eq!(chip.release().address(), DEFAULT_ADDRESS);
    }

    #[test]
    fn write_wiper_clamps_to_max_code() {
        let (mut chip, sim) = setup(7, 2);
        assert_eq!(chip.write_wiper(0, 500, true).unwrap(), 127);
        assert_eq!(sim.wiper(0, true), 127);

        let (mut chip, sim) = setup(8, 2);
        assert_eq!(chip.write_wiper(1, 0x1FF, true).unwrap(), 255);
        assert_eq!(sim.wiper(1, true), 255);
    }

    #[test]
    fn volatility_selects_register() {
        let (mut chip, sim) = setup(8, 2);
        chip.write_wiper(0, 10, true).unwrap();
        chip.write_wiper(0, 20, false).unwrap();
        assert_eq!(sim.writes_of(0x00), 1);
        assert_eq!(sim.writes_of(0x02), 1);
        assert_eq!(chip.read_wiper(0, true).unwrap(), 10);
        assert_eq!(chip.read_wiper(0, false).unwrap(), 20);
    }

    #[test]
    fn channel_out_of_range_is_a_configuration_error() {
        let (mut chip, sim) = setup(8, 1);
        let err = chip.write_wiper(1, 10, true).unwrap_err();
        assert!(matches!(err, DeviceError::Configuration(_)));
        assert_eq!(sim.transactions(), 0);
    }

    #[test]
    fn bus_failure_is_an_io_error() {
        let (mut chip, sim) = setup(8, 2);
        sim.fail_next(1);
        assert!(chip.write_wiper(0, 10, true).unwrap_err().is_io());
        assert!(chip.write_wiper(0, 10, true).is_ok());
    }

    #[test]
    fn non_volatile_value_survives_power_cycle() {
        let (mut chip, sim) = setup(8, 2);
        chip.write_wiper(1, 0xC3, false).unwrap();
        chip.write_wiper(1, 0x05, true).unwrap();
        sim.power_cycle();
        assert_eq!(chip.read_wiper(1, false).unwrap(), 0xC3);
        assert_eq!(chip.read_wiper(1, true).unwrap(), 0xC3);
    }

    #[test]
    fn data_locations_read_back() {
        let (mut chip, sim) = setup(8, 2);
        chip.write_location(MemoryLocation::Data6, 0x1A5).unwrap();
        assert_eq!(sim.data(6), 0x1A5);
        sim.power_cycle();
        assert_eq!(chip.read_location(MemoryLocation::Data6).unwrap(), 0x1A5);
    }

    #[test]
    fn status_cannot_be_written() {
        let (mut chip, sim) = setup(8, 2);
        let err = chip.write_location(MemoryLocation::Status, 0).unwrap_err();
        assert!(matches!(err, DeviceError::Configuration(_)));
        assert_eq!(sim.transactions(), 0);
        assert!(chip.write_location(MemoryLocation::Data0, 0x200).is_err());
    }

    #[test]
    fn status_reports_write_protect() {
        let (mut chip, sim) = setup(8, 2);
        assert!(!chip.read_status().unwrap().write_protect);
        sim.set_write_protect(true);
        assert!(chip.read_status().unwrap().write_protect);
        assert!(chip.write_wiper(0, 1, false).unwrap_err().is_io());
    }

    #[test]
    fn increment_and_decrement_move_volatile_wiper() {
        let (mut chip, sim) = setup(8, 2);
        chip.write_wiper(0, 100, true).unwrap();
        chip.increment_wiper(0).unwrap();
        chip.increment_wiper(0).unwrap();
        chip.decrement_wiper(0).unwrap();
        assert_eq!(sim.wiper(0, true), 101);
        assert!(chip.increment_wiper(2).is_err());
    }

    #[test]
    fn terminals_update_only_their_nibble() {
        let (mut chip, _sim) = setup(8, 2);
        let open_a = Terminals {
            a: false,
            ..Terminals::CONNECTED
        };
        chip.set_terminals(0, open_a).unwrap();
        assert_eq!(chip.read_terminals(0).unwrap(), open_a);
        assert_eq!(chip.read_terminals(1).unwrap(), Terminals::CONNECTED);
        assert_eq!(chip.read_location(MemoryLocation::Tcon).unwrap(), 0x1FB);
    }
}
