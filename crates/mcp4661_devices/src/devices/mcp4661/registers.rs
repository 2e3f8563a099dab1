//! Memory map and command framing for the MCP4661.

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::error::ConfigurationError;

pub const VOLATILE_WIPER_0: u8 = 0x00;
pub const VOLATILE_WIPER_1: u8 = 0x01;
pub const NON_VOLATILE_WIPER_0: u8 = 0x02;
pub const NON_VOLATILE_WIPER_1: u8 = 0x03;

const DATA_MASK: u16 = 0x1FF;
const STATUS_EEPROM_WRITE_ACTIVE: u16 = 1 << 4;
const STATUS_WIPER_LOCK_1: u16 = 1 << 3;
const STATUS_WIPER_LOCK_0: u16 = 1 << 2;
const STATUS_WRITE_PROTECT: u16 = 1 << 0;

///The 2 bit command field of the command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Write = 0b00,
    Increment = 0b01,
    Decrement = 0b10,
    Read = 0b11,
}

///Wiper resolution of the part: the MCP4631/4641 family is 7 bit, the MCP4651/4661 family 8 bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Bits7,
    Bits8,
}

impl Resolution {
    pub fn bits(self) -> u8 {
        match self {
            Resolution::Bits7 => 7,
            Resolution::Bits8 => 8,
        }
    }

    ///Largest wiper code, `2^bits - 1`.
    pub fn max_code(self) -> u16 {
        (1 << self.bits()) - 1
    }
}

impl TryFrom<u8> for Resolution {
    type Error = ConfigurationError;

    fn try_from(bits: u8) -> Result<Self, ConfigurationError> {
        match bits {
            7 => Ok(Resolution::Bits7),
            8 => Ok(Resolution::Bits8),
            _ => Err(ConfigurationError::new(format!(
                "MCP4661 resolution must be 7 or 8 bits, got {}",
                bits
            ))),
        }
    }
}

///Registers in the memory map that are not wipers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum MemoryLocation {
    Tcon,
    Status,
    Data0,
    Data1,
    Data2,
    Data3,
    Data4,
    Data5,
    Data6,
    Data7,
    Data8,
    Data9,
}

impl MemoryLocation {
    pub const ALL: [MemoryLocation; 12] = [
        MemoryLocation::Tcon,
        MemoryLocation::Status,
        MemoryLocation::Data0,
        MemoryLocation::Data1,
        MemoryLocation::Data2,
        MemoryLocation::Data3,
        MemoryLocation::Data4,
        MemoryLocation::Data5,
        MemoryLocation::Data6,
        MemoryLocation::Data7,
        MemoryLocation::Data8,
        MemoryLocation::Data9,
    ];

    pub fn address(self) -> u8 {
        match self {
            MemoryLocation::Tcon => 0x04,
            MemoryLocation::Status => 0x05,
            MemoryLocation::Data0 => 0x06,
            MemoryLocation::Data1 => 0x07,
            MemoryLocation::Data2 => 0x08,
            MemoryLocation::Data3 => 0x09,
            MemoryLocation::Data4 => 0x0A,
            MemoryLocation::Data5 => 0x0B,
            MemoryLocation::Data6 => 0x0C,
            MemoryLocation::Data7 => 0x0D,
            MemoryLocation::Data8 => 0x0E,
            MemoryLocation::Data9 => 0x0F,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MemoryLocation::Tcon => "TCON",
            MemoryLocation::Status => "STATUS",
            MemoryLocation::Data0 => "DATA_0",
            MemoryLocation::Data1 => "DATA_1",
            MemoryLocation::Data2 => "DATA_2",
            MemoryLocation::Data3 => "DATA_3",
            MemoryLocation::Data4 => "DATA_4",
            MemoryLocation::Data5 => "DATA_5",
            MemoryLocation::Data6 => "DATA_6",
            MemoryLocation::Data7 => "DATA_7",
            MemoryLocation::Data8 => "DATA_8",
            MemoryLocation::Data9 => "DATA_9",
        }
    }

    ///STATUS is the only read-only location.
    pub fn is_writable(self) -> bool {
        self != MemoryLocation::Status
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MemoryLocation {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, ConfigurationError> {
        let wanted = s.trim().to_ascii_uppercase();
        MemoryLocation::ALL
            .into_iter()
            .find(|location| location.name() == wanted)
            .ok_or_else(|| {
                ConfigurationError::new(format!(
                    "unknown MCP4661 memory location {:?}, expected TCON, STATUS or DATA_0 to DATA_9",
                    s
                ))
            })
    }
}

impl TryFrom<String> for MemoryLocation {
    type Error = ConfigurationError;

    fn try_from(s: String) -> Result<Self, ConfigurationError> {
        s.parse()
    }
}

///Memory map address of a wiper register.
pub fn wiper_address(wiper: u8, is_volatile: bool) -> u8 {
    if is_volatile {
        VOLATILE_WIPER_0 + wiper
    } else {
        NON_VOLATILE_WIPER_0 + wiper
    }
}

///First byte of every transfer: 4 bit address, 2 bit command, then data bits D9 and D8.
pub fn command_byte(address: u8, command: Command, data: u16) -> u8 {
    (address << 4) | ((command as u8) << 2) | (((data & DATA_MASK) >> 8) as u8)
}

///Value from the two bytes the chip returns after a read command. Only D8 of the first byte is data.
pub fn decode_value(bytes: [u8; 2]) -> u16 {
    (((bytes[0] & 0x01) as u16) << 8) | bytes[1] as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    pub eeprom_write_active: bool,
    pub wiper_lock_1: bool,
    pub wiper_lock_0: bool,
    pub write_protect: bool,
}

impl From<u16> for Status {
    fn from(value: u16) -> Self {
        Status {
            eeprom_write_active: value & STATUS_EEPROM_WRITE_ACTIVE != 0,
            wiper_lock_1: value & STATUS_WIPER_LOCK_1 != 0,
            wiper_lock_0: value & STATUS_WIPER_LOCK_0 != 0,
            write_protect: value & STATUS_WRITE_PROTECT != 0,
        }
    }
}

///Terminal connections of one resistor network, one nibble of TCON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Terminals {
    ///false forces the network into hardware shutdown
    pub enabled: bool,
    pub a: bool,
    pub w: bool,
    pub b: bool,
}

impl Terminals {
    pub const CONNECTED: Terminals = Terminals {
        enabled: true,
        a: true,
        w: true,
        b: true,
    };

    fn nibble(self) -> u16 {
        (self.enabled as u16) << 3 | (self.a as u16) << 2 | (self.w as u16) << 1 | self.b as u16
    }

    ///Terminals of `wiper` as encoded in a TCON value.
    pub fn from_tcon(tcon: u16, wiper: u8) -> Self {
        let nibble = tcon >> (4 * wiper as u16);
        Terminals {
            enabled: nibble & 0b1000 != 0,
            a: nibble & 0b0100 != 0,
            w: nibble & 0b0010 != 0,
            b: nibble & 0b0001 != 0,
        }
    }

    ///`tcon` with the nibble for `wiper` replaced. The general call bit is kept.
    pub fn apply_to_tcon(self, tcon: u16, wiper: u8) -> u16 {
        let shift = 4 * wiper as u16;
        let cleared = tcon & !(0xF << shift) & DATA_MASK;
        cleared | (self.nibble() << shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_byte_layout() {
        assert_eq!(command_byte(VOLATILE_WIPER_1, Command::Write, 0x080), 0x10);
        assert_eq!(command_byte(VOLATILE_WIPER_0, Command::Write, 0x100), 0x01);
        assert_eq!(command_byte(0x05, Command::Read, 0), 0x5C);
        assert_eq!(command_byte(VOLATILE_WIPER_0, Command::Increment, 0), 0x04);
        assert_eq!(command_byte(VOLATILE_WIPER_1, Command::Decrement, 0), 0x18);
    }

    #[test]
    fn decode_ignores_reserved_bits() {
        assert_eq!(decode_value([0xFE, 0x80]), 0x080);
        assert_eq!(decode_value([0xFF, 0x00]), 0x100);
    }

    #[test]
    fn wiper_addresses() {
        assert_eq!(wiper_address(0, true), 0x00);
        assert_eq!(wiper_address(1, true), 0x01);
        assert_eq!(wiper_address(0, false), 0x02);
        assert_eq!(wiper_address(1, false), 0x03);
    }

    #[test]
    fn resolution_bounds() {
        assert_eq!(Resolution::try_from(7).unwrap().max_code(), 127);
        assert_eq!(Resolution::try_from(8).unwrap().max_code(), 255);
        assert!(Resolution::try_from(6).is_err());
        assert!(Resolution::try_from(9).is_err());
    }

    #[test]
    fn memory_locations_parse_by_name() {
        assert_eq!("STATUS".parse::<MemoryLocation>().unwrap(), MemoryLocation::Status);
        assert_eq!("data_6".parse::<MemoryLocation>().unwrap(), MemoryLocation::Data6);
        assert_eq!("DATA_6".parse::<MemoryLocation>().unwrap().address(), 0x0C);
        assert!("DATA_10".parse::<MemoryLocation>().is_err());
        assert!("WIPER_0".parse::<MemoryLocation>().is_err());
    }

    #[test]
    fn memory_map_is_contiguous_and_unique() {
        for (i, location) in MemoryLocation::ALL.iter().enumerate() {
            assert_eq!(location.address(), 0x04 + i as u8);
        }
        assert!(!MemoryLocation::Status.is_writable());
        assert!(MemoryLocation::Data9.is_writable());
    }

    #[test]
    fn status_bits() {
        let status = Status::from(0x1E0 | 0b1_0001);
        assert!(status.eeprom_write_active);
        assert!(status.write_protect);
        assert!(!status.wiper_lock_0);
        assert!(!status.wiper_lock_1);
    }

    #[test]
    fn terminals_round_trip_through_tcon() {
        let off = Terminals {
            enabled: false,
            a: true,
            w: false,
            b: true,
        };
        let tcon = off.apply_to_tcon(0x1FF, 1);
        assert_eq!(tcon, 0x15F);
        assert_eq!(Terminals::from_tcon(tcon, 1), off);
        assert_eq!(Terminals::from_tcon(tcon, 0), Terminals::CONNECTED);
    }

    #[test]
    fn terminals_keep_general_call_and_drop_bits_above_nine() {
        let tcon = Terminals::CONNECTED.apply_to_tcon(0xFE00 | 0x100, 0);
        assert_eq!(tcon, 0x10F);
    }
}
