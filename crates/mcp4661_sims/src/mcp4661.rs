use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use tracing::trace;

const VOLATILE_WIPER_0: u8 = 0x00;
const VOLATILE_WIPER_1: u8 = 0x01;
const NON_VOLATILE_WIPER_0: u8 = 0x02;
const NON_VOLATILE_WIPER_1: u8 = 0x03;
const TCON: u8 = 0x04;
const STATUS: u8 = 0x05;
const DATA_FIRST: u8 = 0x06;
const DATA_LAST: u8 = 0x0F;

const CMD_WRITE: u8 = 0b00;
const CMD_INCREMENT: u8 = 0b01;
const CMD_DECREMENT: u8 = 0b10;
const CMD_READ: u8 = 0b11;

const TCON_DEFAULT: u16 = 0x1FF;
const STATUS_RESERVED: u16 = 0x1E0;

///Error raised by the simulated bus. The chip only ever signals trouble by not acknowledging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    Nack(NoAcknowledgeSource),
}

impl i2c::Error for SimError {
    fn kind(&self) -> ErrorKind {
        match self {
            SimError::Nack(source) => ErrorKind::NoAcknowledge(*source),
        }
    }
}

#[derive(Debug)]
struct ChipState {
    volatile_wipers: [u16; 2],
    non_volatile_wipers: [u16; 2],
    tcon: u16,
    data: [u16; (DATA_LAST - DATA_FIRST + 1) as usize],
    write_protect: bool,
    pending_failures: usize,
    transactions: usize,
    reads: HashMap<u8, usize>,
    writes: HashMap<u8, usize>,
}

impl ChipState {
    fn new(full_scale: u16) -> Self {
        let mid_scale = full_scale / 2;
        Self {
            volatile_wipers: [mid_scale; 2],
            non_volatile_wipers: [mid_scale; 2],
            tcon: TCON_DEFAULT,
            data: [0; (DATA_LAST - DATA_FIRST + 1) as usize],
            write_protect: false,
            pending_failures: 0,
            transactions: 0,
            reads: HashMap::new(),
            writes: HashMap::new(),
        }
    }

    fn register(&self, address: u8) -> Option<u16> {
        match address {
            VOLATILE_WIPER_0 | VOLATILE_WIPER_1 => {
                Some(self.volatile_wipers[address as usize])
            }
            NON_VOLATILE_WIPER_0 | NON_VOLATILE_WIPER_1 => {
                Some(self.non_volatile_wipers[(address - NON_VOLATILE_WIPER_0) as usize])
            }
            TCON => Some(self.tcon),
            STATUS => Some(STATUS_RESERVED | self.write_protect as u16),
            DATA_FIRST..=DATA_LAST => Some(self.data[(address - DATA_FIRST) as usize]),
            _ => None,
        }
    }

    fn write_register(&mut self, address: u8, value: u16, full_scale: u16) -> Result<(), SimError> {
        let nack = SimError::Nack(NoAcknowledgeSource::Data);
        let non_volatile = matches!(
            address,
            NON_VOLATILE_WIPER_0 | NON_VOLATILE_WIPER_1 | DATA_FIRST..=DATA_LAST
        );
        if self.write_protect && non_volatile {
            return Err(nack);
        }
        match address {
            VOLATILE_WIPER_0 | VOLATILE_WIPER_1 => {
                self.volatile_wipers[address as usize] = value.min(full_scale)
            }
            NON_VOLATILE_WIPER_0 | NON_VOLATILE_WIPER_1 => {
                self.non_volatile_wipers[(address - NON_VOLATILE_WIPER_0) as usize] =
                    value.min(full_scale)
            }
            TCON => self.tcon = value & 0x1FF,
            DATA_FIRST..=DATA_LAST => self.data[(address - DATA_FIRST) as usize] = value & 0x1FF,
            _ => return Err(nack),
        }
        *self.writes.entry(address).or_default() += 1;
        Ok(())
    }

    fn step_wiper(&mut self, address: u8, up: bool, full_scale: u16) -> Result<(), SimError> {
        match address {
            VOLATILE_WIPER_0 | VOLATILE_WIPER_1 => {
                let wiper = &mut self.volatile_wipers[address as usize];
                *wiper = if up {
                    (*wiper + 1).min(full_scale)
                } else {
                    wiper.saturating_sub(1)
                };
                *self.writes.entry(address).or_default() += 1;
                Ok(())
            }
            _ => Err(SimError::Nack(NoAcknowledgeSource::Data)),
        }
    }

    ///Runs every command packed into one write. Returns the address of the last read command, if any.
    fn apply_write(&mut self, bytes: &[u8], full_scale: u16) -> Result<Option<u8>, SimError> {
        let mut read_address = None;
        let mut i = 0;
        while i < bytes.len() {
            let command_byte = bytes[i];
            let address = command_byte >> 4;
            match (command_byte >> 2) & 0b11 {
                CMD_WRITE => {
                    let low = *bytes
                        .get(i + 1)
                        .ok_or(SimError::Nack(NoAcknowledgeSource::Data))?;
                    let value = (((command_byte & 0b11) as u16) << 8) | low as u16;
                    self.write_register(address, value, full_scale)?;
                    i += 2;
                }
                CMD_INCREMENT => {
                    self.step_wiper(address, true, full_scale)?;
                    i += 1;
                }
                CMD_DECREMENT => {
                    self.step_wiper(address, false, full_scale)?;
                    i += 1;
                }
                CMD_READ => {
                    if self.register(address).is_none() {
                        return Err(SimError::Nack(NoAcknowledgeSource::Data));
                    }
                    *self.reads.entry(address).or_default() += 1;
                    read_address = Some(address);
                    i += 1;
                }
                _ => unreachable!(),
            }
        }
        Ok(read_address)
    }
}

///An in-memory MCP4661. Clones share the same chip, so a test can keep one handle for inspection
///while the driver owns another.
#[derive(Clone, Debug)]
pub struct SimMcp4661 {
    address: u8,
    full_scale: u16,
    state: Arc<Mutex<ChipState>>,
}

impl SimMcp4661 {
    ///A chip answering at `address`. `bits` picks the 7 bit (full scale 0x80) or 8 bit (0x100) part.
    pub fn new(address: u8, bits: u8) -> Self {
        let full_scale = if bits == 7 { 0x80 } else { 0x100 };
        Self {
            address,
            full_scale,
            state: Arc::new(Mutex::new(ChipState::new(full_scale))),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChipState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    ///Do not acknowledge the next `count` transactions.
    pub fn fail_next(&self, count: usize) {
        self.state().pending_failures = count;
    }

    ///Lock the non-volatile memory the way the WP pin does.
    pub fn set_write_protect(&self, enabled: bool) {
        self.state().write_protect = enabled;
    }

    ///Power the chip off and on again: volatile wipers reload from non-volatile memory and TCON resets.
    pub fn power_cycle(&self) {
        let mut state = self.state();
        state.volatile_wipers = state.non_volatile_wipers;
        state.tcon = TCON_DEFAULT;
        trace!("simulated mcp4661 at {:#04x} power cycled", self.address);
    }

    pub fn wiper(&self, wiper: u8, is_volatile: bool) -> u16 {
        let state = self.state();
        if is_volatile {
            state.volatile_wipers[wiper as usize]
        } else {
            state.non_volatile_wipers[wiper as usize]
        }
    }

    pub fn data(&self, slot: u8) -> u16 {
        self.state().data[slot as usize]
    }

    ///Number of read commands addressed to `address`.
    pub fn reads_of(&self, address: u8) -> usize {
        self.state().reads.get(&address).copied().unwrap_or(0)
    }

    ///Number of accepted writes (including increments and decrements) to `address`.
    pub fn writes_of(&self, address: u8) -> usize {
        self.state().writes.get(&address).copied().unwrap_or(0)
    }

    ///Every transaction seen on the bus, acknowledged or not.
    pub fn transactions(&self) -> usize {
        self.state().transactions
    }
}

impl ErrorType for SimMcp4661 {
    type Error = SimError;
}

impl I2c for SimMcp4661 {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), SimError> {
        let full_scale = self.full_scale;
        let mut state = self.state();
        state.transactions += 1;

        if address != self.address {
            return Err(SimError::Nack(NoAcknowledgeSource::Address));
        }
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(SimError::Nack(NoAcknowledgeSource::Address));
        }

        let mut read_address = None;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if let Some(address) = state.apply_write(bytes, full_scale)? {
                        read_address = Some(address);
                    }
                }
                Operation::Read(buffer) => {
                    let value = read_address
                        .and_then(|address| state.register(address))
                        .ok_or(SimError::Nack(NoAcknowledgeSource::Data))?;
                    //continuous reads repeat the same register
                    for pair in buffer.chunks_mut(2) {
                        pair[0] = 0xFE | (value >> 8) as u8;
                        if let Some(low) = pair.get_mut(1) {
                            *low = value as u8;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: u8 = 0x2C;

    fn read(chip: &mut SimMcp4661, register: u8) -> u16 {
        let mut buffer = [0u8; 2];
        chip.write_read(ADDRESS, &[(register << 4) | (CMD_READ << 2)], &mut buffer)
            .unwrap();
        (((buffer[0] & 0x01) as u16) << 8) | buffer[1] as u16
    }

    #[test]
    fn powers_up_at_mid_scale() {
        let mut chip = SimMcp4661::new(ADDRESS, 8);
        assert_eq!(read(&mut chip, VOLATILE_WIPER_0), 0x80);
        assert_eq!(read(&mut chip, TCON), 0x1FF);

        let mut chip = SimMcp4661::new(ADDRESS, 7);
        assert_eq!(read(&mut chip, NON_VOLATILE_WIPER_1), 0x40);
    }

    #[test]
    fn write_then_read_includes_ninth_bit() {
        let mut chip = SimMcp4661::new(ADDRESS, 8);
        chip.write(ADDRESS, &[(VOLATILE_WIPER_1 << 4) | 0x01, 0x00]).unwrap();
        assert_eq!(read(&mut chip, VOLATILE_WIPER_1), 0x100);
        assert_eq!(chip.writes_of(VOLATILE_WIPER_1), 1);
    }

    #[test]
    fn wrong_address_is_not_acknowledged() {
        let mut chip = SimMcp4661::new(ADDRESS, 8);
        let err = chip.write(0x2D, &[0x00, 0x10]).unwrap_err();
        assert_eq!(err, SimError::Nack(NoAcknowledgeSource::Address));
    }

    #[test]
    fn status_is_read_only() {
        let mut chip = SimMcp4661::new(ADDRESS, 8);
        assert!(chip.write(ADDRESS, &[STATUS << 4, 0x00]).is_err());
    }

    #[test]
    fn increment_saturates_at_full_scale() {
        let mut chip = SimMcp4661::new(ADDRESS, 7);
        chip.write(ADDRESS, &[VOLATILE_WIPER_0 << 4, 0x80]).unwrap();
        chip.write(ADDRESS, &[(VOLATILE_WIPER_0 << 4) | (CMD_INCREMENT << 2)])
            .unwrap();
        assert_eq!(chip.wiper(0, true), 0x80);
    }

    #[test]
    fn injected_failures_clear_after_count() {
        let mut chip = SimMcp4661::new(ADDRESS, 8);
        chip.fail_next(1);
        let mut buffer = [0u8; 2];
        assert!(chip.write_read(ADDRESS, &[(STATUS << 4) | 0x0C], &mut buffer).is_err());
        assert!(chip.write_read(ADDRESS, &[(STATUS << 4) | 0x0C], &mut buffer).is_ok());
        assert_eq!(chip.reads_of(STATUS), 1);
        assert_eq!(chip.transactions(), 2);
    }

    #[test]
    fn power_cycle_reloads_volatile_wipers() {
        let mut chip = SimMcp4661::new(ADDRESS, 8);
        chip.write(ADDRESS, &[NON_VOLATILE_WIPER_0 << 4, 0x20]).unwrap();
        chip.write(ADDRESS, &[VOLATILE_WIPER_0 << 4, 0xF0]).unwrap();
        chip.power_cycle();
        assert_eq!(chip.wiper(0, true), 0x20);
    }

    #[test]
    fn write_protect_blocks_non_volatile_memory() {
        let mut chip = SimMcp4661::new(ADDRESS, 8);
        chip.set_write_protect(true);
        assert!(chip.write(ADDRESS, &[NON_VOLATILE_WIPER_0 << 4, 0x20]).is_err());
        assert!(chip.write(ADDRESS, &[VOLATILE_WIPER_0 << 4, 0x20]).is_ok());
        assert_eq!(read(&mut chip, STATUS) & 0x01, 1);
    }
}
