use std::sync::Arc;

use embedded_hal::i2c;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{lock_chip, registers::Resolution, SharedChip};
use crate::error::DeviceError;

///Wiper code for a normalized output value. Out of range values are clamped, NaN counts as 0 and
///halves round up, so 0.5 on an 8 bit part is 128.
pub fn fraction_to_code(fraction: f64, resolution: Resolution) -> u16 {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    (fraction * resolution.max_code() as f64).round() as u16
}

///One wiper driven as a float output.
pub struct OutputChannel<I2C> {
    name: String,
    chip: SharedChip<I2C>,
    channel: u8,
    is_volatile: bool,
}

impl<I2C> Clone for OutputChannel<I2C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            chip: Arc::clone(&self.chip),
            channel: self.channel,
            is_volatile: self.is_volatile,
        }
    }
}

impl<I2C> OutputChannel<I2C>
where
    I2C: i2c::I2c,
{
    pub fn new(name: &str, chip: SharedChip<I2C>, channel: u8, is_volatile: bool) -> Self {
        Self {
            name: name.to_string(),
            chip,
            channel,
            is_volatile,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_volatile(&self) -> bool {
        self.is_volatile
    }

    pub(super) fn chip(&self) -> &SharedChip<I2C> {
        &self.chip
    }

    ///Sets the wiper from a value in [0, 1]. Returns the code written.
    pub fn set_value(&self, fraction: f64) -> Result<u16, DeviceError<I2C::Error>> {
        let mut chip = lock_chip(&self.chip);
        let code = fraction_to_code(fraction, chip.resolution());
        debug!("{}: state = {} wiper_value = {:#04x}", self.name, fraction, code);
        chip.write_wiper(self.channel, code, self.is_volatile)
    }
}

impl<I2C> OutputChannel<I2C>
where
    I2C: i2c::I2c + Send + 'static,
{
    ///Applies every value received on `rx` until the sender goes away or the token is cancelled.
    ///A failed write is logged and the next value is tried as normal.
    pub fn spawn(self, mut rx: mpsc::Receiver<f64>, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(value) => {
                            if let Err(err) = self.set_value(value) {
                                error!("error setting MCP4661 output {}! {}", self.name, err);
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("MCP4661 output task for {} shutting down.", self.name)
        })
    }
}
