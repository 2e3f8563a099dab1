use std::{sync::Arc, time::Duration};

use embedded_hal::i2c;
use serde::Deserialize;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{lock_chip, registers::MemoryLocation, SharedChip};
use crate::error::DeviceError;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Wiper,
    Memory,
}

///What a sensor channel reads on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSource {
    Wiper { channel: u8, is_volatile: bool },
    Memory(MemoryLocation),
}

impl SensorSource {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorSource::Wiper { .. } => SensorKind::Wiper,
            SensorSource::Memory(_) => SensorKind::Memory,
        }
    }
}

///Periodically reads a wiper or memory location and publishes it.
pub struct SensorChannel<I2C> {
    name: String,
    chip: SharedChip<I2C>,
    source: SensorSource,
    period: Duration,
    normalized: bool,
}

impl<I2C> Clone for SensorChannel<I2C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            chip: Arc::clone(&self.chip),
            source: self.source,
            period: self.period,
            normalized: self.normalized,
        }
    }
}

impl<I2C> SensorChannel<I2C>
where
    I2C: i2c::I2c,
{
    pub fn new(name: &str, chip: SharedChip<I2C>, source: SensorSource, period: Duration) -> Self {
        Self {
            name: name.to_string(),
            chip,
            source,
            period,
            normalized: false,
        }
    }

    ///Publish wiper readings as `code / max_code` instead of the raw code. 1/255 is about 0.0039,
    ///so three decimals are needed to tell adjacent steps apart.
    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> SensorSource {
        self.source
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub(super) fn chip(&self) -> &SharedChip<I2C> {
        &self.chip
    }

    ///One read transaction, converted to the published reading.
    pub fn poll(&self) -> Result<f64, DeviceError<I2C::Error>> {
        let mut chip = lock_chip(&self.chip);
        match self.source {
            SensorSource::Wiper {
                channel,
                is_volatile,
            } => {
                let code = chip.read_wiper(channel, is_volatile)?;
                if self.normalized {
                    let max_code = chip.resolution().max_code() as f64;
                    Ok((code as f64 / max_code).min(1.0))
                } else {
                    Ok(code as f64)
                }
            }
            SensorSource::Memory(location) => Ok(chip.read_location(location)? as f64),
        }
    }
}

impl<I2C> SensorChannel<I2C>
where
    I2C: i2c::I2c + Send + 'static,
{
    ///Polls once per period until cancelled or until nobody holds the receiving end. A failed poll
    ///publishes NaN for that cycle and the next tick tries again.
    pub fn spawn(self, tx: watch::Sender<f64>, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            //ticks are fixed, a slow transaction does not push the schedule back
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = ticker.tick() => {},
                }

                let reading = match self.poll() {
                    Ok(reading) => reading,
                    Err(err) => {
                        warn!("error reading MCP4661 sensor {}: {}", self.name, err);
                        f64::NAN
                    }
                };
                if let Err(err) = tx.send(reading) {
                    debug!("MCP4661 sensor {} has no listeners: {:?}", self.name, err);
                    break;
                }
            }
            debug!("shutting down MCP4661 sensor {}!", self.name);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mcp4661::{driver::DEFAULT_ADDRESS, Mcp4661};
    use mcp4661_core::Input;
    use mcp4661_sims::SimMcp4661;
    use std::sync::Mutex;
    use tokio::time::sleep;

    fn shared(bits: u8) -> (SharedChip<SimMcp4661>, SimMcp4661) {
        let sim = SimMcp4661::new(DEFAULT_ADDRESS, bits);
        let chip = Mcp4661::new(sim.clone(), DEFAULT_ADDRESS, bits, 2).unwrap();
        (Arc::new(Mutex::new(chip)), sim)
    }

    fn wiper(channel: u8, is_volatile: bool) -> SensorSource {
        SensorSource::Wiper {
            channel,
            is_volatile,
        }
    }

    #[test]
    fn polls_raw_and_normalized_wiper() {
        let (chip, _sim) = shared(8);
        lock_chip(&chip).write_wiper(1, 51, true).unwrap();

        let raw = SensorChannel::new("raw", chip.clone(), wiper(1, true), DEFAULT_PERIOD);
        assert_eq!(raw.poll().unwrap(), 51.0);

        let normalized = raw.clone().normalized(true);
        assert_eq!(normalized.poll().unwrap(), 0.2);
    }

    #[test]
    fn polls_memory_location() {
        let (chip, _sim) = shared(8);
        lock_chip(&chip)
            .write_location(MemoryLocation::Data3, 0x123)
            .unwrap();
        let sensor = SensorChannel::new(
            "data",
            chip,
            SensorSource::Memory(MemoryLocation::Data3),
            DEFAULT_PERIOD,
        );
        assert_eq!(sensor.source().kind(), SensorKind::Memory);
        assert_eq!(sensor.poll().unwrap(), 291.0);
    }

    #[test]
    fn nack_fails_one_cycle_then_recovers() {
        let (chip, sim) = shared(8);
        let sensor = SensorChannel::new("wiper", chip, wiper(0, false), DEFAULT_PERIOD);
        sim.fail_next(1);
        assert!(sensor.poll().unwrap_err().is_io());
        assert_eq!(sensor.poll().unwrap(), 128.0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_sensor_reads_once_per_tick() {
        let (chip, sim) = shared(8);
        let sensor = SensorChannel::new(
            "status",
            chip,
            SensorSource::Memory(MemoryLocation::Status),
            Duration::from_secs(1),
        );
        let (input, tx) = Input::new(f64::NAN);
        let mut source = input.source();
        let cancel_token = CancellationToken::new();
        let handle = sensor.spawn(tx, cancel_token.clone());

        source.changed().await.unwrap();
        assert_eq!(sim.reads_of(0x05), 1);
        assert_eq!(*source.borrow_and_update(), 480.0);

        sleep(Duration::from_millis(3500)).await;
        assert_eq!(sim.reads_of(0x05), 4);
        assert_eq!(sim.transactions(), 4);

        cancel_token.cancel();
        handle.await.unwrap();
        assert_eq!(sim.reads_of(0x05), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_stay_on_a_fixed_schedule() {
        let (chip, sim) = shared(8);
        let sensor = SensorChannel::new("wiper", chip, wiper(1, true), Duration::from_millis(250));
        let (input, tx) = Input::new(f64::NAN);
        let cancel_token = CancellationToken::new();
        let handle = sensor.spawn(tx, cancel_token.clone());

        sleep(Duration::from_millis(10_100)).await;
        assert_eq!(sim.reads_of(0x01), 41);

        cancel_token.cancel();
        handle.await.unwrap();
        drop(input);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_publishes_nan_and_polling_continues() {
        let (chip, sim) = shared(8);
        let sensor = SensorChannel::new("wiper", chip, wiper(0, true), Duration::from_secs(1));
        let (input, tx) = Input::new(0.0);
        let mut source = input.source();
        sim.fail_next(1);
        let _handle = sensor.spawn(tx, CancellationToken::new());

        source.changed().await.unwrap();
        assert!(source.borrow_and_update().is_nan());

        source.changed().await.unwrap();
        assert_eq!(*source.borrow_and_update(), 128.0);
    }

    #[tokio::test]
    async fn stops_when_input_is_dropped() {
        let (chip, _sim) = shared(8);
        let sensor = SensorChannel::new("wiper", chip, wiper(0, true), Duration::from_millis(5));
        let (input, tx) = Input::new(0.0);
        let handle = sensor.spawn(tx, CancellationToken::new());
        drop(input);
        handle.await.unwrap();
    }
}
