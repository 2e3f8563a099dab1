use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use embedded_hal::i2c;
use futures::future::join_all;
use mcp4661_core::{
    error::BuildError, Input, InputKind, ModuleBuilder, ModuleIO, Output, OutputKind,
};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConfigurationError, DeviceError};

pub mod driver;
pub mod output;
pub mod registers;
pub mod sensor;

pub use driver::{Mcp4661, DEFAULT_ADDRESS};
pub use output::OutputChannel;
pub use registers::{MemoryLocation, Resolution, Status, Terminals};
pub use sensor::{SensorChannel, SensorKind, SensorSource};

///The chip handle every channel of one device shares. The mutex keeps one transaction on the bus at a time.
pub type SharedChip<I2C> = Arc<Mutex<Mcp4661<I2C>>>;

pub(crate) fn lock_chip<I2C>(chip: &SharedChip<I2C>) -> MutexGuard<'_, Mcp4661<I2C>> {
    match chip.lock() {
        Ok(chip) => chip,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn default_bus() -> u8 {
    1
}

fn default_address() -> u8 {
    DEFAULT_ADDRESS
}

fn default_bits() -> u8 {
    8
}

fn default_wipers() -> u8 {
    2
}

fn default_period_ms() -> u64 {
    sensor::DEFAULT_PERIOD.as_millis() as u64
}

#[derive(Debug, Deserialize)]
pub struct OutputChannelConfig {
    pub channel: u8,
    pub volatile: bool,
    ///TCON setting for this wiper's resistor network, applied once at startup
    #[serde(default)]
    pub terminals: Option<Terminals>,
}

#[derive(Debug, Deserialize)]
pub struct SensorChannelConfig {
    pub kind: SensorKind,
    ///wiper sensors only, defaults to 0
    #[serde(default)]
    pub channel: Option<u8>,
    ///wiper sensors only, defaults to true
    #[serde(default)]
    pub volatile: Option<bool>,
    #[serde(default)]
    pub location: Option<MemoryLocation>,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub normalized: bool,
}

impl SensorChannelConfig {
    pub fn source(&self) -> Result<SensorSource, ConfigurationError> {
        match (self.kind, self.location) {
            (SensorKind::Wiper, None) => Ok(SensorSource::Wiper {
                channel: self.channel.unwrap_or(0),
                is_volatile: self.volatile.unwrap_or(true),
            }),
            (SensorKind::Memory, Some(location)) if self.channel.is_some() || self.volatile.is_some() => {
                Err(ConfigurationError::new(format!(
                    "channel and volatile only apply to wiper sensors, memory sensor reads {}",
                    location
                )))
            }
            (SensorKind::Wiper, Some(location)) => Err(ConfigurationError::new(format!(
                "location {} only applies to memory sensors",
                location
            ))),
            (SensorKind::Memory, Some(location)) => Ok(SensorSource::Memory(location)),
            (SensorKind::Memory, None) => Err(ConfigurationError::message(
                "memory sensors need a location",
            )),
        }
    }

    pub fn period(&self) -> Result<Duration, ConfigurationError> {
        if self.period_ms == 0 {
            Err(ConfigurationError::message("sensor period_ms must be greater than zero"))
        } else {
            Ok(Duration::from_millis(self.period_ms))
        }
    }
}

//system level config -- corresponds to 1 potentiometer chip
#[derive(Debug, Deserialize)]
pub struct Mcp4661DeviceConfig {
    #[serde(default = "default_bus")]
    pub bus: u8,
    #[serde(default = "default_address")]
    pub i2c_address: u8,
    #[serde(default = "default_bits")]
    pub bits: u8,
    #[serde(default = "default_wipers")]
    pub wipers: u8,
    #[serde(default)]
    pub outputs: HashMap<String, OutputChannelConfig>,
    #[serde(default)]
    pub sensors: HashMap<String, SensorChannelConfig>,
}

///One chip and the channels attached to it.
pub struct Mcp4661Device<I2C> {
    chip: SharedChip<I2C>,
    outputs: Vec<OutputChannel<I2C>>,
    sensors: Vec<SensorChannel<I2C>>,
}

impl<I2C> Mcp4661Device<I2C>
where
    I2C: i2c::I2c,
{
    pub fn new(chip: Mcp4661<I2C>) -> Self {
        Self {
            chip: Arc::new(Mutex::new(chip)),
            outputs: Vec::new(),
            sensors: Vec::new(),
        }
    }

    ///A handle for constructing channels against this device.
    pub fn chip(&self) -> SharedChip<I2C> {
        Arc::clone(&self.chip)
    }

    fn check_owner(&self, chip: &SharedChip<I2C>, kind: &str, name: &str) -> Result<(), ConfigurationError> {
        if Arc::ptr_eq(chip, &self.chip) {
            Ok(())
        } else {
            Err(ConfigurationError::new(format!(
                "{} channel {} was built for a different MCP4661",
                kind, name
            )))
        }
    }

    fn check_wiper(&self, wiper: u8, kind: &str, name: &str) -> Result<(), ConfigurationError> {
        lock_chip(&self.chip)
            .check_channel(wiper)
            .map_err(|err| ConfigurationError::new(format!("{} channel {}: {}", kind, name, err)))
    }

    ///Adds an output channel. The wiper index is checked against the chip here, whoever built the channel.
    pub fn register_output_channel(&mut self, channel: OutputChannel<I2C>) -> Result<(), ConfigurationError> {
        self.check_owner(channel.chip(), "output", channel.name())?;
        self.check_wiper(channel.channel(), "output", channel.name())?;
        debug!("registered output channel {} on wiper {}", channel.name(), channel.channel());
        self.outputs.push(channel);
        Ok(())
    }

    pub fn register_sensor_channel(&mut self, channel: SensorChannel<I2C>) -> Result<(), ConfigurationError> {
        self.check_owner(channel.chip(), "sensor", channel.name())?;
        if let SensorSource::Wiper { channel: wiper, .. } = channel.source() {
            self.check_wiper(wiper, "sensor", channel.name())?;
        }
        debug!("registered sensor channel {} reading {:?}", channel.name(), channel.source());
        self.sensors.push(channel);
        Ok(())
    }

    pub fn outputs(&self) -> &[OutputChannel<I2C>] {
        &self.outputs
    }

    pub fn sensors(&self) -> &[SensorChannel<I2C>] {
        &self.sensors
    }

    pub fn dump_config(&self) {
        lock_chip(&self.chip).dump_config();
        for output in &self.outputs {
            info!(
                "  output {}: wiper {}, volatile = {}",
                output.name(),
                output.channel(),
                output.is_volatile()
            );
        }
        for sensor in &self.sensors {
            info!(
                "  sensor {}: {:?} every {:?}",
                sensor.name(),
                sensor.source(),
                sensor.period()
            );
        }
    }
}

impl<I2C> Mcp4661Device<I2C>
where
    I2C: i2c::I2c + Send + 'static,
{
    ///Spawns a task per channel. Outputs become `Output`s and sensors `Input`s, keyed by channel name.
    pub fn start(self, cancel_token: CancellationToken) -> Mcp4661Module {
        let mut join_handles: Vec<JoinHandle<()>> =
            Vec::with_capacity(self.outputs.len() + self.sensors.len());
        let mut outputs = HashMap::with_capacity(self.outputs.len());
        let mut inputs = HashMap::with_capacity(self.sensors.len());

        for channel in self.outputs {
            let (output, rx) = Output::new();
            outputs.insert(channel.name().to_string(), output);
            join_handles.push(channel.spawn(rx, cancel_token.clone()));
        }
        for channel in self.sensors {
            let (input, tx) = Input::new(f64::NAN);
            inputs.insert(channel.name().to_string(), input);
            join_handles.push(channel.spawn(tx, cancel_token.clone()));
        }

        let join_handle = tokio::spawn(async move {
            join_all(join_handles).await;
            debug!("MCP4661 tasks all done!")
        });

        Mcp4661Module {
            join_handle,
            outputs,
            inputs,
        }
    }
}

//running device instance
pub struct Mcp4661Module {
    pub join_handle: JoinHandle<()>,
    pub outputs: HashMap<String, Output<f64>>,
    pub inputs: HashMap<String, Input<f64>>,
}

impl From<Mcp4661Module> for ModuleIO {
    fn from(dev: Mcp4661Module) -> Self {
        ModuleIO {
            join_handle: dev.join_handle,
            inputs: dev
                .inputs
                .into_iter()
                .map(|(key, input)| (key, InputKind::Float(input)))
                .collect(),
            outputs: dev
                .outputs
                .into_iter()
                .map(|(key, out)| (key, OutputKind::Float(out)))
                .collect(),
        }
    }
}

impl Mcp4661Module {
    ///Validates `config`, registers its channels, applies terminal settings and starts polling.
    pub fn try_build<I2C>(
        config: &Mcp4661DeviceConfig,
        i2c: I2C,
        cancel_token: CancellationToken,
    ) -> Result<Self, BuildError>
    where
        I2C: i2c::I2c + Send + 'static,
    {
        let chip = Mcp4661::new(i2c, config.i2c_address, config.bits, config.wipers)?;
        let mut device = Mcp4661Device::new(chip);
        let mut errs: Vec<BuildError> = Vec::new();

        //sorted so startup logs and errors come out in a stable order
        let outputs: BTreeMap<_, _> = config.outputs.iter().collect();
        let sensors: BTreeMap<_, _> = config.sensors.iter().collect();

        for (name, cfg) in outputs {
            let channel = OutputChannel::new(name, device.chip(), cfg.channel, cfg.volatile);
            if let Err(err) = device.register_output_channel(channel) {
                errs.push(err.into());
                continue;
            }
            if let Some(terminals) = cfg.terminals {
                match lock_chip(&device.chip).set_terminals(cfg.channel, terminals) {
                    Ok(()) => {}
                    //bus errors are local to the operation; the output still works with the power-up TCON
                    Err(err @ DeviceError::I2c(_)) => {
                        warn!("could not set terminals for output {}, keeping the current setting: {}", name, err)
                    }
                    Err(err) => errs.push(BuildError::from_string(format!(
                        "could not set terminals for output {}: {}",
                        name, err
                    ))),
                }
            }
        }

        for (name, cfg) in sensors {
            let built = cfg.source().and_then(|source| {
                if cfg.normalized && source.kind() == SensorKind::Memory {
                    return Err(ConfigurationError::message(
                        "normalized only applies to wiper sensors",
                    ));
                }
                let channel = SensorChannel::new(name, device.chip(), source, cfg.period()?)
                    .normalized(cfg.normalized);
                device.register_sensor_channel(channel)
            });
            if let Err(err) = built {
                errs.push(BuildError::from_string(format!("sensor {}: {}", name, err)));
            }
        }

        if !errs.is_empty() {
            return Err(BuildError::from_errs(errs));
        }

        device.dump_config();
        Ok(device.start(cancel_token))
    }
}

pub struct Mcp4661DeviceBuilder<I2C, F>
where
    I2C: i2c::I2c + Send + 'static,
    F: Fn(u8) -> Result<I2C, BuildError>,
{
    i2c_bus_provider: F,
}

impl<I2C, F> Mcp4661DeviceBuilder<I2C, F>
where
    I2C: i2c::I2c + Send + 'static,
    F: Fn(u8) -> Result<I2C, BuildError>,
{
    pub fn new(i2c_bus_provider: F) -> Self {
        Mcp4661DeviceBuilder { i2c_bus_provider }
    }
}

impl<I2C, F> ModuleBuilder for Mcp4661DeviceBuilder<I2C, F>
where
    I2C: i2c::I2c + Send + 'static,
    F: Fn(u8) -> Result<I2C, BuildError>,
{
    type Config = Mcp4661DeviceConfig;
    type Module = Mcp4661Module;

    async fn try_build(
        &self,
        cfg: &Mcp4661DeviceConfig,
        cancel_token: CancellationToken,
    ) -> Result<Mcp4661Module, BuildError> {
        let i2c = (self.i2c_bus_provider)(cfg.bus)?;
        info!("building MCP4661 at {:#04x} on bus {}", cfg.i2c_address, cfg.bus);
        Mcp4661Module::try_build(cfg, i2c, cancel_token)
    }
}
