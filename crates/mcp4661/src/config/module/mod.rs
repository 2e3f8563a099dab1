use mcp4661_core::{
    error::BuildError,
    feedback::{Feedback, FeedbackConfig},
    log::{Log, LogConfig},
    Module, ModuleIO,
};
use mcp4661_devices::devices::mcp4661::Mcp4661DeviceConfig;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

//real hardware on a raspberry pi i2c bus
#[cfg(feature = "rpi")]
use mcp4661_core::ModuleBuilder;
#[cfg(feature = "rpi")]
use mcp4661_devices::devices::mcp4661::Mcp4661DeviceBuilder;

//simulated chip, one per module
#[cfg(feature = "sims")]
use mcp4661_devices::devices::mcp4661::Mcp4661Module;
#[cfg(feature = "sims")]
use mcp4661_sims::SimMcp4661;

/// Modules are collections of Inputs and/or Outputs provided by some black-box system.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum ModuleConfig {
    //core
    Feedback(FeedbackConfig),
    Log(LogConfig),

    #[cfg(feature = "rpi")]
    Mcp4661(Mcp4661DeviceConfig),
    #[cfg(feature = "sims")]
    SimMcp4661(Mcp4661DeviceConfig),
}

impl ModuleConfig {
    pub async fn build(&self, cancel_token: CancellationToken) -> Result<ModuleIO, BuildError> {
        match self {
            //core
            Self::Feedback(feedback_config) => Feedback::try_build(feedback_config, cancel_token)
                .await
                .map(|feedback| feedback.into()),
            Self::Log(log_config) => Log::try_build(log_config, cancel_token)
                .await
                .map(|log| log.into()),

            //devices
            #[cfg(feature = "rpi")]
            Self::Mcp4661(device_config) => Mcp4661DeviceBuilder::new(mcp4661_rpi::get_bus)
                .try_build(device_config, cancel_token)
                .await
                .map(|device| device.into()),
            #[cfg(feature = "sims")]
            Self::SimMcp4661(device_config) => {
                let sim = SimMcp4661::new(device_config.i2c_address, device_config.bits);
                Mcp4661Module::try_build(device_config, sim, cancel_token).map(|device| device.into())
            }
        }
    }

    ///Devices fail on their own; a failed device build does not stop the rest of the config.
    pub fn is_device(&self) -> bool {
        match self {
            Self::Feedback(_) | Self::Log(_) => false,
            #[cfg(feature = "rpi")]
            Self::Mcp4661(_) => true,
            #[cfg(feature = "sims")]
            Self::SimMcp4661(_) => true,
        }
    }
}
