pub mod module;
pub mod pipe;

use std::collections::HashMap;

use module::ModuleConfig;
use pipe::PipeConfig;

use futures::future::join_all;
use mcp4661_core::{error::BuildError, InputKind, OutputKind};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

#[derive(Deserialize, Debug, Default)]
pub struct MetadataConfig {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    pub modules: config_rs::Map<String, ModuleConfig>,
    #[serde(default)]
    pub pipes: Vec<PipeConfig>,
}

///Everything a config started: task handles plus every input and output, keyed `module.channel`.
pub struct App {
    handles: Vec<JoinHandle<()>>,
    pub inputs: HashMap<String, InputKind>,
    pub outputs: HashMap<String, OutputKind>,
    ///devices that failed to build and were left out
    pub skipped: Vec<String>,
}

impl App {
    ///Waits for every module and pipe task to stop. Inputs and outputs stay alive until then.
    pub async fn join(self) {
        join_all(self.handles).await;
        debug!("all tasks stopped.");
    }
}

impl AppConfig {
    pub async fn build(self, cancel_token: CancellationToken) -> Result<App, BuildError> {
        let mut handles = Vec::with_capacity(128);
        let mut inputs = HashMap::with_capacity(128);
        let mut outputs = HashMap::with_capacity(128);
        let mut skipped = Vec::new();

        //build modules, which are collections of inputs and outputs
        debug!("building modules ...");
        for (module_key, module_config) in self.modules {
            trace!("building module {} ...", module_key);
            match module_config.build(cancel_token.clone()).await {
                Ok(module) => {
                    handles.push(module.join_handle);
                    //inputs and outputs are prefixed with the module's key
                    for (input_key, input) in module.inputs {
                        inputs.insert(format!("{}.{}", module_key, input_key), input);
                    }
                    for (output_key, output) in module.outputs {
                        outputs.insert(format!("{}.{}", module_key, output_key), output);
                    }
                }
                Err(err) if module_config.is_device() => {
                    error!("skipping device {}: {:?}", module_key, err);
                    skipped.push(module_key);
                }
                Err(err) => {
                    //stop whatever was already started
                    cancel_token.cancel();
                    return Err(BuildError::from_string(format!(
                        "Error building module {}: {:?}",
                        module_key, err
                    )));
                }
            }
        }

        //build pipes, which read from a single input and write to a single output
        debug!("done building modules. building pipes ...");
        let mut errs = Vec::new();
        for pipe_config in self.pipes {
            let touches_skipped = skipped.iter().any(|key| {
                [&pipe_config.from, &pipe_config.to]
                    .iter()
                    .any(|end| end.strip_prefix(key.as_str()).is_some_and(|rest| rest.starts_with('.')))
            });
            if touches_skipped {
                warn!("skipping pipe from {} to {}, its device was not built", pipe_config.from, pipe_config.to);
                continue;
            }
            trace!("building pipe {:?}", pipe_config);
            match pipe_config.try_build(&inputs, &outputs) {
                Ok(pipe) => handles.push(pipe.handle),
                Err(err) => errs.push(err),
            }
        }
        if !errs.is_empty() {
            cancel_token.cancel();
            return Err(BuildError::from_errs(errs));
        }
        debug!("done building pipes. done starting up.");

        Ok(App {
            handles,
            inputs,
            outputs,
            skipped,
        })
    }

    ///Builds everything, then runs until `cancel_token` is cancelled and all tasks have stopped.
    pub async fn start(self, cancel_token: CancellationToken) -> Result<(), BuildError> {
        self.build(cancel_token).await?.join().await;
        Ok(())
    }
}
