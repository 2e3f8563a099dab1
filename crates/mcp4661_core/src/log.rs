//! A module whose outputs write every value they receive to the log. Pipe a sensor channel into one
//! of these to watch a register from the console.

use std::collections::HashMap;

use crate::{error::BuildError, Module, ModuleIO, Output, OutputKind};
use futures::future::join_all;
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Deserialize, Debug)]
pub struct LogConfig {
    pub names: Vec<String>,
    ///decimal places used when formatting values
    #[serde(default = "default_precision")]
    pub precision: usize,
}

fn default_precision() -> usize {
    3
}

pub struct Log {
    join_handle: JoinHandle<()>,
    outputs: HashMap<String, OutputKind>,
}

impl From<Log> for ModuleIO {
    fn from(log: Log) -> Self {
        ModuleIO {
            join_handle: log.join_handle,
            inputs: HashMap::new(),
            outputs: log.outputs,
        }
    }
}

fn spawn_log_task(
    name: String,
    precision: usize,
    mut rx: mpsc::Receiver<f64>,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(value) if value.is_nan() => info!("{}: unavailable", name),
                    Some(value) => info!("{}: {:.*}", name, precision, value),
                    None => break,
                },
            }
        }
        debug!("log output {} shutting down", name);
    })
}

impl Module for Log {
    type Config = LogConfig;

    async fn try_build(cfg: &Self::Config, cancel_token: CancellationToken) -> Result<Self, BuildError> {
        let mut outputs = HashMap::with_capacity(cfg.names.len());
        let mut join_handles = Vec::with_capacity(cfg.names.len());
        for name in &cfg.names {
            if outputs.contains_key(name) {
                return Err(BuildError::from_string(format!("duplicate log output name {}", name)));
            }
            let (output, rx) = Output::new();
            join_handles.push(spawn_log_task(name.clone(), cfg.precision, rx, cancel_token.clone()));
            outputs.insert(name.clone(), OutputKind::Float(output));
        }

        Ok(Log {
            join_handle: tokio::spawn(async move {
                join_all(join_handles).await;
            }),
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_duplicate_names() {
        let cfg = LogConfig {
            names: vec!["wiper".to_string(), "wiper".to_string()],
            precision: 3,
        };
        assert!(Log::try_build(&cfg, CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn accepts_values_until_cancelled() {
        let cfg = LogConfig {
            names: vec!["status".to_string()],
            precision: 0,
        };
        let token = CancellationToken::new();
        let module: ModuleIO = Log::try_build(&cfg, token.clone()).await.unwrap().into();
        match module.outputs.get("status") {
            Some(OutputKind::Float(output)) => {
                output.sink().send(480.0).await.unwrap();
                output.sink().send(f64::NAN).await.unwrap();
            }
            None => panic!("missing output"),
        }
        token.cancel();
        module.join_handle.await.unwrap();
    }
}
