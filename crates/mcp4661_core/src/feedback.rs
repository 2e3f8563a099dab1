use std::collections::HashMap;

use crate::{error::BuildError, Input, InputKind, Module, ModuleIO, Output, OutputKind};
use futures::future::join_all;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

///A named value held by a `Feedback` module. Anything sent to its output becomes the value of its input.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackItemConfig {
    Float { start: f64 },
}

#[derive(Deserialize, Debug)]
pub struct FeedbackConfig {
    pub items: HashMap<String, FeedbackItemConfig>,
}

/// A Feedback module is a collection of feedback pipes. Each one is an Input and an Output, such that
/// the Output sends its value to the Input. With a pipe from the input to a wiper output it doubles
/// as a setpoint: the start value is written at startup and later writes to the output move the wiper.
pub struct Feedback {
    join_handle: JoinHandle<()>,
    inputs: HashMap<String, InputKind>,
    outputs: HashMap<String, OutputKind>,
}

impl From<Feedback> for ModuleIO {
    fn from(feedback: Feedback) -> Self {
        ModuleIO {
            join_handle: feedback.join_handle,
            inputs: feedback.inputs,
            outputs: feedback.outputs,
        }
    }
}

fn spawn_feedback_pipe<T: Send + Sync + 'static>(
    start: T,
    cancel_token: CancellationToken,
) -> (Input<T>, Output<T>, JoinHandle<()>) {
    let (input, tx) = Input::new(start);
    let (output, mut rx) = Output::new();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(new_value) => {
                        if let Err(err) = tx.send(new_value) {
                            warn!("Error sending to Input from feedback pipe: {}", err);
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("feedback pipe shut down!")
    });
    (input, output, handle)
}

impl Module for Feedback {
    type Config = FeedbackConfig;

    async fn try_build(cfg: &Self::Config, cancel_token: CancellationToken) -> Result<Self, BuildError> {
        let mut inputs = HashMap::with_capacity(cfg.items.len());
        let mut outputs = HashMap::with_capacity(cfg.items.len());
        let mut join_handles = Vec::with_capacity(cfg.items.len());

        for (name, item_cfg) in &cfg.items {
            match item_cfg {
                FeedbackItemConfig::Float { start } => {
                    if !start.is_finite() {
                        return Err(BuildError::from_string(format!(
                            "feedback item {} must start at a finite value",
                            name
                        )));
                    }
                    let (input, output, join_handle) =
                        spawn_feedback_pipe(*start, cancel_token.clone());
                    inputs.insert(name.clone(), InputKind::Float(input));
                    outputs.insert(name.clone(), OutputKind::Float(output));
                    join_handles.push(join_handle);
                }
            }
        }

        Ok(Feedback {
            join_handle: tokio::spawn(async move {
                join_all(join_handles).await;
                debug!("feedback tasks all done!");
            }),
            inputs,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn output_writes_show_up_on_input() {
        let cfg = FeedbackConfig {
            items: HashMap::from([("volume".to_string(), FeedbackItemConfig::Float { start: 0.5 })]),
        };
        let module: ModuleIO = Feedback::try_build(&cfg, CancellationToken::new())
            .await
            .unwrap()
            .into();

        let mut source = match module.inputs.get("volume") {
            Some(InputKind::Float(input)) => input.source(),
            None => panic!("missing input"),
        };
        assert_eq!(*source.borrow(), 0.5);

        match module.outputs.get("volume") {
            Some(OutputKind::Float(output)) => output.sink().send(0.8).await.unwrap(),
            None => panic!("missing output"),
        }
        source.changed().await.unwrap();
        assert_eq!(*source.borrow(), 0.8);
    }

    #[tokio::test]
    async fn rejects_non_finite_start() {
        let cfg = FeedbackConfig {
            items: HashMap::from([("bad".to_string(), FeedbackItemConfig::Float { start: f64::NAN })]),
        };
        assert!(Feedback::try_build(&cfg, CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn cancellation_ends_the_module() {
        let cfg = FeedbackConfig {
            items: HashMap::from([("a".to_string(), FeedbackItemConfig::Float { start: 0.0 })]),
        };
        let token = CancellationToken::new();
        let module: ModuleIO = Feedback::try_build(&cfg, token.clone()).await.unwrap().into();
        token.cancel();
        module.join_handle.await.unwrap();
    }
}
