//! `Pipe` carries measurements from an `Input` to an `Output`, such as a sensor reading into a
//! wiper output or a log.

use crate::{Input, Output};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

///What a pipe does with an unavailable reading. Sensors publish NaN for a failed poll, and a wiper
///output would turn that into code 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    ///Drop it. The sink keeps the last good value.
    #[default]
    Hold,
    ///Pass it on, for sinks that report outages.
    Forward,
}

pub struct Pipe {
    pub handle: JoinHandle<()>,
}

impl Pipe {
    ///Spawns a task sending the current reading and every later one to `output`. Ends when either side closes.
    pub fn new(input: &Input<f64>, output: &Output<f64>, unavailable: Unavailable) -> Pipe {
        let mut source = input.source();
        let sink = output.sink();

        let handle = tokio::spawn(async move {
            let mut held = 0usize;
            loop {
                let reading = *source.borrow_and_update();
                if reading.is_nan() && unavailable == Unavailable::Hold {
                    held += 1;
                    trace!("holding back unavailable reading");
                } else if let Err(err) = sink.send(reading).await {
                    debug!("pipe sink closed: {}", err);
                    break;
                }
                if source.changed().await.is_err() {
                    break;
                }
            }
            debug!("pipe shutting down, {} unavailable readings held back", held);
        });

        Pipe { handle }
    }
}
