use std::collections::HashMap;

use mcp4661_core::{
    error::BuildError,
    pipe::{Pipe, Unavailable},
    InputKind, OutputKind,
};
use serde::Deserialize;

//A `Pipe` reads values from an `Input` and writes them to an `Output`, both named `module.channel`
#[derive(Deserialize, Debug)]
pub struct PipeConfig {
    pub from: String,
    pub to: String,
    ///`forward` to pass failed-poll readings (NaN) on, the default `hold` drops them
    #[serde(default)]
    pub unavailable: Unavailable,
}

impl PipeConfig {
    pub fn try_build(
        &self,
        inputs: &HashMap<String, InputKind>,
        outputs: &HashMap<String, OutputKind>,
    ) -> Result<Pipe, BuildError> {
        let input = inputs.get(&self.from);
        let output = outputs.get(&self.to);

        match (input, output) {
            (Some(InputKind::Float(input)), Some(OutputKind::Float(output))) => Ok(Pipe::new(input, output, self.unavailable)),
            (input, output) => {
                let mut errs = Vec::with_capacity(2);
                if input.is_none() {
                    errs.push(format!("can't build Pipe from {} to {}. input {} not found.", self.from, self.to, self.from));
                }
                if output.is_none() {
                    errs.push(format!("can't build Pipe from {} to {}. output {} not found.", self.from, self.to, self.to));
                }
                Err(BuildError::messages(&errs))
            },
        }
    }
}
