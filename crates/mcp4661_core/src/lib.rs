//!Core types shared by every crate in the workspace: the `Input` and `Output` channel ends that
//!device channels plug into, the `Module` traits used by configuration, and the error type
//!module builds return.

use error::BuildError;
use std::{collections::HashMap, fmt, future::Future};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

pub mod error;
pub mod feedback;
pub mod log;
pub mod pipe;

///A periodic-measurement source. Holds the latest published value; readers subscribe with `source`.
pub struct Input<T> {
    rx: watch::Receiver<T>,
}

impl<T> Input<T> {
    pub fn new(start: T) -> (Self, watch::Sender<T>) {
        let (tx, rx) = watch::channel(start);
        (Self { rx }, tx)
    }
    pub fn source(&self) -> watch::Receiver<T> {
        self.rx.clone()
    }
}

///A normalized-output sink. Values sent through `sink` are consumed by whatever task owns the receiver.
pub struct Output<T> {
    pub tx: mpsc::Sender<T>,
}

impl<T> Output<T> {
    pub fn new() -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }
    pub fn sink(&self) -> mpsc::Sender<T> {
        self.tx.clone()
    }
}

///`Input` kinds when using configuration.
pub enum InputKind {
    Float(Input<f64>),
}

impl fmt::Debug for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(_) => f.write_str("Float"),
        }
    }
}

///`Output` kinds when using configuration.
pub enum OutputKind {
    Float(Output<f64>),
}

impl fmt::Debug for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(_) => f.write_str("Float"),
        }
    }
}

///When using configuration, ModuleIO holds the inputs, outputs and a join handle provided by a `Module`.
///
///Callers should use `join_handle.await`
pub struct ModuleIO {
    pub join_handle: JoinHandle<()>,
    pub inputs: HashMap<String, InputKind>,
    pub outputs: HashMap<String, OutputKind>,
}

///A configurable entity that can provide a ModuleIO.
///
/// A module is a black box with zero or more named `Input`s and zero or more named `Output`s.
/// A potentiometer exposes one `Output` per wiper it drives and one `Input` per register it polls.
pub trait Module: Into<ModuleIO> {
    type Config;

    fn try_build(
        cfg: &Self::Config,
        cancel_token: CancellationToken,
    ) -> impl Future<Output = Result<Self, BuildError>>;
}

///Similar to a `Module`, but built by an entity that holds something the module needs, such as an i2c bus provider.
pub trait ModuleBuilder {
    type Config;
    type Module: Into<ModuleIO>;

    fn try_build(
        &self,
        cfg: &Self::Config,
        cancel_token: CancellationToken,
    ) -> impl Future<Output = Result<Self::Module, BuildError>>;
}
