//! ep Runtime
//!
//! Composition and execution engine for streaming runners. Runners consume
//! batches over bounded channels; [`Pipeline`] chains them and [`Project`]
//! runs them side by side. Errors, cancellation and output schemas
//! propagate through composites.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constant;
pub mod context;
#[cfg(any(test, feature = "testing"))]
pub mod harness;
pub mod map_inp_to_out;
pub mod passthrough;
pub mod pipeline;
pub mod project;
pub mod registry;
pub mod runner;

pub use config::EngineConfig;
pub use constant::Const;
pub use context::{
    Context, DataReceiver, DataSender, drain, drain_until_cancelled, forward_until_cancelled, recv,
    send,
};
pub use map_inp_to_out::MapInpToOut;
pub use passthrough::PassThrough;
pub use pipeline::Pipeline;
pub use project::Project;
pub use registry::{Decoder, RegistryError, RunnerRegistry, RunnerSpec, encode_bytes};
pub use runner::{ApproxSizer, ArgsRunner, FilterRunner, PushRunner, Runner, ScopesRunner};
