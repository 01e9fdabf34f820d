//! Identity runner.

use crate::context::{Context, DataReceiver, DataSender, recv, send};
use crate::registry::RunnerSpec;
use crate::runner::Runner;
use async_trait::async_trait;
use ep_core::{CoreResult, Type};
use std::any::Any;

/// Forwards every input batch unchanged.
///
/// Pipelines drop pass-through stages, and a pipeline built only from them
/// collapses into a single `PassThrough`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassThrough;

impl PassThrough {
    /// Registry tag
    pub const KIND: &'static str = "passthrough";
}

#[async_trait]
impl Runner for PassThrough {
    async fn run(&self, ctx: &Context, mut inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        while let Some(data) = recv(ctx, &mut inp).await {
            send(ctx, &out, data).await?;
        }
        Ok(())
    }

    fn returns(&self) -> Vec<Type> {
        vec![Type::wildcard()]
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        other.is::<Self>()
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        Ok(RunnerSpec::unit(Self::KIND))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
