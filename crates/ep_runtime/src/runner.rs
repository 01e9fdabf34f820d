//! The runner contract.
//!
//! A [`Runner`] consumes batches from an input channel until it closes and
//! emits zero or more batches to its output channel. Runners are built once
//! when the graph is constructed and composed with
//! [`Pipeline`](crate::Pipeline) and [`Project`](crate::Project).
//!
//! Optional capabilities (declared input schema, filter pushdown, scopes,
//! push, size estimation) are separate traits. A runner opts in by
//! overriding the matching `as_*` accessor.

use crate::context::{Context, DataReceiver, DataSender};
use crate::registry::RunnerSpec;
use async_trait::async_trait;
use ep_core::{CoreResult, ScopeSet, SizeEstimate, Type};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug_span, warn};

/// Composable streaming operator over batches of rows
#[async_trait]
pub trait Runner: Send + Sync + fmt::Debug + 'static {
    /// Consume `inp` until it closes, emitting results to `out`.
    ///
    /// Returns `Ok(())` on graceful completion or cancellation. Dropping
    /// `out` (which happens when `run` returns) closes the output. A runner
    /// that stops early drops `inp`, so upstream senders see a closed
    /// channel instead of blocking.
    async fn run(&self, ctx: &Context, inp: DataReceiver, out: DataSender) -> CoreResult<()>;

    /// Output schema, possibly containing unresolved wildcards
    fn returns(&self) -> Vec<Type>;

    /// Structural equality
    fn equals(&self, other: &dyn Runner) -> bool;

    /// Registry tag this runner encodes under
    fn kind(&self) -> &'static str;

    /// Structural encoding, reconstructable through a
    /// [`RunnerRegistry`](crate::RunnerRegistry)
    fn encode(&self) -> CoreResult<RunnerSpec>;

    /// Upcast for downcasting to the concrete runner
    fn as_any(&self) -> &dyn Any;

    /// Declared input schema capability
    fn as_args(&self) -> Option<&dyn ArgsRunner> {
        None
    }

    /// Column filter pushdown capability
    fn as_filter(&self) -> Option<&dyn FilterRunner> {
        None
    }

    /// Scope dependency capability
    fn as_scopes(&self) -> Option<&dyn ScopesRunner> {
        None
    }

    /// Accept a pushed-down runner capability
    fn as_push(&self) -> Option<&dyn PushRunner> {
        None
    }

    /// Output size estimation capability
    fn as_sizer(&self) -> Option<&dyn ApproxSizer> {
        None
    }
}

impl dyn Runner {
    /// Downcast to a concrete runner type
    #[must_use]
    pub fn downcast_ref<T: Runner>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Check the concrete runner type
    #[must_use]
    pub fn is<T: Runner>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A runner that declares the input schema it expects
pub trait ArgsRunner {
    /// Expected input types
    fn args(&self) -> Vec<Type>;
}

/// A runner that can drop output columns it was told are unused
pub trait FilterRunner {
    /// Keep only the output columns flagged `true`
    fn filter(&self, keep: &[bool]);
}

/// A runner that depends on named scopes
pub trait ScopesRunner {
    /// Scopes this runner depends on
    fn scopes(&self) -> ScopeSet;
}

/// A runner that can absorb another runner pushed down into it
pub trait PushRunner {
    /// Try to absorb `runner`, which declares scopes. Returns whether it was
    /// accepted.
    fn push(&self, runner: Arc<dyn Runner>) -> bool;
}

/// A runner that can estimate how many rows it will output
pub trait ApproxSizer {
    /// Estimated output rows
    fn approx_size(&self) -> SizeEstimate;
}

/// Run one stage of a composite. A real (non-sentinel) failure cancels the
/// composite's context so siblings stop promptly.
pub(crate) async fn run_stage(
    ctx: &Context,
    runner: &dyn Runner,
    inp: DataReceiver,
    out: DataSender,
) -> CoreResult<()> {
    let result = runner.run(ctx, inp, out).await;
    if let Err(err) = &result {
        if !err.is_sentinel() {
            warn!(run_id = %ctx.run_id(), kind = runner.kind(), error = %err, "runner failed");
            ctx.cancel();
        }
    }
    result
}

/// Spawn [`run_stage`] as an independent task.
pub(crate) fn spawn_stage(
    ctx: &Context,
    idx: usize,
    runner: Arc<dyn Runner>,
    inp: DataReceiver,
    out: DataSender,
) -> JoinHandle<CoreResult<()>> {
    let ctx = ctx.clone();
    let span = debug_span!("stage", run_id = %ctx.run_id(), idx, kind = runner.kind());
    tokio::spawn(
        async move { run_stage(&ctx, runner.as_ref(), inp, out).await }.instrument(span),
    )
}

/// Wait for spawned stages, keeping their results in stage order.
pub(crate) async fn join_stages(tasks: Vec<JoinHandle<CoreResult<()>>>) -> Vec<CoreResult<()>> {
    futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| {
            joined.unwrap_or_else(|err| {
                Err(ep_core::CoreError::TaskFailed {
                    message: err.to_string(),
                })
            })
        })
        .collect()
}

/// Structural equality over two runner lists
pub(crate) fn all_equal(left: &[Arc<dyn Runner>], right: &[Arc<dyn Runner>]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.equals(r.as_ref()))
}
