//! Row lineage wrapper.
//!
//! [`MapInpToOut`] runs its inner runner once per input row, to completion,
//! so every output row can be joined with the input row that produced it.
//! That costs a full re-run of the inner runner per row with no batching,
//! so use it only when the input is small compared to the output, when
//! performance is secondary, or when batches are already thin.
//!
//! The inner runner must be restartable. One-shot runners (distribution
//! exchanges and the like) cannot be wrapped.

use crate::context::{Context, DataReceiver, DataSender, recv, send};
use crate::registry::RunnerSpec;
use crate::runner::Runner;
use async_trait::async_trait;
use ep_core::{CoreError, CoreResult, Type};
use std::any::Any;
use std::sync::Arc;
use tracing::trace;

/// Joins each input row (left) with every row the inner runner emits for
/// it (right)
#[derive(Debug, Clone)]
pub struct MapInpToOut {
    inner: Arc<dyn Runner>,
}

impl MapInpToOut {
    /// Registry tag
    pub const KIND: &'static str = "map_inp_to_out";

    /// Wrap `inner`
    #[must_use]
    pub fn new(inner: Arc<dyn Runner>) -> Self {
        Self { inner }
    }

    /// The wrapped runner
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Runner> {
        &self.inner
    }
}

#[async_trait]
impl Runner for MapInpToOut {
    async fn run(&self, ctx: &Context, mut inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        while let Some(data) = recv(ctx, &mut inp).await {
            for row in 0..data.len() {
                let single = data.slice(row, row + 1)?;

                let (inner_tx, inner_rx) = ctx.channel();
                let (res_tx, mut res_rx) = ctx.channel();
                // capacity is at least one, so this never waits
                send(ctx, &inner_tx, single.clone()).await?;
                drop(inner_tx);

                let inner = self.inner.run(ctx, inner_rx, res_tx);
                // owns res_rx, so a failed forward unblocks the inner runner
                let forward = {
                    let (single, out) = (&single, &out);
                    async move {
                        while let Some(res) = recv(ctx, &mut res_rx).await {
                            trace!(row, rows = res.len(), "inner output");
                            let joined = single.duplicate(res.len()).expand(&res)?;
                            send(ctx, out, joined).await?;
                        }
                        Ok::<_, CoreError>(())
                    }
                };
                let (inner_result, forward_result) = tokio::join!(inner, forward);
                inner_result?;
                forward_result?;
            }
        }
        Ok(())
    }

    fn returns(&self) -> Vec<Type> {
        let mut types = vec![Type::wildcard()];
        types.extend(self.inner.returns());
        types
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        other
            .downcast_ref::<Self>()
            .is_some_and(|o| self.inner.equals(o.inner.as_ref()))
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        RunnerSpec::new(Self::KIND, &self.inner.encode()?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
