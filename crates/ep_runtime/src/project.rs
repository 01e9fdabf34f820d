//! Parallel composition.
//!
//! A [`Project`] hands every input batch to each of its branches and joins
//! what they produce column-wise. Joining is lock-step: round `i` is the
//! `i`-th batch of every branch. Branches must emit batches one-to-one with
//! their siblings; Project only detects the case where one branch closes
//! while another is still producing.

use crate::context::{
    Context, DataReceiver, DataSender, drain, drain_until_cancelled, recv, send,
};
use crate::registry::RunnerSpec;
use crate::runner::{Runner, all_equal, join_stages};
use async_trait::async_trait;
use ep_core::{CoreError, CoreResult, Type};
use ep_data::Dataset;
use std::any::Any;
use std::iter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, trace, warn};

/// Horizontal composite: same input to every branch, outputs joined in
/// branch order
#[derive(Debug, Clone)]
pub struct Project {
    branches: Vec<Arc<dyn Runner>>,
}

impl Project {
    /// Registry tag
    pub const KIND: &'static str = "project";

    /// Run `runners` side by side. A single runner is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRunner`] if `runners` is empty
    pub fn new(mut runners: Vec<Arc<dyn Runner>>) -> CoreResult<Arc<dyn Runner>> {
        match runners.len() {
            0 => Err(CoreError::invalid_runner(
                "at least 1 runner is required for projecting",
            )),
            1 => Ok(runners.remove(0)),
            _ => Ok(Arc::new(Self { branches: runners })),
        }
    }

    /// Branches in output order
    #[must_use]
    pub fn branches(&self) -> &[Arc<dyn Runner>] {
        &self.branches
    }
}

/// Replicate each upstream batch into every branch input. A branch that
/// stopped reading is skipped; the rest keep receiving. Once done, keep
/// reading upstream until it closes or the caller's context is cancelled.
async fn dispatch(parent: Context, ctx: Context, mut inp: DataReceiver, inps: Vec<DataSender>) {
    let mut inps: Vec<Option<DataSender>> = inps.into_iter().map(Some).collect();
    while let Some(data) = recv(&ctx, &mut inp).await {
        for slot in &mut inps {
            let Some(tx) = slot else { continue };
            if send(&ctx, tx, data.clone()).await.is_err() {
                *slot = None;
            }
        }
        if inps.iter().all(Option::is_none) {
            break;
        }
    }
    drop(inps);
    drain_until_cancelled(&parent, &mut inp).await;
}

/// Run one branch. Any error, sentinels included, cancels the shared
/// context. A clone of `out` is held until then, so the collector never
/// observes the branch closing before the cancellation.
fn spawn_branch(
    ctx: &Context,
    idx: usize,
    runner: Arc<dyn Runner>,
    inp: DataReceiver,
    out: DataSender,
) -> JoinHandle<CoreResult<()>> {
    let ctx = ctx.clone();
    let span = debug_span!("branch", run_id = %ctx.run_id(), idx, kind = runner.kind());
    tokio::spawn(
        async move {
            let held = out.clone();
            let result = runner.run(&ctx, inp, out).await;
            if let Err(err) = &result {
                if !err.is_sentinel() {
                    warn!(error = %err, "branch failed");
                }
                ctx.cancel();
            }
            drop(held);
            result
        }
        .instrument(span),
    )
}

/// Pick the outcome of a run: the first real failure, else the first
/// sentinel so that an enclosing pipeline can discard it.
fn pick_result(results: impl IntoIterator<Item = CoreResult<()>>) -> CoreResult<()> {
    let mut sentinel = None;
    for result in results {
        match result {
            Err(err) if err.is_sentinel() => {
                sentinel.get_or_insert(err);
            }
            Err(err) => return Err(err),
            Ok(()) => {}
        }
    }
    sentinel.map_or(Ok(()), Err)
}

/// Join one batch from every branch per round until all branches close.
async fn collect(ctx: &Context, outs: &mut [DataReceiver], out: &DataSender) -> CoreResult<()> {
    for round in 0.. {
        let mut joined = Dataset::empty();
        let mut all_open = true;
        for (idx, rx) in outs.iter_mut().enumerate() {
            let next = recv(ctx, rx).await;
            if next.is_none() && ctx.is_cancelled() {
                return Ok(());
            }
            if idx == 0 {
                all_open = next.is_some();
            } else if all_open != next.is_some() {
                return Err(CoreError::BatchMismatch);
            }
            if let Some(data) = next {
                joined = joined.expand(&data)?;
            }
        }
        if !all_open {
            break;
        }
        trace!(round, rows = joined.len(), "project round joined");
        send(ctx, out, joined).await?;
    }
    Ok(())
}

#[async_trait]
impl Runner for Project {
    async fn run(&self, ctx: &Context, inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        let parent = ctx.clone();
        let ctx = ctx.child();
        debug!(run_id = %ctx.run_id(), branches = self.branches.len(), "project started");

        let mut inps = Vec::with_capacity(self.branches.len());
        let mut outs = Vec::with_capacity(self.branches.len());
        let mut tasks = Vec::with_capacity(self.branches.len());
        for (idx, branch) in self.branches.iter().enumerate() {
            let (in_tx, in_rx) = ctx.channel();
            let (out_tx, out_rx) = ctx.channel();
            tasks.push(spawn_branch(&ctx, idx, Arc::clone(branch), in_rx, out_tx));
            inps.push(in_tx);
            outs.push(out_rx);
        }
        tokio::spawn(dispatch(parent, ctx.clone(), inp, inps));

        let collected = collect(&ctx, &mut outs, &out).await;
        drop(out);
        if let Err(err) = &collected {
            if !err.is_sentinel() {
                warn!(run_id = %ctx.run_id(), error = %err, "project join failed");
            }
            ctx.cancel();
        }
        for rx in outs {
            drain(rx);
        }

        let results = join_stages(tasks).await;
        let result = pick_result(results.into_iter().chain(iter::once(collected)));
        debug!(run_id = %ctx.run_id(), ok = result.is_ok(), "project finished");
        result
    }

    fn returns(&self) -> Vec<Type> {
        self.branches.iter().flat_map(|b| b.returns()).collect()
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        other
            .downcast_ref::<Self>()
            .is_some_and(|o| all_equal(&self.branches, &o.branches))
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        let branches = self
            .branches
            .iter()
            .map(|b| b.encode())
            .collect::<CoreResult<Vec<_>>>()?;
        RunnerSpec::new(Self::KIND, &branches)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{self, Count, Declared, Fail, Repeat, Stall, Upper};
    use crate::{Const, EngineConfig, PassThrough, Pipeline};
    use ep_data::Column;
    use std::time::Duration;

    fn const_of(s: &str) -> Arc<dyn Runner> {
        Arc::new(Const::new(Dataset::from(Column::strs([s]))).unwrap())
    }

    fn ints(values: impl IntoIterator<Item = i64>) -> Dataset {
        Dataset::from(Column::ints(values))
    }

    #[test]
    fn test_empty_project_is_an_error() {
        let err = Project::new(vec![]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRunner { .. }));
    }

    #[test]
    fn test_single_branch_unwrapped() {
        let a = const_of("a");
        let p = Project::new(vec![Arc::clone(&a)]).unwrap();
        assert!(Arc::ptr_eq(&p, &a));
    }

    #[test]
    fn test_returns_concatenates_branches() {
        let p = Project::new(vec![
            Arc::new(Declared::new(vec![Type::Integer, Type::Str])),
            Arc::new(PassThrough),
            const_of("a"),
        ])
        .unwrap();
        assert_eq!(
            p.returns(),
            vec![Type::Integer, Type::Str, Type::wildcard(), Type::Str]
        );
    }

    #[test]
    fn test_equals_is_structural() {
        let left = Project::new(vec![const_of("a"), const_of("b")]).unwrap();
        let right = Project::new(vec![const_of("a"), const_of("b")]).unwrap();
        let swapped = Project::new(vec![const_of("b"), const_of("a")]).unwrap();
        assert!(left.equals(right.as_ref()));
        assert!(!left.equals(swapped.as_ref()));

        let pipe = Pipeline::new(vec![const_of("a"), const_of("b")]).unwrap();
        assert!(!left.equals(pipe.as_ref()));
    }

    #[tokio::test]
    async fn test_joins_branches_in_order() {
        let p = Project::new(vec![const_of("a"), Arc::new(PassThrough), const_of("b")]).unwrap();
        let batches = vec![ints([1, 2]), ints([3])];
        let (out, result) = harness::run_batches(&Context::background(), p.as_ref(), batches).await;
        assert_eq!(result, Ok(()));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].width(), 3);
        assert_eq!(out[0].strings(), vec!["(a,1,b)", "(a,2,b)"]);
        assert_eq!(out[1].strings(), vec!["(a,3,b)"]);
    }

    #[tokio::test]
    async fn test_width_is_sum_of_branches() {
        let p = Project::new(vec![
            Arc::new(PassThrough),
            Arc::new(Upper),
            Arc::new(Repeat::new(1)),
        ])
        .unwrap();
        let input = Dataset::new(vec![Column::ints([1]), Column::strs(["x"])]).unwrap();
        let (data, result) = harness::run(p.as_ref(), vec![input]).await;
        assert_eq!(result, Ok(()));
        assert_eq!(data.width(), 6);
        assert_eq!(data.strings(), vec!["(1,x,1,X,1,x)"]);
    }

    #[tokio::test]
    async fn test_batch_count_mismatch() {
        let p = Project::new(vec![Arc::new(PassThrough), Arc::new(Count)]).unwrap();
        let batches = vec![ints([1]), ints([2]), ints([3])];
        let run = harness::run(p.as_ref(), batches);
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("project deadlocked");
        assert_eq!(result, Err(CoreError::BatchMismatch));
    }

    #[tokio::test]
    async fn test_row_count_mismatch() {
        let p = Project::new(vec![Arc::new(PassThrough), Arc::new(Repeat::new(2))]).unwrap();
        let run = harness::run(p.as_ref(), vec![ints([1, 2])]);
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("project deadlocked");
        assert!(matches!(result, Err(CoreError::Data { .. })));
    }

    #[tokio::test]
    async fn test_branch_failure_surfaces() {
        let p = Project::new(vec![
            Arc::new(PassThrough),
            Arc::new(Fail::new("branch")),
            Arc::new(Repeat::new(1)),
        ])
        .unwrap();
        let batches: Vec<Dataset> = (0..50).map(|i| ints([i])).collect();
        let run = harness::run(p.as_ref(), batches);
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("project deadlocked");
        assert_eq!(
            result,
            Err(CoreError::Internal {
                message: "branch".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_sentinel_branch_left_to_pipeline() {
        let p = Project::new(vec![
            Arc::new(Fail::ignorable()),
            Arc::new(Fail::on_peer()),
        ])
        .unwrap();
        let (_, result) = harness::run(p.as_ref(), vec![ints([1])]).await;
        assert!(result.unwrap_err().is_sentinel());

        let wrapped = Pipeline::new(vec![Arc::new(Repeat::new(1)), p]).unwrap();
        let (_, result) = harness::run(wrapped.as_ref(), vec![ints([1])]).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_sentinel_branch_beside_open_sibling() {
        let p = Project::new(vec![Arc::new(Fail::ignorable()), Arc::new(PassThrough)]).unwrap();
        let batches = || vec![ints([1]), ints([2]), ints([3])];

        let run = harness::run(p.as_ref(), batches());
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("project deadlocked");
        assert_eq!(result, Err(CoreError::Ignorable));

        let wrapped = Pipeline::new(vec![Arc::new(Repeat::new(1)), p]).unwrap();
        let run = harness::run(wrapped.as_ref(), batches());
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("pipeline deadlocked");
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_real_failure_beats_sentinels() {
        let p = Project::new(vec![
            Arc::new(Fail::ignorable()),
            Arc::new(PassThrough),
            Arc::new(Fail::new("late")),
        ])
        .unwrap();
        let batches: Vec<Dataset> = (0..20).map(|i| ints([i])).collect();
        let run = harness::run(p.as_ref(), batches);
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("project deadlocked");
        assert_eq!(
            result,
            Err(CoreError::Internal {
                message: "late".to_string()
            })
        );
    }

    #[test]
    fn test_pick_result_order() {
        assert_eq!(pick_result(vec![Ok(()), Ok(())]), Ok(()));
        assert_eq!(
            pick_result(vec![Err(CoreError::OnPeer), Err(CoreError::BatchMismatch)]),
            Err(CoreError::BatchMismatch)
        );
        assert_eq!(
            pick_result(vec![Ok(()), Err(CoreError::Ignorable), Err(CoreError::OnPeer)]),
            Err(CoreError::Ignorable)
        );
    }

    #[tokio::test]
    async fn test_cancel_returns_promptly() {
        let ctx = Context::background();
        let p = Project::new(vec![Arc::new(PassThrough), Arc::new(Stall)]).unwrap();
        let batches: Vec<Dataset> = (0..100).map(|i| ints([i])).collect();

        let cancel = {
            let ctx = ctx.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ctx.cancel();
            }
        };
        let run = harness::run_with_context(&ctx, p.as_ref(), batches);
        let ((_, result), ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(run, cancel)
        })
        .await
        .expect("project ignored cancellation");
        assert!(result.map_or_else(|err| err.is_sentinel(), |()| true));
    }

    #[tokio::test]
    async fn test_nested_in_pipeline() {
        let project = Project::new(vec![Arc::new(PassThrough), const_of("z")]).unwrap();
        let p = Pipeline::new(vec![project, Arc::new(Upper)]).unwrap();
        assert_eq!(p.returns(), vec![Type::wildcard(), Type::Str]);

        let (data, result) = harness::run(p.as_ref(), vec![ints([7])]).await;
        assert_eq!(result, Ok(()));
        assert_eq!(data.strings(), vec!["(7,Z)"]);
    }

    #[tokio::test]
    async fn test_larger_channel_capacity() {
        let ctx = Context::new(EngineConfig::new().with_channel_capacity(4));
        let p = Project::new(vec![Arc::new(Repeat::new(1)), const_of("c")]).unwrap();
        let batches: Vec<Dataset> = (0..10).map(|i| ints([i])).collect();
        let (out, result) = harness::run_batches(&ctx, p.as_ref(), batches).await;
        assert_eq!(result, Ok(()));
        let seen: Vec<String> = out.iter().flat_map(Dataset::strings).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("({},c)", i)).collect();
        assert_eq!(seen, expected);
    }
}
