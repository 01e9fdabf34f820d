//! Sequential composition.
//!
//! A [`Pipeline`] feeds the output of each stage into the next one. Every
//! stage except the last runs as its own task; the last runs inline, so
//! the caller of [`Runner::run`] waits for the whole chain.

use crate::context::{Context, DataReceiver, DataSender, forward_until_cancelled};
use crate::passthrough::PassThrough;
use crate::registry::RunnerSpec;
use crate::runner::{
    ApproxSizer, ArgsRunner, FilterRunner, PushRunner, Runner, ScopesRunner, all_equal,
    join_stages, run_stage, spawn_stage,
};
use async_trait::async_trait;
use ep_core::{CoreError, CoreResult, ScopeSet, SizeEstimate, Type, first_error};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Vertical composite: stage `i`'s output is stage `i + 1`'s input
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Runner>>,
}

impl Pipeline {
    /// Registry tag
    pub const KIND: &'static str = "pipeline";

    /// Chain `runners` in order.
    ///
    /// Nested pipelines are flattened one level (they were already flattened
    /// when built) and pass-through stages are dropped. If nothing remains
    /// the result is a [`PassThrough`]; if one stage remains it is returned
    /// as is.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRunner`] if `runners` is empty
    pub fn new(runners: Vec<Arc<dyn Runner>>) -> CoreResult<Arc<dyn Runner>> {
        if runners.is_empty() {
            return Err(CoreError::invalid_runner(
                "at least 1 runner is required for pipelining",
            ));
        }

        let mut stages: Vec<Arc<dyn Runner>> = Vec::with_capacity(runners.len());
        for runner in runners {
            match runner.downcast_ref::<Self>() {
                Some(nested) => stages.extend(nested.stages.iter().cloned()),
                None => stages.push(runner),
            }
        }
        stages.retain(|stage| !stage.is::<PassThrough>());

        match stages.len() {
            0 => Ok(Arc::new(PassThrough)),
            1 => Ok(stages.remove(0)),
            _ => Ok(Arc::new(Self { stages })),
        }
    }

    /// Stages in execution order
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Runner>] {
        &self.stages
    }

    /// Output types of stage `j`, with wildcards resolved against the
    /// stages before it. Resolution walks backward and recurses, since the
    /// previous stage may itself return wildcards.
    fn returns_at(&self, j: usize) -> Vec<Type> {
        let declared = self.stages[j].returns();
        if j == 0 {
            return declared;
        }

        let mut prev: Option<Vec<Type>> = None;
        let mut resolved = Vec::with_capacity(declared.len());
        for ty in declared {
            match ty {
                Type::Wildcard(w) => {
                    let prev = prev.get_or_insert_with(|| self.returns_at(j - 1));
                    resolved.extend(w.resolve(prev));
                }
                ty => resolved.push(ty),
            }
        }
        resolved
    }

    fn last(&self) -> &Arc<dyn Runner> {
        &self.stages[self.stages.len() - 1]
    }
}

#[async_trait]
impl Runner for Pipeline {
    async fn run(&self, ctx: &Context, inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        let parent = ctx;
        let ctx = parent.child();
        debug!(run_id = %ctx.run_id(), stages = self.stages.len(), "pipeline started");

        let mut inp = forward_until_cancelled(parent, &ctx, inp);
        let last = self.stages.len() - 1;
        let mut tasks = Vec::with_capacity(last);
        for (idx, stage) in self.stages[..last].iter().enumerate() {
            let (tx, rx) = ctx.channel();
            tasks.push(spawn_stage(&ctx, idx, Arc::clone(stage), inp, tx));
            inp = rx;
        }

        let last_result = run_stage(&ctx, self.last().as_ref(), inp, out).await;
        // release any earlier stage still blocked mid-flight
        ctx.cancel();

        let mut results = join_stages(tasks).await;
        results.push(last_result);
        let result = first_error(results);
        debug!(run_id = %ctx.run_id(), ok = result.is_ok(), "pipeline finished");
        result
    }

    fn returns(&self) -> Vec<Type> {
        self.returns_at(self.stages.len() - 1)
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        other
            .downcast_ref::<Self>()
            .is_some_and(|o| all_equal(&self.stages, &o.stages))
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        let stages = self
            .stages
            .iter()
            .map(|s| s.encode())
            .collect::<CoreResult<Vec<_>>>()?;
        RunnerSpec::new(Self::KIND, &stages)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_args(&self) -> Option<&dyn ArgsRunner> {
        Some(self)
    }

    fn as_filter(&self) -> Option<&dyn FilterRunner> {
        Some(self)
    }

    fn as_scopes(&self) -> Option<&dyn ScopesRunner> {
        Some(self)
    }

    fn as_push(&self) -> Option<&dyn PushRunner> {
        Some(self)
    }

    fn as_sizer(&self) -> Option<&dyn ApproxSizer> {
        Some(self)
    }
}

impl ArgsRunner for Pipeline {
    /// The first stage's declared input, else a plain wildcard
    fn args(&self) -> Vec<Type> {
        self.stages[0]
            .as_args()
            .map_or_else(|| vec![Type::wildcard()], |first| first.args())
    }
}

impl FilterRunner for Pipeline {
    fn filter(&self, keep: &[bool]) {
        if let Some(last) = self.last().as_filter() {
            last.filter(keep);
        }
    }
}

impl ScopesRunner for Pipeline {
    fn scopes(&self) -> ScopeSet {
        let mut scopes = ScopeSet::new();
        for stage in &self.stages {
            if let Some(s) = stage.as_scopes() {
                scopes.add_all(&s.scopes());
            }
        }
        scopes
    }
}

impl PushRunner for Pipeline {
    /// Offer `runner` to each stage, earliest first
    fn push(&self, runner: Arc<dyn Runner>) -> bool {
        self.stages
            .iter()
            .filter_map(|stage| stage.as_push())
            .any(|stage| stage.push(Arc::clone(&runner)))
    }
}

impl ApproxSizer for Pipeline {
    fn approx_size(&self) -> SizeEstimate {
        self.last()
            .as_sizer()
            .map_or(SizeEstimate::Unknown, |last| last.approx_size())
    }
}
