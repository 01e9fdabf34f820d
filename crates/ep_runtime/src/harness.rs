//! Helpers for driving runners in tests and tools.
//!
//! [`run`] feeds a list of batches into a runner and collects everything it
//! emits. The small runners below ([`Upper`], [`Repeat`], [`Count`],
//! [`Fail`], [`Stall`], [`Declared`]) are building blocks for exercising
//! composites; [`register`] adds them to a [`RunnerRegistry`] so they also
//! survive an encode/decode round trip.

use crate::context::{Context, DataReceiver, DataSender, recv, send};
use crate::registry::{RegistryError, RunnerRegistry, RunnerSpec};
use crate::runner::{ApproxSizer, ArgsRunner, FilterRunner, PushRunner, Runner, ScopesRunner};
use async_trait::async_trait;
use ep_core::{CoreError, CoreResult, ScopeSet, SizeEstimate, Type};
use ep_data::{Column, Dataset, Value};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Run `runner` over `batches` with a fresh context, collecting its output
/// into one dataset.
pub async fn run(runner: &dyn Runner, batches: Vec<Dataset>) -> (Dataset, CoreResult<()>) {
    run_with_context(&Context::background(), runner, batches).await
}

/// Like [`run`], under the given context
pub async fn run_with_context(
    ctx: &Context,
    runner: &dyn Runner,
    batches: Vec<Dataset>,
) -> (Dataset, CoreResult<()>) {
    let (out, mut result) = run_batches(ctx, runner, batches).await;
    let mut collected = Dataset::empty();
    for data in &out {
        match collected.append(data) {
            Ok(appended) => collected = appended,
            Err(err) => {
                if result.is_ok() {
                    result = Err(err.into());
                }
                break;
            }
        }
    }
    (collected, result)
}

/// Run `runner` over `batches`, returning the output batches as emitted
pub async fn run_batches(
    ctx: &Context,
    runner: &dyn Runner,
    batches: Vec<Dataset>,
) -> (Vec<Dataset>, CoreResult<()>) {
    let (in_tx, in_rx) = ctx.channel();
    let (out_tx, mut out_rx) = ctx.channel();

    let produce = async move {
        for data in batches {
            if in_tx.send(data).await.is_err() {
                break;
            }
        }
    };
    let collect = async move {
        let mut out = Vec::new();
        while let Some(data) = out_rx.recv().await {
            out.push(data);
        }
        out
    };

    let ((), result, out) = tokio::join!(produce, runner.run(ctx, in_rx, out_tx), collect);
    (out, result)
}

/// Add the helper runners to `registry`
///
/// # Errors
///
/// Returns error if any of their kinds is already registered
pub fn register(registry: &mut RunnerRegistry) -> Result<(), RegistryError> {
    registry.register(Upper::KIND, decode_upper)?;
    registry.register(Repeat::KIND, decode_repeat)?;
    registry.register(Count::KIND, decode_count)?;
    registry.register(Fail::KIND, decode_fail)?;
    registry.register(Stall::KIND, decode_stall)?;
    registry.register(Declared::KIND, decode_declared)?;
    Ok(())
}

fn decode_upper(_: &RunnerRegistry, _: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    Ok(Arc::new(Upper))
}

fn decode_repeat(_: &RunnerRegistry, spec: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    Ok(Arc::new(Repeat::new(spec.args()?)))
}

fn decode_count(_: &RunnerRegistry, _: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    Ok(Arc::new(Count))
}

fn decode_fail(_: &RunnerRegistry, spec: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    Ok(Arc::new(Fail { with: spec.args()? }))
}

fn decode_stall(_: &RunnerRegistry, _: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    Ok(Arc::new(Stall))
}

fn decode_declared(_: &RunnerRegistry, spec: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    Ok(Arc::new(Declared::from_args(spec.args()?)))
}

/// Upper-cases every string value; other columns pass through
#[derive(Debug, Clone, Copy, Default)]
pub struct Upper;

impl Upper {
    /// Registry tag
    pub const KIND: &'static str = "test_upper";

    fn upper(data: &Dataset) -> CoreResult<Dataset> {
        let columns = data
            .columns()
            .iter()
            .map(|col| {
                if col.ty() != &Type::Str {
                    return Ok(col.clone());
                }
                let values = col
                    .values()
                    .iter()
                    .map(|v| match v {
                        Some(Value::Str(s)) => Some(Value::Str(s.to_uppercase())),
                        other => other.clone(),
                    })
                    .collect();
                Column::new(Type::Str, values)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Dataset::new(columns)?)
    }
}

#[async_trait]
impl Runner for Upper {
    async fn run(&self, ctx: &Context, mut inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        while let Some(data) = recv(ctx, &mut inp).await {
            send(ctx, &out, Self::upper(&data)?).await?;
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

    fn as_args(&self) -> Option<&dyn ArgsRunner> {
        Some(self)
    }
}

impl ArgsRunner for Upper {
    fn args(&self) -> Vec<Type> {
        vec![Type::Str]
    }
}

/// Emits every input batch with its rows repeated `n` times
#[derive(Debug, Clone, Copy)]
pub struct Repeat {
    n: usize,
}

impl Repeat {
    /// Registry tag
    pub const KIND: &'static str = "test_repeat";

    /// Repeat rows `n` times
    #[must_use]
    pub const fn new(n: usize) -> Self {
        Self { n }
    }
}

#[async_trait]
impl Runner for Repeat {
    async fn run(&self, ctx: &Context, mut inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        while let Some(data) = recv(ctx, &mut inp).await {
            send(ctx, &out, data.duplicate(self.n)).await?;
        }
        Ok(())
    }

    fn returns(&self) -> Vec<Type> {
        vec![Type::wildcard()]
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        other.downcast_ref::<Self>().is_some_and(|o| o.n == self.n)
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        RunnerSpec::new(Self::KIND, &self.n)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Emits a single one-row batch with the number of input rows once the
/// input closes
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl Count {
    /// Registry tag
    pub const KIND: &'static str = "test_count";
}

#[async_trait]
impl Runner for Count {
    async fn run(&self, ctx: &Context, mut inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        let mut rows = 0usize;
        while let Some(data) = recv(ctx, &mut inp).await {
            rows += data.len();
        }
        if ctx.is_cancelled() {
            return Ok(());
        }
        let count = i64::try_from(rows).map_err(|err| CoreError::Internal {
            message: err.to_string(),
        })?;
        send(ctx, &out, Dataset::from(Column::ints([count]))).await
    }

    fn returns(&self) -> Vec<Type> {
        vec![Type::Integer]
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FailWith {
    Internal(String),
    Ignorable,
    OnPeer,
}

/// Fails as soon as its first batch arrives (or its input closes)
#[derive(Debug, Clone)]
pub struct Fail {
    with: FailWith,
}

impl Fail {
    /// Registry tag
    pub const KIND: &'static str = "test_fail";

    /// Fail with [`CoreError::Internal`] carrying `message`
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            with: FailWith::Internal(message.into()),
        }
    }

    /// Fail with the [`CoreError::Ignorable`] sentinel
    #[must_use]
    pub const fn ignorable() -> Self {
        Self {
            with: FailWith::Ignorable,
        }
    }

    /// Fail with the [`CoreError::OnPeer`] sentinel
    #[must_use]
    pub const fn on_peer() -> Self {
        Self {
            with: FailWith::OnPeer,
        }
    }

    fn error(&self) -> CoreError {
        match &self.with {
            FailWith::Internal(message) => CoreError::Internal {
                message: message.clone(),
            },
            FailWith::Ignorable => CoreError::Ignorable,
            FailWith::OnPeer => CoreError::OnPeer,
        }
    }
}

#[async_trait]
impl Runner for Fail {
    async fn run(&self, ctx: &Context, mut inp: DataReceiver, _out: DataSender) -> CoreResult<()> {
        let _ = recv(ctx, &mut inp).await;
        Err(self.error())
    }

    fn returns(&self) -> Vec<Type> {
        vec![Type::wildcard()]
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        other.downcast_ref::<Self>().is_some_and(|o| o.with == self.with)
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        RunnerSpec::new(Self::KIND, &self.with)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Never reads its input; returns only once cancelled
#[derive(Debug, Clone, Copy, Default)]
pub struct Stall;

impl Stall {
    /// Registry tag
    pub const KIND: &'static str = "test_stall";
}

#[async_trait]
impl Runner for Stall {
    async fn run(&self, ctx: &Context, _inp: DataReceiver, _out: DataSender) -> CoreResult<()> {
        ctx.cancelled().await;
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

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct DeclaredArgs {
    returns: Vec<Type>,
    scopes: Vec<String>,
    accept_push: bool,
    size: Option<usize>,
}

/// Pass-through runner with a declared output schema and every optional
/// capability. Records filter and push calls so tests can inspect them.
#[derive(Debug, Default)]
pub struct Declared {
    args: DeclaredArgs,
    filtered: Mutex<Option<Vec<bool>>>,
    pushed: AtomicUsize,
}

impl Declared {
    /// Registry tag
    pub const KIND: &'static str = "test_declared";

    /// Declare `returns` as the output schema
    #[must_use]
    pub fn new(returns: Vec<Type>) -> Self {
        Self::from_args(DeclaredArgs {
            returns,
            ..DeclaredArgs::default()
        })
    }

    fn from_args(args: DeclaredArgs) -> Self {
        Self {
            args,
            filtered: Mutex::new(None),
            pushed: AtomicUsize::new(0),
        }
    }

    /// Declare scope dependencies
    #[must_use]
    pub fn with_scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.args.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Accept every pushed runner
    #[must_use]
    pub fn accepting_push(mut self) -> Self {
        self.args.accept_push = true;
        self
    }

    /// Report a known output size
    #[must_use]
    pub fn with_size(mut self, rows: usize) -> Self {
        self.args.size = Some(rows);
        self
    }

    /// Last filter applied, if any
    #[must_use]
    pub fn filtered(&self) -> Option<Vec<bool>> {
        self.filtered.lock().ok().and_then(|filtered| filtered.clone())
    }

    /// Number of runners accepted through push
    #[must_use]
    pub fn pushed(&self) -> usize {
        self.pushed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runner for Declared {
    async fn run(&self, ctx: &Context, mut inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        while let Some(data) = recv(ctx, &mut inp).await {
            send(ctx, &out, data).await?;
        }
        Ok(())
    }

    fn returns(&self) -> Vec<Type> {
        self.args.returns.clone()
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        other.downcast_ref::<Self>().is_some_and(|o| o.args == self.args)
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        RunnerSpec::new(Self::KIND, &self.args)
    }

    fn as_any(&self) -> &dyn Any {
        self
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

impl FilterRunner for Declared {
    fn filter(&self, keep: &[bool]) {
        if let Ok(mut filtered) = self.filtered.lock() {
            *filtered = Some(keep.to_vec());
        }
    }
}

impl ScopesRunner for Declared {
    fn scopes(&self) -> ScopeSet {
        self.args.scopes.iter().cloned().collect()
    }
}

impl PushRunner for Declared {
    fn push(&self, _runner: Arc<dyn Runner>) -> bool {
        if self.args.accept_push {
            self.pushed.fetch_add(1, Ordering::SeqCst);
        }
        self.args.accept_push
    }
}

impl ApproxSizer for Declared {
    fn approx_size(&self) -> SizeEstimate {
        self.args.size.map_or(SizeEstimate::Unknown, SizeEstimate::Rows)
    }
}
