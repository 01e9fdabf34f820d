//! Execution context and channel plumbing.
//!
//! A [`Context`] is created once per top-level run and threaded through
//! every spawned task. Composites derive a child context so that a failure
//! inside them cancels their own tasks without touching siblings higher up.
//!
//! The only suspension points in the engine are channel sends and
//! receives; [`send`] and [`recv`] race them against cancellation so every
//! task observes it within one channel operation.

use crate::config::EngineConfig;
use ep_core::{CoreError, CoreResult, RunId};
use ep_data::Dataset;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Sending half of a hand-off channel
pub type DataSender = mpsc::Sender<Dataset>;

/// Receiving half of a hand-off channel
pub type DataReceiver = mpsc::Receiver<Dataset>;

/// Cancellable execution context
#[derive(Debug, Clone)]
pub struct Context {
    run_id: RunId,
    token: CancellationToken,
    config: Arc<EngineConfig>,
}

impl Context {
    /// Create a root context for a new run
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            run_id: RunId::new(),
            token: CancellationToken::new(),
            config: Arc::new(config),
        }
    }

    /// Root context with the default configuration
    #[must_use]
    pub fn background() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Derive a context that is cancelled with this one, but can also be
    /// cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            run_id: self.run_id,
            token: self.token.child_token(),
            config: Arc::clone(&self.config),
        }
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Run ID shared by every context of a run
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a hand-off channel sized from the configuration
    #[must_use]
    pub fn channel(&self) -> (DataSender, DataReceiver) {
        mpsc::channel(self.config.channel_capacity.max(1))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// Send a batch downstream.
///
/// # Errors
///
/// Returns [`CoreError::Ignorable`] when the context is cancelled or the
/// receiver is gone; either way there is nobody left to produce for.
pub async fn send(ctx: &Context, out: &DataSender, data: Dataset) -> CoreResult<()> {
    tokio::select! {
        biased;
        () = ctx.cancelled() => Err(CoreError::Ignorable),
        sent = out.send(data) => sent.map_err(|_| CoreError::Ignorable),
    }
}

/// Receive the next batch, or `None` once the input is closed or the
/// context is cancelled.
pub async fn recv(ctx: &Context, inp: &mut DataReceiver) -> Option<Dataset> {
    tokio::select! {
        biased;
        () = ctx.cancelled() => None,
        data = inp.recv() => data,
    }
}

/// Consume and discard everything left on `inp` in the background, so its
/// producer never blocks on a send.
pub fn drain(mut inp: DataReceiver) {
    tokio::spawn(async move { while inp.recv().await.is_some() {} });
}

/// Keep reading `inp` until it closes or `parent` is cancelled, when the
/// configuration asks for it. The caller drops `inp` afterwards, so a
/// producer still sending sees a closed channel instead of blocking.
pub async fn drain_until_cancelled(parent: &Context, inp: &mut DataReceiver) {
    if parent.config().drain_on_cancel {
        while recv(parent, inp).await.is_some() {}
    }
}

/// Relay `inp` through a fresh channel until `ctx` is cancelled. Afterwards
/// (or once the relay's reader is gone) upstream is drained per
/// [`drain_until_cancelled`] under `parent`, the context `ctx` derives from.
#[must_use]
pub fn forward_until_cancelled(parent: &Context, ctx: &Context, mut inp: DataReceiver) -> DataReceiver {
    let (tx, rx) = ctx.channel();
    let parent = parent.clone();
    let ctx = ctx.clone();
    tokio::spawn(async move {
        while let Some(data) = recv(&ctx, &mut inp).await {
            if send(&ctx, &tx, data).await.is_err() {
                break;
            }
        }
        drop(tx);
        drain_until_cancelled(&parent, &mut inp).await;
    });
    rx
}
