//! The distribution contract.

use ep_core::CoreResult;
use ep_runtime::Runner;
use std::sync::Arc;

/// Turns a runner graph into one that executes on remote peers.
///
/// The returned runner is an ordinary [`Runner`]: it can be run directly,
/// composed into pipelines and projects, and encoded like any other.
pub trait Distributer: Send + Sync {
    /// Local address this distributer answers on
    fn addr(&self) -> &str;

    /// Distribute `runner` across `peers`
    ///
    /// # Errors
    ///
    /// Returns error if `peers` is empty or the graph cannot be shipped
    fn distribute(&self, runner: Arc<dyn Runner>, peers: &[String]) -> CoreResult<Arc<dyn Runner>>;
}
