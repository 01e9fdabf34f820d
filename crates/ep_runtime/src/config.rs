//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Engine configuration
///
/// Carried by every [`crate::Context`]; composites size the hand-off
/// channels they create from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of each hand-off channel between runners. Kept minimal so a
    /// consumer paces its producer.
    pub channel_capacity: usize,
    /// Whether a composite that stopped consuming keeps reading its upstream.
    /// Pipeline, Project and distributed runs share one policy: drain until
    /// the upstream closes or the caller's context is cancelled, then drop
    /// the receiver so any further send fails instead of blocking. When
    /// off, the receiver is dropped right away.
    pub drain_on_cancel: bool,
}

impl EngineConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            channel_capacity: 1,
            drain_on_cancel: true,
        }
    }

    /// Set the hand-off channel capacity. Zero is clamped to one.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Enable/disable draining upstream after cancellation
    #[must_use]
    pub fn with_drain_on_cancel(mut self, drain: bool) -> Self {
        self.drain_on_cancel = drain;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
