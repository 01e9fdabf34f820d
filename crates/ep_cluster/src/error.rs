//! Distribution errors.

use ep_core::CoreError;

/// Errors raised at the distribution boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// Nothing to distribute to
    #[error("at least 1 peer is required for distribution")]
    NoPeers,

    /// A peer message could not be decoded
    #[error("malformed peer message: {0}")]
    Malformed(String),

    /// A peer reported a failed run
    #[error("peer {peer}: {message}")]
    PeerFailed {
        /// Peer address
        peer: String,
        /// Error reported by the peer
        message: String,
    },
}

impl From<ClusterError> for CoreError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NoPeers => Self::invalid_runner(err.to_string()),
            ClusterError::Malformed(_) => Self::Encoding {
                reason: err.to_string(),
            },
            ClusterError::PeerFailed { .. } => Self::Internal {
                message: err.to_string(),
            },
        }
    }
}
