//! Core error types for ep.
//!
//! Two variants are sentinels: [`CoreError::Ignorable`] and
//! [`CoreError::OnPeer`]. They signal "not a real failure" and composites
//! never surface them as the result of a run. Callers must test for them
//! with [`CoreError::is_sentinel`] (by kind), never by message text.

use thiserror::Error;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Not a failure. Used when a runner stops early because its downstream
    /// went away or its context was cancelled.
    #[error("ignorable")]
    Ignorable,

    /// The failure was already reported by a distributed peer.
    #[error("error already reported by a peer")]
    OnPeer,

    /// Parallel branches disagreed on the number of batches they produced
    #[error("mismatched number of batches between parallel runners")]
    BatchMismatch,

    /// Runner construction misuse (empty composite, multi-row const, ...)
    #[error("invalid runner: {reason}")]
    InvalidRunner {
        /// What the caller did wrong
        reason: String,
    },

    /// Data-level failure (shape mismatch, bad slice, ...)
    #[error("data error: {message}")]
    Data {
        /// Error message
        message: String,
    },

    /// Invalid encoding of a runner or dataset
    #[error("invalid encoding: {reason}")]
    Encoding {
        /// Error message
        reason: String,
    },

    /// No decoder registered for a runner kind
    #[error("unknown runner kind: {kind}")]
    UnknownRunner {
        /// Registry tag that was not found
        kind: String,
    },

    /// A spawned task panicked or was aborted
    #[error("task failed: {message}")]
    TaskFailed {
        /// Error message
        message: String,
    },

    /// Cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Internal error (for unexpected errors)
    #[error("internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Create an [`CoreError::InvalidRunner`] from anything printable
    pub fn invalid_runner(reason: impl Into<String>) -> Self {
        Self::InvalidRunner {
            reason: reason.into(),
        }
    }

    /// Whether this error is one of the sentinels that must not be surfaced
    /// as the outcome of a run.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        matches!(self, Self::Ignorable | Self::OnPeer)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            reason: err.to_string(),
        }
    }
}

/// Pick the outcome of a composite out of its per-task error slots.
///
/// Slots are scanned in order and the first error that is not a sentinel
/// wins. Sentinels and successes collapse to `Ok(())`.
///
/// # Errors
///
/// Returns the first non-sentinel error found
pub fn first_error<I>(results: I) -> CoreResult<()>
where
    I: IntoIterator<Item = CoreResult<()>>,
{
    for result in results {
        match result {
            Err(err) if !err.is_sentinel() => return Err(err),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::BatchMismatch;
        assert_eq!(
            format!("{}", err),
            "mismatched number of batches between parallel runners"
        );

        let err = CoreError::UnknownRunner {
            kind: "scatter".to_string(),
        };
        assert_eq!(format!("{}", err), "unknown runner kind: scatter");
    }

    #[test]
    fn test_sentinels() {
        assert!(CoreError::Ignorable.is_sentinel());
        assert!(CoreError::OnPeer.is_sentinel());
        assert!(!CoreError::BatchMismatch.is_sentinel());
        assert!(!CoreError::Cancelled.is_sentinel());

        // a message that merely looks like a sentinel is still a real error
        let lookalike = CoreError::Internal {
            message: "ignorable".to_string(),
        };
        assert!(!lookalike.is_sentinel());
    }

    #[test]
    fn test_first_error_skips_sentinels() {
        let errs = vec![
            Ok(()),
            Err(CoreError::Ignorable),
            Err(CoreError::OnPeer),
            Err(CoreError::BatchMismatch),
            Err(CoreError::Cancelled),
        ];
        assert_eq!(first_error(errs), Err(CoreError::BatchMismatch));
    }

    #[test]
    fn test_first_error_all_clean() {
        let errs = vec![Ok(()), Err(CoreError::Ignorable), Ok(())];
        assert_eq!(first_error(errs), Ok(()));
        assert_eq!(first_error(Vec::new()), Ok(()));
    }

    #[test]
    fn test_invalid_runner() {
        let err = CoreError::invalid_runner("at least 1 runner is required");
        assert!(err.to_string().contains("at least 1 runner"));
    }

    #[test]
    fn test_from_serde_json() {
        let err: CoreError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, CoreError::Encoding { .. }));
    }
}
