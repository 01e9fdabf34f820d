//! Peer messages and the peer-side decoder.
//!
//! A coordinator ships a runner graph to a peer as a [`PeerRequest`]
//! carrying the graph's structural encoding. The peer rebuilds the graph
//! through its own [`RunnerRegistry`] and, once the run is over, answers
//! with a [`PeerResponse`].

use crate::error::ClusterError;
use ep_core::{CoreError, CoreResult};
use ep_runtime::{Runner, RunnerRegistry, RunnerSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Request to run a graph on a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRequest {
    /// Request ID
    pub request_id: String,
    /// Address of the coordinator that sent it
    pub source: String,
    /// Encoded graph
    pub plan: RunnerSpec,
}

impl PeerRequest {
    /// Encode `runner` into a new request
    ///
    /// # Errors
    ///
    /// Returns error if the runner cannot be encoded
    pub fn new(source: impl Into<String>, runner: &dyn Runner) -> CoreResult<Self> {
        Ok(Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            plan: runner.encode()?,
        })
    }

    /// Serialize to wire bytes
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from wire bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a request
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| ClusterError::Malformed(err.to_string()).into())
    }
}

/// Outcome of a run on a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerResponse {
    /// Request ID this responds to
    pub request_id: String,
    /// Address of the responding peer
    pub peer: String,
    /// Error message if the run failed
    pub error: Option<String>,
}

impl PeerResponse {
    /// Create a successful response
    #[must_use]
    pub fn success(request_id: String, peer: String) -> Self {
        Self {
            request_id,
            peer,
            error: None,
        }
    }

    /// Create a failed response
    #[must_use]
    pub fn failure(request_id: String, peer: String, error: String) -> Self {
        Self {
            request_id,
            peer,
            error: Some(error),
        }
    }

    /// Build from a run outcome. Sentinels are not failures.
    #[must_use]
    pub fn from_result(request_id: String, peer: String, result: &CoreResult<()>) -> Self {
        match result {
            Err(err) if !err.is_sentinel() => Self::failure(request_id, peer, err.to_string()),
            _ => Self::success(request_id, peer),
        }
    }

    /// Whether the run succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Serialize to wire bytes
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from wire bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a response
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| ClusterError::Malformed(err.to_string()).into())
    }

    /// Turn into the error surfaced to the coordinator, if any
    #[must_use]
    pub fn into_error(self) -> Option<CoreError> {
        self.error.map(|message| ClusterError::PeerFailed {
            peer: self.peer,
            message,
        }
        .into())
    }
}

/// Peer side of the distribution boundary
#[derive(Debug, Clone)]
pub struct Peer {
    addr: String,
    registry: Arc<RunnerRegistry>,
}

impl Peer {
    /// Create a peer listening on `addr`
    #[must_use]
    pub fn new(addr: impl Into<String>, registry: Arc<RunnerRegistry>) -> Self {
        Self {
            addr: addr.into(),
            registry,
        }
    }

    /// Peer address
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Rebuild the graph carried by an encoded request
    ///
    /// # Errors
    ///
    /// Returns error if the request is malformed or names an unknown runner
    pub fn accept(&self, bytes: &[u8]) -> CoreResult<(PeerRequest, Arc<dyn Runner>)> {
        let request = PeerRequest::from_bytes(bytes)?;
        debug!(peer = %self.addr, request_id = %request.request_id, source = %request.source, kind = %request.plan.kind, "request accepted");
        let runner = self.registry.decode(&request.plan).inspect_err(|err| {
            warn!(peer = %self.addr, request_id = %request.request_id, error = %err, "request rejected");
        })?;
        Ok((request, runner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ep_data::{Column, Dataset};
    use ep_runtime::{Const, harness::Upper};

    #[test]
    fn test_request_roundtrip() {
        let runner = Const::new(Dataset::from(Column::strs(["a"]))).unwrap();
        let request = PeerRequest::new("local:1", &runner).unwrap();
        let back = PeerRequest::from_bytes(&request.to_bytes().unwrap()).unwrap();
        assert_eq!(back, request);
        assert_eq!(back.plan.kind, "const");
    }

    #[test]
    fn test_malformed_bytes() {
        assert!(matches!(
            PeerRequest::from_bytes(b"{"),
            Err(CoreError::Encoding { .. })
        ));
        assert!(PeerResponse::from_bytes(b"[]").is_err());
    }

    #[test]
    fn test_response_from_result() {
        let ok = PeerResponse::from_result("r".into(), "p".into(), &Ok(()));
        assert!(ok.is_success());

        let sentinel = PeerResponse::from_result("r".into(), "p".into(), &Err(CoreError::Ignorable));
        assert!(sentinel.is_success());
        assert_eq!(sentinel.into_error(), None);

        let failed = PeerResponse::from_result("r".into(), "p".into(), &Err(CoreError::BatchMismatch));
        assert!(!failed.is_success());
        let err = failed.into_error().unwrap();
        assert!(err.to_string().contains("peer p"));
    }

    #[test]
    fn test_peer_accepts_known_runners_only() {
        let peer = Peer::new("peer-0", Arc::new(RunnerRegistry::with_builtins()));
        let runner = Const::new(Dataset::from(Column::strs(["a"]))).unwrap();
        let request = PeerRequest::new("local", &runner).unwrap();
        let (_, rebuilt) = peer.accept(&request.to_bytes().unwrap()).unwrap();
        assert!(rebuilt.equals(&runner));

        let unknown = PeerRequest::new("local", &Upper).unwrap();
        let err = peer.accept(&unknown.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownRunner { .. }));
    }
}
