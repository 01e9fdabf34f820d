//! ep Cluster
//!
//! The distribution boundary. A [`Distributer`] turns a runner graph into
//! one that executes on remote peers. Graphs travel as their structural
//! encoding and are rebuilt on each peer through a runner registry.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod distributer;
pub mod error;
pub mod loopback;
pub mod peer;

pub use distributer::Distributer;
pub use error::ClusterError;
pub use loopback::{DistributedRunner, LoopbackDistributer, register};
pub use peer::{Peer, PeerRequest, PeerResponse};
