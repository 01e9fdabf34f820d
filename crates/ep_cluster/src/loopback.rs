//! In-process distribution.
//!
//! [`LoopbackDistributer`] ships a graph the same way a networked one
//! would: the graph is encoded into a [`PeerRequest`], and every peer
//! rebuilds it from the bytes through its registry. The replicas then run
//! in-process. Input batches are dealt round-robin across the peers and
//! their outputs are gathered in arrival order.

use crate::distributer::Distributer;
use crate::error::ClusterError;
use crate::peer::{Peer, PeerRequest, PeerResponse};
use async_trait::async_trait;
use ep_core::{CoreError, CoreResult, Type, first_error};
use ep_runtime::{
    Context, DataReceiver, DataSender, RegistryError, Runner, RunnerRegistry, RunnerSpec,
    drain_until_cancelled, recv, send,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, warn};

/// Distributer that runs every peer inside this process
#[derive(Debug, Clone)]
pub struct LoopbackDistributer {
    addr: String,
    registry: Arc<RunnerRegistry>,
}

impl LoopbackDistributer {
    /// Create a distributer answering on `addr`. Peers decode graphs
    /// through `registry`.
    #[must_use]
    pub fn new(addr: impl Into<String>, registry: Arc<RunnerRegistry>) -> Self {
        Self {
            addr: addr.into(),
            registry,
        }
    }
}

impl Distributer for LoopbackDistributer {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn distribute(&self, runner: Arc<dyn Runner>, peers: &[String]) -> CoreResult<Arc<dyn Runner>> {
        let distributed = DistributedRunner::build(&self.addr, &self.registry, runner, peers)?;
        Ok(Arc::new(distributed))
    }
}

#[derive(Debug)]
struct Replica {
    peer: String,
    runner: Arc<dyn Runner>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DistributedArgs {
    source: String,
    peers: Vec<String>,
    plan: RunnerSpec,
}

/// A graph replicated on a set of peers
#[derive(Debug)]
pub struct DistributedRunner {
    source: String,
    plan: Arc<dyn Runner>,
    request_id: String,
    replicas: Vec<Replica>,
}

impl DistributedRunner {
    /// Registry tag
    pub const KIND: &'static str = "distributed";

    fn build(
        source: &str,
        registry: &Arc<RunnerRegistry>,
        plan: Arc<dyn Runner>,
        peers: &[String],
    ) -> CoreResult<Self> {
        if peers.is_empty() {
            return Err(ClusterError::NoPeers.into());
        }

        let request = PeerRequest::new(source, plan.as_ref())?;
        let bytes = request.to_bytes()?;
        let replicas = peers
            .iter()
            .map(|addr| {
                let (_, runner) = Peer::new(addr.clone(), Arc::clone(registry)).accept(&bytes)?;
                Ok(Replica {
                    peer: addr.clone(),
                    runner,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        debug!(source, request_id = %request.request_id, peers = peers.len(), "graph distributed");
        Ok(Self {
            source: source.to_string(),
            plan,
            request_id: request.request_id,
            replicas,
        })
    }

    /// Peers running a replica, in dealing order
    #[must_use]
    pub fn peers(&self) -> Vec<&str> {
        self.replicas.iter().map(|r| r.peer.as_str()).collect()
    }

    /// The local graph that was distributed
    #[must_use]
    pub fn plan(&self) -> &Arc<dyn Runner> {
        &self.plan
    }
}

/// Deal upstream batches round-robin to the replicas, skipping any that
/// stopped reading. Once done, keep reading upstream until it closes or
/// the caller's context is cancelled.
async fn scatter(parent: Context, ctx: Context, mut inp: DataReceiver, inps: Vec<DataSender>) {
    let mut inps: Vec<Option<DataSender>> = inps.into_iter().map(Some).collect();
    let mut next = 0;
    'deal: while let Some(data) = recv(&ctx, &mut inp).await {
        for _ in 0..inps.len() {
            let idx = next;
            next = (next + 1) % inps.len();
            let Some(tx) = &inps[idx] else { continue };
            if send(&ctx, tx, data.clone()).await.is_ok() {
                continue 'deal;
            }
            if ctx.is_cancelled() {
                break 'deal;
            }
            inps[idx] = None;
        }
        break;
    }
    drop(inps);
    drain_until_cancelled(&parent, &mut inp).await;
}

/// Surface the first peer failure as is; later failures were caused by or
/// raced with it, so they carry the [`CoreError::OnPeer`] sentinel.
fn surface_once(responses: Vec<CoreResult<PeerResponse>>) -> Vec<CoreResult<()>> {
    let mut reported = false;
    responses
        .into_iter()
        .map(|response| match response?.into_error() {
            None => Ok(()),
            Some(_) if reported => Err(CoreError::OnPeer),
            Some(err) => {
                reported = true;
                Err(err)
            }
        })
        .collect()
}

#[async_trait]
impl Runner for DistributedRunner {
    async fn run(&self, ctx: &Context, inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        let parent = ctx.clone();
        let ctx = ctx.child();

        let mut inps = Vec::with_capacity(self.replicas.len());
        let mut tasks: Vec<JoinHandle<CoreResult<Vec<u8>>>> =
            Vec::with_capacity(self.replicas.len());
        for replica in &self.replicas {
            let (tx, rx) = ctx.channel();
            let peer_ctx = ctx.clone();
            let runner = Arc::clone(&replica.runner);
            let out = out.clone();
            let peer = replica.peer.clone();
            let request_id = self.request_id.clone();
            let span = debug_span!("peer", addr = %replica.peer);
            tasks.push(tokio::spawn(
                async move {
                    let result = runner.run(&peer_ctx, rx, out).await;
                    if let Err(err) = &result {
                        if !err.is_sentinel() {
                            warn!(request_id = %request_id, error = %err, "run failed on peer");
                            peer_ctx.cancel();
                        }
                    }
                    PeerResponse::from_result(request_id, peer, &result).to_bytes()
                }
                .instrument(span),
            ));
            inps.push(tx);
        }
        drop(out);
        tokio::spawn(scatter(parent, ctx.clone(), inp, inps));

        let responses = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| {
                let bytes = joined.map_err(|err| CoreError::TaskFailed {
                    message: err.to_string(),
                })??;
                PeerResponse::from_bytes(&bytes)
            })
            .collect();
        first_error(surface_once(responses))
    }

    fn returns(&self) -> Vec<Type> {
        self.plan.returns()
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        other.downcast_ref::<Self>().is_some_and(|o| {
            o.source == self.source && o.peers() == self.peers() && o.plan.equals(self.plan.as_ref())
        })
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        let args = DistributedArgs {
            source: self.source.clone(),
            peers: self.replicas.iter().map(|r| r.peer.clone()).collect(),
            plan: self.plan.encode()?,
        };
        RunnerSpec::new(Self::KIND, &args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn decode_distributed(registry: &RunnerRegistry, spec: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    let args: DistributedArgs = spec.args()?;
    let plan = registry.decode(&args.plan)?;
    let registry = Arc::new(registry.clone());
    let distributed = DistributedRunner::build(&args.source, &registry, plan, &args.peers)?;
    Ok(Arc::new(distributed))
}

/// Make [`DistributedRunner`] decodable through `registry`
///
/// # Errors
///
/// Returns error if the kind is already registered
pub fn register(registry: &mut RunnerRegistry) -> Result<(), RegistryError> {
    registry.register(DistributedRunner::KIND, decode_distributed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ep_data::{Column, Dataset};
    use ep_runtime::harness::{self, Fail, Repeat, Stall, Upper};
    use ep_runtime::{Const, Pipeline, Project, encode_bytes};
    use std::time::Duration;

    fn registry() -> Arc<RunnerRegistry> {
        let mut registry = RunnerRegistry::with_builtins();
        harness::register(&mut registry).unwrap();
        register(&mut registry).unwrap();
        Arc::new(registry)
    }

    fn peers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("peer-{}", i)).collect()
    }

    fn const_of(s: &str) -> Arc<dyn Runner> {
        Arc::new(Const::new(Dataset::from(Column::strs([s]))).unwrap())
    }

    fn ints(values: impl IntoIterator<Item = i64>) -> Dataset {
        Dataset::from(Column::ints(values))
    }

    #[test]
    fn test_no_peers_is_an_error() {
        let distributer = LoopbackDistributer::new("local", registry());
        let err = distributer.distribute(const_of("a"), &[]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRunner { .. }));
    }

    #[test]
    fn test_unregistered_runner_cannot_be_shipped() {
        let distributer =
            LoopbackDistributer::new("local", Arc::new(RunnerRegistry::with_builtins()));
        let graph = Pipeline::new(vec![const_of("a"), Arc::new(Upper)]).unwrap();
        let err = distributer.distribute(graph, &peers(1)).unwrap_err();
        assert!(matches!(err, CoreError::UnknownRunner { .. }));
    }

    #[tokio::test]
    async fn test_single_peer_matches_local_run() {
        let distributer = LoopbackDistributer::new("local", registry());
        let graph = Pipeline::new(vec![
            Project::new(vec![Arc::new(Upper), const_of("x")]).unwrap(),
            Arc::new(Repeat::new(2)),
        ])
        .unwrap();
        let remote = distributer.distribute(Arc::clone(&graph), &peers(1)).unwrap();
        assert_eq!(remote.returns(), graph.returns());

        let input = || vec![Dataset::from(Column::strs(["a", "b"]))];
        let (local, local_result) = harness::run(graph.as_ref(), input()).await;
        let (shipped, shipped_result) = harness::run(remote.as_ref(), input()).await;
        assert_eq!(local_result, Ok(()));
        assert_eq!(shipped_result, Ok(()));
        assert_eq!(shipped, local);
    }

    #[tokio::test]
    async fn test_batches_dealt_across_peers() {
        let distributer = LoopbackDistributer::new("local", registry());
        let remote = distributer
            .distribute(Arc::new(Repeat::new(2)), &peers(3))
            .unwrap();
        let batches: Vec<Dataset> = (0..6).map(|i| ints([i])).collect();
        let (data, result) = harness::run(remote.as_ref(), batches).await;
        assert_eq!(result, Ok(()));

        let mut rows = data.strings();
        rows.sort();
        let mut expected: Vec<String> = (0..6)
            .flat_map(|i| [format!("({})", i), format!("({})", i)])
            .collect();
        expected.sort();
        assert_eq!(rows, expected);
    }

    #[tokio::test]
    async fn test_peer_failure_reported_once() {
        let distributer = LoopbackDistributer::new("local", registry());
        let remote = distributer
            .distribute(Arc::new(Fail::new("bad plan")), &peers(3))
            .unwrap();
        let batches: Vec<Dataset> = (0..6).map(|i| ints([i])).collect();
        let run = harness::run(remote.as_ref(), batches);
        let (_, result) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("distributed run deadlocked");
        let err = result.unwrap_err();
        assert!(matches!(err, CoreError::Internal { .. }));
        assert!(err.to_string().contains("bad plan"));
    }

    #[test]
    fn test_surface_once_marks_duplicates() {
        let failure = |peer: &str| {
            Ok(PeerResponse::failure("r".into(), peer.into(), "boom".into()))
        };
        let results = surface_once(vec![
            Ok(PeerResponse::success("r".into(), "p0".into())),
            failure("p1"),
            failure("p2"),
        ]);
        assert_eq!(results[0], Ok(()));
        assert!(matches!(results[1], Err(CoreError::Internal { .. })));
        assert_eq!(results[2], Err(CoreError::OnPeer));
    }

    #[tokio::test]
    async fn test_cancel_returns_promptly() {
        let ctx = Context::background();
        let distributer = LoopbackDistributer::new("local", registry());
        let remote = distributer.distribute(Arc::new(Stall), &peers(2)).unwrap();
        let batches: Vec<Dataset> = (0..50).map(|i| ints([i])).collect();

        let cancel = {
            let ctx = ctx.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ctx.cancel();
            }
        };
        let run = harness::run_with_context(&ctx, remote.as_ref(), batches);
        let ((_, result), ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(run, cancel)
        })
        .await
        .expect("distributed run ignored cancellation");
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_distributed_runner_roundtrip() {
        let registry = registry();
        let distributer = LoopbackDistributer::new("local", Arc::clone(&registry));
        let remote = distributer
            .distribute(Pipeline::new(vec![const_of("a"), Arc::new(Upper)]).unwrap(), &peers(2))
            .unwrap();

        let decoded = registry.decode_bytes(&encode_bytes(remote.as_ref()).unwrap()).unwrap();
        assert!(decoded.equals(remote.as_ref()));
        assert_eq!(
            decoded.downcast_ref::<DistributedRunner>().unwrap().peers(),
            vec!["peer-0", "peer-1"]
        );

        let elsewhere = distributer
            .distribute(Pipeline::new(vec![const_of("a"), Arc::new(Upper)]).unwrap(), &peers(3))
            .unwrap();
        assert!(!elsewhere.equals(remote.as_ref()));
    }

    #[tokio::test]
    async fn test_distributed_inside_pipeline() {
        let distributer = LoopbackDistributer::new("local", registry());
        let remote = distributer.distribute(Arc::new(Upper), &peers(1)).unwrap();
        let graph = Pipeline::new(vec![const_of("q"), remote]).unwrap();
        let (data, result) = harness::run(graph.as_ref(), vec![ints([1, 2])]).await;
        assert_eq!(result, Ok(()));
        assert_eq!(data.strings(), vec!["(Q)", "(Q)"]);
    }
}
