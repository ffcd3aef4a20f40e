//! In-process transport connecting peers of one test or demo cluster.
//!
//! Peers are held weakly, so dropping every handle to a peer removes it from
//! the network. Links can be cut per peer to build partitions, and the
//! network can be made lossy to exercise retry paths.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tracing::trace;

use crate::proto::AppendEntriesRequest;
use crate::proto::AppendEntriesResponse;
use crate::proto::VoteRequest;
use crate::proto::VoteResponse;
use crate::NetworkError;
use crate::NodeId;
use crate::Raft;
use crate::RaftContext;
use crate::Result;
use crate::Transport;

/// Share of requests (and, separately, replies) lost on an unreliable network
const UNRELIABLE_DROP_PERCENT: u32 = 10;
/// Upper bound of the random delivery delay on an unreliable network
const UNRELIABLE_MAX_DELAY_MS: u64 = 27;

#[derive(Debug)]
struct NetworkState {
    nodes: HashMap<NodeId, Weak<RaftContext>>,
    disconnected: HashSet<NodeId>,
    reliable: bool,
    /// RPCs received per peer
    rpc_counts: HashMap<NodeId, u64>,
}

/// How one request travels through the network.
struct Route {
    target: Arc<RaftContext>,
    delay: Duration,
    drop_request: bool,
    drop_reply: bool,
}

#[derive(Clone, Debug)]
pub struct LocalNetwork {
    inner: Arc<Mutex<NetworkState>>,
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(NetworkState {
                nodes: HashMap::new(),
                disconnected: HashSet::new(),
                reliable: true,
                rpc_counts: HashMap::new(),
            })),
        }
    }

    /// Transport handle `me` uses to reach its peers.
    pub fn transport(
        &self,
        me: NodeId,
    ) -> Arc<LocalTransport> {
        Arc::new(LocalTransport {
            me,
            network: self.clone(),
        })
    }

    /// Makes `raft` reachable under its node id. Re-registering an id
    /// replaces the previous peer (used to simulate a restart).
    pub fn register(
        &self,
        raft: &Raft,
    ) {
        let mut state = self.inner.lock();
        state.nodes.insert(raft.node_id(), Arc::downgrade(&raft.ctx));
    }

    pub fn unregister(
        &self,
        node_id: NodeId,
    ) {
        self.inner.lock().nodes.remove(&node_id);
    }

    /// Restores every link of `node_id`.
    pub fn connect(
        &self,
        node_id: NodeId,
    ) {
        trace!(node_id, "connect");
        self.inner.lock().disconnected.remove(&node_id);
    }

    /// Cuts every link of `node_id`, in both directions.
    pub fn disconnect(
        &self,
        node_id: NodeId,
    ) {
        trace!(node_id, "disconnect");
        self.inner.lock().disconnected.insert(node_id);
    }

    pub fn is_connected(
        &self,
        node_id: NodeId,
    ) -> bool {
        !self.inner.lock().disconnected.contains(&node_id)
    }

    pub fn set_reliable(
        &self,
        reliable: bool,
    ) {
        self.inner.lock().reliable = reliable;
    }

    /// Number of RPCs `node_id` has received.
    pub fn rpc_count(
        &self,
        node_id: NodeId,
    ) -> u64 {
        self.inner.lock().rpc_counts.get(&node_id).copied().unwrap_or(0)
    }

    pub fn total_rpc_count(&self) -> u64 {
        self.inner.lock().rpc_counts.values().sum()
    }

    fn link_up(
        &self,
        from: NodeId,
        to: NodeId,
    ) -> bool {
        let state = self.inner.lock();
        !state.disconnected.contains(&from) && !state.disconnected.contains(&to)
    }

    fn route(
        &self,
        from: NodeId,
        to: NodeId,
    ) -> Result<Route> {
        let mut state = self.inner.lock();

        if state.disconnected.contains(&from) || state.disconnected.contains(&to) {
            return Err(NetworkError::Unreachable { node_id: to }.into());
        }

        let target = state
            .nodes
            .get(&to)
            .ok_or(NetworkError::PeerNotFound { node_id: to })?
            .upgrade()
            .ok_or(NetworkError::ServiceUnavailable { node_id: to })?;

        *state.rpc_counts.entry(to).or_insert(0) += 1;

        if state.reliable {
            return Ok(Route {
                target,
                delay: Duration::ZERO,
                drop_request: false,
                drop_reply: false,
            });
        }

        let mut rng = rand::thread_rng();
        Ok(Route {
            target,
            delay: Duration::from_millis(rng.gen_range(0..=UNRELIABLE_MAX_DELAY_MS)),
            drop_request: rng.gen_range(0..100) < UNRELIABLE_DROP_PERCENT,
            drop_reply: rng.gen_range(0..100) < UNRELIABLE_DROP_PERCENT,
        })
    }
}

/// One peer's view of a [`LocalNetwork`].
#[derive(Debug)]
pub struct LocalTransport {
    me: NodeId,
    network: LocalNetwork,
}

impl LocalTransport {
    async fn deliver<Req, Resp, F>(
        &self,
        to: NodeId,
        request: Req,
        handler: F,
    ) -> Result<Resp>
    where
        F: FnOnce(&RaftContext, Req) -> Result<Resp>,
    {
        let route = self.network.route(self.me, to)?;

        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }
        if route.drop_request {
            trace!(from = self.me, to, "request dropped");
            return Err(NetworkError::Unreachable { node_id: to }.into());
        }
        if route.target.is_killed() {
            return Err(NetworkError::ServiceUnavailable { node_id: to }.into());
        }

        let response = handler(&route.target, request)?;

        // A partition formed while the request was in flight loses the reply
        if route.drop_reply || !self.network.link_up(self.me, to) {
            trace!(from = self.me, to, "reply dropped");
            return Err(NetworkError::Unreachable { node_id: to }.into());
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request_vote(
        &self,
        target: NodeId,
        request: VoteRequest,
    ) -> Result<VoteResponse> {
        self.deliver(target, request, |ctx, req| ctx.handle_vote_request(req))
            .await
    }

    async fn append_entries(
        &self,
        target: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        self.deliver(target, request, |ctx, req| ctx.handle_append_entries(req))
            .await
    }
}
