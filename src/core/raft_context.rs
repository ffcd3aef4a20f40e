use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::encode_persistent_state;
use crate::metrics::COMMIT_INDEX;
use crate::metrics::CURRENT_TERM;
use crate::metrics::ROLE_TRANSITIONS;
use crate::proto::AppendEntriesRequest;
use crate::proto::AppendEntriesResponse;
use crate::proto::VoteRequest;
use crate::proto::VoteResponse;
use crate::ElectionHandler;
use crate::Error;
use crate::HardState;
use crate::NetworkError;
use crate::NodeId;
use crate::RaftLog;
use crate::RaftNodeConfig;
use crate::RaftRole;
use crate::ReplicationHandler;
use crate::Result;
use crate::RoleLease;
use crate::SharedState;
use crate::StateStorage;
use crate::Transport;

/// Everything one peer's tasks and RPC handlers share.
///
/// `state` is the single lock of the peer. It is a blocking mutex whose guard
/// is `!Send`, so it can never be held across an `.await`.
pub struct RaftContext {
    pub(crate) node_id: NodeId,

    /// Voting members other than this node
    pub(crate) peers: Vec<NodeId>,

    pub(crate) settings: Arc<RaftNodeConfig>,

    pub(crate) state: Mutex<SharedState>,

    // Network
    pub(crate) transport: Arc<dyn Transport>,

    // Storage
    pub(crate) state_storage: Arc<dyn StateStorage>,

    // Handlers
    pub(crate) election_handler: ElectionHandler,
    pub(crate) replication_handler: ReplicationHandler,

    /// Published on every role or term change; drives the role loop
    pub(crate) role_tx: watch::Sender<RoleLease>,
    /// Last log index a leader wants replicated; wakes the replicators
    pub(crate) replicate_tx: watch::Sender<u64>,
    /// Wakes the applier when commit_index moves
    pub(crate) apply_notify: Notify,

    pub(crate) shutdown: CancellationToken,
}

impl Debug for RaftContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RaftContext")
            .field("node_id", &self.node_id)
            .field("peers", &self.peers)
            .finish()
    }
}

impl RaftContext {
    pub(crate) fn new(
        node_id: NodeId,
        peers: Vec<NodeId>,
        settings: Arc<RaftNodeConfig>,
        hard_state: HardState,
        raft_log: RaftLog,
        transport: Arc<dyn Transport>,
        state_storage: Arc<dyn StateStorage>,
    ) -> Self {
        let election = &settings.raft.election;
        let state = SharedState::new(
            node_id,
            hard_state,
            raft_log,
            (election.election_timeout_min, election.election_timeout_max),
        );
        let (role_tx, _) = watch::channel(state.lease());
        let (replicate_tx, _) = watch::channel(state.raft_log.last_entry_id());
        CURRENT_TERM
            .with_label_values(&[&node_id.to_string()])
            .set(hard_state.current_term as i64);

        Self {
            node_id,
            peers,
            settings,
            state: Mutex::new(state),
            transport,
            state_storage,
            election_handler: ElectionHandler::new(node_id),
            replication_handler: ReplicationHandler::new(node_id),
            role_tx,
            replicate_tx,
            apply_notify: Notify::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of voting members, self included.
    pub(crate) fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    pub(crate) fn is_killed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn node_label(&self) -> String {
        self.node_id.to_string()
    }

    // ----------------------------------------------------------------
    // Inbound RPCs

    pub(crate) fn handle_vote_request(
        &self,
        request: VoteRequest,
    ) -> Result<VoteResponse> {
        let mut state = self.state.lock();
        self.ensure_serving(&state)?;
        self.election_handler.handle_vote_request(self, &mut state, request)
    }

    pub(crate) fn handle_append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let mut state = self.state.lock();
        self.ensure_serving(&state)?;
        self.replication_handler
            .handle_append_entries(self, &mut state, request)
    }

    fn ensure_serving(
        &self,
        state: &SharedState,
    ) -> Result<()> {
        if state.halted || self.is_killed() {
            return Err(NetworkError::ServiceUnavailable {
                node_id: self.node_id,
            }
            .into());
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Durable state

    /// Writes `{current_term, voted_for, log}` through the storage adapter.
    ///
    /// Must be called before the lock is released whenever any of the three
    /// changed. A failed write halts the peer.
    pub(crate) fn persist(
        &self,
        state: &mut SharedState,
    ) -> Result<()> {
        let result = encode_persistent_state(&state.hard_state, &state.raft_log)
            .and_then(|bytes| self.state_storage.save_state(bytes));

        match result {
            Ok(()) => {
                debug!(
                    node_id = self.node_id,
                    term = state.current_term(),
                    voted_for = ?state.voted_for(),
                    last_log_index = state.raft_log.last_entry_id(),
                    "state persisted"
                );
                Ok(())
            }
            Err(e) => Err(self.halt(state, format!("failed to persist state: {e}"))),
        }
    }

    /// Stops the peer for good. Returns the error to hand back to the caller.
    pub(crate) fn halt(
        &self,
        state: &mut SharedState,
        reason: String,
    ) -> Error {
        error!(node_id = self.node_id, "{reason}; peer halted");
        state.halted = true;
        self.shutdown.cancel();
        Error::Fatal(reason)
    }

    // ----------------------------------------------------------------
    // Role transitions. All of them run under the state lock.

    fn publish_lease(
        &self,
        state: &mut SharedState,
    ) {
        state.epoch += 1;
        self.role_tx.send_replace(state.lease());
        CURRENT_TERM
            .with_label_values(&[&self.node_label()])
            .set(state.current_term() as i64);
    }

    /// Step-down rule. Adopts `term` when it is newer (clearing the vote) and
    /// makes this peer a follower. The caller persists.
    pub(crate) fn become_follower(
        &self,
        state: &mut SharedState,
        term: u64,
        leader_id: Option<NodeId>,
    ) {
        let term_changed = term > state.current_term();
        if term_changed {
            state.hard_state.current_term = term;
            state.hard_state.voted_for = None;
        }

        let role_changed = !state.role.is_follower();
        if role_changed {
            info!(
                node_id = self.node_id,
                from = state.role.name(),
                term = state.current_term(),
                "step down to follower"
            );
            state.role = state.role.become_follower(leader_id);
            state.election_timer.reset();
            ROLE_TRANSITIONS
                .with_label_values(&[&self.node_label(), "follower"])
                .inc();
        } else if let RaftRole::Follower(follower) = &mut state.role {
            if leader_id.is_some() {
                follower.leader_id = leader_id;
            }
        }

        if term_changed || role_changed {
            self.publish_lease(state);
        }
    }

    /// Starts a new election round: next term, vote for self, fresh timer.
    pub(crate) fn become_candidate(
        &self,
        state: &mut SharedState,
    ) -> Result<()> {
        let role = state.role.become_candidate(self.node_id)?;
        state.hard_state.current_term += 1;
        state.hard_state.voted_for = Some(self.node_id);
        state.role = role;
        state.election_timer.reset();

        info!(
            node_id = self.node_id,
            term = state.current_term(),
            "election timeout, campaigning"
        );
        ROLE_TRANSITIONS
            .with_label_values(&[&self.node_label(), "candidate"])
            .inc();
        self.publish_lease(state);
        self.persist(state)
    }

    pub(crate) fn become_leader(
        &self,
        state: &mut SharedState,
    ) -> Result<()> {
        let last_log_index = state.raft_log.last_entry_id();
        state.role = state.role.become_leader(&self.peers, last_log_index)?;

        info!(
            node_id = self.node_id,
            term = state.current_term(),
            last_log_index,
            "became leader"
        );
        ROLE_TRANSITIONS
            .with_label_values(&[&self.node_label(), "leader"])
            .inc();
        self.publish_lease(state);
        self.replicate_tx.send_replace(last_log_index);
        Ok(())
    }

    // ----------------------------------------------------------------
    // Commit

    /// Raises commit_index to `new_commit_index` (capped at the last log
    /// index) and wakes the applier. Never lowers it.
    pub(crate) fn update_commit_index(
        &self,
        state: &mut SharedState,
        new_commit_index: u64,
    ) {
        let new_commit_index = new_commit_index.min(state.raft_log.last_entry_id());
        if new_commit_index <= state.commit_index {
            return;
        }
        debug!(
            node_id = self.node_id,
            from = state.commit_index,
            to = new_commit_index,
            "commit index advanced"
        );
        state.commit_index = new_commit_index;
        COMMIT_INDEX
            .with_label_values(&[&self.node_label()])
            .set(new_commit_index as i64);
        self.apply_notify.notify_one();
    }

    /// Leader only: commits the highest current-term index held by a
    /// majority.
    pub(crate) fn advance_commit_index(
        &self,
        state: &mut SharedState,
    ) {
        let matched = match state.role.leader_state() {
            Some(leader) => leader.matched_ids(),
            None => return,
        };
        if let Some(index) = state.raft_log.calculate_majority_matched_index(
            state.current_term(),
            state.commit_index,
            matched,
        ) {
            self.update_commit_index(state, index);
        }
    }
}
