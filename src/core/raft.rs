//! Public handle of one Raft peer and the loop that drives its roles.
//!
//! [`Raft::make`] restores durable state, then spawns two tasks:
//! - the role driver, which runs the loop of whatever role the peer currently
//!   plays and restarts it on every role or term change;
//! - the commit handler, which streams committed entries to the service.
//!
//! Every public call returns without waiting on the network.

use std::collections::BTreeSet;
use std::sync::Arc;

use autometrics::autometrics;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::async_task::spawn_task;
use crate::load_persistent_state;
use crate::proto::AppendEntriesRequest;
use crate::proto::AppendEntriesResponse;
use crate::proto::ApplyMsg;
use crate::proto::Entry;
use crate::proto::VoteRequest;
use crate::proto::VoteResponse;
use crate::CommitHandler;
use crate::DefaultCommitHandler;
use crate::Error;
use crate::HardState;
use crate::NodeId;
use crate::RaftContext;
use crate::RaftLog;
use crate::RaftNodeConfig;
use crate::Result;
use crate::RoleLease;
use crate::StateStorage;
use crate::Transport;
use crate::API_SLO;
use crate::CANDIDATE;
use crate::FOLLOWER;
use crate::LEADER;

/// Cloneable handle to a running peer.
#[derive(Clone, Debug)]
pub struct Raft {
    pub(crate) ctx: Arc<RaftContext>,
}

impl Raft {
    /// Creates a peer and starts its background tasks.
    ///
    /// `peers` lists the voting members; `me` may or may not be part of it.
    /// The peer starts as a follower with whatever term, vote and log
    /// `state_storage` holds (term 0 and an empty log on first boot).
    ///
    /// Must be called from within a tokio runtime.
    pub fn make(
        settings: Arc<RaftNodeConfig>,
        peers: Vec<NodeId>,
        me: NodeId,
        transport: Arc<dyn Transport>,
        state_storage: Arc<dyn StateStorage>,
        apply_tx: mpsc::Sender<ApplyMsg>,
    ) -> Result<Self> {
        let peers: Vec<NodeId> = peers
            .into_iter()
            .filter(|id| *id != me)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (hard_state, raft_log) = match load_persistent_state(state_storage.as_ref())? {
            Some(persisted) => (persisted.hard_state, RaftLog::from_entries(persisted.log)?),
            None => (HardState::default(), RaftLog::new()),
        };

        info!(
            node_id = me,
            ?peers,
            current_term = hard_state.current_term,
            voted_for = ?hard_state.voted_for,
            last_log_index = raft_log.last_entry_id(),
            "starting raft peer"
        );

        let ctx = Arc::new(RaftContext::new(
            me,
            peers,
            settings,
            hard_state,
            raft_log,
            transport,
            state_storage,
        ));

        let role_rx = ctx.role_tx.subscribe();
        let driver_ctx = ctx.clone();
        spawn_task("raft-driver", move || drive(driver_ctx, role_rx));

        let mut commit_handler = DefaultCommitHandler::new(ctx.clone(), apply_tx);
        spawn_task("commit-handler", move || async move { commit_handler.run().await });

        Ok(Self { ctx })
    }

    /// `(current_term, is_leader)`.
    pub fn get_state(&self) -> (u64, bool) {
        let state = self.ctx.state.lock();
        (state.current_term(), state.role.is_leader() && !state.halted)
    }

    /// Proposes `command` for replication.
    ///
    /// On a leader, appends it at the current term, persists, wakes the
    /// replicators and returns `(index, term, true)` without waiting for the
    /// entry to commit. Elsewhere returns `(0, term, false)` and changes
    /// nothing.
    #[autometrics(objective = API_SLO)]
    pub fn start(
        &self,
        command: Vec<u8>,
    ) -> Result<(u64, u64, bool)> {
        let mut state = self.ctx.state.lock();
        let term = state.current_term();
        if !state.role.is_leader() || state.halted || self.ctx.is_killed() {
            return Ok((0, term, false));
        }

        let index = state.raft_log.append_command(term, command);
        self.ctx.persist(&mut state)?;
        debug!(node_id = self.ctx.node_id, index, term, "command proposed");

        // A single-node cluster commits on append
        self.ctx.advance_commit_index(&mut state);
        self.ctx.replicate_tx.send_replace(index);
        Ok((index, term, true))
    }

    /// Stops every background task of this peer. Returns immediately; loops
    /// exit at their next suspension point.
    pub fn kill(&self) {
        if !self.ctx.shutdown.is_cancelled() {
            info!(node_id = self.ctx.node_id, "kill requested");
        }
        self.ctx.shutdown.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.ctx.is_killed()
    }

    // ----------------------------------------------------------------
    // Inbound RPCs, for transports that dispatch by handle

    #[autometrics(objective = API_SLO)]
    pub fn handle_vote_request(
        &self,
        request: VoteRequest,
    ) -> Result<VoteResponse> {
        self.ctx.handle_vote_request(request)
    }

    #[autometrics(objective = API_SLO)]
    pub fn handle_append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        self.ctx.handle_append_entries(request)
    }

    // ----------------------------------------------------------------
    // Inspection

    pub fn node_id(&self) -> NodeId {
        self.ctx.node_id
    }

    pub fn current_term(&self) -> u64 {
        self.ctx.state.lock().current_term()
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.ctx.state.lock().voted_for()
    }

    /// One of [`FOLLOWER`], [`CANDIDATE`], [`LEADER`].
    pub fn role(&self) -> i32 {
        self.ctx.state.lock().role.as_i32()
    }

    pub fn commit_index(&self) -> u64 {
        self.ctx.state.lock().commit_index
    }

    pub fn last_applied(&self) -> u64 {
        self.ctx.state.lock().last_applied
    }

    /// Copy of the log, sentinel excluded.
    pub fn log_entries(&self) -> Vec<Entry> {
        self.ctx.state.lock().raft_log.entries().to_vec()
    }

    /// Whether durable storage failed and the peer stopped.
    pub fn is_halted(&self) -> bool {
        self.ctx.state.lock().halted
    }
}

/// Runs the loop of the current role until shutdown.
///
/// A role loop is started for one lease and dropped as soon as a newer lease
/// is published. Loops that outlive their lease notice it themselves the next
/// time they take the lock.
async fn drive(
    ctx: Arc<RaftContext>,
    mut role_rx: watch::Receiver<RoleLease>,
) -> Result<()> {
    loop {
        let lease = *role_rx.borrow_and_update();
        debug!(node_id = ctx.node_id, ?lease, "role loop started");

        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => {
                info!(node_id = ctx.node_id, "[Raft] shutdown signal received.");
                return Ok(());
            }
            changed = role_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                continue;
            }
            result = run_role(&ctx, lease) => {
                if let Err(e) = result {
                    if let Error::Fatal(_) = e {
                        return Err(e);
                    }
                    warn!(node_id = ctx.node_id, ?lease, "role loop failed: {:?}", e);
                }
            }
        }

        // Loop ended on its own; idle until the role changes
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => {
                info!(node_id = ctx.node_id, "[Raft] shutdown signal received.");
                return Ok(());
            }
            changed = role_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

async fn run_role(
    ctx: &RaftContext,
    lease: RoleLease,
) -> Result<()> {
    match lease.role {
        FOLLOWER => run_follower(ctx, lease).await,
        CANDIDATE => ctx.election_handler.broadcast_vote_requests(ctx, lease).await,
        LEADER => run_leader(ctx, lease).await,
        _ => Ok(()),
    }
}

/// Waits out the election timer. Heartbeats and granted votes push the
/// deadline back under the lock, so the deadline is re-read after each sleep.
async fn run_follower(
    ctx: &RaftContext,
    lease: RoleLease,
) -> Result<()> {
    loop {
        let deadline = {
            let mut state = ctx.state.lock();
            if !state.is_current(&lease) {
                return Ok(());
            }
            if state.election_timer.is_expired() {
                return ctx.become_candidate(&mut state);
            }
            state.election_timer.next_deadline()
        };
        sleep_until(deadline).await;
    }
}

/// One replicator per peer, all bound to the same lease.
async fn run_leader(
    ctx: &RaftContext,
    lease: RoleLease,
) -> Result<()> {
    let results = join_all(
        ctx.peers
            .iter()
            .map(|peer_id| ctx.replication_handler.replicate_to_peer(ctx, lease, *peer_id)),
    )
    .await;

    for result in results {
        if let Err(e) = result {
            if let Error::Fatal(_) = e {
                return Err(e);
            }
            warn!(node_id = ctx.node_id, "replicator stopped: {:?}", e);
        }
    }
    Ok(())
}
