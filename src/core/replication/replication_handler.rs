use autometrics::autometrics;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::async_task::call_with_timeout;
use crate::if_higher_term_found;
use crate::metrics::RPC_FAILURES;
use crate::proto::AppendEntriesRequest;
use crate::proto::AppendEntriesResponse;
use crate::NodeId;
use crate::RaftContext;
use crate::Result;
use crate::RoleLease;
use crate::SharedState;
use crate::API_SLO;

/// AppendEntries on both sides: the follower's handler and the leader's
/// per-peer replicators.
#[derive(Clone, Debug)]
pub struct ReplicationHandler {
    pub my_id: NodeId,
}

impl ReplicationHandler {
    pub(crate) fn new(my_id: NodeId) -> Self {
        Self { my_id }
    }

    /// Next request for `peer_id`, or `None` when this peer no longer leads.
    ///
    /// Carries at most `max_entries` entries starting at the peer's
    /// next_index; an empty batch is a heartbeat.
    pub(crate) fn build_append_entries_request(
        &self,
        state: &SharedState,
        peer_id: NodeId,
        max_entries: u64,
    ) -> Option<AppendEntriesRequest> {
        let leader = state.role.leader_state()?;
        let last_log_index = state.raft_log.last_entry_id();
        let next_index = leader.next_index(peer_id)?.clamp(1, last_log_index + 1);
        let prev_log_index = next_index - 1;
        let prev_log_term = state.raft_log.entry_term(prev_log_index).unwrap_or(0);

        Some(AppendEntriesRequest {
            term: state.current_term(),
            leader_id: self.my_id,
            prev_log_index,
            prev_log_term,
            entries: state.raft_log.get_entries_from(next_index, max_entries),
            leader_commit: state.commit_index,
        })
    }

    /// Keeps `peer_id` in sync for as long as `lease` stays current.
    ///
    /// Sends on every heartbeat tick and whenever a new entry is proposed.
    /// After a successful reply with more entries pending it sends again
    /// right away; after a failure it waits for the next tick.
    pub(crate) async fn replicate_to_peer(
        &self,
        ctx: &RaftContext,
        lease: RoleLease,
        peer_id: NodeId,
    ) -> Result<()> {
        let raft = &ctx.settings.raft;
        let rpc_timeout = raft.rpc_timeout();
        let max_entries = raft.replication.append_entries_max_entries_per_replication;

        let mut ticker = interval(raft.heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut replicate_rx = ctx.replicate_tx.subscribe();
        let mut send_now = true;

        loop {
            if !send_now {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = replicate_rx.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                }
            }

            let request = {
                let state = ctx.state.lock();
                if !state.is_current(&lease) {
                    return Ok(());
                }
                match self.build_append_entries_request(&state, peer_id, max_entries) {
                    Some(request) => request,
                    None => return Ok(()),
                }
            };
            ticker.reset();
            trace!(
                node_id = self.my_id,
                peer_id,
                prev_log_index = request.prev_log_index,
                entries = request.entries.len(),
                "send append entries"
            );

            let result = call_with_timeout(
                peer_id,
                rpc_timeout,
                ctx.transport.append_entries(peer_id, request.clone()),
            )
            .await;

            send_now = {
                let mut state = ctx.state.lock();
                if !state.is_current(&lease) {
                    trace!(node_id = self.my_id, peer_id, "stale replication reply ignored");
                    return Ok(());
                }
                match result {
                    Ok(response) => self.handle_append_response(ctx, &mut state, peer_id, &request, response)?,
                    Err(e) => {
                        debug!(node_id = self.my_id, peer_id, "append entries failed: {:?}", e);
                        RPC_FAILURES
                            .with_label_values(&[&ctx.node_label(), "append_entries"])
                            .inc();
                        false
                    }
                }
            };
        }
    }

    /// Applies one reply on the leader. Returns whether more entries are
    /// waiting for this peer.
    pub(crate) fn handle_append_response(
        &self,
        ctx: &RaftContext,
        state: &mut SharedState,
        peer_id: NodeId,
        request: &AppendEntriesRequest,
        response: AppendEntriesResponse,
    ) -> Result<bool> {
        if if_higher_term_found(state.current_term(), response.term) {
            warn!(
                node_id = self.my_id,
                peer_id,
                term = response.term,
                "higher term found during replication"
            );
            ctx.become_follower(state, response.term, None);
            ctx.persist(state)?;
            return Ok(false);
        }

        if response.term != request.term {
            debug!(node_id = self.my_id, peer_id, ?response, "stale append reply");
            return Ok(false);
        }

        let last_log_index = state.raft_log.last_entry_id();
        let Some(leader) = state.role.leader_state_mut() else {
            return Ok(false);
        };

        if response.success {
            leader.handle_success(peer_id, request.last_carried_index());
            let next_index = leader.next_index(peer_id).unwrap_or(last_log_index + 1);
            ctx.advance_commit_index(state);
            Ok(next_index <= last_log_index)
        } else {
            leader.handle_conflict(peer_id, request.prev_log_index, response.match_hint);
            Ok(false)
        }
    }

    /// Follower side of AppendEntries. Persists before the reply leaves.
    #[autometrics(objective = API_SLO)]
    pub(crate) fn handle_append_entries(
        &self,
        ctx: &RaftContext,
        state: &mut SharedState,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let current_term = state.current_term();
        if request.term < current_term {
            debug!(
                node_id = self.my_id,
                leader_id = request.leader_id,
                request_term = request.term,
                current_term,
                "reject append entries from stale leader"
            );
            return Ok(AppendEntriesResponse::higher_term(current_term));
        }

        let mut dirty = request.term > current_term;
        ctx.become_follower(state, request.term, Some(request.leader_id));
        state.election_timer.reset();

        let term = state.current_term();
        let prev_log_index = request.prev_log_index;
        let last_log_index = state.raft_log.last_entry_id();

        // Consistency check
        let mismatch_hint = if prev_log_index > last_log_index {
            Some(last_log_index + 1)
        } else {
            let term_at_prev = state.raft_log.entry_term(prev_log_index).unwrap_or(0);
            if term_at_prev != request.prev_log_term {
                Some(state.raft_log.first_index_for_term(term_at_prev).unwrap_or(0))
            } else {
                None
            }
        };

        if let Some(match_hint) = mismatch_hint {
            debug!(
                node_id = self.my_id,
                prev_log_index,
                prev_log_term = request.prev_log_term,
                last_log_index,
                match_hint,
                "log consistency check failed"
            );
            if dirty {
                ctx.persist(state)?;
            }
            return Ok(AppendEntriesResponse::conflict(term, match_hint));
        }

        let last_new_index = request.last_carried_index();
        let leader_commit = request.leader_commit;
        if !request.is_heartbeat() && state.raft_log.filter_out_conflicts_and_append(prev_log_index, request.entries) {
            dirty = true;
        }

        if dirty {
            ctx.persist(state)?;
        }

        if leader_commit > state.commit_index {
            ctx.update_commit_index(state, leader_commit.min(last_new_index));
        }

        Ok(AppendEntriesResponse::success(term))
    }
}
