use autometrics::autometrics;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::async_task::call_with_timeout;
use crate::cluster::is_majority;
use crate::if_higher_term_found;
use crate::is_target_log_more_recent;
use crate::metrics::RPC_FAILURES;
use crate::proto::VoteRequest;
use crate::proto::VoteResponse;
use crate::NodeId;
use crate::RaftContext;
use crate::Result;
use crate::RoleLease;
use crate::SharedState;
use crate::API_SLO;

/// RequestVote on both sides: the voter's handler and the candidate's round.
#[derive(Clone, Debug)]
pub struct ElectionHandler {
    pub(crate) my_id: NodeId,
}

impl ElectionHandler {
    pub(crate) fn new(my_id: NodeId) -> Self {
        Self { my_id }
    }

    pub(crate) fn build_vote_request(
        &self,
        state: &SharedState,
    ) -> VoteRequest {
        let (last_log_index, last_log_term) = state.raft_log.get_last_entry_metadata();
        VoteRequest {
            term: state.current_term(),
            candidate_id: self.my_id,
            last_log_index,
            last_log_term,
        }
    }

    /// Runs one election round for the candidate holding `lease`.
    ///
    /// Vote requests go out concurrently and replies are counted as they
    /// arrive. The round ends when this peer wins, when a higher term makes it
    /// step down, when the lease is superseded, or when the election timer
    /// fires (which starts the next round).
    pub(crate) async fn broadcast_vote_requests(
        &self,
        ctx: &RaftContext,
        lease: RoleLease,
    ) -> Result<()> {
        let (request, mut deadline) = {
            let mut state = ctx.state.lock();
            if !state.is_current(&lease) {
                return Ok(());
            }

            let votes = state
                .role
                .candidate_state_mut()
                .map(|c| c.vote_count())
                .unwrap_or(0);
            if is_majority(votes, ctx.cluster_size()) {
                // Single-node cluster: own vote is a quorum
                return ctx.become_leader(&mut state);
            }

            (self.build_vote_request(&state), state.election_timer.next_deadline())
        };

        debug!(
            node_id = self.my_id,
            term = request.term,
            peers = ?ctx.peers,
            "broadcast_vote_requests"
        );

        let rpc_timeout = ctx.settings.raft.rpc_timeout();
        let mut pending: FuturesUnordered<_> = ctx
            .peers
            .iter()
            .map(|peer_id| {
                let peer_id = *peer_id;
                let request = request.clone();
                async move {
                    let result = call_with_timeout(
                        peer_id,
                        rpc_timeout,
                        ctx.transport.request_vote(peer_id, request),
                    )
                    .await;
                    (peer_id, result)
                }
            })
            .collect();

        loop {
            tokio::select! {
                Some((peer_id, result)) = pending.next() => {
                    let mut state = ctx.state.lock();
                    if !state.is_current(&lease) {
                        trace!(node_id = self.my_id, "stale election round, ignoring vote reply");
                        return Ok(());
                    }
                    match result {
                        Ok(response) => {
                            if self.handle_vote_response(ctx, &mut state, peer_id, request.term, response)? {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            debug!(node_id = self.my_id, peer_id, "vote request failed: {:?}", e);
                            RPC_FAILURES
                                .with_label_values(&[&ctx.node_label(), "request_vote"])
                                .inc();
                        }
                    }
                }
                _ = sleep_until(deadline) => {
                    let mut state = ctx.state.lock();
                    if !state.is_current(&lease) {
                        return Ok(());
                    }
                    if state.election_timer.is_expired() {
                        debug!(node_id = self.my_id, term = request.term, "election round timed out");
                        return ctx.become_candidate(&mut state);
                    }
                    deadline = state.election_timer.next_deadline();
                }
            }
        }
    }

    /// Counts one vote reply. Returns whether the round is over.
    pub(crate) fn handle_vote_response(
        &self,
        ctx: &RaftContext,
        state: &mut SharedState,
        from: NodeId,
        request_term: u64,
        response: VoteResponse,
    ) -> Result<bool> {
        if if_higher_term_found(state.current_term(), response.term) {
            warn!(
                node_id = self.my_id,
                from,
                term = response.term,
                "higher term found during election"
            );
            ctx.become_follower(state, response.term, None);
            ctx.persist(state)?;
            return Ok(true);
        }

        if request_term != state.current_term() || response.term != request_term || !response.vote_granted {
            debug!(node_id = self.my_id, from, ?response, "vote not granted");
            return Ok(false);
        }

        let votes = match state.role.candidate_state_mut() {
            Some(candidate) => candidate.record_vote(from),
            None => return Ok(true),
        };
        debug!(node_id = self.my_id, from, votes, "vote granted");

        if is_majority(votes, ctx.cluster_size()) {
            info!(
                node_id = self.my_id,
                term = request_term,
                votes,
                "received majority votes"
            );
            ctx.become_leader(state)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Voter side of RequestVote. Persists before the reply leaves.
    #[autometrics(objective = API_SLO)]
    pub(crate) fn handle_vote_request(
        &self,
        ctx: &RaftContext,
        state: &mut SharedState,
        request: VoteRequest,
    ) -> Result<VoteResponse> {
        debug!(node_id = self.my_id, ?request, "VoteRequest::Received");
        let mut dirty = false;

        if request.term > state.current_term() {
            ctx.become_follower(state, request.term, None);
            dirty = true;
        }

        let (last_log_index, last_log_term) = state.raft_log.get_last_entry_metadata();
        let vote_granted = self.check_vote_request_is_legal(
            &request,
            state.current_term(),
            last_log_index,
            last_log_term,
            state.voted_for(),
        );

        if vote_granted {
            if state.voted_for() != Some(request.candidate_id) {
                state.hard_state.voted_for = Some(request.candidate_id);
                dirty = true;
            }
            state.election_timer.reset();
            debug!(
                node_id = self.my_id,
                candidate_id = request.candidate_id,
                term = request.term,
                "vote granted"
            );
        }

        if dirty {
            ctx.persist(state)?;
        }

        Ok(VoteResponse {
            term: state.current_term(),
            vote_granted,
        })
    }

    /// The function to check RPC request is legal or not
    ///
    /// Criterias to check:
    /// - request term is not stale
    /// - votedFor is null or candidateId
    /// - candidate's log is at least as up-to-date as receiver's log
    pub(crate) fn check_vote_request_is_legal(
        &self,
        request: &VoteRequest,
        current_term: u64,
        last_log_index: u64,
        last_log_term: u64,
        voted_for_option: Option<NodeId>,
    ) -> bool {
        if current_term > request.term {
            debug!("current_term({:?}) > request.term({:?})", current_term, request.term);
            return false;
        }

        if !is_target_log_more_recent(
            last_log_index,
            last_log_term,
            request.last_log_index,
            request.last_log_term,
        ) {
            debug!(
                "node_log_is_more_recent_than_requester {:?}, last_log_index={:?}, last_log_term={:?}",
                request, last_log_index, last_log_term
            );
            return false;
        }

        if let Some(voted_for) = voted_for_option {
            if voted_for != request.candidate_id {
                debug!(
                    "already voted for {} in term {}, rejecting {}",
                    voted_for, current_term, request.candidate_id
                );
                return false;
            }
        }

        true
    }
}
