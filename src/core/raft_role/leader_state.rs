use std::collections::HashMap;

use tracing::debug;

use crate::NodeId;

/// Leader-only progress tables. Discarded on any role change.
#[derive(Debug, Clone)]
pub struct LeaderState {
    /// Next log index to send to each follower
    pub(super) next_index: HashMap<NodeId, u64>,
    /// Highest index known to be replicated on each follower
    pub(super) match_index: HashMap<NodeId, u64>,
}

impl LeaderState {
    pub fn new(
        peers: &[NodeId],
        last_log_index: u64,
    ) -> Self {
        let mut state = Self {
            next_index: HashMap::with_capacity(peers.len()),
            match_index: HashMap::with_capacity(peers.len()),
        };
        state.init_peers_next_index_and_match_index(last_log_index, peers);
        state
    }

    fn init_peers_next_index_and_match_index(
        &mut self,
        last_entry_id: u64,
        peer_ids: &[NodeId],
    ) {
        for peer_id in peer_ids {
            self.next_index.insert(*peer_id, last_entry_id + 1);
            self.match_index.insert(*peer_id, 0);
        }
    }

    pub fn next_index(
        &self,
        node_id: NodeId,
    ) -> Option<u64> {
        self.next_index.get(&node_id).copied()
    }

    pub fn match_index(
        &self,
        node_id: NodeId,
    ) -> Option<u64> {
        self.match_index.get(&node_id).copied()
    }

    pub fn prev_log_index(
        &self,
        follower_id: NodeId,
    ) -> Option<u64> {
        self.next_index(follower_id).map(|next| next.saturating_sub(1))
    }

    /// Applies a successful reply proving the follower holds `matched`.
    ///
    /// Both indices only move forward, so a stale reordered reply cannot
    /// undo progress.
    pub fn handle_success(
        &mut self,
        follower_id: NodeId,
        matched: u64,
    ) {
        let match_index = self.match_index.entry(follower_id).or_insert(0);
        *match_index = (*match_index).max(matched);
        let new_match = *match_index;

        let next_index = self.next_index.entry(follower_id).or_insert(1);
        *next_index = (*next_index).max(new_match + 1);

        debug!(
            follower_id,
            match_index = new_match,
            next_index = *next_index,
            "replication progress"
        );
    }

    /// Applies a consistency-check failure.
    ///
    /// Jumps to `match_hint` when the follower supplied one, otherwise steps
    /// back one index from the probed position. Never moves at or below the
    /// known match index, and never moves forward.
    pub fn handle_conflict(
        &mut self,
        follower_id: NodeId,
        prev_log_index: u64,
        match_hint: u64,
    ) {
        let match_index = self.match_index(follower_id).unwrap_or(0);
        let current_next = self.next_index(follower_id).unwrap_or(1);
        let candidate = if match_hint > 0 { match_hint } else { prev_log_index };
        let new_next = candidate.min(current_next).max(match_index + 1).max(1);

        debug!(
            follower_id,
            prev_log_index, match_hint, new_next, "replication conflict, backing off"
        );
        self.next_index.insert(follower_id, new_next);
    }

    /// Match index of every follower.
    pub fn matched_ids(&self) -> Vec<u64> {
        self.match_index.values().copied().collect()
    }
}
