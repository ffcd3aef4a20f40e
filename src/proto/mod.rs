//! Messages exchanged between peers and handed to the replicated service.
//!
//! The transport that carries these is external; every type derives serde so
//! any wire codec can marshal them.

use serde::Deserialize;
use serde::Serialize;

pub type NodeId = u32;

/// One slot of the replicated log.
///
/// Index 0 is reserved for the sentinel entry (term 0, empty command), which
/// is never replicated and never applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: u64,
    pub term: u64,
    pub command: Vec<u8>,
}

impl Entry {
    pub fn sentinel() -> Self {
        Self {
            index: 0,
            term: 0,
            command: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: NodeId,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: NodeId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<Entry>,
    pub leader_commit: u64,
}

impl AppendEntriesRequest {
    /// Highest index this request proves the follower holds, if it succeeds.
    pub fn last_carried_index(&self) -> u64 {
        self.prev_log_index + self.entries.len() as u64
    }

    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
    /// Backtrack hint on failure: where the leader should resume sending.
    ///
    /// - `prev_log_index` past the receiver's log: its last index + 1, so the
    ///   leader jumps straight to the end of that log instead of getting 0.
    /// - term mismatch at `prev_log_index`: first index holding that
    ///   conflicting term.
    ///
    /// 0 means "no hint", the leader steps back by one.
    pub match_hint: u64,
}

impl AppendEntriesResponse {
    /// Generate a successful response
    pub fn success(term: u64) -> Self {
        Self {
            term,
            success: true,
            match_hint: 0,
        }
    }

    /// Generate a failed response (request carried a stale term)
    pub fn higher_term(term: u64) -> Self {
        Self {
            term,
            success: false,
            match_hint: 0,
        }
    }

    /// Generate a failed response (log consistency check failed)
    pub fn conflict(
        term: u64,
        match_hint: u64,
    ) -> Self {
        Self {
            term,
            success: false,
            match_hint,
        }
    }
}

/// A committed entry handed to the service, in increasing index order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyMsg {
    pub index: u64,
    pub command: Vec<u8>,
}
