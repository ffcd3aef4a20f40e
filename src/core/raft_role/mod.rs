pub mod candidate_state;
pub mod follower_state;
pub mod leader_state;


//---------------------------------------------------------------------
pub const FOLLOWER: i32 = 0;
pub const CANDIDATE: i32 = 1;
pub const LEADER: i32 = 2;

use candidate_state::CandidateState;
use follower_state::FollowerState;
use leader_state::LeaderState;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::ElectionTimer;
use crate::NodeId;
use crate::RaftLog;
use crate::Result;
use crate::StateTransitionError;

/// The role a peer currently plays, together with the volatile state only
/// that role owns.
#[derive(Debug)]
pub enum RaftRole {
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    /// Latest term this peer has seen (0 on first boot, increases
    /// monotonically). Persisted before replying to any RPC.
    pub current_term: u64,
    /// Candidate that received this peer's vote in `current_term`, if any.
    pub voted_for: Option<NodeId>,
}

/// Identifies one incarnation of a role.
///
/// A background loop captures the lease it was started for and must check
/// [`SharedState::is_current`] after every suspension point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoleLease {
    pub role: i32,
    pub term: u64,
    pub epoch: u64,
}

/// Everything guarded by the peer's single state lock.
#[derive(Debug)]
pub struct SharedState {
    pub node_id: NodeId,

    pub hard_state: HardState,

    pub raft_log: RaftLog,

    /// Volatile state on all servers:
    /// index of highest log entry known to be committed (initialized to 0,
    /// increases monotonically)
    pub commit_index: u64,

    /// Index of highest log entry handed to the service (initialized to 0,
    /// increases monotonically, never above commit_index)
    pub last_applied: u64,

    pub role: RaftRole,

    pub election_timer: ElectionTimer,

    /// Bumped on every role or term change.
    pub epoch: u64,

    /// Set once durable storage failed; the peer stops serving.
    pub halted: bool,
}

impl RaftRole {
    pub fn as_i32(&self) -> i32 {
        match self {
            RaftRole::Follower(_) => FOLLOWER,
            RaftRole::Candidate(_) => CANDIDATE,
            RaftRole::Leader(_) => LEADER,
        }
    }

    pub fn name(&self) -> &'static str {
        role_name(self.as_i32())
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, RaftRole::Follower(_))
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self, RaftRole::Candidate(_))
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, RaftRole::Leader(_))
    }

    /// Any role may step down.
    pub fn become_follower(
        &self,
        leader_id: Option<NodeId>,
    ) -> RaftRole {
        RaftRole::Follower(FollowerState::new(leader_id))
    }

    /// Starts a new election round. A leader never campaigns.
    pub fn become_candidate(
        &self,
        my_id: NodeId,
    ) -> Result<RaftRole> {
        if self.is_leader() {
            return Err(StateTransitionError::InvalidTransition {
                from: self.name(),
                to: role_name(CANDIDATE),
            }
            .into());
        }
        Ok(RaftRole::Candidate(CandidateState::new(my_id)))
    }

    /// Only a candidate that won its round may lead.
    pub fn become_leader(
        &self,
        peers: &[NodeId],
        last_log_index: u64,
    ) -> Result<RaftRole> {
        if !self.is_candidate() {
            return Err(StateTransitionError::InvalidTransition {
                from: self.name(),
                to: role_name(LEADER),
            }
            .into());
        }
        Ok(RaftRole::Leader(LeaderState::new(peers, last_log_index)))
    }

    pub fn leader_state(&self) -> Option<&LeaderState> {
        match self {
            RaftRole::Leader(state) => Some(state),
            _ => None,
        }
    }

    pub fn leader_state_mut(&mut self) -> Option<&mut LeaderState> {
        match self {
            RaftRole::Leader(state) => Some(state),
            _ => None,
        }
    }

    pub fn candidate_state_mut(&mut self) -> Option<&mut CandidateState> {
        match self {
            RaftRole::Candidate(state) => Some(state),
            _ => None,
        }
    }
}

pub fn role_name(role: i32) -> &'static str {
    match role {
        FOLLOWER => "follower",
        CANDIDATE => "candidate",
        LEADER => "leader",
        _ => "unknown",
    }
}

impl SharedState {
    pub fn new(
        node_id: NodeId,
        hard_state: HardState,
        raft_log: RaftLog,
        election_timeout_range: (u64, u64),
    ) -> Self {
        debug!(
            node_id,
            current_term = hard_state.current_term,
            voted_for = ?hard_state.voted_for,
            last_log_index = raft_log.last_entry_id(),
            "new shared state"
        );
        Self {
            node_id,
            hard_state,
            raft_log,
            commit_index: 0,
            last_applied: 0,
            role: RaftRole::Follower(FollowerState::new(None)),
            election_timer: ElectionTimer::new(election_timeout_range),
            epoch: 0,
            halted: false,
        }
    }

    pub fn current_term(&self) -> u64 {
        self.hard_state.current_term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.hard_state.voted_for
    }

    pub fn lease(&self) -> RoleLease {
        RoleLease {
            role: self.role.as_i32(),
            term: self.current_term(),
            epoch: self.epoch,
        }
    }

    /// Whether a loop started under `lease` may still act.
    pub fn is_current(
        &self,
        lease: &RoleLease,
    ) -> bool {
        !self.halted && self.epoch == lease.epoch
    }
}
