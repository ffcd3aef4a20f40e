use crate::NodeId;

/// Follower's volatile state.
#[derive(Debug, Clone, Default)]
pub struct FollowerState {
    /// Leader that last proved itself in the current term
    pub leader_id: Option<NodeId>,
}

impl FollowerState {
    pub fn new(leader_id: Option<NodeId>) -> Self {
        Self { leader_id }
    }
}
