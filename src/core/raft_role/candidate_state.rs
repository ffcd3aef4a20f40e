use std::collections::HashSet;

use crate::NodeId;

/// Candidate node's volatile state during one election round.
#[derive(Debug, Clone)]
pub struct CandidateState {
    /// Peers that granted their vote in this round, self included
    votes: HashSet<NodeId>,
}

impl CandidateState {
    /// A candidate always starts with its own vote.
    pub fn new(my_id: NodeId) -> Self {
        let mut votes = HashSet::new();
        votes.insert(my_id);
        Self { votes }
    }

    /// Records a granted vote and returns the tally. Duplicate grants from the
    /// same peer are counted once.
    pub fn record_vote(
        &mut self,
        voter: NodeId,
    ) -> usize {
        self.votes.insert(voter);
        self.votes.len()
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }
}
