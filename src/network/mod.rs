//! Network abstraction layer.
//!
//! The core only depends on [`Transport`]; marshaling and dispatch belong to
//! the implementation. Every call the core makes through it is bounded by
//! `raft.general_raft_timeout_duration_in_ms`, so an implementation is free to
//! block or never answer.
mod local;
pub use local::*;

// Trait definition of the current module
// -----------------------------------------------------------------------------
// Core model in Raft: Transport Definition
//

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::proto::AppendEntriesRequest;
use crate::proto::AppendEntriesResponse;
use crate::proto::VoteRequest;
use crate::proto::VoteResponse;
use crate::NodeId;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Delivers a RequestVote RPC to `target` and waits for its reply.
    ///
    /// # Errors
    /// Any `Err` is treated by the caller as "no vote" for this round.
    async fn request_vote(
        &self,
        target: NodeId,
        request: VoteRequest,
    ) -> Result<VoteResponse>;

    /// Delivers an AppendEntries RPC to `target` and waits for its reply.
    ///
    /// # Errors
    /// Any `Err` is treated by the caller as "no progress" for this cycle.
    async fn append_entries(
        &self,
        target: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse>;
}
