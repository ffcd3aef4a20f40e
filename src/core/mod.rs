mod commit_handler;
mod election;
mod raft;
mod raft_context;
mod raft_role;
mod replication;
mod timer;

pub use commit_handler::*;
pub use election::*;
pub use raft::*;
pub(crate) use raft_context::*;
#[doc(hidden)]
pub use raft_role::*;
pub use replication::*;
pub use timer::*;
use tracing::instrument;


/// In raft, during any peer-to-peer communication,
///     if received term is bigger than mine,
///     I need to downgrade to follower
///     and update my term to the higher one.
///
/// e.g. Append Entries RPC reply
/// e.g. Election: receive VoteResponse
/// @return: true - found higher term;
pub(crate) fn if_higher_term_found(
    my_current_term: u64,
    term: u64,
) -> bool {
    if my_current_term < term {
        tracing::warn!("my_current_term: {} < term: {} ?", my_current_term, term);
        return true;
    }

    false
}

/// Raft paper: 5.4.1 Election restriction
///
/// Raft determines which of two logs is more up-to-date by comparing the index and term of the last
/// entries in the logs. If the logs have last entries with different terms, then the log with the
/// later term is more up-to-date. If the logs end with the same term, then whichever log is longer
/// is more up-to-date.
#[instrument]
pub(crate) fn is_target_log_more_recent(
    my_last_log_index: u64,
    my_last_log_term: u64,
    target_last_log_index: u64,
    target_last_log_term: u64,
) -> bool {
    (target_last_log_term > my_last_log_term)
        || (target_last_log_term == my_last_log_term && target_last_log_index >= my_last_log_index)
}
