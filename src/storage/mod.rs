mod adaptors;
mod raft_log;
mod state_storage;


#[doc(hidden)]
pub use adaptors::*;
#[doc(hidden)]
pub use raft_log::*;
#[doc(hidden)]
pub use state_storage::*;
