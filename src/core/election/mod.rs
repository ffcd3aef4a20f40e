mod election_handler;
pub use election_handler::*;
