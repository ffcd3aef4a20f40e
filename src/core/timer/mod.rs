mod election_timer;
pub use election_timer::*;
