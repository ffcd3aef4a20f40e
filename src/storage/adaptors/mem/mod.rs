mod mem_state_storage;
pub use mem_state_storage::*;
