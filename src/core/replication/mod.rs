mod replication_handler;
pub use replication_handler::*;
