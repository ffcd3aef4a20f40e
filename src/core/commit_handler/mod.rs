mod default_commit_handler;
pub use default_commit_handler::*;


use async_trait::async_trait;

use crate::Result;

/// Delivers committed entries to the service.
#[async_trait]
pub trait CommitHandler: Send + 'static {
    /// Runs until the peer shuts down or the service stops listening.
    async fn run(&mut self) -> Result<()>;
}
