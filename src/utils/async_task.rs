use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;

use crate::NetworkError;
use crate::NodeId;
use crate::Result;

/// Runs one outbound RPC bounded by `duration`.
///
/// Elapsing is reported as `NetworkError::Timeout`, the same way the callers
/// treat any other failed attempt.
pub(crate) async fn call_with_timeout<F, T>(
    node_id: NodeId,
    duration: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, call).await {
        Ok(result) => result,
        Err(_) => {
            debug!(node_id, ?duration, "rpc timed out");
            Err(NetworkError::Timeout { node_id, duration }.into())
        }
    }
}

// Helper function to spawn tasks and track their JoinHandles
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        } else {
            debug!("spawned task: {name} exited");
        }
    })
}
