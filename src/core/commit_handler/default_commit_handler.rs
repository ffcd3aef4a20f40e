use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::CommitHandler;
use crate::metrics::APPLIED_ENTRIES;
use crate::proto::ApplyMsg;
use crate::Error;
use crate::RaftContext;
use crate::Result;

/// Hands entries in `(last_applied, commit_index]` to the service, one at a
/// time and in index order.
///
/// `last_applied` moves only after the apply channel accepted the entry. It
/// is not persisted, so after a restart the service sees already applied
/// indices again.
pub struct DefaultCommitHandler {
    ctx: Arc<RaftContext>,
    apply_tx: mpsc::Sender<ApplyMsg>,
}

#[async_trait]
impl CommitHandler for DefaultCommitHandler {
    async fn run(&mut self) -> Result<()> {
        loop {
            while let Some(msg) = self.next_pending()? {
                let index = msg.index;
                tokio::select! {
                    biased;
                    _ = self.ctx.shutdown.cancelled() => {
                        debug!(node_id = self.ctx.node_id, "[CommitHandler] shutdown signal received.");
                        return Ok(());
                    }
                    sent = self.apply_tx.send(msg) => {
                        if sent.is_err() {
                            warn!(node_id = self.ctx.node_id, "apply channel closed, stop applying");
                            return Ok(());
                        }
                    }
                }
                self.mark_applied(index);
            }

            tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => {
                    debug!(node_id = self.ctx.node_id, "[CommitHandler] shutdown signal received.");
                    return Ok(());
                }
                _ = self.ctx.apply_notify.notified() => {
                    trace!(node_id = self.ctx.node_id, "new commit");
                }
            }
        }
    }
}

impl DefaultCommitHandler {
    pub(crate) fn new(
        ctx: Arc<RaftContext>,
        apply_tx: mpsc::Sender<ApplyMsg>,
    ) -> Self {
        Self { ctx, apply_tx }
    }

    /// Next committed entry the service has not seen yet.
    fn next_pending(&self) -> Result<Option<ApplyMsg>> {
        let state = self.ctx.state.lock();
        if state.last_applied >= state.commit_index {
            return Ok(None);
        }

        let index = state.last_applied + 1;
        match state.raft_log.entry(index) {
            Some(entry) => Ok(Some(ApplyMsg {
                index,
                command: entry.command.clone(),
            })),
            None => Err(Error::Fatal(format!(
                "committed entry {index} missing from the log of node {}",
                self.ctx.node_id
            ))),
        }
    }

    fn mark_applied(
        &self,
        index: u64,
    ) {
        let mut state = self.ctx.state.lock();
        if index > state.last_applied {
            state.last_applied = index;
        }
        trace!(node_id = self.ctx.node_id, index, "applied");
        APPLIED_ENTRIES
            .with_label_values(&[&self.ctx.node_label()])
            .inc();
    }
}
