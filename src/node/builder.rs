//! A builder for assembling a [`Raft`] peer from configuration.
//!
//! The [`NodeBuilder`] loads and validates [`RaftNodeConfig`], fills in
//! default components and hands everything to [`Raft::make`].
//!
//! ## Key Design Points
//! - **Default Components**: file-backed [`StateStorage`] under
//!   `db_root_dir/node_{id}`. There is no default transport; one must be set.
//! - **Customization**: `state_storage()` and `transport()` override the
//!   defaults.
//!
//! ## Example
//! ```ignore
//! let (raft, mut apply_rx) = NodeBuilder::new(Some("config/n1.toml"))?
//!     .transport(network.transport(1))
//!     .build()?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;

use crate::proto::ApplyMsg;
use crate::FileStateStorage;
use crate::NodeId;
use crate::Raft;
use crate::RaftNodeConfig;
use crate::Result;
use crate::StateStorage;
use crate::SystemError;
use crate::Transport;

pub struct NodeBuilder {
    node_id: NodeId,
    pub(super) node_config: RaftNodeConfig,
    pub(super) state_storage: Option<Arc<dyn StateStorage>>,
    pub(super) transport: Option<Arc<dyn Transport>>,
}

impl NodeBuilder {
    /// Creates a new NodeBuilder with configuration loaded from the
    /// environment, optionally overridden by the file at `cluster_path`.
    pub fn new(cluster_path: Option<&str>) -> Result<Self> {
        let mut node_config = RaftNodeConfig::new()?;
        if let Some(p) = cluster_path {
            info!("with_override_config from: {}", &p);
            node_config = node_config.with_override_config(p)?;
        }
        Ok(Self::from_config(node_config))
    }

    /// Constructs NodeBuilder from an in-memory configuration.
    pub fn from_config(node_config: RaftNodeConfig) -> Self {
        Self {
            node_id: node_config.cluster.node_id,
            node_config,
            state_storage: None,
            transport: None,
        }
    }

    /// Sets a custom state storage implementation
    pub fn state_storage(
        mut self,
        state_storage: Arc<dyn StateStorage>,
    ) -> Self {
        self.state_storage = Some(state_storage);
        self
    }

    /// Sets the network transport implementation
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the entire node configuration
    pub fn node_config(
        mut self,
        node_config: RaftNodeConfig,
    ) -> Self {
        self.node_id = node_config.cluster.node_id;
        self.node_config = node_config;
        self
    }

    /// Directory the default state storage writes to.
    pub fn state_dir(&self) -> PathBuf {
        self.node_config
            .cluster
            .db_root_dir
            .join(format!("node_{}", self.node_id))
    }

    /// Validates the configuration, starts the peer and returns it together
    /// with the stream of applied entries.
    ///
    /// # Errors
    /// - configuration that fails validation
    /// - no transport configured
    /// - persisted state that cannot be opened or decoded
    pub fn build(self) -> Result<(Raft, mpsc::Receiver<ApplyMsg>)> {
        let state_dir = self.state_dir();
        let node_id = self.node_id;
        let node_config = self.node_config.validate()?;

        let transport = self
            .transport
            .ok_or_else(|| SystemError::NodeStartFailed(format!("no transport configured for node {node_id}")))?;

        let state_storage = match self.state_storage {
            Some(state_storage) => state_storage,
            None => {
                debug!(node_id, ?state_dir, "using file state storage");
                Arc::new(FileStateStorage::new(&state_dir)?)
            }
        };

        let (apply_tx, apply_rx) = mpsc::channel(node_config.raft.commit_handler.apply_channel_capacity);
        let peers = node_config.cluster.initial_cluster.clone();
        let raft = Raft::make(Arc::new(node_config), peers, node_id, transport, state_storage, apply_tx)?;

        Ok((raft, apply_rx))
    }
}
