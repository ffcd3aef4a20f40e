use std::collections::HashSet;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Error;
use crate::NodeId;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    #[serde(default = "default_node_id")]
    pub node_id: NodeId,

    /// Every voting member, including this node
    #[serde(default = "default_initial_cluster")]
    pub initial_cluster: Vec<NodeId>,

    #[serde(default = "default_db_dir")]
    pub db_root_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            initial_cluster: default_initial_cluster(),
            db_root_dir: default_db_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster configuration consistency
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "node_id cannot be 0 (reserved for invalid nodes)".into(),
            )));
        }

        if self.initial_cluster.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "initial_cluster must contain at least one node".into(),
            )));
        }

        if !self.initial_cluster.contains(&self.node_id) {
            return Err(Error::Config(ConfigError::Message(format!(
                "Current node {} not found in initial_cluster",
                self.node_id
            ))));
        }

        let mut ids = HashSet::new();
        for id in &self.initial_cluster {
            if *id == 0 {
                return Err(Error::Config(ConfigError::Message(
                    "initial_cluster cannot contain node id 0".into(),
                )));
            }
            if !ids.insert(*id) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "Duplicate node_id {id} in initial_cluster"
                ))));
            }
        }

        validate_directory(&self.db_root_dir, "db_root_dir")?;
        validate_directory(&self.log_dir, "log_dir")?;

        Ok(())
    }
}

fn default_node_id() -> NodeId {
    1
}
fn default_initial_cluster() -> Vec<NodeId> {
    vec![1]
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("/tmp/db")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/logs")
}
