use std::fmt::Debug;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Configuration parameters for the Raft consensus algorithm
#[derive(Serialize, Deserialize, Clone)]
pub struct RaftConfig {
    /// Heartbeat cadence and batch size of log replication
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Randomized election timeout range
    #[serde(default)]
    pub election: ElectionConfig,

    /// Apply pipeline settings
    #[serde(default)]
    pub commit_handler: CommitHandlerConfig,

    /// Upper bound (in milliseconds) of a single outbound RPC.
    /// A peer that does not answer in time counts as a failed attempt.
    #[serde(default = "default_general_timeout")]
    pub general_raft_timeout_duration_in_ms: u64,
}

impl Debug for RaftConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RaftConfig")
            .field("election", &self.election)
            .field("replication", &self.replication)
            .field("commit_handler", &self.commit_handler)
            .field(
                "general_raft_timeout_duration_in_ms",
                &self.general_raft_timeout_duration_in_ms,
            )
            .finish()
    }
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            replication: ReplicationConfig::default(),
            election: ElectionConfig::default(),
            commit_handler: CommitHandlerConfig::default(),
            general_raft_timeout_duration_in_ms: default_general_timeout(),
        }
    }
}

impl RaftConfig {
    /// Validates all Raft subsystem configurations
    pub fn validate(&self) -> Result<()> {
        if self.general_raft_timeout_duration_in_ms < 1 {
            return Err(Error::Config(ConfigError::Message(
                "general_raft_timeout_duration_in_ms must be at least 1ms".into(),
            )));
        }

        self.replication.validate()?;
        self.election.validate()?;
        self.commit_handler.validate()?;

        if self.replication.rpc_append_entries_clock_in_ms >= self.election.election_timeout_min {
            return Err(Error::Config(ConfigError::Message(format!(
                "rpc_append_entries_clock_in_ms {}ms must be less than election_timeout_min {}ms",
                self.replication.rpc_append_entries_clock_in_ms, self.election.election_timeout_min
            ))));
        }

        if self.general_raft_timeout_duration_in_ms >= self.replication.rpc_append_entries_clock_in_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "general_raft_timeout_duration_in_ms {}ms must be less than rpc_append_entries_clock_in_ms {}ms",
                self.general_raft_timeout_duration_in_ms, self.replication.rpc_append_entries_clock_in_ms
            ))));
        }

        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.general_raft_timeout_duration_in_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.replication.rpc_append_entries_clock_in_ms)
    }
}

// in ms
fn default_general_timeout() -> u64 {
    50
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicationConfig {
    #[serde(default = "default_append_interval")]
    pub rpc_append_entries_clock_in_ms: u64,

    #[serde(default = "default_entries_per_replication")]
    pub append_entries_max_entries_per_replication: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            rpc_append_entries_clock_in_ms: default_append_interval(),
            append_entries_max_entries_per_replication: default_entries_per_replication(),
        }
    }
}

impl ReplicationConfig {
    fn validate(&self) -> Result<()> {
        if self.rpc_append_entries_clock_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "rpc_append_entries_clock_in_ms cannot be 0".into(),
            )));
        }

        if self.append_entries_max_entries_per_replication == 0 {
            return Err(Error::Config(ConfigError::Message(
                "append_entries_max_entries_per_replication must be > 0".into(),
            )));
        }

        Ok(())
    }
}
fn default_append_interval() -> u64 {
    100
}
fn default_entries_per_replication() -> u64 {
    100
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElectionConfig {
    #[serde(default = "default_election_timeout_min")]
    pub election_timeout_min: u64,

    #[serde(default = "default_election_timeout_max")]
    pub election_timeout_max: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: default_election_timeout_min(),
            election_timeout_max: default_election_timeout_max(),
        }
    }
}

impl ElectionConfig {
    fn validate(&self) -> Result<()> {
        if self.election_timeout_min == 0 {
            return Err(Error::Config(ConfigError::Message(
                "election_timeout_min cannot be 0".into(),
            )));
        }

        if self.election_timeout_min >= self.election_timeout_max {
            return Err(Error::Config(ConfigError::Message(format!(
                "election_timeout_min {}ms must be less than election_timeout_max {}ms",
                self.election_timeout_min, self.election_timeout_max
            ))));
        }

        Ok(())
    }
}
fn default_election_timeout_min() -> u64 {
    150
}
fn default_election_timeout_max() -> u64 {
    300
}

/// Apply pipeline configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommitHandlerConfig {
    /// Suggested capacity of the channel the service reads applied entries from
    #[serde(default = "default_apply_channel_capacity")]
    pub apply_channel_capacity: usize,
}

impl Default for CommitHandlerConfig {
    fn default() -> Self {
        Self {
            apply_channel_capacity: default_apply_channel_capacity(),
        }
    }
}

impl CommitHandlerConfig {
    fn validate(&self) -> Result<()> {
        if self.apply_channel_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "apply_channel_capacity must be > 0".into(),
            )));
        }
        Ok(())
    }
}
fn default_apply_channel_capacity() -> usize {
    128
}
