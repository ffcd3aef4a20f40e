//! Raft Peer Error Hierarchy
//!
//! Defines error types for a single Raft peer, categorized by protocol layer
//! and operational concerns.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

use crate::NodeId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Node configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Raft consensus protocol violations and failures
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Unrecoverable failures. The peer refuses to proceed after this.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// Illegal Raft node state transitions
    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),
}

#[derive(Debug, thiserror::Error)]
#[doc(hidden)]
pub enum StateTransitionError {
    #[error("Invalid state transition from {from} to {to}.")]
    InvalidTransition { from: &'static str, to: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Target peer is partitioned away or its transport is closed
    #[error("Peer {node_id} unreachable")]
    Unreachable { node_id: NodeId },

    /// Peer communication timeout
    #[error("Request to {node_id} timed out after {duration:?}")]
    Timeout { node_id: NodeId, duration: Duration },

    /// Peer id is not registered with the transport
    #[error("Peer {node_id} not found")]
    PeerNotFound { node_id: NodeId },

    /// Peer has been killed or halted and no longer serves RPCs
    #[error("Peer {node_id} is not serving requests")]
    ServiceUnavailable { node_id: NodeId },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures while persisting peer state
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError { path: PathBuf, source: std::io::Error },

    /// Persisted blob could not be turned back into a valid peer state
    #[error("Data corruption detected: {0}")]
    DataCorruption(String),
}

// Serialization is classified separately (across protocol layers and system layers)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Node assembly failed before any background task started
    #[error("Node start failed: {0}")]
    NodeStartFailed(String),
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        SerializationError::Bincode(e).into()
    }
}

// ===== Consensus Error conversions =====

impl From<StateTransitionError> for Error {
    fn from(e: StateTransitionError) -> Self {
        Error::Consensus(ConsensusError::StateTransition(e))
    }
}
