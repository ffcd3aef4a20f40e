//! A single Raft peer: leader election, log replication and an ordered apply
//! stream, over a pluggable [`Transport`] and [`StateStorage`].
//!
//! ```rust,ignore
//! let (raft, mut apply_rx) = NodeBuilder::from_config(settings)
//!     .transport(transport)
//!     .build()?;
//! let (index, term, is_leader) = raft.start(b"put x 1".to_vec())?;
//! ```
mod config;
mod core;
mod errors;
mod metrics;
mod network;
mod node;
pub mod proto;
mod storage;
pub mod utils;

pub use core::*;

pub use config::*;
pub use errors::*;
pub use metrics::*;
pub use network::*;
pub use node::*;
pub use proto::NodeId;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
