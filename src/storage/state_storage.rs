//! Core model in Raft: durable peer state.
//!
//! The storage adapter only ever sees an opaque blob. The blob is the bincode
//! image of [`PersistentState`]: `{current_term, voted_for, log}`.

#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::proto::Entry;
use crate::HardState;
use crate::RaftLog;
use crate::Result;
use crate::StorageError;

#[cfg_attr(test, automock)]
pub trait StateStorage: Send + Sync + 'static {
    /// Replaces the stored blob. Returning `Ok` means the bytes are durable.
    fn save_state(
        &self,
        state: Vec<u8>,
    ) -> Result<()>;

    /// Last saved blob, `None` on first boot.
    fn read_state(&self) -> Result<Option<Vec<u8>>>;

    /// Size in bytes of the stored blob.
    fn state_size(&self) -> usize;
}

/// Everything a peer must find again after a crash.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PersistentState {
    pub hard_state: HardState,
    /// Log entries without the sentinel.
    pub log: Vec<Entry>,
}

#[derive(Serialize)]
struct PersistentStateRef<'a> {
    hard_state: &'a HardState,
    log: &'a [Entry],
}

pub fn encode_persistent_state(
    hard_state: &HardState,
    log: &RaftLog,
) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(&PersistentStateRef {
        hard_state,
        log: log.entries(),
    })?;
    Ok(bytes)
}

pub fn decode_persistent_state(bytes: &[u8]) -> Result<PersistentState> {
    bincode::deserialize::<PersistentState>(bytes).map_err(|e| {
        StorageError::DataCorruption(format!("persisted state cannot be decoded: {e}")).into()
    })
}

/// Reads and decodes whatever `storage` holds. `None` on first boot.
pub fn load_persistent_state(storage: &dyn StateStorage) -> Result<Option<PersistentState>> {
    match storage.read_state()? {
        Some(bytes) if !bytes.is_empty() => {
            let state = decode_persistent_state(&bytes)?;
            debug!(
                current_term = state.hard_state.current_term,
                voted_for = ?state.hard_state.voted_for,
                entries = state.log.len(),
                "loaded persisted state"
            );
            Ok(Some(state))
        }
        _ => Ok(None),
    }
}
