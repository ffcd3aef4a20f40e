use std::sync::Arc;

use parking_lot::RwLock;

use crate::Result;
use crate::StateStorage;

/// In-memory state storage.
///
/// Clones share the same blob, so a test can drop a peer and build a new one
/// over the same storage to simulate a restart.
#[derive(Clone, Debug, Default)]
pub struct MemStateStorage {
    state: Arc<RwLock<Option<Vec<u8>>>>,
}

impl MemStateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent copy holding the current blob.
    pub fn snapshot_copy(&self) -> Self {
        Self {
            state: Arc::new(RwLock::new(self.state.read().clone())),
        }
    }
}

impl StateStorage for MemStateStorage {
    fn save_state(
        &self,
        state: Vec<u8>,
    ) -> Result<()> {
        *self.state.write() = Some(state);
        Ok(())
    }

    fn read_state(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.state.read().clone())
    }

    fn state_size(&self) -> usize {
        self.state.read().as_ref().map(|s| s.len()).unwrap_or(0)
    }
}
