use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::debug;
use tracing::error;

use crate::file_io::create_parent_dir_if_not_exist;
use crate::Result;
use crate::StateStorage;
use crate::StorageError;

const STATE_FILE_NAME: &str = "state.bin";
const STATE_TMP_FILE_NAME: &str = "state.bin.tmp";

/// File-backed state storage.
///
/// Every save writes a temporary file, syncs it and renames it over
/// `state.bin`, so a crash leaves either the old or the new image.
#[derive(Debug)]
pub struct FileStateStorage {
    data_dir: PathBuf,
    /// Serializes writers; readers go straight to the file.
    write_lock: Mutex<()>,
}

impl FileStateStorage {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|e| StorageError::PathError {
            path: data_dir.clone(),
            source: e,
        })?;
        debug!("file state storage at {:?}", data_dir);
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE_NAME)
    }

    fn write_atomically(
        &self,
        state: &[u8],
    ) -> std::io::Result<()> {
        let tmp_path = self.data_dir.join(STATE_TMP_FILE_NAME);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(state)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, self.state_path())?;

        // Persist the rename itself
        #[cfg(unix)]
        File::open(&self.data_dir)?.sync_all()?;

        Ok(())
    }
}

impl StateStorage for FileStateStorage {
    fn save_state(
        &self,
        state: Vec<u8>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        create_parent_dir_if_not_exist(&self.state_path())?;
        self.write_atomically(&state).map_err(|e| {
            error!("failed to persist state into {:?}: {:?}", self.data_dir, e);
            StorageError::PathError {
                path: self.state_path(),
                source: e,
            }
            .into()
        })
    }

    fn read_state(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(self.state_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::PathError {
                path: self.state_path(),
                source: e,
            }
            .into()),
        }
    }

    fn state_size(&self) -> usize {
        fs::metadata(self.state_path()).map(|m| m.len() as usize).unwrap_or(0)
    }
}
