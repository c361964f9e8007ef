//! JSON snapshot of the inventory on disk.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::state::InventoryState;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} is not a valid inventory snapshot: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("inventory snapshot {path} is inconsistent: {reason}")]
    Inconsistent { path: PathBuf, reason: String },
}

impl PersistenceError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Loads a snapshot. A missing file yields `Ok(None)`.
pub fn load_state(path: &Path) -> Result<Option<InventoryState>, PersistenceError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no inventory snapshot yet");
            return Ok(None);
        }
        Err(err) => return Err(PersistenceError::io(path, err)),
    };

    let state: InventoryState = serde_json::from_str(&raw).map_err(|source| PersistenceError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    state
        .check_invariants()
        .map_err(|reason| PersistenceError::Inconsistent {
            path: path.to_path_buf(),
            reason,
        })?;

    info!(path = %path.display(), "inventory snapshot loaded");
    Ok(Some(state))
}

/// Writes a snapshot atomically: a temporary file in the target directory is renamed over `path`.
pub fn save_state(path: &Path, state: &InventoryState) -> Result<(), PersistenceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| PersistenceError::io(dir, err))?;

    let temp = tempfile::NamedTempFile::new_in(dir).map_err(|err| PersistenceError::io(dir, err))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, state).map_err(|source| PersistenceError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|err| PersistenceError::io(path, err))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|err| PersistenceError::io(path, err))?;
    temp.persist(path)
        .map_err(|err| PersistenceError::io(path, err.error))?;

    debug!(path = %path.display(), "inventory snapshot saved");
    Ok(())
}
