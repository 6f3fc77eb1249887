//! Atomic JSON file operations.
//!
//! Writes go temp file → fsync → rename so a reader (or a restarted pod)
//! only ever sees the previous or the new fully-written document.

use crate::error::{PodError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Staging path used for `path` while a write is in flight.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// # Errors
/// Returns `PodError::State` on serialization, write, sync or rename failure.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| PodError::State(format!("cannot serialize {}: {e}", path.display())))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            PodError::State(format!(
                "cannot create state directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let tmp_path = staging_path(path);
    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        PodError::State(format!(
            "cannot create temp file '{}': {e}",
            tmp_path.display()
        ))
    })?;
    file.write_all(&json)
        .map_err(|e| PodError::State(format!("cannot write temp file: {e}")))?;
    file.sync_all()
        .map_err(|e| PodError::State(format!("cannot sync temp file: {e}")))?;
    drop(file);

    std::fs::rename(&tmp_path, path).map_err(|e| {
        PodError::State(format!(
            "cannot rename '{}' to '{}': {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}

/// Read and parse a JSON document.
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
/// Returns `PodError::State` when the file exists but cannot be read or
/// parsed. Callers that must always boot treat this as "no prior state".
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PodError::State(format!(
                "cannot read '{}': {e}",
                path.display()
            )));
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PodError::State(format!("cannot parse '{}': {e}", path.display())))
}
