//! Snapshot file I/O: crash-safe replacement and startup read.
//!
//! A write goes to a sibling `<path>.tmp`, is synced, and is then renamed
//! over the target. Readers of the target path only ever see a complete
//! old file or a complete new one.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::codec::{self, Decoded};
use crate::error::ServiceError;

/// Sibling temporary path used while writing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomically replaces `path` with `bytes`.
///
/// On failure the target is untouched and the temporary file is removed
/// on a best-effort basis. There is no retry.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ServiceError> {
    let tmp = temp_path(path);

    let result = write_and_sync(&tmp, bytes)
        .and_then(|()| fs::rename(&tmp, path).map_err(|e| ServiceError::io(path, e)));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_and_sync(tmp: &Path, bytes: &[u8]) -> Result<(), ServiceError> {
    let mut file = File::create(tmp).map_err(|e| ServiceError::io(tmp, e))?;
    file.write_all(bytes).map_err(|e| ServiceError::io(tmp, e))?;
    // sync_data is enough: the rename carries the metadata change.
    file.sync_data().map_err(|e| ServiceError::io(tmp, e))
}

/// Reads and decodes the snapshot at `path`. A missing file is `Ok(None)`.
pub fn read_snapshot(path: &Path) -> Result<Option<Decoded>, ServiceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ServiceError::io(path, e)),
    };
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Read snapshot file");
    codec::decode(&bytes).map(Some)
}
