//! Filesystem primitives shared by storage and validation.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Suffix of in-flight temp files.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Writes `bytes` to `path` so readers see either the old or the new content.
///
/// The data goes to a hidden temp file in the same directory, is flushed to
/// disk, then renamed over `path`. On failure the temp file is removed and
/// `path` is left untouched.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = temp_path(path);

    let result = write_synced(&tmp, bytes)
        .map_err(|e| StoreError::io("writing", &tmp, e))
        .and_then(|()| fs::rename(&tmp, path).map_err(|e| StoreError::io("renaming", path, e)));

    if result.is_err() {
        discard_temp(&tmp);
    }
    result
}

/// Like [`atomic_write`], but never replaces an existing file.
///
/// The synced temp file is hard-linked into place, which fails atomically
/// when `path` is taken. Returns `Ok(false)` in that case.
pub fn atomic_create(path: &Path, bytes: &[u8]) -> Result<bool, StoreError> {
    let tmp = temp_path(path);

    let result = write_synced(&tmp, bytes)
        .map_err(|e| StoreError::io("writing", &tmp, e))
        .and_then(|()| match fs::hard_link(&tmp, path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(StoreError::io("linking", path, err)),
        });

    discard_temp(&tmp);
    result
}

fn discard_temp(tmp: &Path) {
    if let Err(err) = fs::remove_file(tmp) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = ?tmp, error = %err, "failed to remove temp file");
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// `dir/.<name>.<uuid>.tmp` next to `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_name = format!(".{name}.{}{TEMP_SUFFIX}", uuid::Uuid::new_v4());
    path.with_file_name(tmp_name)
}

/// Creates `dir` and any missing parents.
pub fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io("creating directory", dir, e))
}

/// Whether `path` exists. Errors other than "not found" are reported.
pub fn exists(path: &Path) -> Result<bool, StoreError> {
    path.try_exists()
        .map_err(|e| StoreError::io("checking", path, e))
}

/// Reads a whole file, mapping "not found" to `Ok(None)`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::io("reading", path, err)),
    }
}
