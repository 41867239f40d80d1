//! Session files, the session index and backups.
//!
//! # Layout
//!
//! Everything lives in one directory:
//!
//! - `<id>.json`: one versioned session document per session
//! - `index.json`: the [`SessionIndex`]
//! - `<id>.backup.<yyyymmddTHHMMSSfff>-<nnn>.json`: backup wrappers (UTC stamp
//!   plus a sequence number for backups taken within the same millisecond)
//! - `.<name>.<uuid>.tmp`: in-flight atomic writes, hidden from enumeration
//!
//! # Consistency
//!
//! Every document is written with [`atomic_write`], so a crash leaves either
//! the old or the new version on disk. A session file is always written
//! before its index entry, which means a failed write can leave an orphaned
//! file but never an entry pointing at nothing.
//!
//! There is no cross-process locking; one writer per directory is assumed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sk_core::index::INDEX_FORMAT_VERSION;
use sk_core::session::SESSION_FORMAT_VERSION;
use sk_core::types::BACKUP_MARKER;
use sk_core::{Session, SessionId, SessionIndex, SessionMetadata};

use crate::error::StoreError;
use crate::fs::{atomic_create, atomic_write, ensure_dir, exists, read_optional};

/// File name of the index document. Its stem is a reserved session id.
pub const INDEX_FILE: &str = "index.json";

/// Current format version for backup wrappers.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

const SESSION_EXT: &str = ".json";
const BACKUP_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3f";
/// Backups of one session per millisecond; the sequence is zero-padded to
/// three digits so names sort chronologically.
const MAX_BACKUPS_PER_STAMP: u32 = 1000;

/// Storage behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageOptions {
    /// Back a session up before deleting it.
    pub create_backups: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            create_backups: true,
        }
    }
}

/// Wrapper around the raw bytes of a backed-up session.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupDocument {
    version: u32,
    session_id: SessionId,
    created_at: DateTime<Utc>,
    data: String,
}

/// Handle to a sessions directory.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    dir: PathBuf,
    options: StorageOptions,
}

impl SessionStorage {
    /// Opens a sessions directory, creating it if necessary.
    pub fn open(dir: impl Into<PathBuf>, options: StorageOptions) -> Result<Self, StoreError> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        tracing::debug!(dir = ?dir, "opened session storage");
        Ok(Self { dir, options })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn options(&self) -> StorageOptions {
        self.options
    }

    pub fn session_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}{SESSION_EXT}"))
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Persists `session` and upserts its index entry.
    pub fn write_session(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.session_path(&session.id);
        let bytes = serde_json::to_vec_pretty(session).map_err(|source| StoreError::Json {
            what: "session",
            source,
        })?;
        atomic_write(&path, &bytes)?;

        let mut index = self.get_index()?;
        index.upsert(SessionMetadata::from_session(session), Utc::now());
        self.write_index(&index)?;

        tracing::debug!(
            session_id = %session.id,
            messages = session.messages.len(),
            "wrote session"
        );
        Ok(())
    }

    /// Loads a session by id.
    pub fn read_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        let path = self.session_path(id);
        let bytes = read_optional(&path)?.ok_or_else(|| StoreError::SessionNotFound(id.clone()))?;
        let session = decode_session(id.as_str(), &path, &bytes)?;
        if &session.id != id {
            return Err(StoreError::IdMismatch {
                path,
                expected: id.clone(),
                found: session.id,
            });
        }
        Ok(session)
    }

    /// Removes a session and its index entry, backing it up first when
    /// backups are enabled. Returns the backup path, if one was written.
    pub fn delete_session(&self, id: &SessionId) -> Result<Option<PathBuf>, StoreError> {
        let path = self.session_path(id);
        if !exists(&path)? {
            return Err(StoreError::SessionNotFound(id.clone()));
        }

        // A corrupted index fails the call before anything is removed.
        let mut index = self.get_index()?;

        let backup = if self.options.create_backups {
            Some(self.create_backup(id)?)
        } else {
            None
        };

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::SessionNotFound(id.clone()));
            }
            Err(err) => return Err(StoreError::io("removing", &path, err)),
        }

        if index.remove(id, Utc::now()).is_some() {
            self.write_index(&index)?;
        }

        tracing::info!(session_id = %id, backup = ?backup, "deleted session");
        Ok(backup)
    }

    /// Copies the current session file into a backup wrapper.
    pub fn create_backup(&self, id: &SessionId) -> Result<PathBuf, StoreError> {
        self.create_backup_at(id, Utc::now())
    }

    pub fn create_backup_at(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, StoreError> {
        let source = self.session_path(id);
        let bytes =
            read_optional(&source)?.ok_or_else(|| StoreError::SessionNotFound(id.clone()))?;
        let data = String::from_utf8(bytes).map_err(|e| StoreError::corrupted(id.as_str(), e))?;

        let document = BackupDocument {
            version: BACKUP_FORMAT_VERSION,
            session_id: id.clone(),
            created_at: now,
            data,
        };
        let encoded = serde_json::to_vec_pretty(&document).map_err(|source| StoreError::Json {
            what: "backup",
            source,
        })?;

        let stamp = now.format(BACKUP_STAMP_FORMAT).to_string();
        for seq in 0..MAX_BACKUPS_PER_STAMP {
            let path = self
                .dir
                .join(format!("{id}{BACKUP_MARKER}{stamp}-{seq:03}{SESSION_EXT}"));
            if atomic_create(&path, &encoded)? {
                tracing::debug!(session_id = %id, path = ?path, "created backup");
                return Ok(path);
            }
        }
        Err(StoreError::io(
            "creating backup",
            &self.dir.join(format!("{id}{BACKUP_MARKER}{stamp}")),
            io::Error::from(io::ErrorKind::AlreadyExists),
        ))
    }

    /// Writes the session inside a backup back as a live session.
    pub fn restore_from_backup(&self, path: &Path) -> Result<SessionId, StoreError> {
        let bytes =
            read_optional(path)?.ok_or_else(|| StoreError::BackupNotFound(path.to_path_buf()))?;
        let invalid = |reason: String| StoreError::InvalidBackupFormat {
            path: path.to_path_buf(),
            reason,
        };

        let document: BackupDocument =
            serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
        if document.version == 0 || document.version > BACKUP_FORMAT_VERSION {
            return Err(invalid(format!(
                "unsupported backup version {}",
                document.version
            )));
        }

        let session = decode_session(document.session_id.as_str(), path, document.data.as_bytes())
            .map_err(|e| invalid(e.to_string()))?;
        if session.id != document.session_id {
            return Err(invalid(format!(
                "wrapper names session '{}' but contains '{}'",
                document.session_id, session.id
            )));
        }

        self.write_session(&session)?;
        tracing::info!(session_id = %session.id, backup = ?path, "restored session from backup");
        Ok(session.id)
    }

    /// Reads the index. A missing index is an empty one.
    pub fn get_index(&self) -> Result<SessionIndex, StoreError> {
        let path = self.index_path();
        let Some(bytes) = read_optional(&path)? else {
            return Ok(SessionIndex::default());
        };

        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptedIndex {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        check_version("index", &path, &value, INDEX_FORMAT_VERSION)?;
        serde_json::from_value(value).map_err(|e| StoreError::CorruptedIndex {
            path,
            reason: e.to_string(),
        })
    }

    /// Replaces the index document.
    pub fn write_index(&self, index: &SessionIndex) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(index).map_err(|source| StoreError::Json {
            what: "index",
            source,
        })?;
        atomic_write(&self.index_path(), &bytes)
    }

    /// Whether a live session file exists for `id`.
    pub fn session_exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        exists(&self.session_path(id))
    }

    /// Indexed sessions, most recently modified first.
    pub fn list_sessions(&self) -> Result<Vec<SessionMetadata>, StoreError> {
        Ok(self
            .get_index()?
            .by_recency()
            .into_iter()
            .cloned()
            .collect())
    }

    /// Ids of the live session files on disk, sorted.
    ///
    /// Skips the index, backups, hidden temp files and names that are not
    /// valid session ids.
    pub fn list_session_files(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut ids: Vec<SessionId> = self
            .dir_names()?
            .into_iter()
            .filter(|name| name != INDEX_FILE && !name.contains(BACKUP_MARKER))
            .filter_map(|name| {
                let stem = name.strip_suffix(SESSION_EXT)?;
                match SessionId::new(stem) {
                    Ok(id) => Some(id),
                    Err(err) => {
                        tracing::trace!(file = %name, error = %err, "ignoring non-session file");
                        None
                    }
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Backup files for `id`, newest first.
    pub fn list_backups(&self, id: &SessionId) -> Result<Vec<PathBuf>, StoreError> {
        let prefix = format!("{id}{BACKUP_MARKER}");
        let mut names: Vec<String> = self
            .dir_names()?
            .into_iter()
            .filter(|name| name.starts_with(&prefix) && name.ends_with(SESSION_EXT))
            .collect();
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names.into_iter().map(|name| self.dir.join(name)).collect())
    }

    fn dir_names(&self) -> Result<Vec<String>, StoreError> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| StoreError::io("listing", &self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("listing", &self.dir, e))?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Parses and version-checks a session document.
///
/// `label` names the session in errors when the document is unreadable.
pub fn decode_session(label: &str, path: &Path, bytes: &[u8]) -> Result<Session, StoreError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| StoreError::corrupted(label, e))?;
    check_version("session", path, &value, SESSION_FORMAT_VERSION)?;
    serde_json::from_value(value).map_err(|e| StoreError::corrupted(label, e))
}

fn check_version(
    kind: &'static str,
    path: &Path,
    value: &Value,
    supported: u32,
) -> Result<(), StoreError> {
    let Some(found) = value.get("version").and_then(Value::as_u64) else {
        // Missing or non-numeric versions fail typed deserialization instead.
        return Ok(());
    };
    if found == 0 || found > u64::from(supported) {
        return Err(StoreError::UnsupportedVersion {
            kind,
            path: path.to_path_buf(),
            found: u32::try_from(found).unwrap_or(u32::MAX),
            supported,
        });
    }
    Ok(())
}
