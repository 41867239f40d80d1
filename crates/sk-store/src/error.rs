use std::io;
use std::path::PathBuf;

use sk_core::SessionId;
use thiserror::Error;

/// Storage errors.
///
/// Display strings keep the words "not found", "corrupted" and
/// "permission denied" so failure categorization can rely on them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("corrupted session {id}: {reason}")]
    CorruptedSession { id: String, reason: String },

    #[error("corrupted session index at {path}: {reason}")]
    CorruptedIndex { path: PathBuf, reason: String },

    #[error("permission denied while {operation} {path}")]
    PermissionDenied {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backup not found: {0}")]
    BackupNotFound(PathBuf),

    #[error("invalid backup format in {path}: {reason}")]
    InvalidBackupFormat { path: PathBuf, reason: String },

    /// A corrupted-class failure: the document is well formed but from a
    /// format this build does not understand.
    #[error("corrupted {kind} at {path}: unsupported version {found} (supported: {supported})")]
    UnsupportedVersion {
        kind: &'static str,
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("corrupted session file {path}: contains id '{found}', expected '{expected}'")]
    IdMismatch {
        path: PathBuf,
        expected: SessionId,
        found: SessionId,
    },

    #[error("I/O error while {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Wraps an I/O error, promoting permission failures to their own variant.
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                operation,
                path,
                source,
            }
        } else {
            Self::Io {
                operation,
                path,
                source,
            }
        }
    }

    #[must_use]
    pub fn corrupted(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::CorruptedSession {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this failure means the document exists but cannot be trusted.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptedSession { .. }
                | Self::CorruptedIndex { .. }
                | Self::UnsupportedVersion { .. }
                | Self::IdMismatch { .. }
        )
    }
}
