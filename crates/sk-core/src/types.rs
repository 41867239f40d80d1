//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker that distinguishes backup documents from live session files.
pub const BACKUP_MARKER: &str = ".backup.";

/// File stem of the session index. Session files share its directory, so no
/// session may use it as an id.
pub const INDEX_STEM: &str = "index";

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The value cannot be used as a file name in the sessions directory.
    #[error("invalid {field} '{value}': {reason}")]
    NotFileSafe {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Generates a validated string ID newtype with common trait implementations.
///
/// The optional third argument names an extra check run after the emptiness test.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal $(, $check:path)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                $( $check($field_name, &id)?; )?
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

/// Rejects ids that would escape the sessions directory or collide with
/// hidden temp files, backup documents or the index.
fn check_file_safe(field: &'static str, id: &str) -> Result<(), ValidationError> {
    let reason = if id == "." || id == ".." {
        Some("reserved path component")
    } else if id.contains(['/', '\\', '\0']) {
        Some("contains a path separator")
    } else if id.starts_with('.') {
        Some("must not start with '.'")
    } else if id.contains(BACKUP_MARKER) {
        Some("contains the backup marker")
    } else if id.eq_ignore_ascii_case(INDEX_STEM) {
        Some("reserved for the session index")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ValidationError::NotFileSafe {
            field,
            value: id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

define_string_id!(
    /// A validated session identifier.
    ///
    /// Session ids double as file names in the sessions directory, so besides
    /// being non-empty they must be safe to join onto a directory path.
    SessionId, "session ID", check_file_safe
);

define_string_id!(
    /// A validated message identifier, unique within one session.
    MessageId, "message ID"
);

impl SessionId {
    /// Generates a fresh random session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl MessageId {
    /// Generates a fresh random message id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_rejects_empty() {
        assert_eq!(
            SessionId::new("").unwrap_err(),
            ValidationError::Empty {
                field: "session ID"
            }
        );
        assert!(SessionId::new("valid-session").is_ok());
    }

    #[test]
    fn session_id_rejects_path_escapes() {
        for bad in ["..", ".", "a/b", "a\\b", ".hidden", "s1.backup.2025", "index", "INDEX"] {
            let err = SessionId::new(bad).unwrap_err();
            assert!(
                matches!(err, ValidationError::NotFileSafe { .. }),
                "expected {bad:?} to be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn session_id_serde_roundtrip() {
        let id = SessionId::new("session-abc").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"session-abc\"");
        let parsed: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn session_id_serde_rejects_unsafe() {
        let result: Result<SessionId, _> = serde_json::from_str("\"../etc\"");
        assert!(result.is_err());
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(SessionId::new(a.as_str()).is_ok());
    }

    #[test]
    fn message_id_rejects_empty() {
        assert!(MessageId::new("").is_err());
        assert!(MessageId::new("msg-1").is_ok());
    }
}
