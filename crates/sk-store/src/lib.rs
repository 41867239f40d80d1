//! Storage layer for sessionkeep.
//!
//! Persists sessions as versioned JSON documents in a single directory,
//! alongside an index of lightweight metadata and backup wrappers.
//! [`SessionValidator`] detects and repairs drift between the two.

mod error;
pub mod fs;
mod storage;
mod validator;

pub use error::StoreError;
pub use storage::{
    BACKUP_FORMAT_VERSION, INDEX_FILE, SessionStorage, StorageOptions, decode_session,
};
pub use validator::{CleanupReport, SessionValidator, ValidationReport};
