//! Core domain logic for sessionkeep.
//!
//! This crate contains the fundamental types and logic for:
//! - Sessions: the persisted conversation model and its index metadata
//! - Recovery: per-session failure tracking, backoff and recovery options
//! - Filtering: redacting secrets before a session is exported
//!
//! Nothing here touches the filesystem; see `sk-store` for persistence.

pub mod filter;
pub mod index;
pub mod recovery;
pub mod session;
pub mod types;

pub use filter::{
    ExportOptions, ExportPayload, FilterResult, PatternCategory, SensitiveDataConfig,
    SensitiveDataFilter, SessionExport,
};
pub use index::{SessionIndex, SessionMetadata};
pub use recovery::{
    ErrorRecoverySystem, FailureKind, RecoveryAction, RecoveryConfig, RecoveryContext,
    RecoveryOption, RecoveryOptionKind, RecoveryPreset,
};
pub use session::{ContentBlock, Message, MessageContent, Role, Session, Tags, TokenUsage};
pub use types::{MessageId, SessionId, ValidationError};
