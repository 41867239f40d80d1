//! CLI subcommand implementations.

pub mod backup;
pub mod delete;
pub mod export;
pub mod list;
pub mod new;
pub mod repair;
pub mod restore_backup;
pub mod resume;
pub mod show;
pub mod validate;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sk_core::SessionId;

use crate::Config;
use crate::manager::SessionManager;

/// Opens the configured sessions directory.
pub(crate) fn open_manager(config: &Config) -> Result<SessionManager> {
    SessionManager::open(config.clone()).with_context(|| {
        format!(
            "failed to open sessions directory {}",
            config.sessions_dir().display()
        )
    })
}

pub(crate) fn parse_id(raw: &str) -> Result<SessionId> {
    SessionId::new(raw.trim()).with_context(|| format!("invalid session id '{raw}'"))
}

pub(crate) fn format_minute(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}
