//! List command showing indexed sessions, most recent first.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use clap::Args;
use sk_core::SessionMetadata;

use super::{format_minute, open_manager};
use crate::Config;

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &ListArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let sessions = manager.storage().list_sessions()?;

    if args.json {
        serde_json::to_writer_pretty(&mut *writer, &sessions)?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", format_sessions(&sessions))?;
    }
    Ok(())
}

/// Format sessions as a table.
pub fn format_sessions(sessions: &[SessionMetadata]) -> String {
    let mut output = String::new();
    if sessions.is_empty() {
        writeln!(output, "No sessions found.").unwrap();
        return output;
    }

    let width = sessions
        .iter()
        .map(|m| m.id.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max(2);

    writeln!(output, "{:<width$}  {:<16}  {:>4}  Title", "ID", "Modified", "Msgs").unwrap();
    for meta in sessions {
        let title = meta.title.as_deref().unwrap_or("(untitled)");
        writeln!(
            output,
            "{:<width$}  {:<16}  {:>4}  {}",
            meta.id,
            format_minute(meta.last_modified),
            meta.message_count,
            title
        )
        .unwrap();
    }
    output
}
