//! Delete command.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use super::{open_manager, parse_id};
use crate::Config;

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Session ID.
    pub id: String,
}

pub fn run<W: Write>(writer: &mut W, args: &DeleteArgs, config: &Config) -> Result<()> {
    let id = parse_id(&args.id)?;
    let manager = open_manager(config)?;
    let backup = manager
        .storage()
        .delete_session(&id)
        .with_context(|| format!("failed to delete session {id}"))?;

    writeln!(writer, "Deleted session {id}")?;
    if let Some(path) = backup {
        writeln!(writer, "Backup: {}", path.display())?;
    }
    Ok(())
}
