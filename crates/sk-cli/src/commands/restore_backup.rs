//! Restore-backup command.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::open_manager;
use crate::Config;

#[derive(Debug, Args)]
pub struct RestoreBackupArgs {
    /// Path to a backup file.
    pub path: PathBuf,
}

pub fn run<W: Write>(writer: &mut W, args: &RestoreBackupArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let id = manager
        .storage()
        .restore_from_backup(&args.path)
        .with_context(|| format!("failed to restore {}", args.path.display()))?;
    writeln!(
        writer,
        "Restored session {id} from {}",
        args.path.display()
    )?;
    Ok(())
}
