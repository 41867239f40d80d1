//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::backup::BackupArgs;
use crate::commands::delete::DeleteArgs;
use crate::commands::export::ExportArgs;
use crate::commands::list::ListArgs;
use crate::commands::new::NewArgs;
use crate::commands::restore_backup::RestoreBackupArgs;
use crate::commands::resume::ResumeArgs;
use crate::commands::show::ShowArgs;
use crate::commands::validate::ValidateArgs;

/// Session persistence and recovery for the coding assistant.
///
/// Saves conversations to disk, keeps the session index consistent and
/// restores the most recent healthy session at startup.
#[derive(Debug, Parser)]
#[command(name = "sk", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create and save an empty session.
    New(NewArgs),

    /// List indexed sessions, most recent first.
    List(ListArgs),

    /// Show one session.
    Show(ShowArgs),

    /// Check the index against the session files.
    Validate(ValidateArgs),

    /// Prune orphaned index entries and re-index orphaned files.
    Repair,

    /// Export a session with sensitive data redacted.
    Export(ExportArgs),

    /// Back up a session.
    Backup(BackupArgs),

    /// Restore a session from a backup file.
    RestoreBackup(RestoreBackupArgs),

    /// Delete a session, backing it up first.
    Delete(DeleteArgs),

    /// Restore the most recent healthy session, or start a new one.
    Resume(ResumeArgs),
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resume_id_conflicts_with_new() {
        assert!(Cli::try_parse_from(["sk", "resume", "s1", "--new"]).is_err());
        let cli = Cli::try_parse_from(["sk", "-v", "resume", "--model", "m"]).unwrap();
        assert!(cli.verbose);
        let Some(Commands::Resume(args)) = cli.command else {
            panic!("expected resume");
        };
        assert_eq!(args.template.model, "m");
        assert_eq!(args.template.provider, "unknown");
    }
}
