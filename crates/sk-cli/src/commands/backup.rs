//! Backup command.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use super::{open_manager, parse_id};
use crate::Config;

#[derive(Debug, Args)]
pub struct BackupArgs {
    /// Session ID.
    pub id: String,
}

pub fn run<W: Write>(writer: &mut W, args: &BackupArgs, config: &Config) -> Result<()> {
    let id = parse_id(&args.id)?;
    let manager = open_manager(config)?;
    let path = manager
        .storage()
        .create_backup(&id)
        .with_context(|| format!("failed to back up session {id}"))?;
    writeln!(writer, "Backed up session {id} to {}", path.display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{config, demo_session, storage};

    #[test]
    fn writes_backup_next_to_sessions() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path());
        let storage = storage(&config);
        let session = demo_session("s1");
        storage.write_session(&session).unwrap();

        let mut output = Vec::new();
        run(
            &mut output,
            &BackupArgs {
                id: "s1".to_string(),
            },
            &config,
        )
        .unwrap();

        let backups = storage.list_backups(&session.id).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("Backed up session s1 to {}\n", backups[0].display())
        );
    }

    #[test]
    fn missing_session() {
        let temp = tempfile::tempdir().unwrap();
        let mut output = Vec::new();
        let err = run(
            &mut output,
            &BackupArgs {
                id: "ghost".to_string(),
            },
            &config(temp.path()),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }
}
