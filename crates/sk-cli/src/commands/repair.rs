//! Repair command pruning orphaned entries and re-indexing orphaned files.

use std::io::Write;

use anyhow::{Context, Result};
use sk_store::SessionValidator;

use super::open_manager;
use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let report = SessionValidator::new(manager.storage())
        .cleanup_orphaned_entries()
        .context("failed to repair session index")?;

    writeln!(writer, "Removed {} orphaned entries", report.entries_removed)?;
    writeln!(
        writer,
        "Re-indexed {} orphaned files",
        report.orphaned_files_processed
    )?;
    writeln!(writer, "Refreshed {} stale entries", report.entries_refreshed)?;
    if !report.cleaned_sessions.is_empty() {
        let ids: Vec<_> = report.cleaned_sessions.iter().map(|id| id.as_str()).collect();
        writeln!(writer, "Touched: {}", ids.join(", "))?;
    }
    for warning in &report.warnings {
        writeln!(writer, "warning: {warning}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use insta::assert_snapshot;

    use super::*;
    use crate::commands::test_support::{config, demo_session, storage};

    #[test]
    fn repairs_drift_and_keeps_corrupted_files() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path());
        let storage = storage(&config);
        storage.write_session(&demo_session("gone")).unwrap();
        fs::remove_file(storage.session_path(&demo_session("gone").id)).unwrap();
        fs::write(
            storage.dir().join("s1.json"),
            serde_json::to_vec(&demo_session("s1")).unwrap(),
        )
        .unwrap();
        fs::write(storage.dir().join("bad.json"), b"{").unwrap();

        let mut output = Vec::new();
        run(&mut output, &config).unwrap();
        let output = String::from_utf8(output).unwrap();

        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("Removed 1 orphaned entries"));
        assert_eq!(lines.next(), Some("Re-indexed 1 orphaned files"));
        assert_eq!(lines.next(), Some("Refreshed 0 stale entries"));
        assert_eq!(lines.next(), Some("Touched: gone, s1"));
        assert!(lines.next().unwrap().starts_with("warning: session file bad is corrupted"));
        assert!(storage.dir().join("bad.json").exists());
    }

    #[test]
    fn nothing_to_do() {
        let temp = tempfile::tempdir().unwrap();
        let mut output = Vec::new();
        run(&mut output, &config(temp.path())).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Removed 0 orphaned entries
        Re-indexed 0 orphaned files
        Refreshed 0 stale entries
        ");
    }
}
