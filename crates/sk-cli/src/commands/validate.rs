//! Validate command reporting drift between session files and the index.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use clap::Args;
use sk_core::SessionId;
use sk_store::{SessionValidator, ValidationReport};

use super::open_manager;
use crate::Config;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &ValidateArgs, config: &Config) -> Result<()> {
    let manager = open_manager(config)?;
    let report = SessionValidator::new(manager.storage()).validate_session_index()?;

    if args.json {
        serde_json::to_writer_pretty(&mut *writer, &report)?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", format_report(&report))?;
    }
    Ok(())
}

fn section(out: &mut String, label: &str, ids: &[SessionId]) {
    writeln!(out, "{label:<18}{}", ids.len()).unwrap();
    for id in ids {
        writeln!(out, "  {id}").unwrap();
    }
}

pub fn format_report(report: &ValidationReport) -> String {
    let mut out = String::new();
    section(&mut out, "Orphaned entries:", &report.orphaned_entries);
    section(&mut out, "Orphaned files:", &report.orphaned_files);
    section(&mut out, "Corrupted files:", &report.corrupted_files);
    section(&mut out, "Stale entries:", &report.stale_entries);

    if !report.warnings.is_empty() {
        writeln!(out, "Warnings:").unwrap();
        for warning in &report.warnings {
            writeln!(out, "  - {warning}").unwrap();
        }
    }

    if report.is_clean() {
        writeln!(out, "Index is consistent.").unwrap();
    } else {
        writeln!(out, "Run 'sk repair' to fix the index.").unwrap();
    }
    out
}
