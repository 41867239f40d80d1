//! Export command writing a sanitized session document.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sk_core::ExportOptions;

use super::{open_manager, parse_id};
use crate::Config;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Session ID.
    pub id: String,

    /// Export only the index metadata, not the conversation.
    #[arg(long)]
    pub metadata_only: bool,

    /// Keep workspace and context file paths instead of stripping them.
    #[arg(long)]
    pub preserve_paths: bool,

    /// Write to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run<W: Write>(writer: &mut W, args: &ExportArgs, config: &Config) -> Result<()> {
    let id = parse_id(&args.id)?;
    let mut config = config.clone();
    if args.preserve_paths {
        config.filter.preserve_workspace_paths = true;
    }
    let manager = open_manager(&config)?;

    let export = manager
        .export_session(
            &id,
            ExportOptions {
                metadata_only: args.metadata_only,
            },
        )
        .with_context(|| format!("failed to export session {id}"))?;
    for warning in &export.filter.warnings {
        tracing::warn!(%warning, "export filter warning");
    }

    let mut json = serde_json::to_string_pretty(&export)?;
    json.push('\n');

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            writeln!(
                writer,
                "Exported session {id} to {} ({} redactions)",
                path.display(),
                export.filter.match_count
            )?;
        }
        None => writer.write_all(json.as_bytes())?,
    }
    Ok(())
}
