//! Show command printing one session.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use sk_core::Session;
use sk_core::index::preview;

use super::{open_manager, parse_id};
use crate::Config;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Session ID.
    pub id: String,

    /// Output the full session document as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &ShowArgs, config: &Config) -> Result<()> {
    let id = parse_id(&args.id)?;
    let manager = open_manager(config)?;
    let session = manager
        .restore_session(&id)
        .with_context(|| format!("failed to load session {id}"))?;

    if args.json {
        serde_json::to_writer_pretty(&mut *writer, &session)?;
        writeln!(writer)?;
    } else {
        write!(writer, "{}", format_session(&session))?;
    }
    Ok(())
}

pub fn format_session(session: &Session) -> String {
    let mut out = String::new();
    let stamp = |ts: chrono::DateTime<chrono::Utc>| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let usage = session.token_usage;

    writeln!(out, "Session {}", session.id).unwrap();
    if let Some(title) = &session.title {
        writeln!(out, "Title:     {title}").unwrap();
    }
    writeln!(out, "Model:     {} ({})", session.model, session.provider).unwrap();
    writeln!(out, "Workspace: {}", session.workspace_root).unwrap();
    writeln!(out, "Created:   {}", stamp(session.created_at)).unwrap();
    writeln!(out, "Modified:  {}", stamp(session.last_modified)).unwrap();
    writeln!(
        out,
        "Tokens:    {} (in {}, out {})",
        usage.total, usage.input, usage.output
    )
    .unwrap();
    if !session.tags.is_empty() {
        let tags: Vec<_> = session.tags.iter().collect();
        writeln!(out, "Tags:      {}", tags.join(", ")).unwrap();
    }
    if !session.context_files.is_empty() {
        writeln!(out, "Context:   {}", session.context_files.join(", ")).unwrap();
    }
    writeln!(out, "Messages:  {}", session.messages.len()).unwrap();
    for message in &session.messages {
        writeln!(out, "  [{}] {}", message.role, preview(&message.text())).unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::commands::test_support::{config, demo_session, storage};

    #[test]
    fn shows_session_summary() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path());
        storage(&config).write_session(&demo_session("s1")).unwrap();

        let mut output = Vec::new();
        let args = ShowArgs {
            id: "s1".to_string(),
            json: false,
        };
        run(&mut output, &args, &config).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Session s1
        Title:     Demo
        Model:     claude-sonnet (anthropic)
        Workspace: /home/alice/proj
        Created:   2025-01-01 00:00:00 UTC
        Modified:  2025-01-01 00:01:00 UTC
        Tokens:    150 (in 120, out 30)
        Tags:      demo
        Context:   /home/alice/proj/src/main.rs
        Messages:  1
          [user] hello there
        ");
    }

    #[test]
    fn missing_session_reports_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let mut output = Vec::new();
        let args = ShowArgs {
            id: "ghost".to_string(),
            json: false,
        };
        let err = run(&mut output, &args, &config(temp.path())).unwrap_err();
        assert!(format!("{err:#}").contains("session not found: ghost"));
    }

    #[test]
    fn rejects_unsafe_ids() {
        let temp = tempfile::tempdir().unwrap();
        let mut output = Vec::new();
        let args = ShowArgs {
            id: "../etc/passwd".to_string(),
            json: false,
        };
        let err = run(&mut output, &args, &config(temp.path())).unwrap_err();
        assert!(err.to_string().contains("invalid session id"));
    }
}
