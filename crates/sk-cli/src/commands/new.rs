//! New-session command.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use super::open_manager;
use crate::Config;
use crate::restore::NewSessionTemplate;

/// Where and with what a new session starts. Shared with `resume`.
#[derive(Debug, Clone, Args)]
pub struct SessionTemplateArgs {
    /// Workspace root (defaults to the current directory).
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Model name.
    #[arg(long, default_value = "unknown")]
    pub model: String,

    /// Provider name.
    #[arg(long, default_value = "unknown")]
    pub provider: String,
}

impl SessionTemplateArgs {
    pub fn template(&self) -> Result<NewSessionTemplate> {
        let workspace = match &self.workspace {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("failed to read current directory")?,
        };
        Ok(NewSessionTemplate {
            workspace_root: workspace.display().to_string(),
            model: self.model.clone(),
            provider: self.provider.clone(),
        })
    }
}

#[derive(Debug, Args)]
pub struct NewArgs {
    #[command(flatten)]
    pub template: SessionTemplateArgs,

    /// Session title.
    #[arg(long)]
    pub title: Option<String>,

    /// Tag to attach (repeatable).
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

pub fn run<W: Write>(writer: &mut W, args: &NewArgs, config: &Config) -> Result<()> {
    let template = args.template.template()?;
    let manager = open_manager(config)?;
    let mut session = manager
        .create_session(
            &template.workspace_root,
            &template.model,
            &template.provider,
        )
        .context("failed to create session")?;

    if args.title.is_some() || !args.tags.is_empty() {
        session.title.clone_from(&args.title);
        for tag in &args.tags {
            session.tags.insert(tag.as_str());
        }
        session.touch(Utc::now());
        manager
            .save_session(&session)
            .with_context(|| format!("failed to save session {}", session.id))?;
    }

    writeln!(writer, "Created session {}", session.id)?;
    Ok(())
}
