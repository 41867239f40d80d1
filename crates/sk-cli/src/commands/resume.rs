//! Resume command driving the startup restoration flow.

use std::io::Write;

use anyhow::{Result, bail};
use clap::Args;
use sk_core::ErrorRecoverySystem;

use super::new::SessionTemplateArgs;
use super::{open_manager, parse_id};
use crate::Config;
use crate::restore::{RestorationFlow, RestoreOutcome, RestoreState};

#[derive(Debug, Args)]
pub struct ResumeArgs {
    /// Session to resume (defaults to the most recent one).
    #[arg(conflicts_with = "new")]
    pub id: Option<String>,

    /// Skip restoring and start a new session.
    #[arg(long)]
    pub new: bool,

    #[command(flatten)]
    pub template: SessionTemplateArgs,
}

pub fn run<W: Write>(writer: &mut W, args: &ResumeArgs, config: &Config) -> Result<()> {
    let requested = args.id.as_deref().map(parse_id).transpose()?;
    let template = args.template.template()?;
    let manager = open_manager(config)?;
    let recovery = ErrorRecoverySystem::new(config.recovery.recovery_config());

    let mut flow = RestorationFlow::new(&manager, recovery, template).on_progress(|state| {
        if let RestoreState::Validating { current, total } = state {
            tracing::debug!(current, total, "validating candidates");
        } else {
            tracing::debug!(state = %state, "restoration progress");
        }
    });

    flow.start()?;
    if let RestoreState::Prompting { candidates } = flow.state() {
        if args.new {
            flow.new_session()?;
        } else {
            let id = match &requested {
                Some(id) => id.clone(),
                None => match candidates.first() {
                    Some(meta) => meta.id.clone(),
                    None => bail!("no sessions to resume"),
                },
            };
            flow.select(&id)?;
        }
    }

    match flow.state() {
        RestoreState::Complete(RestoreOutcome::Restored(session)) => writeln!(
            writer,
            "Restored session {} ({} messages)",
            session.id,
            session.messages.len()
        )?,
        RestoreState::Complete(RestoreOutcome::NewSession(session)) => {
            writeln!(writer, "Started new session {}", session.id)?;
        }
        RestoreState::Error {
            session_id,
            message,
            options,
        } => {
            writeln!(writer, "Failed to restore session {session_id}: {message}")?;
            writeln!(writer, "Recovery options:")?;
            for option in options {
                let marker = if option.is_recommended { "*" } else { " " };
                writeln!(
                    writer,
                    "  {marker} {}: {}",
                    option.label, option.description
                )?;
            }
            writeln!(writer, "Run 'sk resume --new' to start a new session.")?;
        }
        state => bail!("restoration stopped while {state}"),
    }
    Ok(())
}
