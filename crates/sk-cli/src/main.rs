use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sk_cli::commands::{
    backup, delete, export, list, new, repair, restore_backup, resume, show, validate,
};
use sk_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays parseable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let workspace = std::env::current_dir().ok();
    let config = Config::load_for_workspace(cli.config.as_deref(), workspace.as_deref())
        .context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match command {
        Commands::New(args) => new::run(&mut out, args, &config)?,
        Commands::List(args) => list::run(&mut out, args, &config)?,
        Commands::Show(args) => show::run(&mut out, args, &config)?,
        Commands::Validate(args) => validate::run(&mut out, args, &config)?,
        Commands::Repair => repair::run(&mut out, &config)?,
        Commands::Export(args) => export::run(&mut out, args, &config)?,
        Commands::Backup(args) => backup::run(&mut out, args, &config)?,
        Commands::RestoreBackup(args) => restore_backup::run(&mut out, args, &config)?,
        Commands::Delete(args) => delete::run(&mut out, args, &config)?,
        Commands::Resume(args) => resume::run(&mut out, args, &config)?,
    }
    out.flush()?;

    Ok(())
}
