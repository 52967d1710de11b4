//! `dm-launch`: resolves, updates, and runs the dm-langserver engine.
//!
//! Editors can use `dm-launch run` as their language server command; the
//! engine inherits stdin/stdout, so all diagnostics go to stderr.

use clap::{Parser, Subcommand};
use dm_launch::config::{ConfigStore, LauncherConfig};
use dm_launch::prompt::{NonInteractivePrompter, Prompter, TerminalPrompter};
use dm_launch::resolver::{CommandResolver, Resolution, ResolverOptions};
use dm_launch::{LauncherError, launch_dirs};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Resolve, update, and launch the dm-langserver engine.
#[derive(Parser)]
#[command(name = "dm-launch", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for auto-downloaded engine builds.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Resolve the engine and run it with inherited stdio.
    Run {
        /// Extra arguments passed to the engine.
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Resolve the engine and print the command as JSON.
    Resolve,

    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the engine protocol.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dm_launch=info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(launch_dirs::config_file);
    let store = Arc::new(ConfigStore::open(&config_path)?);
    let config = store.config();
    let cache_dir = cli.cache_dir.unwrap_or_else(launch_dirs::cache_dir);

    let prompter: Arc<dyn Prompter> =
        if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
            Arc::new(TerminalPrompter)
        } else {
            Arc::new(NonInteractivePrompter)
        };
    let resolver = CommandResolver::new(
        store.clone(),
        prompter,
        ResolverOptions::from_config(&config.update, cache_dir),
    );

    match cli.command.unwrap_or(Command::Run { args: Vec::new() }) {
        // The engine inherits the terminal, so the background check must not prompt.
        Command::Run { args } => {
            let resolver = resolver.with_background_prompter(Arc::new(NonInteractivePrompter));
            run(&resolver, args).await
        }
        Command::Resolve => resolve(&resolver).await,
        Command::Config => print_config(&config_path, &config),
    }
}

async fn run(resolver: &CommandResolver, extra_args: Vec<String>) -> anyhow::Result<()> {
    let mut resolution = resolver.resolve().await;
    let Some(command) = resolution.command().cloned() else {
        anyhow::bail!(
            "dm-langserver not started: {}",
            resolution.reason().unwrap_or("no executable")
        );
    };

    let mut child = tokio::process::Command::new(&command.path)
        .args(&command.args)
        .args(&extra_args)
        .spawn()
        .map_err(|e| LauncherError::Launch(format!("cannot start {command}: {e}")))?;
    tracing::info!(%command, pid = child.id(), "engine started");

    let (status, outcome) = tokio::join!(child.wait(), resolution.background_outcome());
    if let Some(outcome) = outcome {
        tracing::info!(%outcome, "background update check finished");
    }
    if resolver.session().update_available() {
        tracing::info!("a new dm-langserver build is ready and will be used on next start");
    }

    let status = status?;
    tracing::info!(%status, "engine exited");
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => std::process::exit(code),
        None => anyhow::bail!("engine terminated by signal"),
    }
}

async fn resolve(resolver: &CommandResolver) -> anyhow::Result<()> {
    let mut resolution = resolver.resolve().await;
    let outcome = resolution.background_outcome().await;

    match &resolution {
        Resolution::Launch { command, state, .. } => {
            println!("{}", serde_json::to_string_pretty(command)?);
            eprintln!("resolved via {state:?}");
            if let Some(outcome) = outcome {
                eprintln!("update check: {outcome}");
            }
            Ok(())
        }
        Resolution::NoCommand { reason } => anyhow::bail!("no dm-langserver command: {reason}"),
    }
}

fn print_config(path: &std::path::Path, config: &LauncherConfig) -> anyhow::Result<()> {
    eprintln!("# {}", path.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
