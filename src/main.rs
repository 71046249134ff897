//! CLI entry point for seedwarden.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use seedwarden_core::{Config, Warden};
use tracing::{debug, info};

mod cli;
mod commands;

use cli::{AcquireCommand, Args, Command, QueueCommand};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = Config::load_or_default(args.config.as_deref())?;
    debug!(
        instances = config.instances.len(),
        data_dir = %config.data_dir().display(),
        "Configuration loaded"
    );
    let warden = Warden::from_config(&config)
        .await
        .context("failed to initialise seedwarden")?;

    match &args.command {
        Command::Dispatch(dispatch_args) => {
            commands::run_dispatch_command(&warden, dispatch_args).await?;
        }
        Command::Health => commands::run_health_command(&warden).await?,
        Command::Queue { command } => match command {
            QueueCommand::List => commands::run_queue_list_command(&warden).await?,
            QueueCommand::Replay => commands::run_queue_replay_command(&warden).await?,
            QueueCommand::Drain => commands::run_queue_drain_command(&warden).await?,
        },
        Command::Tick => commands::run_tick_command(&warden).await?,
        Command::Watch(watch_args) => {
            let interval = Duration::from_secs(watch_args.interval.unwrap_or(config.interval_secs));
            info!("Seedwarden watching");
            commands::run_watch_command(&warden, interval).await?;
        }
        Command::Status => commands::run_status_command(&warden).await?,
        Command::Roi => commands::run_roi_command(&warden).await?,
        Command::Acquire { command } => match command {
            AcquireCommand::Record { payload, cost } => {
                commands::run_acquire_record_command(&warden, payload, *cost).await?;
            }
            AcquireCommand::Check => commands::run_acquire_check_command(&warden)?,
        },
    }

    Ok(())
}
