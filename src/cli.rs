//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Failover torrent dispatch with upload-ratio emergency control.
///
/// Seedwarden delivers new downloads to the first healthy torrent daemon,
/// queues them when none answers, and pauses downloading when the tracker
/// ratio drops below its floor.
#[derive(Parser, Debug)]
#[command(name = "seedwarden")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the config file (default: $XDG_CONFIG_HOME/seedwarden/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deliver a magnet link or torrent URL to the first healthy instance
    Dispatch(DispatchArgs),

    /// Check every configured instance
    Health,

    /// Inspect or replay queued requests
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Run one monitor cycle (health, ratio sample, emergency decision)
    Tick,

    /// Run the monitor loop until interrupted
    Watch(WatchArgs),

    /// Print current metrics as JSON
    Status,

    /// Print the point return on investment
    Roi,

    /// Record or gate point-costing acquisitions
    Acquire {
        #[command(subcommand)]
        command: AcquireCommand,
    },
}

#[derive(ClapArgs, Debug)]
pub struct DispatchArgs {
    /// Magnet link or torrent URL
    pub payload: String,

    /// Category to file the torrent under
    #[arg(long)]
    pub category: Option<String>,

    /// Directory to save the torrent into
    #[arg(long, value_name = "DIR")]
    pub save_path: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct WatchArgs {
    /// Seconds between monitor cycles (30-86400; default from config)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(30..=86400))]
    pub interval: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// List queued requests
    List,
    /// Deliver queued requests to the first healthy instance
    Replay,
    /// Print queued requests as JSON and clear the queue
    Drain,
}

#[derive(Subcommand, Debug)]
pub enum AcquireCommand {
    /// Append an acquisition to the ledger
    Record {
        /// Magnet link or torrent URL that was acquired
        payload: String,

        /// Points spent (omit for freeleech)
        #[arg(long)]
        cost: Option<f64>,
    },
    /// Exit non-zero while point-costing acquisitions are blocked
    Check,
}
