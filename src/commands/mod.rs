//! CLI command handlers.

mod acquire;
mod dispatch;
mod health;
mod monitor;
mod queue;

pub use acquire::{run_acquire_check_command, run_acquire_record_command, run_roi_command};
pub use dispatch::run_dispatch_command;
pub use health::run_health_command;
pub use monitor::{run_status_command, run_tick_command, run_watch_command};
pub use queue::{run_queue_drain_command, run_queue_list_command, run_queue_replay_command};

use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
