//! Queue command handlers: list, replay, drain.

use anyhow::Result;
use seedwarden_core::Warden;

use super::print_json;

pub async fn run_queue_list_command(warden: &Warden) -> Result<()> {
    let entries = warden.dispatcher().queue().peek().await?;
    if entries.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {}  attempts={}  reason={}",
            entry.queued_at.to_rfc3339(),
            entry.payload,
            entry.attempts,
            entry.reason
        );
    }
    println!("total = {}", entries.len());
    Ok(())
}

pub async fn run_queue_replay_command(warden: &Warden) -> Result<()> {
    let report = warden.dispatcher().replay_queue().await?;
    println!("delivered = {}", report.delivered);
    println!("failed = {}", report.failed);
    println!("remaining = {}", report.remaining);
    if report.skipped {
        println!("skipped = true (another replay is running)");
    }
    Ok(())
}

pub async fn run_queue_drain_command(warden: &Warden) -> Result<()> {
    let entries = warden.dispatcher().queue().drain().await?;
    print_json(&entries)
}
