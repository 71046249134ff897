//! Monitor command handlers: one cycle, the loop, and metrics.

use std::time::Duration;

use anyhow::Result;
use seedwarden_core::Warden;
use tracing::warn;

use super::print_json;

pub async fn run_tick_command(warden: &Warden) -> Result<()> {
    let report = warden.tick().await?;
    print_json(&report)
}

pub async fn run_watch_command(warden: &Warden, interval: Duration) -> Result<()> {
    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            // no signal handler: run until killed
            warn!(error = %error, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    warden.run(interval, shutdown).await;
    Ok(())
}

pub async fn run_status_command(warden: &Warden) -> Result<()> {
    let metrics = warden.get_metrics().await;
    print_json(&metrics)
}
