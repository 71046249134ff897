//! Health command handler.

use anyhow::Result;
use seedwarden_core::Warden;

pub async fn run_health_command(warden: &Warden) -> Result<()> {
    let observed = warden.dispatcher().refresh_health().await;
    if observed.is_empty() {
        println!("No instances configured.");
        return Ok(());
    }

    for status in &observed {
        match status.version.as_deref().or(status.detail.as_deref()) {
            Some(extra) => println!("{} = {} {}", status.instance_name, status.state, extra.trim()),
            None => println!("{} = {}", status.instance_name, status.state),
        }
    }
    Ok(())
}
