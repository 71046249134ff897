//! Dispatch command handler: deliver one request or queue it.

use anyhow::Result;
use seedwarden_core::{DispatchRequest, Warden};

use crate::cli::DispatchArgs;

pub async fn run_dispatch_command(warden: &Warden, args: &DispatchArgs) -> Result<()> {
    let mut request = DispatchRequest::new(args.payload.clone());
    if let Some(category) = &args.category {
        request = request.with_category(category.clone());
    }
    if let Some(path) = &args.save_path {
        request = request.with_path(path.clone());
    }

    let outcome = warden.dispatch(&request).await?;
    match &outcome.delivered_to {
        Some(instance) => println!("delivered_to = {instance}"),
        None => println!("queued = true (no healthy instance)"),
    }
    for status in &outcome.observed {
        println!("  {} = {}", status.instance_name, status.state);
    }
    Ok(())
}
