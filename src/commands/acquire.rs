//! Acquisition command handlers: ledger records, the emergency gate, ROI.

use anyhow::Result;
use seedwarden_core::{AcquisitionRecord, Warden};

pub async fn run_acquire_record_command(
    warden: &Warden,
    payload: &str,
    cost: Option<f64>,
) -> Result<()> {
    let record = AcquisitionRecord::new(payload, cost);
    if record.is_paid() {
        warden.controller().guard_acquisition()?;
    }
    warden.roi_tracker().ledger().record(record).await?;
    println!("recorded = {payload}");
    Ok(())
}

pub fn run_acquire_check_command(warden: &Warden) -> Result<()> {
    warden.controller().guard_acquisition()?;
    println!("acquisitions = allowed");
    Ok(())
}

pub async fn run_roi_command(warden: &Warden) -> Result<()> {
    let report = warden.roi_report().await?;
    println!("earned_estimate = {:.2}", report.earned_estimate);
    println!("spent_total = {:.2}", report.spent_total);
    println!("roi = {:.2}", report.roi);
    println!("recommendation = {}", report.recommendation);
    Ok(())
}
