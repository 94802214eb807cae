//! Drift detection, repair and verification

use colored::Colorize;
use gitstate_config::RepairMode;

use super::Engine;
use crate::error::Result;
use crate::interactive::TerminalConfirm;

/// Detect drift and handle it with `mode`, or the configured mode.
pub fn run_drift(engine: &mut Engine, mode: Option<RepairMode>, json: bool) -> Result<()> {
    engine.ensure_fresh()?;
    let mode = mode.unwrap_or(engine.configuration().errors.drift_repair);
    let outcome = engine.repair_drift(mode, &mut TerminalConfirm)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.report.is_clean() {
        println!("{} No drift", "OK".green().bold());
        return Ok(());
    }
    for item in &outcome.report.items {
        println!("  {} {}", "~".yellow(), item);
    }
    if outcome.applied {
        println!("{} Repaired {} fields", "OK".green().bold(), outcome.report.items.len());
    } else {
        println!(
            "{} Not repaired (run {} to fix)",
            "Note:".yellow(),
            "gitstate drift --repair auto".cyan()
        );
    }
    Ok(())
}

pub fn run_verify(engine: &mut Engine) -> Result<()> {
    engine.ensure_fresh()?;
    engine.validate_against_truth()?;
    let report = engine.detect_drift()?;
    if report.is_clean() {
        println!("{} State matches repository", "OK".green().bold());
    } else {
        // Fields validation does not gate on
        println!(
            "{} State usable, but cached fields differ:",
            "Warning:".yellow().bold()
        );
        for item in &report.items {
            println!("  {} {}", "~".yellow(), item);
        }
    }
    Ok(())
}
