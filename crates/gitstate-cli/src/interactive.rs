//! Interactive prompts for CLI commands
//!
//! Uses dialoguer for the drift repair confirmation.

use colored::Colorize;
use dialoguer::Confirm;
use gitstate_core::DriftReport;

/// Asks on the terminal before a drift repair is applied.
pub struct TerminalConfirm;

impl gitstate_core::Confirm for TerminalConfirm {
    fn confirm(&mut self, report: &DriftReport) -> bool {
        println!("{}", "Cached state differs from the repository:".yellow());
        for item in &report.items {
            println!("  {} {}", "~".yellow(), item);
        }
        match Confirm::new()
            .with_prompt("Rewrite the cached state from the repository?")
            .default(true)
            .interact()
        {
            Ok(answer) => answer,
            Err(e) => {
                // No terminal: treat as declined
                tracing::warn!(error = %e, "Confirmation prompt failed");
                false
            }
        }
    }
}
