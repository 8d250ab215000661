use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use dialoguer::Confirm;

/// Ask before deleting every control record. Non-interactive sessions must
/// pass `--yes` instead.
pub fn confirm_reset(db_path: &Path) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        println!("Non-interactive environment detected.");
        println!("Re-run with --yes to reset {}.", db_path.display());
        return Ok(false);
    }

    println!();
    println!("  This removes the control record of every channel in");
    println!("  {}", db_path.display());
    println!("  Recorded versions are lost; migrated data is left as is.");
    println!();

    Confirm::new()
        .with_prompt("Reset all control records?")
        .default(false)
        .interact()
        .context("reset confirmation cancelled")
}
