//! Uninstall command implementation.

use anyhow::{Context, Result};
use pkg_lib::engine::{Engine, UninstallOutcome};

use crate::output::{OutputFormat, print_json, print_stat, print_success, print_warning};

pub fn cmd_uninstall(engine: &Engine, packages: &[String], output: OutputFormat) -> Result<()> {
  let mut outcomes = Vec::with_capacity(packages.len());

  for name in packages {
    let outcome = engine
      .uninstall(name)
      .with_context(|| format!("uninstall of {} failed", name))?;

    if !output.is_json() {
      match &outcome {
        UninstallOutcome::NotInstalled { name } => print_warning(&format!("{} is not installed", name)),
        UninstallOutcome::Removed { name, stats, .. } => {
          print_success(&format!("Uninstalled {}", name));
          print_stat("Files removed", &stats.files_removed.to_string());
          print_stat("Directories removed", &stats.dirs_removed.to_string());
          if stats.dirs_kept > 0 {
            print_stat("Directories kept", &stats.dirs_kept.to_string());
          }
        }
      }
    }
    outcomes.push(outcome);
  }

  if output.is_json() {
    print_json(&outcomes)?;
  }
  Ok(())
}
