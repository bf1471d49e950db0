//! Install command implementation.

use anyhow::{Context, Result};
use pkg_lib::engine::Engine;

use crate::output::{OutputFormat, print_json, print_stat, print_success};

pub fn cmd_install(engine: &Engine, packages: &[String], output: OutputFormat) -> Result<()> {
  let mut outcomes = Vec::with_capacity(packages.len());

  for name in packages {
    let outcome = engine
      .install(name)
      .with_context(|| format!("install of {} failed", name))?;

    if !output.is_json() {
      print_success(&format!("Installed {} {}", outcome.name, outcome.version));
      print_stat("Entries", &outcome.entries.to_string());
      if outcome.replaced {
        print_stat("Replaced", "previous installation removed");
      }
    }
    outcomes.push(outcome);
  }

  if output.is_json() {
    print_json(&outcomes)?;
  }
  Ok(())
}
