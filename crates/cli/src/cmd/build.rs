//! Build command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use pkg_lib::engine::{BuildStatus, Engine};

use crate::output::{OutputFormat, print_info, print_json, print_success};

/// Build each descriptor in order, stopping at the first failure.
pub fn cmd_build(engine: &Engine, descriptors: &[PathBuf], output: OutputFormat) -> Result<()> {
  let mut outcomes = Vec::with_capacity(descriptors.len());

  for path in descriptors {
    let outcome = engine
      .build(path)
      .with_context(|| format!("build of {} failed", path.display()))?;

    if !output.is_json() {
      match outcome.status {
        BuildStatus::Built => print_success(&format!("Built {} {}", outcome.name, outcome.version)),
        BuildStatus::Cached => print_info(&format!("{} {} is already built", outcome.name, outcome.version)),
      }
    }
    outcomes.push(outcome);
  }

  if output.is_json() {
    print_json(&outcomes)?;
  }
  Ok(())
}
