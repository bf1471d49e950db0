//! Files command implementation.

use std::collections::BTreeMap;

use anyhow::Result;
use pkg_lib::engine::Engine;

use crate::output::{OutputFormat, print_json, print_warning};

/// Print ledger entries. Packages that are not installed produce a warning.
pub fn cmd_files(engine: &Engine, packages: &[String], output: OutputFormat) -> Result<()> {
  let mut ledgers = BTreeMap::new();

  for name in packages {
    let entries = engine.files(name)?;
    if entries.is_none() {
      print_warning(&format!("{} is not installed", name));
    }
    if !output.is_json()
      && let Some(entries) = &entries
    {
      for entry in entries {
        println!("{}", entry);
      }
    }
    ledgers.insert(name.as_str(), entries);
  }

  if output.is_json() {
    print_json(&ledgers)?;
  }
  Ok(())
}
