//! Version command implementation.

use std::collections::BTreeMap;

use anyhow::Result;
use pkg_lib::engine::Engine;

use crate::output::{OutputFormat, format_pointer, print_json, print_warning};

pub fn cmd_version(engine: &Engine, packages: &[String], output: OutputFormat) -> Result<()> {
  let mut versions = BTreeMap::new();

  for name in packages {
    let version = engine.current_version(name)?;
    match &version {
      None => print_warning(&format!("{} has not been built", name)),
      Some(version) if !output.is_json() => println!("{}", format_pointer(name, version)),
      Some(_) => {}
    }
    versions.insert(name.as_str(), version);
  }

  if output.is_json() {
    print_json(&versions)?;
  }
  Ok(())
}
