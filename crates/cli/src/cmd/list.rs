//! List command implementation.

use anyhow::Result;
use pkg_lib::engine::Engine;

use crate::output::{OutputFormat, format_pointer, print_info, print_json};

pub fn cmd_list(engine: &Engine, output: OutputFormat) -> Result<()> {
  let packages = engine.installed()?;

  if output.is_json() {
    return print_json(&packages);
  }

  if packages.is_empty() {
    print_info("No packages installed");
    return Ok(());
  }
  for package in &packages {
    let version = package.version.as_deref().unwrap_or("?");
    println!("{}", format_pointer(&package.name, version));
  }
  Ok(())
}
