//! Uninstall orchestration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{Engine, EngineError, RemovalStats, UninstallOutcome, UninstallStage};
use crate::descriptor::{Descriptor, Phase};
use crate::ledger::LedgerEntry;

impl Engine {
  /// Remove every path recorded in the ledger of `name`.
  ///
  /// Not being installed is reported as [`UninstallOutcome::NotInstalled`],
  /// not as an error.
  pub fn uninstall(&self, name: &str) -> Result<UninstallOutcome, EngineError> {
    if !self.ledgers.is_installed(name) {
      warn!(name, "package is not installed");
      return Ok(UninstallOutcome::NotInstalled { name: name.to_string() });
    }
    let descriptor = self.load_current(name)?;
    if descriptor.is_none() {
      warn!(name, "no descriptor for installed package; uninstall hooks skipped");
    }
    self.uninstall_with(name, descriptor.as_ref())
  }

  pub(super) fn uninstall_with(
    &self,
    name: &str,
    descriptor: Option<&Descriptor>,
  ) -> Result<UninstallOutcome, EngineError> {
    let Some(lines) = self.ledgers.read(name)? else {
      warn!(name, "package is not installed");
      return Ok(UninstallOutcome::NotInstalled { name: name.to_string() });
    };
    let mut stages = vec![UninstallStage::Loaded];

    info!(name, entries = lines.len(), "uninstalling package");
    if let Some(descriptor) = descriptor {
      self.run_hook(descriptor, Phase::PreUninstall)?;
    }
    stages.push(UninstallStage::PreUninstall);

    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for line in &lines {
      match LedgerEntry::parse(line) {
        LedgerEntry::File(path) => files.push(path),
        LedgerEntry::Dir(path) => dirs.push(path),
      }
    }

    let mut stats = RemovalStats::default();
    for file in &files {
      match fs::remove_file(file) {
        Ok(()) => stats.files_removed += 1,
        Err(e) if e.kind() == io::ErrorKind::NotFound => debug!(path = %file.display(), "already gone"),
        Err(source) => {
          return Err(EngineError::Io {
            path: file.clone(),
            source,
          });
        }
      }
    }
    stages.push(UninstallStage::FilesRemoved);

    // Reverse lexicographic order removes children before their parents.
    dirs.sort();
    dirs.reverse();
    for dir in &dirs {
      match remove_owned_dir(dir, &self.config.root) {
        DirRemoval::Removed => stats.dirs_removed += 1,
        DirRemoval::Kept => stats.dirs_kept += 1,
        DirRemoval::Missing => {}
      }
    }
    stages.push(UninstallStage::DirsRemoved);

    self.ledgers.remove(name)?;
    stages.push(UninstallStage::LedgerCleared);

    if let Some(descriptor) = descriptor {
      self.run_hook(descriptor, Phase::PostUninstall)?;
    }
    stages.push(UninstallStage::PostUninstalled);

    info!(
      name,
      files = stats.files_removed,
      dirs = stats.dirs_removed,
      kept = stats.dirs_kept,
      "uninstalled package"
    );
    Ok(UninstallOutcome::Removed {
      name: name.to_string(),
      stats,
      stages,
    })
  }
}

enum DirRemoval {
  Removed,
  Kept,
  Missing,
}

/// Remove an empty directory recorded in a ledger.
///
/// Symlinks, the target root itself and directories that still hold entries
/// are kept; a non-empty directory is not an error.
fn remove_owned_dir(dir: &Path, root: &Path) -> DirRemoval {
  let Ok(meta) = fs::symlink_metadata(dir) else {
    return DirRemoval::Missing;
  };
  if meta.file_type().is_symlink() || !meta.is_dir() || same_dir(dir, root) {
    debug!(path = %dir.display(), "directory kept");
    return DirRemoval::Kept;
  }
  match fs::remove_dir(dir) {
    Ok(()) => DirRemoval::Removed,
    Err(e) => {
      debug!(path = %dir.display(), error = %e, "directory not removed");
      DirRemoval::Kept
    }
  }
}

fn same_dir(a: &Path, b: &Path) -> bool {
  let strip = |p: &Path| -> PathBuf { p.components().collect() };
  strip(a) == strip(b)
}
