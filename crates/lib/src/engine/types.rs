//! Error, stage and outcome types for the lifecycle engine.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::cache::CacheError;
use crate::descriptor::{CallbackError, DescriptorError};
use crate::fetch::FetchError;
use crate::ledger::LedgerError;
use crate::util::hash::HashError;

/// Errors that abort a single package's build, install or uninstall.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Descriptor(#[from] DescriptorError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  /// A source did not match its declared checksum.
  #[error("checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
  Integrity {
    path: PathBuf,
    expected: String,
    actual: String,
  },

  /// A build archive failed verification and was deleted.
  #[error("build archive {} is corrupt ({reason}); it was removed, rebuild the package", .path.display())]
  CorruptArchive { path: PathBuf, reason: String },

  #[error(transparent)]
  Callback(#[from] CallbackError),

  #[error("package '{name}' has not been built")]
  NotBuilt { name: String },

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error(transparent)]
  Ledger(#[from] LedgerError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Coarse classification of [`EngineError`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  Fetch,
  Integrity,
  Callback,
  State,
  Io,
}

impl EngineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      EngineError::Descriptor(_) => ErrorKind::Validation,
      EngineError::Fetch(_) => ErrorKind::Fetch,
      EngineError::Integrity { .. } | EngineError::CorruptArchive { .. } => ErrorKind::Integrity,
      EngineError::Callback(_) => ErrorKind::Callback,
      EngineError::NotBuilt { .. } => ErrorKind::State,
      EngineError::Archive(_)
      | EngineError::Cache(_)
      | EngineError::Ledger(_)
      | EngineError::Hash(_)
      | EngineError::Io { .. } => ErrorKind::Io,
    }
  }

  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> EngineError {
    let path = path.into();
    move |source| EngineError::Io { path, source }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ErrorKind::Validation => "validation",
      ErrorKind::Fetch => "fetch",
      ErrorKind::Integrity => "integrity",
      ErrorKind::Callback => "callback",
      ErrorKind::State => "state",
      ErrorKind::Io => "io",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
  Loaded,
  Sourced,
  Built,
  Archived,
  Stored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
  Loaded,
  PreInstall,
  Extracted,
  Ledgered,
  PostInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UninstallStage {
  Loaded,
  PreUninstall,
  FilesRemoved,
  DirsRemoved,
  LedgerCleared,
  PostUninstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
  /// Sources were prepared and the build callback ran.
  Built,
  /// A verified archive already existed; only the current pointers were updated.
  Cached,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
  pub name: String,
  pub version: String,
  pub status: BuildStatus,
  pub archive: PathBuf,
  pub stages: Vec<BuildStage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
  pub name: String,
  pub version: String,
  /// A previous installation was uninstalled first.
  pub replaced: bool,
  /// Number of ledger entries recorded.
  pub entries: usize,
  pub stages: Vec<InstallStage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalStats {
  pub files_removed: usize,
  pub dirs_removed: usize,
  /// Directories left in place because they were non-empty or symlinks.
  pub dirs_kept: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UninstallOutcome {
  Removed {
    name: String,
    stats: RemovalStats,
    stages: Vec<UninstallStage>,
  },
  /// No ledger existed; nothing was touched.
  NotInstalled { name: String },
}

/// A package with a ledger under the current root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
  pub name: String,
  /// Version the current pointer resolves to, if it still exists.
  pub version: Option<String>,
}
