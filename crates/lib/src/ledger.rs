//! Install ledgers.
//!
//! A ledger is the file list recorded when a package is installed, one entry
//! per line, rebased onto the target root. Directory entries end in `/`. The
//! ledger's existence is what marks a package as installed.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::consts::LEDGER_NAME;
use crate::util::fs::{remove_if_exists, write_atomic};

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("failed to read ledger {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write ledger {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// One recorded path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
  File(PathBuf),
  Dir(PathBuf),
}

impl LedgerEntry {
  pub fn parse(line: &str) -> Self {
    match line.strip_suffix('/') {
      Some(dir) if !dir.is_empty() => LedgerEntry::Dir(PathBuf::from(dir)),
      _ => LedgerEntry::File(PathBuf::from(line)),
    }
  }
}

/// Ledgers of every package under one root.
#[derive(Debug, Clone)]
pub struct Ledgers {
  lib_dir: PathBuf,
}

impl Ledgers {
  pub fn new(config: &Config) -> Self {
    Self {
      lib_dir: config.lib_dir(),
    }
  }

  pub fn path(&self, name: &str) -> PathBuf {
    self.lib_dir.join(name).join(LEDGER_NAME)
  }

  pub fn is_installed(&self, name: &str) -> bool {
    self.path(name).is_file()
  }

  /// Recorded entries, or `None` when the package is not installed.
  pub fn read(&self, name: &str) -> Result<Option<Vec<String>>, LedgerError> {
    let path = self.path(name);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(LedgerError::Read { path, source }),
    };
    Ok(Some(
      content.lines().filter(|l| !l.is_empty()).map(str::to_string).collect(),
    ))
  }

  /// Replace the ledger atomically.
  pub fn write(&self, name: &str, entries: &[String]) -> Result<(), LedgerError> {
    let path = self.path(name);
    let mut content = entries.join("\n");
    if !content.is_empty() {
      content.push('\n');
    }
    write_atomic(&path, content.as_bytes()).map_err(|source| LedgerError::Write {
      path: path.clone(),
      source,
    })?;
    debug!(name, entries = entries.len(), path = %path.display(), "wrote ledger");
    Ok(())
  }

  pub fn remove(&self, name: &str) -> Result<(), LedgerError> {
    let path = self.path(name);
    remove_if_exists(&path).map_err(|source| LedgerError::Write { path, source })
  }

  /// Names of installed packages, sorted.
  pub fn installed(&self) -> Result<Vec<String>, LedgerError> {
    let entries = match fs::read_dir(&self.lib_dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(LedgerError::Read {
          path: self.lib_dir.clone(),
          source,
        });
      }
    };

    let mut names = Vec::new();
    for entry in entries {
      let entry = entry.map_err(|source| LedgerError::Read {
        path: self.lib_dir.clone(),
        source,
      })?;
      let name = entry.file_name().to_string_lossy().to_string();
      if self.is_installed(&name) {
        names.push(name);
      }
    }
    names.sort();
    Ok(names)
  }
}
