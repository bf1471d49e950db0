//! Build cache.
//!
//! Maps (name, version) to a durable source snapshot and a verified build
//! archive, and keeps name-level "current version" symlinks.
//!
//! # Layout
//!
//! ```text
//! R/var/lib/pkg/<name>/<version>/<name>.pkg          descriptor copy
//! R/var/lib/pkg/<name>/<name>.pkg                    -> <version>/<name>.pkg
//! R/var/cache/pkg/<name>/<version>/src/              source snapshot
//! R/var/cache/pkg/<name>/<version>/pkg.tar.gz        build archive
//! R/var/cache/pkg/<name>/<version>/pkg.tar.gz.md5    checksum sidecar
//! R/var/cache/pkg/<name>/pkg.tar.gz                  -> <version>/pkg.tar.gz
//! R/var/cache/pkg/<name>/pkg.tar.gz.md5              -> <version>/pkg.tar.gz.md5
//! ```
//!
//! Pointer targets are version-relative, so a root can be relocated without
//! rewriting them.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::consts::{ARCHIVE_NAME, DESCRIPTOR_EXT, SNAPSHOT_DIR};
use crate::util::fs::{remove_if_exists, replace_symlink, same_contents};
use crate::util::hash::{self, ContentHash, HashError, SidecarCheck};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
  move |source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// State of a version's build archive, as observed without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveState {
  Missing,
  Valid,
  /// The archive exists but its sidecar is missing or no longer matches.
  Corrupt { reason: String },
}

#[derive(Debug, Clone)]
pub struct BuildCache {
  lib_dir: PathBuf,
  cache_dir: PathBuf,
}

impl BuildCache {
  pub fn new(config: &Config) -> Self {
    Self {
      lib_dir: config.lib_dir(),
      cache_dir: config.cache_dir(),
    }
  }

  /// `R/var/lib/pkg/<name>`; also holds the ledger.
  pub fn data_dir(&self, name: &str) -> PathBuf {
    self.lib_dir.join(name)
  }

  pub fn version_dir(&self, name: &str, version: &str) -> PathBuf {
    self.cache_dir.join(name).join(version)
  }

  pub fn archive_path(&self, name: &str, version: &str) -> PathBuf {
    self.version_dir(name, version).join(ARCHIVE_NAME)
  }

  pub fn current_archive(&self, name: &str) -> PathBuf {
    self.cache_dir.join(name).join(ARCHIVE_NAME)
  }

  pub fn descriptor_copy(&self, name: &str, version: &str) -> PathBuf {
    self.data_dir(name).join(version).join(descriptor_file(name))
  }

  pub fn current_descriptor(&self, name: &str) -> PathBuf {
    self.data_dir(name).join(descriptor_file(name))
  }

  /// Durable directory where fetched sources for this exact version accumulate.
  ///
  /// Never cleared automatically; repeated builds reuse what it holds.
  pub fn snapshot(&self, name: &str, version: &str) -> Result<PathBuf, CacheError> {
    let dir = self.version_dir(name, version).join(SNAPSHOT_DIR);
    fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    Ok(dir)
  }

  /// Observe the archive state without modifying anything.
  pub fn inspect(&self, name: &str, version: &str) -> Result<ArchiveState, CacheError> {
    let archive = self.archive_path(name, version);
    if !archive.is_file() {
      return Ok(ArchiveState::Missing);
    }
    Ok(match hash::verify_sidecar(&archive)? {
      SidecarCheck::Valid => ArchiveState::Valid,
      SidecarCheck::MissingSidecar => ArchiveState::Corrupt {
        reason: "checksum sidecar missing".to_string(),
      },
      SidecarCheck::Mismatch { expected, actual } => ArchiveState::Corrupt {
        reason: format!("expected {}, found {}", expected, actual),
      },
    })
  }

  /// Delete a version's archive and sidecar.
  pub fn heal(&self, name: &str, version: &str) -> Result<(), CacheError> {
    let archive = self.archive_path(name, version);
    let sidecar = hash::sidecar_path(&archive);
    remove_if_exists(&archive).map_err(io_err(&archive))?;
    remove_if_exists(&sidecar).map_err(io_err(&sidecar))?;
    Ok(())
  }

  /// Whether a verified archive exists for (name, version).
  ///
  /// This is not a pure query: a corrupt archive is deleted before returning
  /// `false`, so the next build starts from scratch. Use [`Self::inspect`]
  /// to observe without healing.
  pub fn is_built(&self, name: &str, version: &str) -> Result<bool, CacheError> {
    match self.inspect(name, version)? {
      ArchiveState::Valid => Ok(true),
      ArchiveState::Missing => Ok(false),
      ArchiveState::Corrupt { reason } => {
        warn!(name, version, reason = %reason, "deleting corrupt build archive");
        self.heal(name, version)?;
        Ok(false)
      }
    }
  }

  /// Temp file inside the version directory to pack a new archive into.
  pub fn stage_archive(&self, name: &str, version: &str) -> Result<NamedTempFile, CacheError> {
    let dir = self.version_dir(name, version);
    fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    tempfile::Builder::new()
      .prefix(".pkg-")
      .tempfile_in(&dir)
      .map_err(io_err(&dir))
  }

  /// Move a staged archive into place and write its checksum sidecar.
  pub fn commit_archive(&self, name: &str, version: &str, staged: NamedTempFile) -> Result<ContentHash, CacheError> {
    let archive = self.archive_path(name, version);
    staged.persist(&archive).map_err(|e| CacheError::Io {
      path: archive.clone(),
      source: e.error,
    })?;
    let digest = hash::write_sidecar(&archive)?;
    info!(name, version, md5 = %digest, "stored build archive");
    Ok(digest)
  }

  /// Copy the descriptor into the version's data directory.
  ///
  /// Returns `false` when a byte-identical copy is already there.
  pub fn store_descriptor(&self, name: &str, version: &str, src: &Path) -> Result<bool, CacheError> {
    let dest = self.descriptor_copy(name, version);
    if same_contents(src, &dest).map_err(io_err(&dest))? {
      debug!(name, version, "descriptor copy up to date");
      return Ok(false);
    }
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::copy(src, &dest).map_err(io_err(&dest))?;
    Ok(true)
  }

  /// Point the name-level descriptor, archive and sidecar links at `version`.
  pub fn link_current(&self, name: &str, version: &str) -> Result<(), CacheError> {
    let descriptor_target = Path::new(version).join(descriptor_file(name));
    let current_descriptor = self.current_descriptor(name);
    replace_symlink(&descriptor_target, &current_descriptor).map_err(io_err(&current_descriptor))?;

    let archive_target = Path::new(version).join(ARCHIVE_NAME);
    let current_archive = self.current_archive(name);
    replace_symlink(&archive_target, &current_archive).map_err(io_err(&current_archive))?;

    let sidecar_target = hash::sidecar_path(&archive_target);
    let current_sidecar = hash::sidecar_path(&current_archive);
    replace_symlink(&sidecar_target, &current_sidecar).map_err(io_err(&current_sidecar))?;

    debug!(name, version, "linked current version");
    Ok(())
  }

  /// Version the current descriptor link resolves to, if any.
  pub fn current_version(&self, name: &str) -> Result<Option<String>, CacheError> {
    let link = self.current_descriptor(name);
    let target = match fs::read_link(&link) {
      Ok(target) => target,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => return Err(CacheError::Io { path: link, source }),
    };

    let version = if target.is_absolute() {
      target.parent().and_then(Path::file_name).map(|v| v.to_string_lossy().to_string())
    } else {
      target.components().next().and_then(|c| match c {
        Component::Normal(v) => Some(v.to_string_lossy().to_string()),
        _ => None,
      })
    };
    Ok(version)
  }
}

fn descriptor_file(name: &str) -> String {
  format!("{}.{}", name, DESCRIPTOR_EXT)
}
