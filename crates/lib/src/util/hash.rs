//! Checksum verification for fetched sources and build archives.
//!
//! This module provides:
//! - `ContentHash`: a 32-character MD5 digest, as printed by `md5sum`
//! - `hash_file()` / `hash_bytes()`: digest computation
//! - `verify()`: compare a file against an expected digest
//! - sidecar helpers writing and checking `<hex>  <filename>` files

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use thiserror::Error;

use crate::util::fs::write_atomic;

/// An MD5 digest for content verification.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (32 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Compare against a digest written by a human or another tool.
  pub fn matches(&self, expected: &str) -> bool {
    self.0.eq_ignore_ascii_case(expected.trim())
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error)]
pub enum HashError {
  #[error("failed to read file {path}: {source}")]
  ReadFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write checksum sidecar {path}: {source}")]
  WriteSidecar {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Hash a file's contents.
///
/// Returns the 32-character MD5 hash of the file.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError::ReadFile {
    path: path.to_path_buf(),
    source,
  };
  let mut file = fs::File::open(path).map_err(read_err)?;

  let mut hasher = Md5::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Md5::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Check the file at `path` against `expected` (hex, case-insensitive).
///
/// A mismatch is `Ok(false)`; only an unreadable file is an error. Whether a
/// mismatch is fatal is the caller's decision.
pub fn verify(path: &Path, expected: &str) -> Result<bool, HashError> {
  Ok(hash_file(path)?.matches(expected))
}

/// Path of the sidecar belonging to `file`: `<file>.md5`.
pub fn sidecar_path(file: &Path) -> PathBuf {
  let mut name = file.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(".");
  name.push(crate::consts::CHECKSUM_EXT);
  file.with_file_name(name)
}

/// Hash `file` and write `<hex>  <filename>` next to it.
pub fn write_sidecar(file: &Path) -> Result<ContentHash, HashError> {
  let hash = hash_file(file)?;
  let file_name = file
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default();
  let sidecar = sidecar_path(file);
  write_atomic(&sidecar, format!("{}  {}\n", hash, file_name).as_bytes()).map_err(|source| {
    HashError::WriteSidecar {
      path: sidecar.clone(),
      source,
    }
  })?;
  Ok(hash)
}

/// Outcome of checking a file against its sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidecarCheck {
  /// Digest in the sidecar matches the file.
  Valid,
  /// The sidecar is missing or unparseable.
  MissingSidecar,
  /// The file no longer matches its recorded digest.
  Mismatch { expected: String, actual: ContentHash },
}

/// Verify `file` against the digest recorded in its sidecar.
///
/// The sidecar names the file it describes; the digest is checked against the
/// file in the sidecar's own directory with that name.
pub fn verify_sidecar(file: &Path) -> Result<SidecarCheck, HashError> {
  let sidecar = sidecar_path(file);
  let content = match fs::read_to_string(&sidecar) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SidecarCheck::MissingSidecar),
    Err(source) => return Err(HashError::ReadFile { path: sidecar, source }),
  };

  let Some((expected, named)) = parse_sidecar(&content) else {
    return Ok(SidecarCheck::MissingSidecar);
  };

  let target = match sidecar.parent() {
    Some(dir) => dir.join(named),
    None => file.to_path_buf(),
  };
  let actual = hash_file(&target)?;
  if actual.matches(expected) {
    Ok(SidecarCheck::Valid)
  } else {
    Ok(SidecarCheck::Mismatch {
      expected: expected.to_string(),
      actual,
    })
  }
}

/// Split a `<hex>  <filename>` line. A leading `*` on the name (binary mode) is ignored.
fn parse_sidecar(content: &str) -> Option<(&str, &str)> {
  let line = content.lines().find(|l| !l.trim().is_empty())?;
  let (digest, name) = line.split_once(char::is_whitespace)?;
  let name = name.trim_start().trim_start_matches('*').trim_end();
  if digest.is_empty() || name.is_empty() {
    return None;
  }
  Some((digest, name))
}
