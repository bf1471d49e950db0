//! Archive codec.
//!
//! Packs a build tree into a single `tar.gz` artifact, unpacks it into a target
//! root, and enumerates member paths. The member list, not a walk of the target
//! root after extraction, is what the installed-file ledger records.
//!
//! Source tarballs fetched for a build are unpacked with [`extract_source`].

mod source;

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, EntryType};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub use source::{extract_source, is_tar_archive};

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to read archive {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write archive {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("failed to unpack {member} into {dest}: {source}")]
  Unpack {
    member: String,
    dest: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("refusing to replace {path}: archive has a {archive_kind} where a {existing_kind} exists")]
  TypeConflict {
    path: PathBuf,
    archive_kind: &'static str,
    existing_kind: &'static str,
  },

  #[error("archive member escapes destination: {0}")]
  UnsafeMember(String),
}

/// Packs and unpacks installable file trees.
pub trait ArchiveCodec {
  /// Format name, also the archive file extension.
  fn format(&self) -> &'static str;

  /// Pack the full contents of `source_dir` (dotfiles included) into `archive`.
  fn pack(&self, source_dir: &Path, archive: &Path) -> Result<(), ArchiveError>;

  /// Unpack `archive` into `dest`.
  fn unpack(&self, archive: &Path, dest: &Path) -> Result<(), ArchiveError>;

  /// Member paths with a leading `./` stripped and `prefix` prepended.
  ///
  /// Directories keep a trailing separator. Blank entries are omitted.
  fn list_members(&self, archive: &Path, prefix: &str) -> Result<Vec<String>, ArchiveError>;
}

/// Gzip-compressed tar archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGz;

impl TarGz {
  fn open(archive: &Path) -> Result<Archive<GzDecoder<BufReader<File>>>, ArchiveError> {
    let file = File::open(archive).map_err(|source| ArchiveError::Read {
      path: archive.to_path_buf(),
      source,
    })?;
    Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
  }
}

impl ArchiveCodec for TarGz {
  fn format(&self) -> &'static str {
    crate::consts::ARCHIVE_EXT
  }

  fn pack(&self, source_dir: &Path, archive: &Path) -> Result<(), ArchiveError> {
    let write_err = |source| ArchiveError::Write {
      path: archive.to_path_buf(),
      source,
    };

    let file = File::create(archive).map_err(write_err)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut count = 0usize;
    for entry in WalkDir::new(source_dir)
      .min_depth(1)
      .follow_links(false)
      .sort_by_file_name()
    {
      let entry = entry.map_err(|e| ArchiveError::Walk {
        path: source_dir.to_path_buf(),
        message: e.to_string(),
      })?;
      let rel = entry
        .path()
        .strip_prefix(source_dir)
        .map_err(|e| ArchiveError::Walk {
          path: entry.path().to_path_buf(),
          message: e.to_string(),
        })?;
      builder.append_path_with_name(entry.path(), rel).map_err(write_err)?;
      count += 1;
    }

    let encoder = builder.into_inner().map_err(write_err)?;
    let mut writer = encoder.finish().map_err(write_err)?;
    io::Write::flush(&mut writer).map_err(write_err)?;

    info!(archive = %archive.display(), entries = count, "packed archive");
    Ok(())
  }

  fn unpack(&self, archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dest).map_err(|source| ArchiveError::Unpack {
      member: String::new(),
      dest: dest.to_path_buf(),
      source,
    })?;

    let mut tar = Self::open(archive)?;
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let entries = tar.entries().map_err(|source| ArchiveError::Read {
      path: archive.to_path_buf(),
      source,
    })?;

    for entry in entries {
      let mut entry = entry.map_err(|source| ArchiveError::Read {
        path: archive.to_path_buf(),
        source,
      })?;
      let member = entry
        .path()
        .map_err(|source| ArchiveError::Read {
          path: archive.to_path_buf(),
          source,
        })?
        .into_owned();
      let Some(rel) = normalize_member(&member)? else {
        continue;
      };
      let target = dest.join(&rel);
      check_type_conflict(&target, entry.header().entry_type())?;

      let unpacked = entry.unpack_in(dest).map_err(|source| ArchiveError::Unpack {
        member: member.display().to_string(),
        dest: dest.to_path_buf(),
        source,
      })?;
      if !unpacked {
        return Err(ArchiveError::UnsafeMember(member.display().to_string()));
      }
    }

    debug!(archive = %archive.display(), dest = %dest.display(), "unpacked archive");
    Ok(())
  }

  fn list_members(&self, archive: &Path, prefix: &str) -> Result<Vec<String>, ArchiveError> {
    let prefix = if prefix.is_empty() { "/" } else { prefix };
    let mut tar = Self::open(archive)?;
    let read_err = |source| ArchiveError::Read {
      path: archive.to_path_buf(),
      source,
    };

    let mut members = Vec::new();
    for entry in tar.entries().map_err(read_err)? {
      let entry = entry.map_err(read_err)?;
      let path = entry.path().map_err(read_err)?;
      let Some(rel) = normalize_member(&path)? else {
        continue;
      };
      let mut line = format!("{}{}", prefix, rel.display());
      if entry.header().entry_type().is_dir() {
        line.push('/');
      }
      members.push(line);
    }
    Ok(members)
  }
}

/// Strip `./` and trailing separators; `None` for the archive root itself.
///
/// Ledgers hold one path per line, so a name with a line break is unsafe.
fn normalize_member(path: &Path) -> Result<Option<PathBuf>, ArchiveError> {
  let name = path.to_string_lossy();
  if name.contains(['\n', '\r']) {
    return Err(ArchiveError::UnsafeMember(name.escape_debug().to_string()));
  }
  let rel: PathBuf = path
    .components()
    .filter(|c| !matches!(c, Component::CurDir | Component::RootDir))
    .collect();
  Ok(if rel.as_os_str().is_empty() { None } else { Some(rel) })
}

/// Existing paths may only be replaced by an entry of a compatible kind.
///
/// A directory entry is satisfied by an existing directory or a symlink that
/// resolves to one; the symlink is left in place. Any other entry must not land
/// on a real directory.
fn check_type_conflict(target: &Path, kind: EntryType) -> Result<(), ArchiveError> {
  let Ok(existing) = fs::symlink_metadata(target) else {
    return Ok(());
  };

  if kind.is_dir() {
    if existing.is_dir() || (existing.file_type().is_symlink() && target.is_dir()) {
      return Ok(());
    }
    return Err(ArchiveError::TypeConflict {
      path: target.to_path_buf(),
      archive_kind: "directory",
      existing_kind: describe(&existing),
    });
  }

  if existing.is_dir() {
    return Err(ArchiveError::TypeConflict {
      path: target.to_path_buf(),
      archive_kind: if kind.is_symlink() { "symlink" } else { "file" },
      existing_kind: "directory",
    });
  }
  Ok(())
}

fn describe(meta: &fs::Metadata) -> &'static str {
  if meta.file_type().is_symlink() {
    "symlink"
  } else if meta.is_dir() {
    "directory"
  } else {
    "file"
  }
}
