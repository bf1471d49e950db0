//! Extraction of fetched source tarballs into a scratch source directory.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use super::ArchiveError;

/// Whether `name` looks like a tar-family archive this crate can unpack.
pub fn is_tar_archive(name: &str) -> bool {
  name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Unpack a source tarball into `dest`.
///
/// With `strip_first` set, the leading path component of every member is
/// dropped (e.g. `demo-1.0/Makefile` lands at `dest/Makefile`).
pub fn extract_source(archive_path: &Path, dest: &Path, strip_first: bool) -> Result<(), ArchiveError> {
  let name = archive_path.to_string_lossy();
  let file = File::open(archive_path).map_err(|source| ArchiveError::Read {
    path: archive_path.to_path_buf(),
    source,
  })?;
  let reader = BufReader::new(file);

  if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
    unpack_entries(Archive::new(GzDecoder::new(reader)), archive_path, dest, strip_first)
  } else {
    unpack_entries(Archive::new(reader), archive_path, dest, strip_first)
  }
}

fn unpack_entries<R: Read>(
  mut archive: Archive<R>,
  archive_path: &Path,
  dest: &Path,
  strip_first: bool,
) -> Result<(), ArchiveError> {
  let read_err = |source| ArchiveError::Read {
    path: archive_path.to_path_buf(),
    source,
  };
  let unpack_err = |member: &Path, source| ArchiveError::Unpack {
    member: member.display().to_string(),
    dest: dest.to_path_buf(),
    source,
  };

  fs::create_dir_all(dest).map_err(|e| unpack_err(Path::new(""), e))?;
  archive.set_preserve_permissions(true);

  for entry in archive.entries().map_err(read_err)? {
    let mut entry = entry.map_err(read_err)?;
    let path = entry.path().map_err(read_err)?.into_owned();

    if !strip_first {
      if !entry.unpack_in(dest).map_err(|e| unpack_err(&path, e))? {
        return Err(ArchiveError::UnsafeMember(path.display().to_string()));
      }
      continue;
    }

    let stripped: PathBuf = path.components().skip(1).collect();
    if stripped.as_os_str().is_empty() {
      continue;
    }
    if !stripped.components().all(|c| matches!(c, Component::Normal(_))) {
      return Err(ArchiveError::UnsafeMember(path.display().to_string()));
    }

    let dest_path = dest.join(&stripped);
    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent).map_err(|e| unpack_err(&path, e))?;
    }
    entry.unpack(&dest_path).map_err(|e| unpack_err(&path, e))?;
  }

  debug!(archive = %archive_path.display(), dest = %dest.display(), strip_first, "extracted source");
  Ok(())
}
