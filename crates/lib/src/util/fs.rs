//! Filesystem primitives shared by the cache, ledger and fetcher.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Write `contents` to `path` through a temp file in the same directory and a rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  let dir = parent_of(path)?;
  fs::create_dir_all(dir)?;
  let mut temp = NamedTempFile::new_in(dir)?;
  temp.write_all(contents)?;
  temp.as_file().sync_all()?;
  temp.persist(path).map_err(|e| e.error)?;
  Ok(())
}

/// Point `link` at `target`, replacing whatever `link` was.
///
/// The new link is created under a temporary name and renamed over `link`, so
/// readers see either the old or the new target.
#[cfg(unix)]
pub fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
  let dir = parent_of(link)?;
  fs::create_dir_all(dir)?;

  // Reserve a unique name, then swap the placeholder file for the symlink.
  let placeholder = tempfile::Builder::new().prefix(".link-").tempfile_in(dir)?;
  let temp_link = placeholder.path().to_path_buf();
  placeholder.close()?;

  std::os::unix::fs::symlink(target, &temp_link)?;
  if let Err(e) = fs::rename(&temp_link, link) {
    let _ = fs::remove_file(&temp_link);
    return Err(e);
  }
  Ok(())
}

/// Copy a file or directory tree without carrying ownership metadata.
///
/// Symlinks are recreated as symlinks. Existing destination files are overwritten.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
  let meta = fs::symlink_metadata(src)?;
  if !meta.is_dir() {
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent)?;
    }
    return copy_entry(src, dest, &meta);
  }

  for entry in WalkDir::new(src).follow_links(false) {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dest.join(rel);
    let meta = entry.path().symlink_metadata()?;
    if meta.is_dir() {
      fs::create_dir_all(&target)?;
    } else {
      copy_entry(entry.path(), &target, &meta)?;
    }
  }
  Ok(())
}

fn copy_entry(src: &Path, dest: &Path, meta: &fs::Metadata) -> io::Result<()> {
  if meta.file_type().is_symlink() {
    let target = fs::read_link(src)?;
    remove_if_exists(dest)?;
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, dest)?;
    Ok(())
  } else {
    fs::copy(src, dest).map(|_| ())
  }
}

/// Remove a file or symlink, treating absence as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_file(path) {
    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

/// Remove a directory tree, treating absence as success.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_dir_all(path) {
    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

/// Whether two files exist and hold identical bytes.
pub fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
  let left = match fs::read(a) {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
    Err(e) => return Err(e),
  };
  match fs::read(b) {
    Ok(right) => Ok(left == right),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}

fn parent_of(path: &Path) -> io::Result<&Path> {
  path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{} has no parent", path.display())))
}
