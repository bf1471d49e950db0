//! Source fetching.
//!
//! Resolves a [`SourceSpec`] into a file or checkout inside a package's source
//! snapshot directory. Transports are ports so the engine can run against fakes:
//!
//! - [`Downloader`] for network locators (real: [`HttpDownloader`])
//! - [`VersionControl`] for repository locators (real: [`GitCli`])
//! - local locators are plain copies

mod git;
mod http;
mod locator;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::util::fs::{copy_tree, remove_dir_if_exists, remove_if_exists};

pub use git::{GitCli, VersionControl};
pub use http::{Downloader, HttpDownloader};
pub use locator::{Locator, SourceSpec};

/// Errors that can occur during fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
  /// The locator fits none of the supported forms.
  #[error("invalid source locator: '{0}'")]
  InvalidLocator(String),

  /// HTTP request failed.
  #[error("failed to download {url}: {message}")]
  Download { url: String, message: String },

  /// A git command failed.
  #[error("git {action} failed for {repo}: {message}")]
  Git {
    action: &'static str,
    repo: String,
    message: String,
  },

  /// A local source does not exist.
  #[error("local source not found: {0}")]
  LocalNotFound(PathBuf),

  #[error("failed to write {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Directories a fetch resolves against.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
  /// Snapshot directory receiving the fetched entry.
  pub dest_dir: &'a Path,
  /// Target root; absolute local locators resolve beneath it.
  pub root: &'a Path,
  /// Directory of the descriptor; relative local locators resolve beneath it.
  pub descriptor_dir: &'a Path,
}

/// Dispatches each locator variant to its transport.
pub struct Fetcher {
  downloader: Box<dyn Downloader>,
  vcs: Box<dyn VersionControl>,
}

impl Default for Fetcher {
  fn default() -> Self {
    Self::new(Box::new(HttpDownloader::new()), Box::new(GitCli::default()))
  }
}

impl Fetcher {
  pub fn new(downloader: Box<dyn Downloader>, vcs: Box<dyn VersionControl>) -> Self {
    Self { downloader, vcs }
  }

  /// Fetch `spec` into `ctx.dest_dir` and return the local path.
  ///
  /// Network and local sources overwrite any existing entry of the same name.
  /// Repository checkouts are synchronized in place when they already exist.
  pub fn fetch(&self, spec: &SourceSpec, ctx: &FetchContext<'_>) -> Result<PathBuf, FetchError> {
    fs::create_dir_all(ctx.dest_dir).map_err(|source| FetchError::Io {
      path: ctx.dest_dir.to_path_buf(),
      source,
    })?;
    let dest = ctx.dest_dir.join(spec.local_name());

    match &spec.locator {
      Locator::VersionControl { repo, reference } => {
        if dest.join(".git").exists() {
          info!(repo = %repo, reference = %reference, "synchronizing checkout");
          self.vcs.update(repo, reference, &dest)?;
        } else {
          remove_dir_if_exists(&dest).map_err(|source| FetchError::Io {
            path: dest.clone(),
            source,
          })?;
          info!(repo = %repo, reference = %reference, "cloning");
          self.vcs.clone_ref(repo, reference, &dest)?;
        }
      }
      Locator::Network { url } => {
        info!(url = %url, "downloading");
        self.downloader.download(url, &dest)?;
      }
      Locator::Local { path } => {
        let src = if path.starts_with('/') {
          ctx.root.join(path.trim_start_matches('/'))
        } else {
          ctx.descriptor_dir.join(path)
        };
        copy_local(&src, &dest)?;
      }
    }

    debug!(source = %spec.raw, path = %dest.display(), "fetched");
    Ok(dest)
  }
}

fn copy_local(src: &Path, dest: &Path) -> Result<(), FetchError> {
  let meta = fs::symlink_metadata(src).map_err(|_| FetchError::LocalNotFound(src.to_path_buf()))?;
  let io_err = |source| FetchError::Io {
    path: dest.to_path_buf(),
    source,
  };

  if fs::symlink_metadata(dest).map(|m| m.is_dir()).unwrap_or(false) {
    remove_dir_if_exists(dest).map_err(io_err)?;
  } else {
    remove_if_exists(dest).map_err(io_err)?;
  }

  info!(src = %src.display(), dir = meta.is_dir(), "copying local source");
  copy_tree(src, dest).map_err(io_err)
}
