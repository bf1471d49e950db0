//! Engine configuration.
//!
//! Every path the engine touches is derived from [`Config::root`], so tests can
//! run the whole lifecycle against a throwaway directory.

use std::path::{Path, PathBuf};

use crate::consts::APP_NAME;

/// Configuration threaded into [`crate::engine::Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Target root receiving installed files and holding all package state.
  pub root: PathBuf,
  /// Forwarded to callbacks as `NOTEST=1`.
  pub disable_tests: bool,
  /// Parallelism hint forwarded to callbacks as `JOBS` and `MAKEFLAGS`.
  pub jobs: Option<usize>,
  /// Directory in which randomized scratch directories are created.
  pub scratch_dir: PathBuf,
}

impl Default for Config {
  fn default() -> Self {
    Self::new("/")
  }
}

impl Config {
  /// A relative `root` is resolved against the current directory once, here.
  ///
  /// Ledger lines and `PKG_ROOT` are derived from the root and must stay valid
  /// from whatever directory a later invocation runs in.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      root: std::path::absolute(&root).unwrap_or(root),
      disable_tests: false,
      jobs: None,
      scratch_dir: std::env::temp_dir(),
    }
  }

  pub fn with_disable_tests(mut self, disable_tests: bool) -> Self {
    self.disable_tests = disable_tests;
    self
  }

  pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
    self.jobs = jobs;
    self
  }

  pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.scratch_dir = dir.into();
    self
  }

  /// `R/var/lib/pkg`: descriptor copies, current descriptor links, ledgers.
  pub fn lib_dir(&self) -> PathBuf {
    self.root.join("var").join("lib").join(APP_NAME)
  }

  /// `R/var/cache/pkg`: source snapshots, archives, sidecars.
  pub fn cache_dir(&self) -> PathBuf {
    self.root.join("var").join("cache").join(APP_NAME)
  }

  /// Resolve an absolute host-style path (e.g. `/usr/bin/x`) under the target root.
  pub fn rooted(&self, path: &str) -> PathBuf {
    self.root.join(path.trim_start_matches('/'))
  }

  /// Prefix prepended to archive member paths when recording them in a ledger.
  ///
  /// Always ends with exactly one separator: `/` for the host root,
  /// `/mnt/target/` otherwise.
  pub fn ledger_prefix(&self) -> String {
    let root = self.root.to_string_lossy();
    let trimmed = root.trim_end_matches('/');
    format!("{}/", trimmed)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}
