//! Shared helpers for library lifecycle tests.

use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pkg_lib::config::Config;
use pkg_lib::engine::Engine;
use pkg_lib::fetch::{Downloader, FetchError, Fetcher, VersionControl};
use tempfile::TempDir;

/// Serves canned bodies keyed by URL and counts requests.
#[derive(Clone, Default)]
pub struct FakeDownloader {
  bodies: HashMap<String, Vec<u8>>,
  pub calls: Rc<Cell<usize>>,
}

impl FakeDownloader {
  pub fn serve(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
    self.bodies.insert(url.to_string(), body.into());
    self
  }
}

impl Downloader for FakeDownloader {
  fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
    self.calls.set(self.calls.get() + 1);
    let body = self.bodies.get(url).ok_or_else(|| FetchError::Download {
      url: url.to_string(),
      message: "404 Not Found".to_string(),
    })?;
    fs::write(dest, body).unwrap();
    Ok(())
  }
}

pub struct OfflineVcs;

impl VersionControl for OfflineVcs {
  fn clone_ref(&self, repo: &str, _reference: &str, _dest: &Path) -> Result<(), FetchError> {
    Err(FetchError::Git {
      action: "clone",
      repo: repo.to_string(),
      message: "offline".to_string(),
    })
  }

  fn update(&self, repo: &str, _reference: &str, _checkout: &Path) -> Result<(), FetchError> {
    Err(FetchError::Git {
      action: "fetch",
      repo: repo.to_string(),
      message: "offline".to_string(),
    })
  }
}

/// Isolated target root, scratch area and descriptor directory.
pub struct TestRoot {
  pub temp: TempDir,
}

impl TestRoot {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn root(&self) -> PathBuf {
    self.dir("root")
  }

  pub fn scratch(&self) -> PathBuf {
    self.dir("scratch")
  }

  pub fn descriptors(&self) -> PathBuf {
    self.dir("descriptors")
  }

  pub fn config(&self) -> Config {
    Config::new(self.root()).with_scratch_dir(self.scratch())
  }

  pub fn engine(&self) -> Engine {
    self.engine_with(FakeDownloader::default())
  }

  pub fn engine_with(&self, downloader: FakeDownloader) -> Engine {
    Engine::new(self.config()).with_fetcher(Fetcher::new(Box::new(downloader), Box::new(OfflineVcs)))
  }

  /// Write `<descriptors>/<file>.pkg`.
  pub fn descriptor(&self, file: &str, content: &str) -> PathBuf {
    let path = self.descriptors().join(format!("{}.pkg", file));
    fs::write(&path, content).unwrap();
    path
  }

  /// Path of `rel` under the target root, as recorded in ledgers.
  pub fn rooted(&self, rel: &str) -> String {
    format!("{}/{}", self.root().display(), rel)
  }

  /// Directories left behind in the scratch area.
  pub fn scratch_dirs(&self) -> Vec<PathBuf> {
    fs::read_dir(self.scratch())
      .unwrap()
      .flatten()
      .map(|e| e.path())
      .filter(|p| p.is_dir())
      .collect()
  }
}

/// Descriptor whose build writes each of `files` (relative to `$DESTDIR`).
pub fn writing_descriptor(name: &str, version: &str, files: &[&str]) -> String {
  with_build(name, version, &write_commands(name, files), "")
}

pub fn write_commands(name: &str, files: &[&str]) -> String {
  files
    .iter()
    .map(|f| format!("mkdir -p \"$(dirname \"$DESTDIR/{f}\")\" && echo {name} > \"$DESTDIR/{f}\""))
    .collect::<Vec<_>>()
    .join(" && ")
}

/// Descriptor with a single-command build and extra table fields.
pub fn with_build(name: &str, version: &str, build_cmd: &str, extra: &str) -> String {
  format!(
    r#"return {{
  name = "{name}",
  version = "{version}",
  {extra}
  build = function(ctx)
    ctx:sh([[{build_cmd}]])
  end,
}}
"#
  )
}
