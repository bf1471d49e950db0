//! Lifecycle engine.
//!
//! Orchestrates the three per-package state machines:
//!
//! - build: `Loaded → Sourced → Built → Archived → Stored`
//! - install: `Loaded → PreInstall → Extracted → Ledgered → PostInstalled`
//! - uninstall: `Loaded → PreUninstall → FilesRemoved → DirsRemoved → LedgerCleared → PostUninstalled`
//!
//! A failure aborts the package and leaves state as of the last completed
//! stage. Nothing is rolled back; reruns rely on the cache and ledger checks
//! to skip completed work. There is no cross-process locking.

mod build;
mod install;
pub mod types;
mod uninstall;

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveCodec, TarGz};
use crate::cache::BuildCache;
use crate::config::Config;
use crate::consts::{BINDIR, LIBDIR, PREFIX};
use crate::descriptor::{CallbackEnv, Descriptor, Phase};
use crate::fetch::Fetcher;
use crate::ledger::Ledgers;

pub use types::*;

pub struct Engine {
  config: Config,
  cache: BuildCache,
  ledgers: Ledgers,
  fetcher: Fetcher,
  codec: Box<dyn ArchiveCodec>,
}

impl Engine {
  pub fn new(config: Config) -> Self {
    Self {
      cache: BuildCache::new(&config),
      ledgers: Ledgers::new(&config),
      fetcher: Fetcher::default(),
      codec: Box::new(TarGz),
      config,
    }
  }

  pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
    self.fetcher = fetcher;
    self
  }

  pub fn with_codec(mut self, codec: Box<dyn ArchiveCodec>) -> Self {
    self.codec = codec;
    self
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn cache(&self) -> &BuildCache {
    &self.cache
  }

  pub fn ledgers(&self) -> &Ledgers {
    &self.ledgers
  }

  /// Installed packages with the version their current pointer resolves to.
  pub fn installed(&self) -> Result<Vec<InstalledPackage>, EngineError> {
    self
      .ledgers
      .installed()?
      .into_iter()
      .map(|name| {
        let version = self.cache.current_version(&name)?;
        Ok(InstalledPackage { name, version })
      })
      .collect()
  }

  /// Ledger entries of an installed package, `None` when not installed.
  pub fn files(&self, name: &str) -> Result<Option<Vec<String>>, EngineError> {
    Ok(self.ledgers.read(name)?)
  }

  /// Current built version of `name`, if any.
  pub fn current_version(&self, name: &str) -> Result<Option<String>, EngineError> {
    Ok(self.cache.current_version(name)?)
  }

  /// Load the descriptor the current pointer of `name` resolves to.
  fn load_current(&self, name: &str) -> Result<Option<Descriptor>, EngineError> {
    let path = self.cache.current_descriptor(name);
    if !path.exists() {
      return Ok(None);
    }
    Ok(Some(Descriptor::load(&path)?))
  }

  fn log_dir(&self) -> Result<&Path, EngineError> {
    let dir = &self.config.scratch_dir;
    fs::create_dir_all(dir).map_err(EngineError::io(dir))?;
    Ok(dir)
  }

  /// Run `phase` with the target root as working directory.
  fn run_hook(&self, descriptor: &Descriptor, phase: Phase) -> Result<bool, EngineError> {
    let env = self.callback_env(descriptor, self.config.root.clone());
    fs::create_dir_all(&self.config.root).map_err(EngineError::io(&self.config.root))?;
    Ok(descriptor.invoke(phase, &env, self.log_dir()?)?)
  }

  /// Base environment shared by every callback.
  fn callback_env(&self, descriptor: &Descriptor, cwd: PathBuf) -> CallbackEnv {
    let mut env = CallbackEnv::new(cwd)
      .with_var("PKG_NAME", descriptor.name.as_str())
      .with_var("PKG_VERSION", descriptor.version.as_str())
      .with_var("PKG_ROOT", self.config.root.to_string_lossy())
      .with_var("PREFIX", PREFIX)
      .with_var("BINDIR", BINDIR)
      .with_var("LIBDIR", LIBDIR);
    if self.config.disable_tests {
      env = env.with_var("NOTEST", "1");
    }
    if let Some(jobs) = self.config.jobs {
      env = env
        .with_var("JOBS", jobs.to_string())
        .with_var("MAKEFLAGS", format!("-j{}", jobs));
    }
    env
  }
}
