//! Install orchestration.

use tracing::{info, warn};

use super::{Engine, EngineError, InstallOutcome, InstallStage, UninstallOutcome};
use crate::cache::ArchiveState;
use crate::descriptor::Phase;

impl Engine {
  /// Install the current built version of `name` into the target root.
  ///
  /// An existing installation is uninstalled first. A corrupt archive is
  /// deleted and the install aborts before touching the root.
  pub fn install(&self, name: &str) -> Result<InstallOutcome, EngineError> {
    let version = self
      .cache
      .current_version(name)?
      .ok_or_else(|| EngineError::NotBuilt { name: name.to_string() })?;

    let archive = self.cache.archive_path(name, &version);
    match self.cache.inspect(name, &version)? {
      ArchiveState::Valid => {}
      ArchiveState::Missing => return Err(EngineError::NotBuilt { name: name.to_string() }),
      ArchiveState::Corrupt { reason } => {
        warn!(name, version = %version, reason = %reason, "deleting corrupt build archive");
        self.cache.heal(name, &version)?;
        return Err(EngineError::CorruptArchive { path: archive, reason });
      }
    }

    let descriptor = self
      .load_current(name)?
      .ok_or_else(|| EngineError::NotBuilt { name: name.to_string() })?;
    let mut stages = vec![InstallStage::Loaded];

    let replaced = if self.ledgers.is_installed(name) {
      info!(name, "replacing existing installation");
      matches!(self.uninstall_with(name, Some(&descriptor))?, UninstallOutcome::Removed { .. })
    } else {
      false
    };

    info!(name, version = %version, root = %self.config.root.display(), "installing package");
    self.run_hook(&descriptor, Phase::PreInstall)?;
    stages.push(InstallStage::PreInstall);

    self.codec.unpack(&archive, &self.config.root)?;
    stages.push(InstallStage::Extracted);

    let entries = self.codec.list_members(&archive, &self.config.ledger_prefix())?;
    self.ledgers.write(name, &entries)?;
    stages.push(InstallStage::Ledgered);

    self.run_hook(&descriptor, Phase::PostInstall)?;
    stages.push(InstallStage::PostInstalled);

    Ok(InstallOutcome {
      name: name.to_string(),
      version,
      replaced,
      entries: entries.len(),
      stages,
    })
  }
}
