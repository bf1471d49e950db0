//! Build orchestration.

use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{BuildOutcome, BuildStage, BuildStatus, Engine, EngineError};
use crate::archive::{extract_source, is_tar_archive};
use crate::descriptor::{Descriptor, Phase};
use crate::fetch::{FetchContext, SourceSpec};
use crate::util::fs::{copy_tree, remove_dir_if_exists, remove_if_exists};
use crate::util::hash;

impl Engine {
  /// Build the package described by the descriptor at `path`.
  ///
  /// A version whose archive is already built and verified is not rebuilt;
  /// only its descriptor copy and current pointers are refreshed.
  pub fn build(&self, path: &Path) -> Result<BuildOutcome, EngineError> {
    let descriptor = Descriptor::load(path)?;
    let name = descriptor.name.clone();
    let version = descriptor.version.clone();
    let mut stages = vec![BuildStage::Loaded];

    if self.cache.is_built(&name, &version)? {
      info!(name = %name, version = %version, "already built; relinking");
      self.cache.store_descriptor(&name, &version, &descriptor.path)?;
      self.cache.link_current(&name, &version)?;
      return Ok(BuildOutcome {
        archive: self.cache.archive_path(&name, &version),
        name,
        version,
        status: BuildStatus::Cached,
        stages,
      });
    }

    info!(name = %name, version = %version, "building package");
    let specs = descriptor
      .sources
      .iter()
      .map(|raw| SourceSpec::parse(raw))
      .collect::<Result<Vec<_>, _>>()?;

    let snapshot = self.cache.snapshot(&name, &version)?;
    self.fetch_sources(&descriptor, &specs, &snapshot)?;
    stages.push(BuildStage::Sourced);

    let srcdir = self.scratch_dir(&descriptor, "src")?;
    self.mirror_sources(&specs, &snapshot, srcdir.path())?;

    let builddir = self.scratch_dir(&descriptor, "build")?;
    let base = |cwd: &Path| {
      self
        .callback_env(&descriptor, cwd.to_path_buf())
        .with_var("SRCDIR", srcdir.path().to_string_lossy())
        .with_var("DESTDIR", builddir.path().to_string_lossy())
    };
    let log_dir = self.log_dir()?;
    descriptor.invoke(Phase::Prepare, &base(srcdir.path()), log_dir)?;
    descriptor.invoke(Phase::Build, &base(builddir.path()), log_dir)?;
    stages.push(BuildStage::Built);

    let srcdir_path = srcdir.path().to_path_buf();
    srcdir.close().map_err(EngineError::io(srcdir_path))?;

    let staged = self.cache.stage_archive(&name, &version)?;
    self.codec.pack(builddir.path(), staged.path())?;
    self.cache.commit_archive(&name, &version, staged)?;
    let builddir_path = builddir.path().to_path_buf();
    builddir.close().map_err(EngineError::io(builddir_path))?;
    stages.push(BuildStage::Archived);

    self.cache.store_descriptor(&name, &version, &descriptor.path)?;
    self.cache.link_current(&name, &version)?;
    stages.push(BuildStage::Stored);

    info!(name = %name, version = %version, format = self.codec.format(), "build complete");
    Ok(BuildOutcome {
      archive: self.cache.archive_path(&name, &version),
      name,
      version,
      status: BuildStatus::Built,
      stages,
    })
  }

  /// Bring every source into the snapshot, verifying declared checksums.
  ///
  /// A snapshot entry that already matches its checksum is reused. Entries
  /// without a checksum are always fetched again.
  fn fetch_sources(&self, descriptor: &Descriptor, specs: &[SourceSpec], snapshot: &Path) -> Result<(), EngineError> {
    let ctx = FetchContext {
      dest_dir: snapshot,
      root: &self.config.root,
      descriptor_dir: descriptor.dir(),
    };

    for (index, spec) in specs.iter().enumerate() {
      let expected = descriptor.checksum_for(index);
      let cached = snapshot.join(spec.local_name());

      match expected {
        Some(expected) if cached.is_file() => {
          if hash::verify(&cached, expected)? {
            debug!(source = %spec.raw, "cached source verified");
            continue;
          }
          warn!(source = %spec.raw, path = %cached.display(), "cached source fails its checksum; fetching again");
        }
        _ => {}
      }

      let fetched = self.fetcher.fetch(spec, &ctx)?;

      let Some(expected) = expected else {
        continue;
      };
      if !fetched.is_file() {
        warn!(source = %spec.raw, "checksum declared for a directory source; not verified");
        continue;
      }
      let actual = hash::hash_file(&fetched)?;
      if !actual.matches(expected) {
        remove_if_exists(&fetched).map_err(EngineError::io(&fetched))?;
        return Err(EngineError::Integrity {
          path: fetched,
          expected: expected.to_string(),
          actual: actual.0,
        });
      }
    }
    Ok(())
  }

  /// Copy the snapshot into `srcdir` and unpack tarball sources there.
  fn mirror_sources(&self, specs: &[SourceSpec], snapshot: &Path, srcdir: &Path) -> Result<(), EngineError> {
    copy_tree(snapshot, srcdir).map_err(EngineError::io(srcdir))?;

    for spec in specs {
      let local = spec.local_name();
      let mirrored = srcdir.join(&local);
      if !is_tar_archive(&local) || !mirrored.is_file() {
        continue;
      }
      match &spec.dest {
        Some(dest) => {
          let target = srcdir.join(dest);
          remove_dir_if_exists(&target).map_err(EngineError::io(&target))?;
          extract_source(&mirrored, &target, true)?;
        }
        None => extract_source(&mirrored, srcdir, false)?,
      }
    }
    Ok(())
  }

  fn scratch_dir(&self, descriptor: &Descriptor, kind: &str) -> Result<TempDir, EngineError> {
    let parent = self.log_dir()?;
    tempfile::Builder::new()
      .prefix(&format!("{}-{}-{}.", descriptor.name, descriptor.version, kind))
      .tempdir_in(parent)
      .map_err(EngineError::io(parent))
  }
}
