//! Package descriptors.
//!
//! A descriptor is a Lua chunk returning a table with the package identity,
//! its sources and its lifecycle callbacks:
//!
//! ```lua
//! return {
//!   name = "demo",
//!   version = "1.0",
//!   sources = { "https://example.org/demo-1.0.tar.gz::demo" },
//!   checksums = { "9f86d08..." },
//!   build = function(ctx)
//!     ctx:sh("make -C $SRCDIR/demo DESTDIR=$DESTDIR install")
//!   end,
//! }
//! ```
//!
//! Every load gets its own Lua VM, owned by the returned [`Descriptor`].
//! Dropping the descriptor unloads its callbacks.

mod lua;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::consts::CHECKSUM_SKIP;

pub use lua::CallbackEnv;

/// Errors raised while loading a descriptor. All of them happen before any
/// filesystem mutation.
#[derive(Debug, Error)]
pub enum DescriptorError {
  #[error("cannot read descriptor {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to evaluate descriptor {path}: {message}")]
  Eval { path: PathBuf, message: String },

  #[error("descriptor {path} must return a table")]
  NotATable { path: PathBuf },

  #[error("descriptor {path} is missing required field '{field}'")]
  MissingField { path: PathBuf, field: &'static str },

  #[error("descriptor {path} has invalid field '{field}': {message}")]
  InvalidField {
    path: PathBuf,
    field: &'static str,
    message: String,
  },
}

/// A lifecycle callback that failed.
#[derive(Debug, Error)]
#[error("{phase} callback failed: {message} (log: {})", .log.display())]
pub struct CallbackError {
  pub phase: Phase,
  pub message: String,
  /// Retained output of the failed callback.
  pub log: PathBuf,
}

/// Lifecycle callbacks a descriptor may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
  Prepare,
  Build,
  PreInstall,
  PostInstall,
  PreUninstall,
  PostUninstall,
}

impl Phase {
  /// Name of the descriptor field holding this callback.
  pub fn field(self) -> &'static str {
    match self {
      Phase::Prepare => "prepare",
      Phase::Build => "build",
      Phase::PreInstall => "pre_install",
      Phase::PostInstall => "post_install",
      Phase::PreUninstall => "pre_uninstall",
      Phase::PostUninstall => "post_uninstall",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.field())
  }
}

/// The callback set. `build` is the only mandatory one.
#[derive(Debug)]
pub struct Callbacks {
  pub prepare: Option<LuaFunction>,
  pub build: LuaFunction,
  pub pre_install: Option<LuaFunction>,
  pub post_install: Option<LuaFunction>,
  pub pre_uninstall: Option<LuaFunction>,
  pub post_uninstall: Option<LuaFunction>,
}

impl Callbacks {
  pub fn get(&self, phase: Phase) -> Option<&LuaFunction> {
    match phase {
      Phase::Prepare => self.prepare.as_ref(),
      Phase::Build => Some(&self.build),
      Phase::PreInstall => self.pre_install.as_ref(),
      Phase::PostInstall => self.post_install.as_ref(),
      Phase::PreUninstall => self.pre_uninstall.as_ref(),
      Phase::PostUninstall => self.post_uninstall.as_ref(),
    }
  }
}

/// A loaded package descriptor.
pub struct Descriptor {
  pub name: String,
  pub version: String,
  pub sources: Vec<String>,
  /// Index-aligned with `sources`; may be shorter.
  pub checksums: Vec<String>,
  /// Canonical path of the descriptor file.
  pub path: PathBuf,
  callbacks: Callbacks,
  // Declared last so the callbacks above are released before the VM.
  lua: Lua,
}

impl fmt::Debug for Descriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Descriptor")
      .field("name", &self.name)
      .field("version", &self.version)
      .field("sources", &self.sources)
      .field("checksums", &self.checksums)
      .field("path", &self.path)
      .finish_non_exhaustive()
  }
}

impl Descriptor {
  /// Load and validate the descriptor at `path`.
  pub fn load(path: &Path) -> Result<Self, DescriptorError> {
    let path = dunce::canonicalize(path).map_err(|source| DescriptorError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let content = fs::read_to_string(&path).map_err(|source| DescriptorError::Read {
      path: path.clone(),
      source,
    })?;

    let lua = Lua::new();
    let value = lua
      .load(&content)
      .set_name(format!("@{}", path.display()))
      .eval::<LuaValue>()
      .map_err(|e| DescriptorError::Eval {
        path: path.clone(),
        message: e.to_string(),
      })?;
    let LuaValue::Table(table) = value else {
      return Err(DescriptorError::NotATable { path });
    };

    let fields = Fields { table: &table, path: &path };
    let name = fields.identifier("name")?;
    let version = fields.identifier("version")?;
    let sources = fields.string_list("sources")?;
    let checksums = fields.string_list("checksums")?;
    let callbacks = Callbacks {
      prepare: fields.function(Phase::Prepare)?,
      build: fields
        .function(Phase::Build)?
        .ok_or_else(|| DescriptorError::MissingField {
          path: path.clone(),
          field: "build",
        })?,
      pre_install: fields.function(Phase::PreInstall)?,
      post_install: fields.function(Phase::PostInstall)?,
      pre_uninstall: fields.function(Phase::PreUninstall)?,
      post_uninstall: fields.function(Phase::PostUninstall)?,
    };

    debug!(name = %name, version = %version, path = %path.display(), "loaded descriptor");
    Ok(Self {
      name,
      version,
      sources,
      checksums,
      path,
      callbacks,
      lua,
    })
  }

  /// Directory containing the descriptor; relative local sources resolve here.
  pub fn dir(&self) -> &Path {
    self.path.parent().unwrap_or(Path::new("/"))
  }

  pub fn has_callback(&self, phase: Phase) -> bool {
    self.callbacks.get(phase).is_some()
  }

  /// Expected digest for the source at `index`, if one is declared.
  ///
  /// Entries past the end of `checksums`, empty entries and `SKIP` are unchecked.
  pub fn checksum_for(&self, index: usize) -> Option<&str> {
    self
      .checksums
      .get(index)
      .map(|s| s.trim())
      .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(CHECKSUM_SKIP))
  }

  /// Run the callback for `phase` if the descriptor defines it.
  ///
  /// Output goes to a log file in `log_dir` that is deleted on success and
  /// kept on failure. Returns whether a callback ran.
  pub fn invoke(&self, phase: Phase, env: &CallbackEnv, log_dir: &Path) -> Result<bool, CallbackError> {
    let Some(func) = self.callbacks.get(phase) else {
      return Ok(false);
    };
    lua::run_callback(&self.lua, func, phase, &self.name, env, log_dir)?;
    Ok(true)
  }
}

struct Fields<'a> {
  table: &'a LuaTable,
  path: &'a Path,
}

impl Fields<'_> {
  fn invalid(&self, field: &'static str, message: impl Into<String>) -> DescriptorError {
    DescriptorError::InvalidField {
      path: self.path.to_path_buf(),
      field,
      message: message.into(),
    }
  }

  /// A non-empty string usable as a single path segment.
  fn identifier(&self, field: &'static str) -> Result<String, DescriptorError> {
    let value: Option<String> = self.table.get(field).map_err(|e| self.invalid(field, e.to_string()))?;
    let Some(value) = value.filter(|v| !v.is_empty()) else {
      return Err(DescriptorError::MissingField {
        path: self.path.to_path_buf(),
        field,
      });
    };
    if value == "." || value == ".." || value.contains('/') || value.chars().any(|c| c.is_whitespace() || c.is_control())
    {
      return Err(self.invalid(field, format!("'{}' is not a valid path segment", value)));
    }
    Ok(value)
  }

  fn string_list(&self, field: &'static str) -> Result<Vec<String>, DescriptorError> {
    let value: Option<Vec<String>> = self.table.get(field).map_err(|e| self.invalid(field, e.to_string()))?;
    Ok(value.unwrap_or_default())
  }

  fn function(&self, phase: Phase) -> Result<Option<LuaFunction>, DescriptorError> {
    let field = phase.field();
    let value: LuaValue = self.table.get(field).map_err(|e| self.invalid(field, e.to_string()))?;
    match value {
      LuaValue::Nil => Ok(None),
      LuaValue::Function(f) => Ok(Some(f)),
      other => Err(self.invalid(field, format!("expected function, got {}", other.type_name()))),
    }
  }
}
