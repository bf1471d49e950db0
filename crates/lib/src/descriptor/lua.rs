//! Lua runtime for descriptors and the `ctx` object handed to callbacks.
//!
//! `ctx` exposes the phase's directories and flags as fields and two methods:
//!
//! - `ctx:sh(cmd)` runs `/bin/sh -c cmd` in the phase working directory with
//!   the callback environment; output is appended to the phase log and a
//!   non-zero exit raises a Lua error.
//! - `ctx:log(msg)` appends a line to the phase log.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use mlua::prelude::*;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::{CallbackError, Phase};

/// Working directory and environment of one callback invocation.
#[derive(Debug, Clone, Default)]
pub struct CallbackEnv {
  pub cwd: PathBuf,
  /// Variables exported to `ctx:sh` on top of the inherited environment.
  pub vars: BTreeMap<String, String>,
}

impl CallbackEnv {
  pub fn new(cwd: impl Into<PathBuf>) -> Self {
    Self {
      cwd: cwd.into(),
      vars: BTreeMap::new(),
    }
  }

  pub fn with_var(mut self, key: &str, value: impl Into<String>) -> Self {
    self.vars.insert(key.to_string(), value.into());
    self
  }

  pub fn var(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }
}

struct CallbackCtx {
  env: CallbackEnv,
  log: PathBuf,
}

impl CallbackCtx {
  fn open_log(&self) -> std::io::Result<File> {
    OpenOptions::new().append(true).create(true).open(&self.log)
  }

  fn sh(&self, cmd: &str) -> LuaResult<()> {
    info!(cmd = %cmd, cwd = %self.env.cwd.display(), "executing command");
    let log = self.open_log().map_err(LuaError::external)?;
    let stderr = log.try_clone().map_err(LuaError::external)?;

    let status = Command::new("/bin/sh")
      .arg("-c")
      .arg(cmd)
      .current_dir(&self.env.cwd)
      .envs(&self.env.vars)
      .stdin(Stdio::null())
      .stdout(Stdio::from(log))
      .stderr(Stdio::from(stderr))
      .status()
      .map_err(|e| LuaError::external(format!("failed to spawn /bin/sh: {}", e)))?;

    if !status.success() {
      let code = status.code().map_or_else(|| "signal".to_string(), |c| c.to_string());
      return Err(LuaError::external(format!("command exited with {}: {}", code, cmd)));
    }
    Ok(())
  }
}

impl LuaUserData for CallbackCtx {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    for (field, var) in [
      ("name", "PKG_NAME"),
      ("version", "PKG_VERSION"),
      ("root", "PKG_ROOT"),
      ("srcdir", "SRCDIR"),
      ("destdir", "DESTDIR"),
      ("prefix", "PREFIX"),
      ("bindir", "BINDIR"),
      ("libdir", "LIBDIR"),
    ] {
      fields.add_field_method_get(field, move |_, this| Ok(this.env.var(var).map(str::to_string)));
    }
    fields.add_field_method_get("jobs", |_, this| {
      Ok(this.env.var("JOBS").and_then(|j| j.parse::<usize>().ok()))
    });
    fields.add_field_method_get("notest", |_, this| Ok(this.env.var("NOTEST").is_some()));
    fields.add_field_method_get("cwd", |_, this| Ok(this.env.cwd.to_string_lossy().to_string()));
  }

  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("sh", |_, this, cmd: String| this.sh(&cmd));

    methods.add_method("log", |_, this, msg: String| {
      let mut log = this.open_log().map_err(LuaError::external)?;
      writeln!(log, "{}", msg).map_err(LuaError::external)
    });
  }
}

/// Call `func(ctx)` with output captured to a log in `log_dir`.
pub(super) fn run_callback(
  lua: &Lua,
  func: &LuaFunction,
  phase: Phase,
  package: &str,
  env: &CallbackEnv,
  log_dir: &Path,
) -> Result<(), CallbackError> {
  let fail = |message: String, log: PathBuf| CallbackError { phase, message, log };

  let log = tempfile::Builder::new()
    .prefix(&format!("{}-{}.", package, phase))
    .suffix(".log")
    .tempfile_in(log_dir)
    .map_err(|e| fail(format!("cannot create log: {}", e), log_dir.to_path_buf()))?;

  debug!(package, %phase, log = %log.path().display(), "invoking callback");

  let ctx = CallbackCtx {
    env: env.clone(),
    log: log.path().to_path_buf(),
  };
  let result = lua
    .create_userdata(ctx)
    .and_then(|ud| func.call::<()>(ud));

  match result {
    Ok(()) => Ok(()),
    Err(e) => {
      let message = e.to_string();
      let path = retain_log(log, &message);
      warn!(package, %phase, log = %path.display(), "callback failed");
      Err(fail(message, path))
    }
  }
}

/// Append the failure to the log and keep the file on disk.
fn retain_log(log: NamedTempFile, message: &str) -> PathBuf {
  let path = log.path().to_path_buf();
  match log.keep() {
    Ok((mut file, kept)) => {
      let _ = writeln!(file, "\nerror: {}", message);
      kept
    }
    Err(_) => path,
  }
}
