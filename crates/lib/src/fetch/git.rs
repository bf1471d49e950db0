//! Repository checkouts through the `git` executable.
//!
//! Checkouts are shallow and pinned to one ref. Submodules are initialized and
//! updated shallowly as well, which keeps repeated synchronizations from
//! accumulating history.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use super::FetchError;

/// Clones and synchronizes single-ref checkouts.
pub trait VersionControl {
  /// Fresh shallow, single-ref clone of `repo` at `reference` into `dest`.
  fn clone_ref(&self, repo: &str, reference: &str, dest: &Path) -> Result<(), FetchError>;

  /// Bring an existing checkout to the tip of `reference`.
  fn update(&self, repo: &str, reference: &str, checkout: &Path) -> Result<(), FetchError>;
}

#[derive(Debug, Clone)]
pub struct GitCli {
  program: String,
}

impl Default for GitCli {
  fn default() -> Self {
    Self {
      program: "git".to_string(),
    }
  }
}

impl GitCli {
  fn run(&self, action: &'static str, repo: &str, args: &[&str]) -> Result<(), FetchError> {
    debug!(program = %self.program, ?args, "running git");
    let output = Command::new(&self.program)
      .args(args)
      .env("GIT_TERMINAL_PROMPT", "0")
      .output()
      .map_err(|e| FetchError::Git {
        action,
        repo: repo.to_string(),
        message: e.to_string(),
      })?;

    if !output.status.success() {
      return Err(FetchError::Git {
        action,
        repo: repo.to_string(),
        message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    Ok(())
  }
}

impl VersionControl for GitCli {
  fn clone_ref(&self, repo: &str, reference: &str, dest: &Path) -> Result<(), FetchError> {
    let dest = dest.to_string_lossy();
    self.run(
      "clone",
      repo,
      &[
        "clone",
        "--depth",
        "1",
        "--single-branch",
        "--branch",
        reference,
        "--recurse-submodules",
        "--shallow-submodules",
        repo,
        &dest,
      ],
    )
  }

  fn update(&self, repo: &str, reference: &str, checkout: &Path) -> Result<(), FetchError> {
    let dir = checkout.to_string_lossy();
    self.run("fetch", repo, &["-C", &dir, "fetch", "--depth", "1", "origin", reference])?;
    self.run("checkout", repo, &["-C", &dir, "checkout", "--force", "FETCH_HEAD"])?;
    self.run(
      "submodule update",
      repo,
      &["-C", &dir, "submodule", "update", "--init", "--recursive", "--depth", "1"],
    )
  }
}
