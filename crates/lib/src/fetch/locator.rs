//! Source locator parsing.
//!
//! A locator is one of three variants, decided once by [`SourceSpec::parse`]:
//!
//! ```text
//! git+https://github.com/org/repo.git:v1.2   version control (repository + ref)
//! https://example.org/demo-1.0.tar.gz        network download
//! fix-build.patch | /etc/skel/.profile       local copy
//! ```
//!
//! Any locator may carry a `::<dest>` suffix naming the subdirectory a
//! tarball is extracted into.

use sha2::{Digest, Sha256};

use super::FetchError;

/// Where a source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
  /// `git[+transport]://host/path/repo:ref`
  VersionControl { repo: String, reference: String },
  /// `http(s)://` or `ftp://`
  Network { url: String },
  /// A path relative to the descriptor, or absolute under the target root.
  Local { path: String },
}

/// A parsed `sources` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
  pub raw: String,
  pub locator: Locator,
  /// Extraction subdirectory requested with `::<dest>`.
  pub dest: Option<String>,
}

impl SourceSpec {
  pub fn parse(raw: &str) -> Result<Self, FetchError> {
    let invalid = || FetchError::InvalidLocator(raw.to_string());

    let (body, dest) = match raw.rsplit_once("::") {
      Some((body, dest)) if !dest.is_empty() && !body.is_empty() => {
        if dest.contains('/') || dest == "." || dest == ".." {
          return Err(invalid());
        }
        (body, Some(dest.to_string()))
      }
      Some(_) => return Err(invalid()),
      None => (raw, None),
    };

    if body.trim().is_empty() {
      return Err(invalid());
    }

    let locator = match body.split_once("://") {
      Some((scheme, rest)) => parse_remote(scheme, rest, body).ok_or_else(invalid)?,
      None => Locator::Local { path: body.to_string() },
    };

    Ok(Self {
      raw: raw.to_string(),
      locator,
      dest,
    })
  }

  /// Canonical name of the fetched file or checkout inside the snapshot.
  pub fn local_name(&self) -> String {
    self.locator.local_name()
  }
}

fn parse_remote(scheme: &str, rest: &str, body: &str) -> Option<Locator> {
  let scheme_ok = !scheme.is_empty()
    && scheme
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
  if !scheme_ok || rest.is_empty() {
    return None;
  }

  if scheme == "git" || scheme.starts_with("git+") {
    let (host_path, tail) = rest.rsplit_once('/')?;
    let (name, reference) = tail.rsplit_once(':')?;
    if host_path.is_empty() || name.is_empty() || reference.is_empty() {
      return None;
    }
    let transport = scheme.strip_prefix("git+").unwrap_or(scheme);
    return Some(Locator::VersionControl {
      repo: format!("{}://{}/{}", transport, host_path, name),
      reference: reference.to_string(),
    });
  }

  match scheme {
    "http" | "https" | "ftp" => Some(Locator::Network { url: body.to_string() }),
    _ => None,
  }
}

impl Locator {
  pub fn local_name(&self) -> String {
    match self {
      Locator::VersionControl { repo, reference } => {
        let base = repo.rsplit('/').next().unwrap_or(repo);
        let base = base.strip_suffix(".git").unwrap_or(base);
        format!("{}-{}", base, reference.replace('/', "_"))
      }
      Locator::Network { url } => url_to_filename(url),
      Locator::Local { path } => {
        let trimmed = path.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
      }
    }
  }
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to hash of URL
/// if no suitable filename can be extracted.
fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split('?').next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '+' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("download_{}", &hex::encode(hasher.finalize())[..16])
}
