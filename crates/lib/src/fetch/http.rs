//! Network downloads.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::info;

use super::FetchError;

/// Downloads a URL to a local file.
pub trait Downloader {
  /// Write the body of `url` to `dest`, replacing any existing file.
  fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Blocking HTTP(S) downloader backed by `reqwest`.
///
/// The client is built per download; a builder failure is a download error.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
  connect_timeout: Duration,
}

impl Default for HttpDownloader {
  fn default() -> Self {
    Self::new()
  }
}

impl HttpDownloader {
  pub fn new() -> Self {
    Self {
      connect_timeout: Duration::from_secs(30),
    }
  }

  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = timeout;
    self
  }

  fn client(&self) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
      .user_agent(concat!("pkg/", env!("CARGO_PKG_VERSION")))
      .connect_timeout(self.connect_timeout)
      .timeout(None)
      .build()
  }
}

impl Downloader for HttpDownloader {
  fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
    let fail = |message: String| FetchError::Download {
      url: url.to_string(),
      message,
    };

    let client = self.client().map_err(|e| fail(e.to_string()))?;
    let mut response = client
      .get(url)
      .send()
      .and_then(|r| r.error_for_status())
      .map_err(|e| fail(e.to_string()))?;

    let dir = dest.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(|source| FetchError::Io {
      path: dir.to_path_buf(),
      source,
    })?;

    // Only a complete body is renamed over `dest`.
    let mut temp = NamedTempFile::new_in(dir).map_err(|source| FetchError::Io {
      path: dir.to_path_buf(),
      source,
    })?;
    let size = response.copy_to(&mut temp).map_err(|e| fail(e.to_string()))?;
    temp.persist(dest).map_err(|e| FetchError::Io {
      path: dest.to_path_buf(),
      source: e.error,
    })?;

    info!(url = %url, path = %dest.display(), size, "download complete");
    Ok(())
  }
}
