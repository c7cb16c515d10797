//! Artifact retrieval: fetch the finished file, resolve its name, save it.
//!
//! Filename resolution order: the `Content-Disposition` header's
//! `filename=` token (quotes stripped, no double-decoding) when present,
//! else the tool's documented default name. HTTP non-success and network
//! failure surface as distinct errors, and neither invalidates the stored
//! job result — the download button can always be retried.
//!
//! Saving goes through an injected [`ArtifactSink`]: the browser build
//! implements it as object-URL + anchor-click + revoke, the default
//! [`DirectorySink`] here as an atomic write (temp file + rename) so a
//! failed save never leaves a truncated artifact behind.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// A fetched artifact: its bytes and resolved filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Where a fetched artifact ends up.
pub trait ArtifactSink: Send + Sync {
    /// Persist the artifact and return its final location.
    fn deliver(&self, artifact: &Artifact) -> Result<PathBuf, PipelineError>;
}

static DISPOSITION_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"filename[^;=\n]*=(?:"([^"\n]*)"|'([^'\n]*)'|([^;\n]*))"#)
        .expect("static pattern compiles")
});

/// Extract the filename from a `Content-Disposition` header value.
///
/// Quotes are stripped; the value is otherwise taken as-is (no percent or
/// RFC 5987 decoding).
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let caps = DISPOSITION_FILENAME.captures(header)?;
    let raw = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str();
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Fetches finished artifacts from the conversion service.
#[derive(Debug, Clone)]
pub struct DownloadResolver {
    http: reqwest::Client,
    base_url: String,
}

impl DownloadResolver {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Network { reason: e.to_string() })?;
        Ok(DownloadResolver {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        DownloadResolver {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetch the artifact at `location` (absolute, or relative to the API
    /// base) and resolve its filename.
    pub async fn fetch_artifact(
        &self,
        location: &str,
        default_name: &str,
    ) -> Result<Artifact, PipelineError> {
        let url = if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), location)
        };
        info!(%url, "fetching artifact");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::Network { reason: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .map(|b| b.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "The file could not be downloaded.".to_string());
            warn!(status = code, %message, "artifact fetch rejected");
            return Err(PipelineError::DownloadRejected { status: code, message });
        }

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| default_name.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Network { reason: e.to_string() })?
            .to_vec();

        debug!(%filename, size = bytes.len(), "artifact fetched");
        Ok(Artifact { bytes, filename })
    }
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    error: String,
}

/// Saves artifacts into a directory, atomically.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::SaveFailed {
            path: dir.clone(),
            source: e,
        })?;
        Ok(DirectorySink { dir })
    }
}

impl ArtifactSink for DirectorySink {
    fn deliver(&self, artifact: &Artifact) -> Result<PathBuf, PipelineError> {
        // Server-provided names are untrusted: keep only the final path
        // component so a crafted filename cannot escape the directory.
        let name = Path::new(&artifact.filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!(".{name}.part"));

        std::fs::write(&tmp, &artifact.bytes).map_err(|e| PipelineError::SaveFailed {
            path: tmp.clone(),
            source: e,
        })?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(PipelineError::SaveFailed { path, source: e });
        }
        info!(path = %path.display(), "artifact saved");
        Ok(path)
    }
}

/// The one-hour retention countdown shown next to the download button.
///
/// Purely informational: it mirrors the server's retention policy but
/// nothing client-side acts on it — the download stays clickable at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCountdown {
    remaining: u64,
}

impl RetentionCountdown {
    pub fn new(secs: u64) -> Self {
        RetentionCountdown { remaining: secs }
    }

    /// The standard one-hour remote retention window.
    pub fn one_hour() -> Self {
        RetentionCountdown::new(3600)
    }

    /// Decrement by one second; call once per second from a UI timer.
    pub fn tick(&mut self) -> u64 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    /// `M:SS`, total minutes unrolled (a full hour shows as `60:00`).
    pub fn display(&self) -> String {
        format!("{}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}
