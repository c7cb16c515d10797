//! Submission: package the selected files as a multipart request and
//! interpret the JSON result.
//!
//! This is intentionally the only stage that talks to the conversion
//! endpoints. It never retries — a failed submission surfaces on the
//! Preview page with the working set intact, and retrying is the user's
//! call. No client-side timeout is set either: the conversion request is
//! bounded by the HTTP stack's own defaults, nothing stricter.
//!
//! On a non-success status the server's `{ "error": "..." }` message is
//! surfaced verbatim when present; an unparsable body falls back to a
//! generic message carrying the status code.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{SubmitOptions, ToolSpec};
use crate::error::PipelineError;
use crate::model::FileEntry;

/// The parsed success envelope. Field availability varies per tool; the
/// flow combines this with client-side knowledge into typed metrics.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAck {
    pub job_id: Option<String>,
    pub download_url: Option<String>,
    pub message: Option<String>,
    pub converted_name: Option<String>,
    pub file_count: Option<usize>,
    pub page_count: Option<usize>,
    pub total_original_size: Option<u64>,
    pub compressed_size: Option<u64>,
    /// Can be negative when compression grew the file.
    pub saved_percentage: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ServerErrorBody {
    error: String,
}

/// Posts conversion jobs to the tool endpoints.
#[derive(Debug, Clone)]
pub struct ConversionClient {
    http: reqwest::Client,
    base_url: String,
}

impl ConversionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Network { reason: e.to_string() })?;
        Ok(ConversionClient {
            http,
            base_url: base_url.into(),
        })
    }

    /// Share an existing client (connection pool) across components.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        ConversionClient {
            http,
            base_url: base_url.into(),
        }
    }

    /// The underlying pooled client, for components sharing connections.
    pub fn http(&self) -> reqwest::Client {
        self.http.clone()
    }

    /// Submit the selected entries to the tool's endpoint.
    ///
    /// Entries are appended in the given order — for merge this order is
    /// the output page order. A success response must carry at least one of
    /// `jobId` / `downloadUrl` or it is treated as malformed.
    pub async fn submit(
        &self,
        spec: &ToolSpec,
        entries: &[&FileEntry],
        options: &SubmitOptions,
    ) -> Result<ServerAck, PipelineError> {
        let mut form = Form::new();
        for entry in entries {
            form = form.part(spec.file_field, file_part(entry)?);
        }
        if let Some(level) = options.level {
            form = form.text("level", level.as_str());
        }
        if let Some(pages) = &options.pages {
            let encoded = serde_json::to_string(pages).unwrap_or_else(|_| "[]".to_string());
            form = form.text("pages", encoded);
        }

        let url = format!("{}{}", self.base_url.trim_end_matches('/'), spec.submit_path);
        info!(tool = %spec.kind, files = entries.len(), %url, "submitting conversion");

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Network { reason: e.to_string() })?;

        let status = response.status();
        if status.is_success() {
            let ack: ServerAck = response
                .json()
                .await
                .map_err(|e| PipelineError::BadResponse { detail: e.to_string() })?;
            if ack.job_id.is_none() && ack.download_url.is_none() {
                return Err(PipelineError::BadResponse {
                    detail: "response carries neither jobId nor downloadUrl".into(),
                });
            }
            debug!(job_id = ?ack.job_id, download_url = ?ack.download_url, "submission accepted");
            Ok(ack)
        } else {
            let code = status.as_u16();
            let message = response
                .json::<ServerErrorBody>()
                .await
                .ok()
                .map(|b| b.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("The conversion failed (HTTP {code})."));
            warn!(status = code, %message, "submission rejected");
            Err(PipelineError::ServerRejected { status: code, message })
        }
    }
}

fn file_part(entry: &FileEntry) -> Result<Part, PipelineError> {
    let mime = if entry.mime_type.is_empty() {
        "application/octet-stream"
    } else {
        entry.mime_type.as_str()
    };
    Part::bytes(entry.payload.clone())
        .file_name(entry.name.clone())
        .mime_str(mime)
        .map_err(|e| PipelineError::InvalidConfig(format!("invalid MIME type '{mime}': {e}")))
}
