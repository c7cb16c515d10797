//! Intake validation: reject files by declared type and size before any
//! expensive work.
//!
//! Validation is synchronous and side-effect-free. It never reads file
//! content beyond header metadata — the declared MIME type, the extension,
//! and the size — so a 100 MB candidate costs the same to reject as a 1 KB
//! one. Per-file outcomes are a discriminated [`Verdict`] rather than
//! control flow, and the batch policy (stop at the first rejection, or
//! collect them all) is an explicit [`IntakePolicy`] parameter instead of
//! an accident of loop structure.

use std::path::Path;
use tracing::debug;

use crate::config::ToolSpec;
use crate::error::{PipelineError, RejectReason};
use crate::model::FileEntry;

/// A candidate file as handed to intake: name, declared type, raw bytes.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        IncomingFile {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a candidate from disk, guessing the MIME type from the
    /// extension the way a browser fills in `file.type`.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::UnreadableFile {
                path: path.to_path_buf(),
                source: e,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(IncomingFile { name, mime_type, bytes })
    }
}

/// The outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

/// How a batch reacts to a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntakePolicy {
    /// Stop at the first rejection. Files accepted before it stay queued.
    #[default]
    FailFast,
    /// Validate every candidate and report all rejections.
    CollectAll,
}

/// Accepted entries and rejections from one batch pass.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub accepted: Vec<FileEntry>,
    /// `(file name, reason)` per rejected candidate. Under
    /// [`IntakePolicy::FailFast`] this holds at most one element.
    pub rejected: Vec<(String, RejectReason)>,
}

/// Validate a single candidate against a tool's rules.
pub fn validate(name: &str, mime_type: &str, size: u64, spec: &ToolSpec) -> Verdict {
    if !type_matches(name, mime_type, spec) {
        return Verdict::Rejected(RejectReason::WrongType {
            accepted: spec.accepted_label(),
        });
    }
    if size > spec.max_file_bytes {
        return Verdict::Rejected(RejectReason::too_large(size, spec.max_file_bytes));
    }
    Verdict::Accepted
}

/// Validate a batch, building a [`FileEntry`] for each accepted candidate.
///
/// Previously-accepted entries are never discarded by a later rejection —
/// the fail-fast policy only stops *further* validation.
pub fn validate_batch(
    candidates: Vec<IncomingFile>,
    spec: &ToolSpec,
    policy: IntakePolicy,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for candidate in candidates {
        match validate(
            &candidate.name,
            &candidate.mime_type,
            candidate.bytes.len() as u64,
            spec,
        ) {
            Verdict::Accepted => {
                debug!(name = %candidate.name, size = candidate.bytes.len(), "accepted");
                outcome.accepted.push(FileEntry::new(
                    candidate.name,
                    candidate.mime_type,
                    candidate.bytes,
                ));
            }
            Verdict::Rejected(reason) => {
                debug!(name = %candidate.name, %reason, "rejected");
                outcome.rejected.push((candidate.name, reason));
                if policy == IntakePolicy::FailFast {
                    break;
                }
            }
        }
    }
    outcome
}

/// Accept by declared MIME type first; fall back to the extension when the
/// type is missing or generic, as browsers sometimes report for drag-drops.
fn type_matches(name: &str, mime_type: &str, spec: &ToolSpec) -> bool {
    let mime = mime_type.trim();
    if spec.accepted_mime.iter().any(|m| m.eq_ignore_ascii_case(mime)) {
        return true;
    }
    if mime.is_empty() || mime.eq_ignore_ascii_case("application/octet-stream") {
        if let Some(ext) = name.rsplit('.').next().filter(|e| *e != name) {
            return spec
                .accepted_ext
                .iter()
                .any(|a| a.eq_ignore_ascii_case(ext));
        }
    }
    false
}
