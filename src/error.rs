//! Error types for the pdfhub-client library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Blocking**: the current phase cannot proceed
//!   (working set below the tool's minimum, missing session, submission or
//!   download failure). Returned as `Err(PipelineError)` from the
//!   [`crate::flow::ToolFlow`] operations.
//!
//! * [`RejectReason`] — **Per-file**: one candidate file failed validation
//!   (wrong type, too large) but the intake as a whole continues. Carried in
//!   the validator's [`crate::pipeline::validate::Verdict`] and in the
//!   [`crate::flow::IntakeReport`] so callers can show an inline message
//!   without losing the files accepted before it.
//!
//! Thumbnail rendering failures appear in neither type: a document that will
//! not rasterise simply has no preview, which is not an error the user can
//! act on.

use std::path::PathBuf;
use thiserror::Error;

/// All blocking errors returned by the pdfhub-client pipeline.
///
/// Per-file validation failures use [`RejectReason`] and are reported inline
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// The tool needs more files than the working set holds.
    #[error("This tool needs at least {min} file(s) — you have {got}.")]
    TooFewFiles { min: usize, got: usize },

    /// The batch exceeds the tool's per-request ceiling.
    #[error("You can process up to {max} files at once — you selected {got}.")]
    TooManyFiles { max: usize, got: usize },

    /// A single candidate was rejected and the flow chose to surface it as
    /// a blocking error (nothing else was accepted).
    #[error("'{name}': {reason}")]
    FileRejected { name: String, reason: RejectReason },

    /// Could not read a candidate file from disk (CLI intake path).
    #[error("Could not read '{path}': {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Session errors ────────────────────────────────────────────────────
    /// The expected session key is absent or unparsable. Callers must
    /// redirect to Intake, never render a partially-initialised page.
    #[error("No active session under '{key}'. Start again from the upload step.")]
    SessionMissing { key: String },

    /// The backing store itself failed (I/O on the file-backed store).
    #[error("Session storage failed: {detail}")]
    Storage { detail: String },

    // ── Selection errors ──────────────────────────────────────────────────
    /// Proceed was requested with nothing selected.
    #[error("Nothing is selected — pick at least one {unit} to continue.")]
    EmptySelection { unit: &'static str },

    // ── Submission errors ─────────────────────────────────────────────────
    /// The server answered with a non-success status. `message` is the
    /// server-provided `error` string verbatim when one was present.
    #[error("{message}")]
    ServerRejected { status: u16, message: String },

    /// The request never produced an HTTP response (DNS, refused, reset).
    #[error("Could not reach the conversion service: {reason}")]
    Network { reason: String },

    /// A 2xx response whose body did not match the expected envelope.
    #[error("Unexpected response from the conversion service: {detail}")]
    BadResponse { detail: String },

    // ── Download errors ───────────────────────────────────────────────────
    /// Artifact retrieval failed with an HTTP status. Retrying is always
    /// possible; the stored job result stays valid.
    #[error("Download failed (HTTP {status}): {message}")]
    DownloadRejected { status: u16, message: String },

    /// The fetched artifact could not be written to its destination.
    #[error("Failed to save '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config / state errors ─────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation was called in a phase that does not allow it.
    #[error("'{operation}' is not available in the {phase} phase")]
    WrongPhase {
        operation: &'static str,
        phase: &'static str,
    },
}

impl PipelineError {
    /// Whether the page handling this error must redirect to the tool's
    /// Intake page instead of rendering. True exactly for the
    /// missing/corrupt-session case of the Preview and Download pages.
    pub fn redirects_to_intake(&self) -> bool {
        matches!(self, PipelineError::SessionMissing { .. })
    }
}

/// Why a single candidate file was rejected at intake.
///
/// Validation is synchronous and only looks at header metadata (declared
/// type, size) — never at file content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// Declared MIME type and extension both fall outside the tool's
    /// accepted set.
    #[error("wrong type — this tool accepts {accepted}")]
    WrongType { accepted: String },

    /// The file exceeds the tool's per-file byte limit.
    #[error("too large — {size_mb} MB is over the {limit_mb} MB limit")]
    TooLarge { size_mb: u64, limit_mb: u64 },
}

impl RejectReason {
    pub fn too_large(size: u64, limit: u64) -> Self {
        RejectReason::TooLarge {
            size_mb: size / (1024 * 1024),
            limit_mb: limit / (1024 * 1024),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_rejected_message_is_verbatim() {
        let e = PipelineError::ServerRejected {
            status: 500,
            message: "disk full".into(),
        };
        assert_eq!(e.to_string(), "disk full");
    }

    #[test]
    fn session_missing_redirects() {
        let e = PipelineError::SessionMissing {
            key: "uploadedPDFs".into(),
        };
        assert!(e.redirects_to_intake());
        assert!(e.to_string().contains("uploadedPDFs"));
    }

    #[test]
    fn submission_failures_do_not_redirect() {
        let e = PipelineError::Network {
            reason: "connection refused".into(),
        };
        assert!(!e.redirects_to_intake());
    }

    #[test]
    fn too_large_reports_megabytes() {
        let r = RejectReason::too_large(80 * 1024 * 1024, 50 * 1024 * 1024);
        let msg = r.to_string();
        assert!(msg.contains("80 MB"), "got: {msg}");
        assert!(msg.contains("50 MB"), "got: {msg}");
    }

    #[test]
    fn wrong_phase_display() {
        let e = PipelineError::WrongPhase {
            operation: "submit",
            phase: "Done",
        };
        assert!(e.to_string().contains("submit"));
        assert!(e.to_string().contains("Done"));
    }
}
