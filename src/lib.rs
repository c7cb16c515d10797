//! # pdfhub-client
//!
//! The client-side conversion-session pipeline behind a multi-tool document
//! site: merge, split, compress, PDF⇄image, PDF⇄Word. The actual document
//! manipulation lives behind remote HTTP endpoints; this crate owns
//! everything around them — validating and previewing user files, carrying
//! the working set across independently-loaded pages, driving the remote
//! job with narrated progress, and resolving the finished artifact into a
//! local save.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Validate  type/size gate, fail-fast batch policy
//!  ├─ 2. Thumbnail page-1 covers via pdfium (spawn_blocking, degrade-to-none)
//!  ├─ 3. Persist   working set → session store (base64-in-JSON, per-tool keys)
//!  ├─ 4. Select    entries / pages / order for the next operation
//!  ├─ 5. Submit    multipart POST + narrated progress (real response gates)
//!  └─ 6. Download  artifact fetch, Content-Disposition name, atomic save
//! ```
//!
//! The phases map onto three independent page loads — Intake,
//! Preview/Select, Download — with the injected [`session::SessionStore`]
//! as the only channel between them. [`flow::ToolFlow`] is the state
//! machine that enforces the page-transition protocol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfhub_client::{
//!     FlowConfig, IncomingFile, MemorySessionStore, SubmitOptions, ToolFlow, ToolKind,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemorySessionStore::new());
//!     let mut flow = ToolFlow::new(ToolKind::Merge, FlowConfig::default(), store)?;
//!
//!     flow.intake(vec![
//!         IncomingFile::from_path("a.pdf").await?,
//!         IncomingFile::from_path("b.pdf").await?,
//!     ])
//!     .await?;
//!     flow.load_preview()?;
//!     let result = flow.submit(&SubmitOptions::default()).await?;
//!     println!("merged {} files", result.metrics.file_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfhub` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfhub-client = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod flow;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CompressionLevel, FlowConfig, FlowConfigBuilder, SubmitOptions, ToolKind, ToolSpec,
};
pub use error::{PipelineError, RejectReason};
pub use flow::{AfterRemoval, IntakeReport, Phase, ToolFlow};
pub use model::{FileEntry, JobMetrics, JobResult, WorkingSet};
pub use pipeline::download::{
    filename_from_disposition, Artifact, ArtifactSink, DirectorySink, DownloadResolver,
    RetentionCountdown,
};
pub use pipeline::select::SelectionState;
pub use pipeline::submit::{ConversionClient, ServerAck};
pub use pipeline::thumbnail::{RenderedCover, RenderedPreview, ThumbnailRenderer};
pub use pipeline::validate::{BatchOutcome, IncomingFile, IntakePolicy, Verdict};
pub use progress::{
    Narrator, NoopProgressObserver, ProgressObserver, ProgressScript, ProgressSnapshot,
    ProgressStep,
};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
