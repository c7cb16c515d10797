//! The per-tool flow: an explicit state machine over the three page loads.
//!
//! ```text
//! Empty ──intake──▶ Intake ──load_preview──▶ Ready ──submit──▶ Submitting ──▶ Done
//!   ▲                  │                       ▲                   │
//!   └──── rejection ───┘                       └──── failure ──────┘
//! ```
//!
//! Each page of the site is an independent route load; the only
//! state that crosses a page boundary lives in the injected
//! [`SessionStore`]. [`ToolFlow`] makes that protocol explicit: Intake
//! validates and persists the working set, Preview loads it back (or
//! redirects), Submitting runs the narrated progress and the real request
//! concurrently with the transition gated only on the real response, and
//! Download resolves the stored [`JobResult`] into a saved artifact.
//!
//! Failure transitions are part of the contract: a submission failure
//! returns to `Ready` with the working set intact (no re-upload), a missing
//! or corrupt session redirects to Intake, and nothing leaves `Done` except
//! [`ToolFlow::start_over`], which clears every session key for the tool.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{FlowConfig, SubmitOptions, ToolKind, ToolSpec};
use crate::error::{PipelineError, RejectReason};
use crate::model::{JobMetrics, JobResult, WorkingSet};
use crate::pipeline::download::{ArtifactSink, DownloadResolver, RetentionCountdown};
use crate::pipeline::select::SelectionState;
use crate::pipeline::submit::{ConversionClient, ServerAck};
use crate::pipeline::thumbnail::{RenderedPreview, ThumbnailRenderer};
use crate::pipeline::validate::{self, IncomingFile};
use crate::progress::{Narrator, ProgressObserver};
use crate::session::{self, SessionStore};

/// Where a flow currently stands. One phase is active at a time; no two
/// phases ever mutate the working set concurrently, so the single-writer
/// invariant is enforced by these transitions rather than by a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Intake,
    Ready,
    Submitting,
    Done,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Empty => "Empty",
            Phase::Intake => "Intake",
            Phase::Ready => "Ready",
            Phase::Submitting => "Submitting",
            Phase::Done => "Done",
        }
    }
}

/// What intake did with a batch.
#[derive(Debug, Default)]
pub struct IntakeReport {
    pub accepted: usize,
    /// `(file name, reason)` per rejection; under the fail-fast policy at
    /// most one entry.
    pub rejected: Vec<(String, RejectReason)>,
}

/// Whether the Preview page can stay up after a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterRemoval {
    Stay,
    /// The set fell below the tool's minimum — go back to Intake.
    RedirectToIntake,
}

/// One tool's conversion-session pipeline.
pub struct ToolFlow {
    spec: ToolSpec,
    config: FlowConfig,
    store: Arc<dyn SessionStore>,
    renderer: ThumbnailRenderer,
    client: ConversionClient,
    resolver: DownloadResolver,
    observer: Option<Arc<dyn ProgressObserver>>,
    phase: Phase,
    working: WorkingSet,
    selection: SelectionState,
}

impl ToolFlow {
    pub fn new(
        kind: ToolKind,
        config: FlowConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, PipelineError> {
        let spec = ToolSpec::of(kind);
        let client = ConversionClient::new(config.api_base_url.clone())?;
        let resolver = DownloadResolver::with_client(client.http(), config.api_base_url.clone());
        let renderer = ThumbnailRenderer::new(&config);
        Ok(ToolFlow {
            spec,
            config,
            store,
            renderer,
            client,
            resolver,
            observer: None,
            phase: Phase::Empty,
            working: WorkingSet::new(),
            selection: SelectionState::new(),
        })
    }

    /// Replace the renderer — tests use [`ThumbnailRenderer::detached`].
    pub fn with_renderer(mut self, renderer: ThumbnailRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Receive narrated-progress snapshots during submission.
    pub fn progress_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn working(&self) -> &WorkingSet {
        &self.working
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    // ── Intake ────────────────────────────────────────────────────────────

    /// Validate a batch of candidate files, render previews for the
    /// accepted ones, and persist the working set.
    ///
    /// Count-window violations are reported before any per-file work.
    /// A rejection never discards entries accepted before it; the phase
    /// only falls back to `Empty` when nothing at all was accepted.
    pub async fn intake(&mut self, files: Vec<IncomingFile>) -> Result<IntakeReport, PipelineError> {
        self.require_phase("intake", &[Phase::Empty, Phase::Intake])?;

        let held = if self.spec.accumulate { self.working.len() } else { 0 };
        let incoming = files.len();
        if held + incoming > self.spec.max_files {
            return Err(PipelineError::TooManyFiles {
                max: self.spec.max_files,
                got: held + incoming,
            });
        }
        // Tools that take the whole batch at once (merge) refuse a fresh
        // batch below their minimum up front.
        if !self.spec.accumulate && incoming < self.spec.min_files {
            self.phase = Phase::Empty;
            return Err(PipelineError::TooFewFiles {
                min: self.spec.min_files,
                got: incoming,
            });
        }
        if !self.spec.accumulate {
            self.working = WorkingSet::new();
        }

        let outcome = validate::validate_batch(files, &self.spec, self.spec.intake_policy);
        let report = IntakeReport {
            accepted: outcome.accepted.len(),
            rejected: outcome.rejected,
        };

        // Covers render a few at a time; failures degrade to a missing
        // preview and intake never blocks on the engine.
        let renderer = &self.renderer;
        let rendered: Vec<_> = stream::iter(outcome.accepted)
            .map(|mut entry| async move {
                if let Some(cover) = renderer
                    .render_cover(&entry.mime_type, entry.payload.clone())
                    .await
                {
                    entry.thumbnail = Some(cover.png);
                    entry.page_count = Some(cover.page_count);
                }
                entry
            })
            .buffered(4)
            .collect()
            .await;
        for entry in rendered {
            self.working.push(entry);
        }

        if self.working.is_empty() {
            self.phase = Phase::Empty;
            if let Some((name, reason)) = report.rejected.first() {
                return Err(PipelineError::FileRejected {
                    name: name.clone(),
                    reason: reason.clone(),
                });
            }
            return Ok(report);
        }

        self.persist_working()?;
        self.phase = Phase::Intake;
        info!(
            tool = %self.spec.kind,
            accepted = report.accepted,
            rejected = report.rejected.len(),
            queued = self.working.len(),
            "intake complete"
        );
        Ok(report)
    }

    /// Whether the Intake page may navigate to Preview.
    pub fn proceed_to_preview(&self) -> Result<(), PipelineError> {
        if self.working.len() < self.spec.min_files {
            return Err(PipelineError::TooFewFiles {
                min: self.spec.min_files,
                got: self.working.len(),
            });
        }
        Ok(())
    }

    // ── Preview ───────────────────────────────────────────────────────────

    /// The Preview page's load: restore the working set from the session.
    ///
    /// A missing, unparsable, or empty session is a hard redirect to Intake
    /// ([`PipelineError::redirects_to_intake`]) — never a partial render.
    pub fn load_preview(&mut self) -> Result<(), PipelineError> {
        let ws: WorkingSet = session::load(self.store.as_ref(), self.spec.working_key)?;
        if ws.is_empty() {
            return Err(PipelineError::SessionMissing {
                key: self.spec.working_key.to_string(),
            });
        }
        self.working = ws;
        self.selection = SelectionState::all_of(&self.working);
        self.phase = Phase::Ready;
        debug!(tool = %self.spec.kind, files = self.working.len(), "preview loaded");
        Ok(())
    }

    pub fn toggle(&mut self, id: &str) {
        self.selection.toggle(&self.working, id);
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(&self.working);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Flip one page of a paged entry (split-style tools).
    pub fn toggle_page(&mut self, id: &str, page: usize) -> bool {
        match self.working.get(id) {
            Some(entry) => self.selection.toggle_page(entry, page),
            None => false,
        }
    }

    pub fn select_all_pages(&mut self, id: &str) -> bool {
        match self.working.get(id) {
            Some(entry) => self.selection.select_all_pages(entry),
            None => false,
        }
    }

    /// Remove an entry from the set (and the session). Dropping below the
    /// tool's minimum sends the user back to Intake.
    pub fn remove(&mut self, id: &str) -> Result<AfterRemoval, PipelineError> {
        self.selection.remove(&mut self.working, id);
        self.persist_working()?;
        if self.working.len() < self.spec.min_files {
            self.phase = Phase::Empty;
            return Ok(AfterRemoval::RedirectToIntake);
        }
        Ok(AfterRemoval::Stay)
    }

    /// Stable reorder of the working set (merge page order).
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), PipelineError> {
        self.working.reorder(from, to);
        self.persist_working()
    }

    /// Render the leading pages of one entry for page-selection UIs.
    /// On-demand only — previews are never persisted into the session.
    pub async fn preview_pages(&self, id: &str) -> Option<RenderedPreview> {
        if !self.spec.paged_preview {
            return None;
        }
        let entry = self.working.get(id)?;
        self.renderer.render_preview(entry.payload.clone()).await
    }

    // ── Submission ────────────────────────────────────────────────────────

    /// Submit the selected entries. The narrated progress plays on its own
    /// task; only the real response decides the outcome. On failure the
    /// phase returns to `Ready` with the working set untouched, so the user
    /// retries without re-uploading.
    pub async fn submit(&mut self, options: &SubmitOptions) -> Result<JobResult, PipelineError> {
        self.require_phase("submit", &[Phase::Ready])?;

        let selected = self.selection.selected_entries(&self.working);
        if selected.is_empty() {
            return Err(PipelineError::EmptySelection { unit: "file" });
        }
        if selected.len() < self.spec.min_files {
            return Err(PipelineError::TooFewFiles {
                min: self.spec.min_files,
                got: selected.len(),
            });
        }
        if self.spec.kind == ToolKind::Split
            && options.pages.as_ref().map(|p| p.is_empty()).unwrap_or(true)
        {
            return Err(PipelineError::EmptySelection { unit: "page" });
        }

        let file_count = selected.len();
        let total_size: u64 = selected.iter().map(|e| e.size).sum();
        let first_page_count = selected.first().and_then(|e| e.page_count);

        self.phase = Phase::Submitting;
        let narrator = Narrator::start(self.spec.progress_script());
        if let Some(observer) = &self.observer {
            forward_progress(&narrator, Arc::clone(observer));
        }

        let outcome = self.client.submit(&self.spec, &selected, options).await;
        drop(selected);

        match outcome {
            Ok(ack) => {
                narrator.complete("Complete!");
                let metrics = self.build_metrics(&ack, file_count, total_size, first_page_count, options);
                let result = JobResult {
                    job_id: ack.job_id,
                    download_url: ack.download_url,
                    message: ack.message,
                    metrics,
                };
                if let Err(e) = self.persist_result(&result, options) {
                    // The job succeeded remotely but the hand-off channel is
                    // broken; fall back to Ready so the user can act.
                    self.phase = Phase::Ready;
                    return Err(e);
                }
                self.phase = Phase::Done;
                info!(tool = %self.spec.kind, files = file_count, "submission succeeded");
                Ok(result)
            }
            Err(e) => {
                narrator.halt();
                self.phase = Phase::Ready;
                warn!(tool = %self.spec.kind, error = %e, "submission failed, working set preserved");
                Err(e)
            }
        }
    }

    // ── Download ──────────────────────────────────────────────────────────

    /// The Download page's load: restore the job result from the session.
    /// Missing or unusable results redirect to Intake.
    pub fn load_download(&mut self) -> Result<JobResult, PipelineError> {
        let result: JobResult = session::load(self.store.as_ref(), self.spec.result_key)?;
        if !result.is_fetchable() {
            return Err(PipelineError::SessionMissing {
                key: self.spec.result_key.to_string(),
            });
        }
        self.phase = Phase::Done;
        Ok(result)
    }

    /// Fetch the finished artifact and hand it to the sink. A failure here
    /// leaves the job result valid — the action can simply be retried.
    pub async fn download_artifact(
        &self,
        result: &JobResult,
        sink: &dyn ArtifactSink,
    ) -> Result<PathBuf, PipelineError> {
        let url = self
            .spec
            .artifact_url(
                &self.config.api_base_url,
                result.job_id.as_deref(),
                result.download_url.as_deref(),
            )
            .ok_or_else(|| PipelineError::BadResponse {
                detail: "job result has no artifact locator".into(),
            })?;
        let artifact = self
            .resolver
            .fetch_artifact(&url, self.spec.default_artifact_name)
            .await?;
        sink.deliver(&artifact)
    }

    /// The informational retention countdown for the Download page.
    pub fn retention(&self) -> RetentionCountdown {
        RetentionCountdown::new(self.config.retention_secs)
    }

    /// Discard the whole session and return to `Empty` — the only way out
    /// of `Done`.
    pub fn start_over(&mut self) -> Result<(), PipelineError> {
        self.store.clear(self.spec.working_key)?;
        self.store.clear(self.spec.result_key)?;
        if let Some(key) = self.spec.options_key {
            self.store.clear(key)?;
        }
        self.working = WorkingSet::new();
        self.selection = SelectionState::new();
        self.phase = Phase::Empty;
        info!(tool = %self.spec.kind, "session cleared");
        Ok(())
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn require_phase(
        &self,
        operation: &'static str,
        allowed: &[Phase],
    ) -> Result<(), PipelineError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(PipelineError::WrongPhase {
                operation,
                phase: self.phase.name(),
            })
        }
    }

    fn persist_working(&self) -> Result<(), PipelineError> {
        session::save(self.store.as_ref(), self.spec.working_key, &self.working)
    }

    fn persist_result(
        &self,
        result: &JobResult,
        options: &SubmitOptions,
    ) -> Result<(), PipelineError> {
        session::save(self.store.as_ref(), self.spec.result_key, result)?;
        if let (Some(key), Some(level)) = (self.spec.options_key, options.level) {
            session::save(self.store.as_ref(), key, &level)?;
        }
        Ok(())
    }

    fn build_metrics(
        &self,
        ack: &ServerAck,
        file_count: usize,
        total_size: u64,
        first_page_count: Option<usize>,
        options: &SubmitOptions,
    ) -> JobMetrics {
        match self.spec.kind {
            ToolKind::Merge => JobMetrics::Merge {
                file_count,
                page_count: ack.page_count,
                total_size,
            },
            ToolKind::Compress => JobMetrics::Compress {
                file_count,
                original_size: total_size,
                compressed_size: ack.compressed_size,
                saved_percentage: ack.saved_percentage.and_then(|p| u8::try_from(p).ok()),
                level: options.level.unwrap_or_default(),
            },
            ToolKind::Split => JobMetrics::Split {
                selected_pages: options.pages.clone().unwrap_or_default(),
                total_pages: first_page_count.or(ack.page_count).unwrap_or(0),
            },
            _ => JobMetrics::Convert {
                file_count,
                output: self.spec.output_format.to_string(),
            },
        }
    }
}

/// Pump narrator snapshots into the injected observer until settled.
fn forward_progress(narrator: &Narrator, observer: Arc<dyn ProgressObserver>) {
    let mut rx = narrator.subscribe();
    tokio::spawn(async move {
        observer.on_update(&rx.borrow().clone());
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow().clone();
            let settled = snapshot.settled;
            observer.on_update(&snapshot);
            if settled {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;

    fn flow(kind: ToolKind) -> (ToolFlow, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let flow = ToolFlow::new(kind, FlowConfig::default(), store.clone())
            .expect("flow")
            .with_renderer(ThumbnailRenderer::detached());
        (flow, store)
    }

    fn pdf(name: &str) -> IncomingFile {
        IncomingFile::new(name, "application/pdf", b"%PDF-1.4 sample".to_vec())
    }

    #[tokio::test]
    async fn merge_intake_needs_two_files() {
        let (mut flow, _) = flow(ToolKind::Merge);
        let err = flow.intake(vec![pdf("only.pdf")]).await.unwrap_err();
        assert!(matches!(err, PipelineError::TooFewFiles { min: 2, got: 1 }));
        assert_eq!(flow.phase(), Phase::Empty);
    }

    #[tokio::test]
    async fn merge_intake_caps_at_twenty() {
        let (mut flow, _) = flow(ToolKind::Merge);
        let batch: Vec<IncomingFile> = (0..21).map(|i| pdf(&format!("f{i}.pdf"))).collect();
        let err = flow.intake(batch).await.unwrap_err();
        assert!(matches!(err, PipelineError::TooManyFiles { max: 20, got: 21 }));
    }

    #[tokio::test]
    async fn intake_persists_and_preview_restores() {
        let (mut flow, store) = flow(ToolKind::Merge);
        flow.intake(vec![pdf("a.pdf"), pdf("b.pdf")]).await.expect("intake");
        assert_eq!(flow.phase(), Phase::Intake);
        flow.proceed_to_preview().expect("two files is enough");

        // A second flow instance plays the independently-loaded Preview page.
        let mut preview = ToolFlow::new(ToolKind::Merge, FlowConfig::default(), store)
            .expect("flow")
            .with_renderer(ThumbnailRenderer::detached());
        preview.load_preview().expect("session present");
        assert_eq!(preview.phase(), Phase::Ready);
        assert_eq!(preview.working().len(), 2);
        assert_eq!(preview.selection().len(), 2);
    }

    #[tokio::test]
    async fn preview_without_session_redirects() {
        let (mut flow, _) = flow(ToolKind::Merge);
        let err = flow.load_preview().unwrap_err();
        assert!(err.redirects_to_intake());
        assert_eq!(flow.phase(), Phase::Empty);
    }

    #[tokio::test]
    async fn rejected_only_batch_surfaces_a_blocking_error() {
        let (mut flow, _) = flow(ToolKind::Compress);
        let bad = IncomingFile::new("notes.txt", "text/plain", b"hello".to_vec());
        let err = flow.intake(vec![bad]).await.unwrap_err();
        assert!(matches!(err, PipelineError::FileRejected { .. }));
        assert_eq!(flow.phase(), Phase::Empty);
        assert!(flow.working().is_empty());
    }

    #[tokio::test]
    async fn partial_accept_keeps_earlier_files() {
        let (mut flow, _) = flow(ToolKind::PdfToWord);
        let report = flow
            .intake(vec![
                pdf("good.pdf"),
                IncomingFile::new("bad.txt", "text/plain", b"x".to_vec()),
                pdf("never-reached.pdf"),
            ])
            .await
            .expect("partial accept");
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(flow.working().len(), 1);
        assert_eq!(flow.phase(), Phase::Intake);
    }

    #[tokio::test]
    async fn accumulating_tool_appends_across_picks() {
        let (mut flow, _) = flow(ToolKind::PdfToWord);
        flow.intake(vec![pdf("one.pdf")]).await.expect("first pick");
        flow.intake(vec![pdf("two.pdf")]).await.expect("second pick");
        assert_eq!(flow.working().len(), 2);
    }

    #[tokio::test]
    async fn removal_below_minimum_redirects() {
        let (mut flow, _) = flow(ToolKind::Merge);
        flow.intake(vec![pdf("a.pdf"), pdf("b.pdf")]).await.expect("intake");
        flow.load_preview().expect("preview");

        let id = flow.working().entries[0].id.clone();
        let disposition = flow.remove(&id).expect("remove");
        assert_eq!(disposition, AfterRemoval::RedirectToIntake);
        assert_eq!(flow.phase(), Phase::Empty);
    }

    #[tokio::test]
    async fn removal_above_minimum_stays() {
        let (mut flow, _) = flow(ToolKind::Compress);
        flow.intake(vec![pdf("a.pdf"), pdf("b.pdf")]).await.expect("intake");
        flow.load_preview().expect("preview");

        let id = flow.working().entries[0].id.clone();
        assert_eq!(flow.remove(&id).expect("remove"), AfterRemoval::Stay);
        assert_eq!(flow.phase(), Phase::Ready);
        assert_eq!(flow.working().len(), 1);
    }

    #[tokio::test]
    async fn submit_is_gated_on_the_ready_phase() {
        let (mut flow, _) = flow(ToolKind::Merge);
        let err = flow.submit(&SubmitOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::WrongPhase { operation: "submit", .. }));
    }

    #[tokio::test]
    async fn split_submit_requires_a_page_selection() {
        let (mut flow, _) = flow(ToolKind::Split);
        flow.intake(vec![pdf("doc.pdf")]).await.expect("intake");
        flow.load_preview().expect("preview");
        let err = flow.submit(&SubmitOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptySelection { unit: "page" }));
        assert_eq!(flow.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn download_without_result_redirects() {
        let (mut flow, _) = flow(ToolKind::Compress);
        let err = flow.load_download().unwrap_err();
        assert!(err.redirects_to_intake());
    }

    #[tokio::test]
    async fn start_over_clears_every_key() {
        let (mut flow, store) = flow(ToolKind::Compress);
        flow.intake(vec![pdf("a.pdf")]).await.expect("intake");
        session::save(
            store.as_ref(),
            "pdfCompressResult",
            &JobResult {
                job_id: Some("j".into()),
                download_url: None,
                message: None,
                metrics: JobMetrics::Convert { file_count: 1, output: "pdf".into() },
            },
        )
        .expect("seed result");

        flow.start_over().expect("start over");
        assert_eq!(flow.phase(), Phase::Empty);
        assert!(flow.working().is_empty());
        assert!(store.load_raw("uploadedPdfFiles").expect("load").is_none());
        assert!(store.load_raw("pdfCompressResult").expect("load").is_none());
        assert!(store.load_raw("compressionLevel").expect("load").is_none());
    }

    #[tokio::test]
    async fn paged_preview_is_refused_for_flat_tools() {
        let (mut flow, _) = flow(ToolKind::Merge);
        flow.intake(vec![pdf("a.pdf"), pdf("b.pdf")]).await.expect("intake");
        let id = flow.working().entries[0].id.clone();
        assert!(flow.preview_pages(&id).await.is_none());
    }
}
