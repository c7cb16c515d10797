//! Per-tool parameters and flow-wide configuration.
//!
//! Every tool page follows the same intake → preview → download pattern;
//! everything that actually differs between tools fits in a [`ToolSpec`]
//! row — accepted types, size/count windows, endpoint and session-key
//! names, the narrated progress script. The pipeline itself is written
//! once and parameterised by the row.
//!
//! # Design choice: builder over constructor
//! [`FlowConfig`] follows the builder pattern: callers set only what they
//! care about and rely on documented defaults for the rest.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;
use crate::pipeline::validate::IntakePolicy;
use crate::progress::{ProgressScript, ProgressStep};

const MB: u64 = 1024 * 1024;

/// Every tool the pipeline can drive. One variant per site route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    Merge,
    Split,
    Compress,
    PdfToJpg,
    PdfToPng,
    JpgToPdf,
    PngToPdf,
    PdfToWord,
    WordToPdf,
}

impl ToolKind {
    pub fn all() -> &'static [ToolKind] {
        &[
            ToolKind::Merge,
            ToolKind::Split,
            ToolKind::Compress,
            ToolKind::PdfToJpg,
            ToolKind::PdfToPng,
            ToolKind::JpgToPdf,
            ToolKind::PngToPdf,
            ToolKind::PdfToWord,
            ToolKind::WordToPdf,
        ]
    }

    /// Route slug, as used in page paths (`/merge-pdf`, …).
    pub fn slug(&self) -> &'static str {
        match self {
            ToolKind::Merge => "merge-pdf",
            ToolKind::Split => "split-pdf",
            ToolKind::Compress => "compress-pdf",
            ToolKind::PdfToJpg => "pdf-to-jpg",
            ToolKind::PdfToPng => "pdf-to-png",
            ToolKind::JpgToPdf => "jpg-to-pdf",
            ToolKind::PngToPdf => "png-to-pdf",
            ToolKind::PdfToWord => "pdf-to-word",
            ToolKind::WordToPdf => "word-to-pdf",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Everything the pipeline needs to know about one tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub kind: ToolKind,
    /// MIME types the validator accepts outright.
    pub accepted_mime: &'static [&'static str],
    /// Extensions accepted when the declared MIME type is absent or generic.
    pub accepted_ext: &'static [&'static str],
    pub max_file_bytes: u64,
    /// Minimum files for a submittable working set (merge needs 2).
    pub min_files: usize,
    /// Per-request file ceiling, mirroring the server's upload limits.
    pub max_files: usize,
    /// Whether entry order is meaningful (merge, image→PDF page order).
    pub ordered: bool,
    /// Whether Preview offers per-page selection (split) or page previews.
    pub paged_preview: bool,
    /// Whether intake appends to an existing working set instead of
    /// replacing it (pdf-to-word accumulates across picks).
    pub accumulate: bool,
    /// How batch validation treats a rejection.
    pub intake_policy: IntakePolicy,
    /// Multipart field name the server expects for the file part(s).
    pub file_field: &'static str,
    pub submit_path: &'static str,
    /// Download route prefix for job-id tools; `None` when the server
    /// returns a ready-made `downloadUrl` instead.
    pub download_path: Option<&'static str>,
    pub working_key: &'static str,
    pub result_key: &'static str,
    /// Extra session key for tool options (compression level).
    pub options_key: Option<&'static str>,
    /// Fallback artifact name when the response carries no
    /// Content-Disposition filename.
    pub default_artifact_name: &'static str,
    /// Output format label for display metrics.
    pub output_format: &'static str,
}

impl ToolSpec {
    /// The static parameter row for a tool.
    pub fn of(kind: ToolKind) -> ToolSpec {
        match kind {
            ToolKind::Merge => ToolSpec {
                kind,
                accepted_mime: &["application/pdf"],
                accepted_ext: &["pdf"],
                max_file_bytes: 100 * MB,
                min_files: 2,
                max_files: 20,
                ordered: true,
                paged_preview: false,
                accumulate: false,
                intake_policy: IntakePolicy::FailFast,
                file_field: "files",
                submit_path: "/api/merge-pdf",
                download_path: None,
                working_key: "uploadedPDFs",
                result_key: "mergeResult",
                options_key: None,
                default_artifact_name: "merged-document.pdf",
                output_format: "pdf",
            },
            ToolKind::Split => ToolSpec {
                kind,
                accepted_mime: &["application/pdf"],
                accepted_ext: &["pdf"],
                max_file_bytes: 100 * MB,
                min_files: 1,
                max_files: 1,
                ordered: false,
                paged_preview: true,
                accumulate: false,
                intake_policy: IntakePolicy::FailFast,
                file_field: "file",
                submit_path: "/api/split-pdf",
                download_path: Some("/api/download-split"),
                working_key: "splitPdfFile",
                result_key: "splitPdfResult",
                options_key: None,
                default_artifact_name: "split-document.zip",
                output_format: "zip",
            },
            ToolKind::Compress => ToolSpec {
                kind,
                accepted_mime: &["application/pdf"],
                accepted_ext: &["pdf"],
                max_file_bytes: 100 * MB,
                min_files: 1,
                max_files: 10,
                ordered: false,
                paged_preview: false,
                accumulate: false,
                intake_policy: IntakePolicy::FailFast,
                file_field: "files",
                submit_path: "/api/compress-pdf-batch",
                download_path: Some("/api/download-compressed"),
                working_key: "uploadedPdfFiles",
                result_key: "pdfCompressResult",
                options_key: Some("compressionLevel"),
                default_artifact_name: "compressed-pdf.pdf",
                output_format: "pdf",
            },
            ToolKind::PdfToJpg => ToolSpec {
                kind,
                accepted_mime: &["application/pdf"],
                accepted_ext: &["pdf"],
                max_file_bytes: 100 * MB,
                min_files: 1,
                max_files: 1,
                ordered: false,
                paged_preview: true,
                accumulate: false,
                intake_policy: IntakePolicy::FailFast,
                file_field: "file",
                submit_path: "/api/pdf-to-jpg",
                download_path: Some("/api/download"),
                working_key: "pdfToJpgFile",
                result_key: "pdfJpgResult",
                options_key: None,
                default_artifact_name: "converted-images.zip",
                output_format: "jpg",
            },
            ToolKind::PdfToPng => ToolSpec {
                kind,
                accepted_mime: &["application/pdf"],
                accepted_ext: &["pdf"],
                max_file_bytes: 100 * MB,
                min_files: 1,
                max_files: 1,
                ordered: false,
                paged_preview: true,
                accumulate: false,
                intake_policy: IntakePolicy::FailFast,
                // The server's pdf-to-png route reads its single upload from
                // a field named `pdf`, unlike every other tool.
                file_field: "pdf",
                submit_path: "/api/pdf-to-png",
                download_path: Some("/api/download"),
                working_key: "pdfToPngFile",
                result_key: "pdfPngResult",
                options_key: None,
                default_artifact_name: "converted-images.zip",
                output_format: "png",
            },
            ToolKind::JpgToPdf => ToolSpec {
                kind,
                accepted_mime: &["image/jpeg"],
                accepted_ext: &["jpg", "jpeg"],
                max_file_bytes: 100 * MB,
                min_files: 1,
                max_files: 20,
                ordered: true,
                paged_preview: false,
                accumulate: false,
                intake_policy: IntakePolicy::FailFast,
                file_field: "files",
                submit_path: "/api/jpg-to-pdf",
                download_path: Some("/api/download-jpg-pdf"),
                working_key: "uploadedJpgImages",
                result_key: "jpgPdfResult",
                options_key: None,
                default_artifact_name: "converted-document.pdf",
                output_format: "pdf",
            },
            ToolKind::PngToPdf => ToolSpec {
                kind,
                accepted_mime: &["image/png"],
                accepted_ext: &["png"],
                max_file_bytes: 100 * MB,
                min_files: 1,
                max_files: 20,
                ordered: true,
                paged_preview: false,
                accumulate: false,
                intake_policy: IntakePolicy::FailFast,
                file_field: "files",
                submit_path: "/api/png-to-pdf",
                download_path: Some("/api/download-png-pdf"),
                working_key: "uploadedPngImages",
                result_key: "pngPdfResult",
                options_key: None,
                default_artifact_name: "converted-document.pdf",
                output_format: "pdf",
            },
            ToolKind::PdfToWord => ToolSpec {
                kind,
                accepted_mime: &["application/pdf"],
                accepted_ext: &["pdf"],
                // The OCR/reconstruction backend enforces a tighter cap than
                // the byte-shuffling tools.
                max_file_bytes: 50 * MB,
                min_files: 1,
                max_files: 10,
                ordered: false,
                paged_preview: true,
                accumulate: true,
                intake_policy: IntakePolicy::FailFast,
                file_field: "files",
                submit_path: "/api/pdf-to-word",
                download_path: Some("/api/download-word"),
                working_key: "uploadedPdfFiles",
                result_key: "pdfWordConvertResult",
                options_key: None,
                default_artifact_name: "converted-document.docx",
                output_format: "docx",
            },
            ToolKind::WordToPdf => ToolSpec {
                kind,
                accepted_mime: &[
                    "application/msword",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                ],
                accepted_ext: &["doc", "docx"],
                max_file_bytes: 50 * MB,
                min_files: 1,
                max_files: 10,
                ordered: false,
                paged_preview: false,
                accumulate: false,
                intake_policy: IntakePolicy::FailFast,
                file_field: "files",
                submit_path: "/api/word-to-pdf",
                download_path: Some("/api/download-word-pdf"),
                working_key: "uploadedWordFiles",
                result_key: "wordPdfResult",
                options_key: None,
                default_artifact_name: "converted-document.pdf",
                output_format: "pdf",
            },
        }
    }

    /// Human-readable accepted-formats list for rejection messages.
    pub fn accepted_label(&self) -> String {
        self.accepted_ext
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The narrated progress script played while the real request is in
    /// flight. Percentages top out below 100 — only the real response
    /// completes the bar.
    pub fn progress_script(&self) -> ProgressScript {
        let steps: &[(u8, &str, u64)] = match self.kind {
            ToolKind::Merge => &[
                (15, "Uploading documents...", 400),
                (35, "Processing PDFs...", 500),
                (55, "Combining pages...", 600),
                (75, "Optimizing output...", 400),
                (90, "Finalizing merge...", 300),
            ],
            ToolKind::Split => &[
                (15, "Uploading PDF to secure server...", 500),
                (35, "Analyzing document structure...", 600),
                (55, "Extracting selected pages...", 800),
                (75, "Building new PDF document...", 700),
                (90, "Finalizing your file...", 400),
            ],
            ToolKind::Compress => &[
                (15, "Uploading PDFs...", 400),
                (35, "Analyzing document structure...", 500),
                (55, "Optimizing images...", 700),
                (75, "Applying compression...", 500),
                (90, "Finalizing...", 300),
            ],
            ToolKind::PdfToWord => &[
                (15, "Uploading PDFs...", 400),
                (35, "Analyzing document structure...", 600),
                (55, "Extracting tables and text...", 800),
                (75, "Creating Word document...", 600),
                (90, "Finalizing...", 400),
            ],
            ToolKind::PdfToJpg | ToolKind::PdfToPng => &[
                (15, "Uploading document...", 400),
                (35, "Reading pages...", 500),
                (60, "Rendering images...", 700),
                (80, "Packaging output...", 400),
                (90, "Finalizing...", 300),
            ],
            ToolKind::JpgToPdf | ToolKind::PngToPdf => &[
                (15, "Uploading images...", 400),
                (35, "Reading images...", 500),
                (60, "Building PDF pages...", 700),
                (80, "Optimizing output...", 400),
                (90, "Finalizing...", 300),
            ],
            ToolKind::WordToPdf => &[
                (15, "Uploading documents...", 400),
                (35, "Reading document structure...", 600),
                (60, "Rendering pages...", 700),
                (80, "Optimizing output...", 400),
                (90, "Finalizing...", 300),
            ],
        };
        ProgressScript::new(
            "Preparing files...",
            steps
                .iter()
                .map(|&(percent, label, delay_ms)| ProgressStep {
                    percent,
                    label: label.to_string(),
                    delay_ms,
                })
                .collect(),
        )
    }

    /// Absolute artifact URL for a stored job result, or `None` when the
    /// result carries no locator at all.
    pub fn artifact_url(&self, base_url: &str, job_id: Option<&str>, download_url: Option<&str>) -> Option<String> {
        if let Some(url) = download_url {
            if url.starts_with("http://") || url.starts_with("https://") {
                return Some(url.to_string());
            }
            return Some(format!("{}{}", base_url.trim_end_matches('/'), url));
        }
        match (self.download_path, job_id) {
            (Some(prefix), Some(id)) => Some(format!(
                "{}{}/{}",
                base_url.trim_end_matches('/'),
                prefix,
                id
            )),
            _ => None,
        }
    }
}

/// Compression level for the compress tool. The wire value is the lowercase
/// name the server's `level` field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Light compression, keeps everything visually intact.
    Maximum,
    /// The default trade-off.
    #[default]
    Balanced,
    /// Smallest output, visible quality loss possible.
    Extreme,
}

impl CompressionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLevel::Maximum => "maximum",
            CompressionLevel::Balanced => "balanced",
            CompressionLevel::Extreme => "extreme",
        }
    }
}

impl std::str::FromStr for CompressionLevel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maximum" => Ok(CompressionLevel::Maximum),
            "balanced" => Ok(CompressionLevel::Balanced),
            "extreme" => Ok(CompressionLevel::Extreme),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown compression level '{other}' (expected maximum|balanced|extreme)"
            ))),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar options attached to a submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    /// Compression level (compress tool only).
    pub level: Option<CompressionLevel>,
    /// 1-indexed page numbers to extract (split tool only).
    pub pages: Option<Vec<usize>>,
}

/// Flow-wide configuration, shared by every tool.
///
/// Built via [`FlowConfig::builder()`] or [`FlowConfig::default()`].
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Base URL of the conversion API.
    pub api_base_url: String,
    /// Longest edge of a page-1 cover thumbnail, in pixels. Default: 400.
    ///
    /// Covers travel through the session store as base64, so they are kept
    /// small; the practical store capacity is tens of MB for the whole set.
    pub cover_max_edge: u32,
    /// Longest edge of a preview page render. Default: 800.
    pub preview_max_edge: u32,
    /// Pages rendered for a multi-page preview. Default: 5.
    ///
    /// Bounds both latency and memory on large documents; the page count
    /// itself is still reported in full.
    pub preview_page_cap: usize,
    /// Remote artifact retention communicated to the user. Default: 3600 s.
    /// Informational only — nothing client-side enforces it.
    pub retention_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            api_base_url: "http://localhost:5011".to_string(),
            cover_max_edge: 400,
            preview_max_edge: 800,
            preview_page_cap: 5,
            retention_secs: 3600,
        }
    }
}

impl FlowConfig {
    pub fn builder() -> FlowConfigBuilder {
        FlowConfigBuilder {
            config: FlowConfig::default(),
        }
    }
}

/// Builder for [`FlowConfig`].
#[derive(Debug)]
pub struct FlowConfigBuilder {
    config: FlowConfig,
}

impl FlowConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn cover_max_edge(mut self, px: u32) -> Self {
        self.config.cover_max_edge = px.clamp(50, 2000);
        self
    }

    pub fn preview_max_edge(mut self, px: u32) -> Self {
        self.config.preview_max_edge = px.clamp(100, 4000);
        self
    }

    pub fn preview_page_cap(mut self, pages: usize) -> Self {
        self.config.preview_page_cap = pages.max(1);
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FlowConfig, PipelineError> {
        let c = &self.config;
        if c.api_base_url.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "api_base_url must not be empty".into(),
            ));
        }
        if !c.api_base_url.starts_with("http://") && !c.api_base_url.starts_with("https://") {
            return Err(PipelineError::InvalidConfig(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                c.api_base_url
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_has_a_spec_row() {
        for &kind in ToolKind::all() {
            let spec = ToolSpec::of(kind);
            assert_eq!(spec.kind, kind);
            assert!(spec.min_files >= 1);
            assert!(spec.max_files >= spec.min_files);
            assert!(!spec.accepted_mime.is_empty());
            assert!(spec.submit_path.starts_with("/api/"));
            assert!(!spec.working_key.is_empty());
            assert!(!spec.result_key.is_empty());
        }
    }

    #[test]
    fn merge_requires_two_ordered_files() {
        let spec = ToolSpec::of(ToolKind::Merge);
        assert_eq!(spec.min_files, 2);
        assert!(spec.ordered);
        assert!(spec.download_path.is_none(), "merge downloads by URL");
    }

    #[test]
    fn pdf_to_word_has_the_tight_cap() {
        let spec = ToolSpec::of(ToolKind::PdfToWord);
        assert_eq!(spec.max_file_bytes, 50 * MB);
        assert!(spec.accumulate);
    }

    #[test]
    fn scripts_stay_below_one_hundred() {
        for &kind in ToolKind::all() {
            let script = ToolSpec::of(kind).progress_script();
            let mut prev = 0u8;
            for step in &script.steps {
                assert!(step.percent < 100, "{kind}: narration may not reach 100");
                assert!(step.percent >= prev, "{kind}: script must be non-decreasing");
                prev = step.percent;
            }
        }
    }

    #[test]
    fn artifact_url_prefers_download_url() {
        let spec = ToolSpec::of(ToolKind::Compress);
        let url = spec.artifact_url(
            "http://localhost:5011",
            Some("job-9"),
            Some("/uploads/out.pdf"),
        );
        assert_eq!(url.as_deref(), Some("http://localhost:5011/uploads/out.pdf"));
    }

    #[test]
    fn artifact_url_builds_job_id_route() {
        let spec = ToolSpec::of(ToolKind::Compress);
        let url = spec.artifact_url("http://localhost:5011/", Some("job-9"), None);
        assert_eq!(
            url.as_deref(),
            Some("http://localhost:5011/api/download-compressed/job-9")
        );
    }

    #[test]
    fn artifact_url_none_without_locator() {
        let spec = ToolSpec::of(ToolKind::Merge);
        assert_eq!(spec.artifact_url("http://x", None, None), None);
    }

    #[test]
    fn compression_level_round_trips_wire_name() {
        for level in [
            CompressionLevel::Maximum,
            CompressionLevel::Balanced,
            CompressionLevel::Extreme,
        ] {
            let parsed: CompressionLevel = level.as_str().parse().expect("parse");
            assert_eq!(parsed, level);
        }
        assert!("ultra".parse::<CompressionLevel>().is_err());
    }

    #[test]
    fn builder_rejects_bad_base_url() {
        assert!(FlowConfig::builder().api_base_url("").build().is_err());
        assert!(FlowConfig::builder()
            .api_base_url("ftp://host")
            .build()
            .is_err());
        assert!(FlowConfig::builder()
            .api_base_url("https://api.pdfhub.example")
            .build()
            .is_ok());
    }
}
