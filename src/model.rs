//! Data model for a conversion session.
//!
//! Everything in this module is designed to survive a full page-navigation
//! boundary: the [`WorkingSet`] and [`JobResult`] are the only values handed
//! from one phase to the next, and they travel through a string-only session
//! store. Binary fields (`payload`, `thumbnail`) therefore serialise as
//! base64 — the JSON the store holds is text-safe end to end, and
//! `load(save(ws))` reproduces the exact bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::config::CompressionLevel;

/// One user-supplied document or image awaiting processing.
///
/// `payload` is always present once the entry is accepted; `thumbnail` and
/// `page_count` are filled in asynchronously by the renderer and stay absent
/// when rendering fails or the format is not paged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Opaque token, generated client-side at intake; stable for the
    /// session. Millisecond timestamp plus a random suffix, so entries in
    /// one batch still get distinct ids.
    pub id: String,
    pub name: String,
    /// Size in bytes, as declared at intake (equals `payload.len()`).
    pub size: u64,
    pub mime_type: String,
    /// Full file content. Base64 on the wire, raw bytes in memory.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// PNG render of page 1, when the engine produced one.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes_opt"
    )]
    pub thumbnail: Option<Vec<u8>>,
    /// Total pages, known only for paged formats after rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

impl FileEntry {
    /// Build an accepted entry around its raw bytes. Thumbnail and page
    /// count are attached later by the renderer.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, payload: Vec<u8>) -> Self {
        FileEntry {
            id: new_entry_id(),
            name: name.into(),
            size: payload.len() as u64,
            mime_type: mime_type.into(),
            payload,
            thumbnail: None,
            page_count: None,
        }
    }
}

/// Generate an intake-time entry id: `<millis>-<random suffix>`.
pub fn new_entry_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{millis}-{}", &suffix[..9])
}

/// The ordered collection of [`FileEntry`] for one tool invocation.
///
/// Order is significant for merge (it becomes the output page order) and
/// for image→PDF; batch tools ignore it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkingSet {
    pub entries: Vec<FileEntry>,
}

impl WorkingSet {
    pub fn new() -> Self {
        WorkingSet::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut FileEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn push(&mut self, entry: FileEntry) {
        self.entries.push(entry);
    }

    /// Remove an entry by id, preserving the order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<FileEntry> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(idx))
    }

    /// Stable move: take the entry at `from` out and re-insert it at `to`.
    /// Out-of-range indices leave the set untouched.
    pub fn reorder(&mut self, from: usize, to: usize) {
        if from >= self.entries.len() || to >= self.entries.len() || from == to {
            return;
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
    }
}

/// The server's descriptor of a completed conversion, persisted for the
/// Download phase. Created once per successful request, never mutated,
/// discarded when a new flow starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Server-issued job handle, when the tool downloads by job id.
    pub job_id: Option<String>,
    /// Server-issued relative artifact path, when the tool downloads by URL.
    pub download_url: Option<String>,
    /// Human-readable server message, for display only.
    pub message: Option<String>,
    pub metrics: JobMetrics,
}

impl JobResult {
    /// At least one of `job_id` / `download_url` must be present for the
    /// Download phase to have anything to fetch.
    pub fn is_fetchable(&self) -> bool {
        self.job_id.is_some() || self.download_url.is_some()
    }
}

/// Per-tool display metrics, sharing a common envelope.
///
/// A tagged union rather than a loose map: each tool's Download page knows
/// exactly which numbers it can show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "kebab-case")]
pub enum JobMetrics {
    Merge {
        file_count: usize,
        /// Page count of the merged output, when the server reported it.
        page_count: Option<usize>,
        total_size: u64,
    },
    Compress {
        file_count: usize,
        original_size: u64,
        compressed_size: Option<u64>,
        saved_percentage: Option<u8>,
        level: CompressionLevel,
    },
    Split {
        selected_pages: Vec<usize>,
        total_pages: usize,
    },
    Convert {
        file_count: usize,
        /// Output format label, e.g. "docx", "jpg".
        output: String,
    },
}

impl JobMetrics {
    pub fn file_count(&self) -> usize {
        match self {
            JobMetrics::Merge { file_count, .. }
            | JobMetrics::Compress { file_count, .. }
            | JobMetrics::Convert { file_count, .. } => *file_count,
            JobMetrics::Split { .. } => 1,
        }
    }
}

// ── Base64 transport encoding ────────────────────────────────────────────

mod base64_bytes {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

mod base64_bytes_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => ser.serialize_some(&STANDARD.encode(b)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<u8>>, D::Error> {
        let s: Option<String> = Option::deserialize(de)?;
        match s {
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, payload: &[u8]) -> FileEntry {
        FileEntry::new(name, "application/pdf", payload.to_vec())
    }

    #[test]
    fn entry_ids_are_unique_within_a_batch() {
        let ids: Vec<String> = (0..50).map(|_| new_entry_id()).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }

    #[test]
    fn payload_survives_json_round_trip() {
        // Every byte value, so the base64 path is exercised fully.
        let payload: Vec<u8> = (0u8..=255).collect();
        let mut e = entry("all-bytes.pdf", &payload);
        e.thumbnail = Some(vec![0x89, 0x50, 0x4e, 0x47]);
        e.page_count = Some(3);

        let json = serde_json::to_string(&e).expect("serialise");
        assert!(!json.contains('\u{0}'), "JSON must be text-safe");

        let back: FileEntry = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, e);
    }

    #[test]
    fn absent_thumbnail_is_omitted() {
        let e = entry("plain.pdf", b"%PDF-1.4");
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(!json.contains("thumbnail"));
        assert!(!json.contains("page_count"));
    }

    #[test]
    fn working_set_reorder_is_a_stable_move() {
        let mut ws = WorkingSet::new();
        for name in ["a.pdf", "b.pdf", "c.pdf", "d.pdf"] {
            ws.push(entry(name, b"%PDF"));
        }
        ws.reorder(0, 2);
        let names: Vec<&str> = ws.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b.pdf", "c.pdf", "a.pdf", "d.pdf"]);
    }

    #[test]
    fn reorder_inverse_restores_order() {
        let mut ws = WorkingSet::new();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            ws.push(entry(name, b"%PDF"));
        }
        let before = ws.clone();
        ws.reorder(0, 2);
        ws.reorder(2, 0);
        assert_eq!(ws, before);
    }

    #[test]
    fn reorder_out_of_range_is_a_noop() {
        let mut ws = WorkingSet::new();
        ws.push(entry("a.pdf", b"%PDF"));
        let before = ws.clone();
        ws.reorder(0, 5);
        ws.reorder(5, 0);
        assert_eq!(ws, before);
    }

    #[test]
    fn remove_preserves_remaining_order() {
        let mut ws = WorkingSet::new();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            ws.push(entry(name, b"%PDF"));
        }
        let b_id = ws.entries[1].id.clone();
        let removed = ws.remove(&b_id).expect("entry exists");
        assert_eq!(removed.name, "b.pdf");
        let names: Vec<&str> = ws.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.pdf", "c.pdf"]);
        assert!(ws.remove(&b_id).is_none());
    }

    #[test]
    fn job_result_fetchable_requires_a_locator() {
        let metrics = JobMetrics::Merge {
            file_count: 2,
            page_count: Some(10),
            total_size: 1024,
        };
        let r = JobResult {
            job_id: None,
            download_url: None,
            message: None,
            metrics: metrics.clone(),
        };
        assert!(!r.is_fetchable());

        let r = JobResult {
            job_id: Some("job-1".into()),
            download_url: None,
            message: None,
            metrics,
        };
        assert!(r.is_fetchable());
    }
}
