//! Preview rendering: page-1 covers and bounded multi-page previews.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! thread pool so rendering a large page never stalls the event loop. A
//! caller that drops the returned future simply abandons the result — the
//! flow treats an abandoned render like any other absent thumbnail.
//!
//! ## Why probe-and-degrade?
//!
//! The rendering engine is an external shared library that may not be
//! present at all. Availability is probed once and remembered; when the
//! probe fails, every render resolves to `None` and intake continues
//! without previews. The same applies per document: corrupt or encrypted
//! bytes degrade to "no thumbnail" rather than aborting intake.
//!
//! ## Why cap pixels and pages?
//!
//! Thumbnails travel through the session store as base64, and preview pages
//! are held in memory all at once. Capping the longest edge (covers small,
//! preview pages larger) and the preview page count (default 5) bounds both
//! latency and the session payload regardless of document size.

use image::DynamicImage;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use crate::config::FlowConfig;

/// A rendered page-1 cover plus the document's total page count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCover {
    /// PNG bytes, longest edge capped.
    pub png: Vec<u8>,
    pub page_count: usize,
}

/// The first pages of a document, for selection UIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPreview {
    /// PNG bytes per rendered page, in page order. Length is capped; the
    /// true total lives in `page_count`.
    pub pages: Vec<Vec<u8>>,
    pub page_count: usize,
}

/// Renders covers and previews, tolerating an absent engine.
pub struct ThumbnailRenderer {
    cover_max_edge: u32,
    preview_max_edge: u32,
    page_cap: usize,
    engine_ok: OnceCell<bool>,
}

impl ThumbnailRenderer {
    pub fn new(config: &FlowConfig) -> Self {
        ThumbnailRenderer {
            cover_max_edge: config.cover_max_edge,
            preview_max_edge: config.preview_max_edge,
            page_cap: config.preview_page_cap,
            engine_ok: OnceCell::new(),
        }
    }

    /// A renderer that behaves as if the engine never loads. Useful in
    /// tests and in embeddings that skip previews entirely.
    pub fn detached() -> Self {
        ThumbnailRenderer {
            cover_max_edge: 400,
            preview_max_edge: 800,
            page_cap: 5,
            engine_ok: OnceCell::with_value(false),
        }
    }

    /// Whether the rendering engine could be bound. Probed once, off the
    /// async threads, and remembered for the renderer's lifetime.
    pub async fn engine_ready(&self) -> bool {
        if let Some(ok) = self.engine_ok.get() {
            return *ok;
        }
        let ok = spawn_blocking(|| bind_engine().is_ok())
            .await
            .unwrap_or(false);
        if !ok {
            warn!("pdfium engine unavailable — continuing without previews");
        }
        *self.engine_ok.get_or_init(|| ok)
    }

    /// Render a page-1 cover for an accepted file.
    ///
    /// Image payloads are downscaled directly and never need the engine;
    /// PDF payloads go through pdfium. Anything else — and any render
    /// failure — yields `None`.
    pub async fn render_cover(&self, mime_type: &str, bytes: Vec<u8>) -> Option<RenderedCover> {
        if mime_type.starts_with("image/") {
            return self.shrink_image(bytes).await;
        }
        if mime_type != "application/pdf" {
            return None;
        }
        if !self.engine_ready().await {
            return None;
        }
        let max_edge = self.cover_max_edge;
        let outcome = spawn_blocking(move || render_pdf_blocking(&bytes, max_edge, 1))
            .await
            .unwrap_or_else(|e| Err(format!("render task failed: {e}")));
        match outcome {
            Ok((mut pages, page_count)) if !pages.is_empty() => Some(RenderedCover {
                png: pages.remove(0),
                page_count,
            }),
            Ok(_) => None,
            Err(detail) => {
                debug!(%detail, "cover render failed, continuing without thumbnail");
                None
            }
        }
    }

    /// Render up to the configured cap of leading pages, for split-style
    /// page selection and multi-page previews.
    pub async fn render_preview(&self, bytes: Vec<u8>) -> Option<RenderedPreview> {
        if !self.engine_ready().await {
            return None;
        }
        let max_edge = self.preview_max_edge;
        let cap = self.page_cap;
        let outcome = spawn_blocking(move || render_pdf_blocking(&bytes, max_edge, cap))
            .await
            .unwrap_or_else(|e| Err(format!("render task failed: {e}")));
        match outcome {
            Ok((pages, page_count)) if !pages.is_empty() => {
                Some(RenderedPreview { pages, page_count })
            }
            Ok(_) => None,
            Err(detail) => {
                debug!(%detail, "preview render failed");
                None
            }
        }
    }

    async fn shrink_image(&self, bytes: Vec<u8>) -> Option<RenderedCover> {
        let max_edge = self.cover_max_edge;
        let outcome = spawn_blocking(move || -> Result<Vec<u8>, String> {
            let img = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;
            let thumb = img.thumbnail(max_edge, max_edge);
            encode_png(&thumb).map_err(|e| e.to_string())
        })
        .await
        .unwrap_or_else(|e| Err(format!("shrink task failed: {e}")));
        match outcome {
            Ok(png) => Some(RenderedCover { png, page_count: 1 }),
            Err(detail) => {
                debug!(%detail, "image thumbnail failed");
                None
            }
        }
    }
}

/// Bind to a pdfium library: an explicit `PDFIUM_LIB_PATH`, else a copy in
/// the working directory, else whatever the system provides.
fn bind_engine() -> Result<Pdfium, PdfiumError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        return Ok(Pdfium::new(Pdfium::bind_to_library(&path)?));
    }
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())?;
    Ok(Pdfium::new(bindings))
}

/// Blocking render of the first `page_cap` pages. Binds the engine inside
/// the blocking closure — pdfium handles must not cross threads.
fn render_pdf_blocking(
    bytes: &[u8],
    max_edge: u32,
    page_cap: usize,
) -> Result<(Vec<Vec<u8>>, usize), String> {
    let pdfium = bind_engine().map_err(|e| format!("bind: {e:?}"))?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| format!("load: {e:?}"))?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    let render_config = PdfRenderConfig::new()
        .set_target_width(max_edge as i32)
        .set_maximum_height(max_edge as i32);

    let wanted = page_cap.min(page_count);
    let mut rendered = Vec::with_capacity(wanted);
    for idx in 0..wanted {
        let page = pages
            .get(idx as u16)
            .map_err(|e| format!("page {}: {e:?}", idx + 1))?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("render page {}: {e:?}", idx + 1))?;
        let image = bitmap.as_image();
        debug!(page = idx + 1, width = image.width(), height = image.height(), "rendered");
        rendered.push(encode_png(&image).map_err(|e| format!("encode page {}: {e}", idx + 1))?);
    }

    Ok((rendered, page_count))
}

/// PNG-encode a rendered page. PNG keeps text crisp at thumbnail sizes;
/// JPEG artefacts on rendered text make previews look broken.
fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([40, 90, 200, 255]),
        ));
        encode_png(&img).expect("encode")
    }

    #[test]
    fn encode_png_produces_decodable_bytes() {
        let bytes = sample_png(10, 10);
        let decoded = image::load_from_memory(&bytes).expect("valid png");
        assert_eq!(decoded.width(), 10);
    }

    #[tokio::test]
    async fn detached_renderer_skips_pdf_covers() {
        let renderer = ThumbnailRenderer::detached();
        assert!(!renderer.engine_ready().await);
        let cover = renderer
            .render_cover("application/pdf", b"%PDF-1.4 whatever".to_vec())
            .await;
        assert!(cover.is_none());
        assert!(renderer.render_preview(b"%PDF-1.4".to_vec()).await.is_none());
    }

    #[tokio::test]
    async fn image_covers_do_not_need_the_engine() {
        let renderer = ThumbnailRenderer::detached();
        let cover = renderer
            .render_cover("image/png", sample_png(1200, 600))
            .await
            .expect("image cover");
        assert_eq!(cover.page_count, 1);
        let decoded = image::load_from_memory(&cover.png).expect("valid png");
        assert!(decoded.width() <= 400 && decoded.height() <= 400);
    }

    #[tokio::test]
    async fn corrupt_image_degrades_to_none() {
        let renderer = ThumbnailRenderer::detached();
        let cover = renderer
            .render_cover("image/png", vec![0, 1, 2, 3])
            .await;
        assert!(cover.is_none());
    }

    #[tokio::test]
    async fn unsupported_mime_degrades_to_none() {
        let renderer = ThumbnailRenderer::detached();
        let cover = renderer
            .render_cover("application/msword", vec![1, 2, 3])
            .await;
        assert!(cover.is_none());
    }

    #[tokio::test]
    async fn corrupt_pdf_degrades_to_none() {
        // Runs both with and without a system pdfium: either the probe
        // fails (engine-less skip) or the load fails (corrupt bytes).
        let config = FlowConfig::default();
        let renderer = ThumbnailRenderer::new(&config);
        let cover = renderer
            .render_cover("application/pdf", b"not a pdf at all".to_vec())
            .await;
        assert!(cover.is_none());
    }
}
