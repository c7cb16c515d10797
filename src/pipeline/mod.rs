//! Pipeline stages for a conversion session.
//!
//! Each submodule implements exactly one responsibility of the
//! intake → preview → submit → download flow. Keeping stages separate makes
//! each independently testable and lets us swap implementations (a different
//! rendering engine, a different store) without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ thumbnail ──▶ select ──▶ submit ──▶ download
//! (type/size)  (pdfium)      (ids/pages) (multipart) (artifact)
//! ```
//!
//! 1. [`validate`]  — synchronous type/size gate with an explicit batch
//!    policy; the only stage that can reject a file
//! 2. [`thumbnail`] — rasterise covers and preview pages; runs in
//!    `spawn_blocking` because pdfium is not async-safe, and degrades to
//!    "no thumbnail" when the engine is absent
//! 3. [`select`]    — which entries (and pages) participate in the next
//!    submission, and in what order
//! 4. [`submit`]    — the multipart request to the tool endpoint; the only
//!    stage with submission network I/O
//! 5. [`download`]  — artifact retrieval, filename resolution, local save

pub mod download;
pub mod select;
pub mod submit;
pub mod thumbnail;
pub mod validate;
