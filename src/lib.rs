//! # pdfmed
//!
//! File medical-analysis photos and scans by specialty and date, and keep one
//! fitted-layout PDF per specialty.
//!
//! ## Why this crate?
//!
//! Lab results arrive as phone photos, HEIC shots, scanned PDFs and the odd
//! video still. This crate normalises each of them to a JPEG named after the
//! analysis date, stores it under its specialty, and rebuilds that
//! specialty's document with one page per image in chronological order, so
//! the history of a specialty can be read front to back.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source (photo / video / HEIC / PDF)
//!  │
//!  ├─ 1. Input     classify by extension
//!  ├─ 2. Convert   fallback chain: image crate → ImageMagick → ffmpeg → heif-convert
//!  │               (PDFs: one JPEG per page via ImageMagick)
//!  ├─ 3. Collect   foto/<slug>/*.jpg ordered by (date token | mtime, name)
//!  ├─ 4. Layout    fit each image inside the page margins, centred
//!  └─ 5. Render    one page per image → pdf/<slug>/<slug>.pdf (atomic)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfmed::{add, regenerate_all, AddRequest, PdfMedConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PdfMedConfig::default();
//!     let outcome = add(&AddRequest::new("scan.jpg", "Cardiology", "12-03-2024"), &config)?;
//!     println!("{} now has {} pages", outcome.specialty, outcome.pdf.pages);
//!
//!     let report = regenerate_all(&config)?;
//!     eprintln!("{} documents, {} failures", report.generated.len(), report.failures.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfmed` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfmed = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! None are required for JPEG/PNG/GIF/WebP/BMP/TIFF sources. ImageMagick
//! (`magick` or `convert`) is needed for PDF sources and as a fallback
//! decoder, `ffmpeg` for videos, `heif-convert` for HEIC/HEIF.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod date;
pub mod error;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod specialty;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageGeometry, PageSize, PdfMedConfig, PdfMedConfigBuilder};
pub use date::{parse_date, AnalysisDate};
pub use error::{ItemWarning, PdfMedError};
pub use naming::{ensure_unique_path, sanitize};
pub use output::{
    AddOutcome, DateSource, GeneratedPdf, ImageArtifact, PageLayout, RegenReport,
    SpecialtyFailure,
};
pub use pipeline::collect::collect;
pub use pipeline::layout::fit_within;
pub use pipeline::rasterize::ingest_pdf_pages;
pub use pipeline::strategy::{Attempt, ConversionChain, ConversionStrategy};
pub use progress::{LayoutProgressCallback, NoopProgressCallback, ProgressCallback};
pub use specialty::{add, add_with, regenerate, regenerate_all, AddRequest};
