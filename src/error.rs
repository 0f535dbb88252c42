//! Error types for the pdfmed library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfMedError`] — **Fatal**: the current invocation (or, during a bulk
//!   regeneration, the current specialty) cannot proceed. Returned as
//!   `Err(PdfMedError)` from [`crate::specialty::add`],
//!   [`crate::specialty::regenerate`] and the conversion entry points.
//!
//! * [`ItemWarning`] — **Non-fatal**: a single artifact could not be placed
//!   (unreadable header, corrupt bytes) or a specialty had nothing to lay out.
//!   Stored inside [`crate::output::GeneratedPdf`] so callers see what was
//!   skipped while the document is still produced from the remaining items.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdfmed library.
#[derive(Debug, Error)]
pub enum PdfMedError {
    // ── Argument errors ───────────────────────────────────────────────────
    /// A required value is missing or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The analysis date matched none of the accepted layouts.
    #[error("Invalid date '{input}': expected DD-MM-YYYY (also DD.MM.YYYY or DD/MM/YYYY)")]
    InvalidDateFormat { input: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the source.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Naming errors ─────────────────────────────────────────────────────
    /// Every `_02` … `_999` candidate next to the destination is taken.
    #[error("Too many name collisions for '{path}'")]
    TooManyCollisions { path: PathBuf },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// No strategy in the chain produced a JPEG.
    #[error("Could not convert '{path}' to JPEG ({failed} failed, {skipped} skipped): {leading}")]
    ConversionExhausted {
        path: PathBuf,
        failed: usize,
        skipped: usize,
        leading: String,
    },

    /// None of the candidate executables resolve on the search path.
    #[error("External tool not found on PATH: {tool}")]
    ToolUnavailable { tool: String },

    /// An external tool could not be spawned or exited unsuccessfully.
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The rasteriser reported success but left no page files behind.
    #[error("'{path}' produced no page images; the rasteriser failed silently")]
    NoPagesProduced { path: PathBuf },

    /// The built-in decoder could not read the source.
    #[error("Failed to decode '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    /// JPEG encoding failed.
    #[error("Failed to encode JPEG for '{path}': {detail}")]
    ImageEncode { path: PathBuf, detail: String },

    // ── Layout / PDF errors ───────────────────────────────────────────────
    /// The source directory of a specialty does not exist.
    #[error("Source directory not found: '{path}'")]
    DirectoryMissing { path: PathBuf },

    /// Listing a directory failed.
    #[error("Failed to read directory '{path}': {source}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// lopdf rejected the assembled document.
    #[error("PDF assembly failed: {0}")]
    PdfAssembly(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A file-system operation on `path` failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or replace the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PdfMedError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PdfMedError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal problem with a single artifact or specialty.
///
/// Generation continues past every warning; a document with fewer pages (or
/// none) is still written.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemWarning {
    /// The image header could not be read, so the item has no size.
    #[error("Skipping {name}: could not read dimensions: {detail}")]
    UnreadableDimensions { name: String, detail: String },

    /// The header was fine but the bytes could not be embedded.
    #[error("Skipping {name}: could not embed image: {detail}")]
    UnreadableImage { name: String, detail: String },

    /// The specialty directory holds no JPEG files.
    #[error("No JPG images in {dir} to build a PDF from")]
    EmptySource { dir: PathBuf },
}
