//! Result types returned by ingestion and generation.
//!
//! All of them serialise with serde so the binary's `--json` mode can print
//! them verbatim.

use crate::date::date_from_file_name;
use crate::error::{ItemWarning, PdfMedError};
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Where an artifact's effective date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    /// The `DD_MM_YYYY` token in the file name.
    FileName,
    /// The file's last-modified time.
    Modified,
}

/// A converted JPEG stored under a specialty's source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub path: PathBuf,
    /// File name, used as the tie-breaker for equal dates.
    pub name: String,
    /// Date used for ordering, in local time.
    pub effective_date: NaiveDateTime,
    pub date_source: DateSource,
}

impl ImageArtifact {
    /// Build an artifact for `path`, recovering its effective date.
    ///
    /// The date embedded in the file name wins; the file's modification time
    /// is read only when the name carries no valid token.
    pub fn from_path(path: &Path) -> Result<Self, PdfMedError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(date) = date_from_file_name(&name) {
            return Ok(Self {
                path: path.to_path_buf(),
                name,
                effective_date: date.and_time(chrono::NaiveTime::MIN),
                date_source: DateSource::FileName,
            });
        }

        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| PdfMedError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            name,
            effective_date: DateTime::<Local>::from(modified).naive_local(),
            date_source: DateSource::Modified,
        })
    }

    /// Total order used for page order: effective date, then file name.
    pub fn chronological(a: &Self, b: &Self) -> Ordering {
        a.effective_date
            .cmp(&b.effective_date)
            .then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
    }
}

/// Placement of one image on its page, in millimetres from the top-left
/// corner of the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Millimetres per source pixel.
    pub scale: f64,
}

/// One regenerated specialty document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPdf {
    pub specialty: String,
    pub path: PathBuf,
    /// Artifacts collected from the source directory.
    pub collected: usize,
    /// Pages written (collected minus skipped).
    pub pages: usize,
    pub warnings: Vec<ItemWarning>,
}

/// Result of `add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddOutcome {
    pub specialty: String,
    /// Newly written artifacts, in page order.
    pub artifacts: Vec<ImageArtifact>,
    pub pdf: GeneratedPdf,
}

/// A specialty whose regeneration failed during a bulk run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialtyFailure {
    pub specialty: String,
    pub error: String,
}

/// Result of regenerating every specialty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegenReport {
    pub generated: Vec<GeneratedPdf>,
    pub failures: Vec<SpecialtyFailure>,
}

impl RegenReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total pages across every generated document.
    pub fn total_pages(&self) -> usize {
        self.generated.iter().map(|g| g.pages).sum()
    }
}
