//! Input resolution: validate a user-supplied source and classify it.
//!
//! Classification is by extension only (case-insensitive). Anything that is
//! not a known video, PDF or HEIC/HEIF extension is assumed to be a raster
//! image and handed to the built-in decoder first.

use crate::error::PdfMedError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Closed set of extensions treated as video.
pub const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "mov", "avi", "mkv", "mpeg", "mpg", "m4v", "webm"];

/// HEIC/HEIF family extensions.
pub const HEIF_EXTENSIONS: [&str; 3] = ["heic", "heif", "heics"];

/// What kind of input a source file is, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Raster,
    Video,
    Pdf,
    Heif,
}

impl SourceKind {
    /// Classify `path` by its (lower-cased) extension.
    pub fn classify(path: &Path) -> Self {
        let ext = lowercase_extension(path);
        match ext.as_deref() {
            Some("pdf") => SourceKind::Pdf,
            Some(e) if VIDEO_EXTENSIONS.contains(&e) => SourceKind::Video,
            Some(e) if HEIF_EXTENSIONS.contains(&e) => SourceKind::Heif,
            _ => SourceKind::Raster,
        }
    }
}

/// An as-yet-unconverted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourceItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = SourceKind::classify(&path);
        Self { path, kind }
    }
}

/// Validate that `path` is an existing, readable file and classify it.
pub fn resolve_source(path: &Path) -> Result<SourceItem, PdfMedError> {
    if !path.is_file() {
        return Err(PdfMedError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    // Check read permission by attempting to open
    match std::fs::File::open(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfMedError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(PdfMedError::io(path, e)),
    }

    let item = SourceItem::new(path);
    debug!("Resolved source {} as {:?}", path.display(), item.kind);
    Ok(item)
}

/// Lower-cased extension without the dot, if any.
pub(crate) fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn classify_by_extension_case_insensitive() {
        assert_eq!(SourceKind::classify(Path::new("a.PDF")), SourceKind::Pdf);
        assert_eq!(SourceKind::classify(Path::new("a.Mov")), SourceKind::Video);
        assert_eq!(SourceKind::classify(Path::new("a.webm")), SourceKind::Video);
        assert_eq!(SourceKind::classify(Path::new("a.HEIC")), SourceKind::Heif);
        assert_eq!(SourceKind::classify(Path::new("a.heif")), SourceKind::Heif);
    }

    #[test]
    fn unknown_extensions_are_raster() {
        assert_eq!(SourceKind::classify(Path::new("a.png")), SourceKind::Raster);
        assert_eq!(SourceKind::classify(Path::new("a.tiff")), SourceKind::Raster);
        assert_eq!(SourceKind::classify(Path::new("noext")), SourceKind::Raster);
        assert_eq!(SourceKind::classify(Path::new("a.mp3")), SourceKind::Raster);
    }

    #[test]
    fn resolve_missing_source() {
        let err = resolve_source(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, PdfMedError::SourceNotFound { .. }));
    }

    #[test]
    fn resolve_directory_is_not_a_source() {
        let dir = TempDir::new().unwrap();
        let err = resolve_source(dir.path()).unwrap_err();
        assert!(matches!(err, PdfMedError::SourceNotFound { .. }));
    }

    #[test]
    fn resolve_existing_source() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("scan.pdf");
        std::fs::write(&p, b"%PDF-1.4").unwrap();
        let item = resolve_source(&p).unwrap();
        assert_eq!(item.kind, SourceKind::Pdf);
        assert_eq!(item.path, p);
    }
}
