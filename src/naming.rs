//! Path and name utilities: filesystem-safe slugs and collision-free paths.
//!
//! Specialty and name-prefix strings come straight from the command line
//! ("Эндокринология", "Foot & Ankle", "ENT/Allergy"). [`sanitize`] turns
//! them into a single path component; [`ensure_unique_path`] guarantees an
//! `add` never overwrites an artifact that already carries the same prefix
//! and date.

use crate::error::PdfMedError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Highest collision suffix probed by [`ensure_unique_path`] (exclusive).
pub const MAX_COLLISION_SUFFIX: u32 = 1000;

static RE_SEPARATOR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_]{2,}").unwrap());

/// Make `text` safe to use as a single path component.
///
/// Trims surrounding whitespace, turns spaces into `_`, turns `/`, `\` and
/// `:` into `-`, then collapses every run of two or more `-`/`_` into one
/// `-`. Case and diacritics are left alone.
pub fn sanitize(text: &str) -> String {
    let s = text
        .trim()
        .replace(' ', "_")
        .replace(['/', '\\', ':'], "-");
    RE_SEPARATOR_RUN.replace_all(&s, "-").into_owned()
}

/// Return `path` if nothing exists there, otherwise the first free
/// `stem_02.ext`, `stem_03.ext`, … sibling.
///
/// Fails with [`PdfMedError::TooManyCollisions`] once `_999` is taken too.
pub fn ensure_unique_path(path: &Path) -> Result<PathBuf, PdfMedError> {
    if !exists(path)? {
        return Ok(path.to_path_buf());
    }

    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for i in 2..MAX_COLLISION_SUFFIX {
        let candidate = dir.join(format!("{stem}_{i:02}{ext}"));
        if !exists(&candidate)? {
            return Ok(candidate);
        }
    }

    Err(PdfMedError::TooManyCollisions {
        path: path.to_path_buf(),
    })
}

fn exists(path: &Path) -> Result<bool, PdfMedError> {
    path.try_exists().map_err(|e| PdfMedError::io(path, e))
}
