//! Item collection: list a specialty's JPEGs in chronological order.

use crate::error::PdfMedError;
use crate::output::ImageArtifact;
use crate::pipeline::input::lowercase_extension;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Collect the `.jpg`/`.jpeg` files directly inside `dir`, ordered by
/// effective date and then by file name.
///
/// Subdirectories and other extensions are ignored. Only a failure to list
/// `dir` itself is an error.
pub fn collect(dir: &Path) -> Result<Vec<ImageArtifact>, PdfMedError> {
    let entries = fs::read_dir(dir).map_err(|e| PdfMedError::ReadDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PdfMedError::ReadDirFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() || !is_jpeg_name(&path) {
            continue;
        }
        items.push(ImageArtifact::from_path(&path)?);
    }

    items.sort_by(ImageArtifact::chronological);
    debug!("Collected {} JPEGs from {}", items.len(), dir.display());
    Ok(items)
}

fn is_jpeg_name(path: &Path) -> bool {
    matches!(lowercase_extension(path).as_deref(), Some("jpg" | "jpeg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DateSource;
    use chrono::NaiveDate;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    fn names(items: &[ImageArtifact]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn orders_by_embedded_date_not_name() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a_03_01_2024.jpg");
        touch(dir.path(), "b_01_01_2024.jpg");
        touch(dir.path(), "c_02_01_2024.JPG");

        let items = collect(dir.path()).unwrap();
        assert_eq!(
            names(&items),
            vec!["b_01_01_2024.jpg", "c_02_01_2024.JPG", "a_03_01_2024.jpg"]
        );
    }

    #[test]
    fn equal_dates_break_ties_by_name() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "x_01_01_2024_02.jpg");
        touch(dir.path(), "x_01_01_2024.jpg");
        touch(dir.path(), "a_01_01_2024.jpeg");

        let items = collect(dir.path()).unwrap();
        assert_eq!(
            names(&items),
            vec!["a_01_01_2024.jpeg", "x_01_01_2024.jpg", "x_01_01_2024_02.jpg"]
        );
    }

    #[test]
    fn skips_other_files_and_subdirectories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "keep_01_01_2024.jpg");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "scan.png");
        fs::create_dir(dir.path().join("nested.jpg")).unwrap();
        touch(&dir.path().join("nested.jpg"), "inner_01_01_2020.jpg");

        let items = collect(dir.path()).unwrap();
        assert_eq!(names(&items), vec!["keep_01_01_2024.jpg"]);
    }

    #[test]
    fn falls_back_to_modification_time() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "IMG_0002.jpg");
        touch(dir.path(), "IMG_0001.jpg");
        touch(dir.path(), "dated_01_01_2000.jpg");

        // IMG_0002 is older than IMG_0001 on disk.
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        File::options()
            .write(true)
            .open(dir.path().join("IMG_0002.jpg"))
            .unwrap()
            .set_modified(base)
            .unwrap();
        File::options()
            .write(true)
            .open(dir.path().join("IMG_0001.jpg"))
            .unwrap()
            .set_modified(base + Duration::from_secs(86_400))
            .unwrap();

        let items = collect(dir.path()).unwrap();
        assert_eq!(
            names(&items),
            vec!["dated_01_01_2000.jpg", "IMG_0002.jpg", "IMG_0001.jpg"]
        );
        assert_eq!(items[0].date_source, DateSource::FileName);
        assert_eq!(items[1].date_source, DateSource::Modified);
    }

    #[test]
    fn invalid_token_uses_mtime() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "x_45_13_2024.jpg");
        let items = collect(dir.path()).unwrap();
        assert_eq!(items[0].date_source, DateSource::Modified);
    }

    #[test]
    fn order_is_stable_across_runs() {
        let dir = TempDir::new().unwrap();
        for name in ["b_01_01_2024.jpg", "a_01_01_2024.jpg", "c_05_05_2023.jpg"] {
            touch(dir.path(), name);
        }
        let first = collect(dir.path()).unwrap();
        let second = collect(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first[0].effective_date.date(),
            NaiveDate::from_ymd_opt(2023, 5, 5).unwrap()
        );
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(collect(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = collect(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, PdfMedError::ReadDirFailed { .. }));
    }
}
