//! Multi-page PDF ingestion: one JPEG per page.
//!
//! ImageMagick is invoked once with a page-indexed output pattern
//! (`<base>_%03d.jpg`, numbered from 001) into a private temporary directory
//! next to the destination. Only after the tool exits successfully are the
//! pages moved into place, each through [`ensure_unique_path`], so a failed
//! run leaves nothing in the specialty directory.

use crate::config::PdfMedConfig;
use crate::error::PdfMedError;
use crate::naming::ensure_unique_path;
use crate::output::ImageArtifact;
use crate::pipeline::input::SourceItem;
use crate::pipeline::strategy::standard_magick_pipeline;
use crate::pipeline::tools::{run_tool, IMAGEMAGICK};
use regex::Regex;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Rasterise every page of `source` into `dest_dir` as
/// `<base_name>_NNN.jpg`, returned in page order.
///
/// Fails with [`PdfMedError::ToolUnavailable`] when ImageMagick is not on
/// the configured search path, [`PdfMedError::ToolFailed`] when it exits non-zero, and
/// [`PdfMedError::NoPagesProduced`] when it exits cleanly but wrote nothing.
pub fn ingest_pdf_pages(
    source: &SourceItem,
    dest_dir: &Path,
    base_name: &str,
    config: &PdfMedConfig,
) -> Result<Vec<ImageArtifact>, PdfMedError> {
    let program = IMAGEMAGICK
        .locate(config.tool_path.as_deref())
        .ok_or_else(|| PdfMedError::ToolUnavailable {
            tool: IMAGEMAGICK.label.to_string(),
        })?;
    ingest_with(&program, &[], source, dest_dir, base_name, config)
}

fn ingest_with(
    program: &Path,
    leading_args: &[OsString],
    source: &SourceItem,
    dest_dir: &Path,
    base_name: &str,
    config: &PdfMedConfig,
) -> Result<Vec<ImageArtifact>, PdfMedError> {
    fs::create_dir_all(dest_dir).map_err(|e| PdfMedError::io(dest_dir, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".pdfmed-pages-")
        .tempdir_in(dest_dir)
        .map_err(|e| PdfMedError::io(dest_dir, e))?;

    let pattern = staging
        .path()
        .join(format!("{}_%03d.jpg", base_name.replace('%', "%%")));

    let mut args: Vec<OsString> = leading_args.to_vec();
    args.push("-density".into());
    args.push(config.pdf_density.to_string().into());
    args.push(source.path.clone().into_os_string());
    args.push("-scene".into());
    args.push("1".into());
    args.extend(standard_magick_pipeline(config));
    args.push(pattern.into_os_string());

    run_tool(program, &args)?;

    let pages = staged_pages(staging.path(), base_name)?;
    if pages.is_empty() {
        return Err(PdfMedError::NoPagesProduced {
            path: source.path.clone(),
        });
    }
    debug!("{} produced {} page(s)", source.path.display(), pages.len());

    let moved = move_into_place(&pages, dest_dir)?;
    let artifacts = moved
        .iter()
        .map(|p| ImageArtifact::from_path(p))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "Ingested {} page(s) from {}",
        artifacts.len(),
        source.path.display()
    );
    Ok(artifacts)
}

/// Files in `dir` named `<base>_<digits>.jpg`, sorted by name.
fn staged_pages(dir: &Path, base_name: &str) -> Result<Vec<PathBuf>, PdfMedError> {
    let re = Regex::new(&format!(r"^{}_[0-9]{{3,}}\.jpg$", regex::escape(base_name)))
        .map_err(|e| PdfMedError::InvalidArgument(format!("page pattern: {e}")))?;

    let entries = fs::read_dir(dir).map_err(|e| PdfMedError::ReadDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut pages = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PdfMedError::ReadDirFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let name = entry.file_name();
        if re.is_match(&name.to_string_lossy()) && entry.path().is_file() {
            pages.push(entry.path());
        }
    }
    pages.sort();
    Ok(pages)
}

/// Move `pages` into `dest_dir` in order. On error every page already moved
/// is removed again.
fn move_into_place(pages: &[PathBuf], dest_dir: &Path) -> Result<Vec<PathBuf>, PdfMedError> {
    let mut moved: Vec<PathBuf> = Vec::with_capacity(pages.len());
    for page in pages {
        let result = page
            .file_name()
            .ok_or_else(|| PdfMedError::InvalidArgument(format!("bad page path {}", page.display())))
            .and_then(|name| ensure_unique_path(&dest_dir.join(name)))
            .and_then(|target| {
                fs::rename(page, &target)
                    .map(|_| target)
                    .map_err(|e| PdfMedError::io(page, e))
            });
        match result {
            Ok(target) => moved.push(target),
            Err(e) => {
                for done in &moved {
                    if let Err(rm) = fs::remove_file(done) {
                        warn!("Could not roll back {}: {}", done.display(), rm);
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Shell script standing in for ImageMagick: writes `count` pages using
    /// the printf-style pattern passed as the last argument.
    fn fake_magick(dir: &Path, count: u32) -> PathBuf {
        let script = dir.join("fake-magick.sh");
        fs::write(
            &script,
            format!(
                "for last; do :; done\n\
                 i=1\n\
                 while [ $i -le {count} ]; do printf x > \"$(printf \"$last\" $i)\"; i=$((i+1)); done\n"
            ),
        )
        .unwrap();
        script
    }

    fn run(
        script: &Path,
        dest: &Path,
        base: &str,
    ) -> Result<Vec<ImageArtifact>, PdfMedError> {
        let source = SourceItem::new("scan.pdf");
        ingest_with(
            Path::new("sh"),
            &[script.as_os_str().to_owned()],
            &source,
            dest,
            base,
            &PdfMedConfig::default(),
        )
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn missing_imagemagick_is_tool_unavailable() {
        let empty_bin = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let out = dest.path().join("cardio");
        let cfg = PdfMedConfig::builder()
            .tool_path(empty_bin.path())
            .build()
            .unwrap();

        let err = ingest_pdf_pages(&SourceItem::new("scan.pdf"), &out, "Cardio", &cfg)
            .unwrap_err();
        match err {
            PdfMedError::ToolUnavailable { tool } => assert_eq!(tool, "ImageMagick"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!out.exists(), "nothing may be created without a converter");
    }

    #[test]
    fn pages_land_in_order_with_three_digit_index() {
        let tools = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let script = fake_magick(tools.path(), 3);

        let artifacts = run(&script, dest.path(), "Cardio_01_02_2024").unwrap();
        let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Cardio_01_02_2024_001.jpg",
                "Cardio_01_02_2024_002.jpg",
                "Cardio_01_02_2024_003.jpg"
            ]
        );
        // Staging directory is gone.
        assert_eq!(listing(dest.path()), names);
    }

    #[test]
    fn existing_pages_are_not_overwritten() {
        let tools = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("X_01_01_2024_001.jpg"), b"old").unwrap();
        let script = fake_magick(tools.path(), 1);

        let artifacts = run(&script, dest.path(), "X_01_01_2024").unwrap();
        assert_eq!(artifacts[0].name, "X_01_01_2024_001_02.jpg");
        assert_eq!(
            fs::read(dest.path().join("X_01_01_2024_001.jpg")).unwrap(),
            b"old"
        );
    }

    #[test]
    fn percent_in_base_name_is_literal() {
        let tools = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let script = fake_magick(tools.path(), 1);

        let artifacts = run(&script, dest.path(), "50%_01_01_2024").unwrap();
        assert_eq!(artifacts[0].name, "50%_01_01_2024_001.jpg");
    }

    #[test]
    fn zero_pages_is_an_error() {
        let tools = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let script = fake_magick(tools.path(), 0);

        let err = run(&script, dest.path(), "Empty_01_01_2024").unwrap_err();
        assert!(matches!(err, PdfMedError::NoPagesProduced { .. }));
        assert!(listing(dest.path()).is_empty());
    }

    #[test]
    fn tool_failure_leaves_nothing_behind() {
        let tools = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let script = tools.path().join("fail.sh");
        fs::write(&script, "for last; do :; done\nprintf x > \"$(printf \"$last\" 1)\"\necho broken >&2\nexit 1\n").unwrap();

        let err = run(&script, dest.path(), "F_01_01_2024").unwrap_err();
        match err {
            PdfMedError::ToolFailed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(listing(dest.path()).is_empty());
    }

    #[test]
    fn unrelated_staged_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        for name in ["B_002.jpg", "B_001.jpg", "B_01.jpg", "B_001.png", "other_001.jpg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let pages = staged_pages(dir.path(), "B").unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["B_001.jpg", "B_002.jpg"]);
    }
}
