//! External command-line converters.
//!
//! Each [`ExternalTool`] names one or more interchangeable executables in
//! preference order (`magick` before `convert`). A tool is available when one
//! of them resolves on the executable search path; the lookup is repeated on
//! every attempt rather than cached. Invocations block until the child exits
//! and capture stderr so failures can be reported with the tool's own words.

use crate::error::PdfMedError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// A family of interchangeable executables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalTool {
    /// Human-readable name used in logs and errors.
    pub label: &'static str,
    /// Executable names, most preferred first.
    pub candidates: &'static [&'static str],
}

/// ImageMagick 7 (`magick`) or 6 (`convert`).
pub const IMAGEMAGICK: ExternalTool = ExternalTool {
    label: "ImageMagick",
    candidates: &["magick", "convert"],
};

/// Video frame extractor.
pub const FFMPEG: ExternalTool = ExternalTool {
    label: "ffmpeg",
    candidates: &["ffmpeg"],
};

/// libheif's converter.
pub const HEIF_CONVERT: ExternalTool = ExternalTool {
    label: "heif-convert",
    candidates: &["heif-convert"],
};

impl ExternalTool {
    /// First candidate found on `search_path` (the process `PATH` when
    /// `None`), if any.
    pub fn locate(&self, search_path: Option<&OsStr>) -> Option<PathBuf> {
        self.candidates
            .iter()
            .find_map(|name| find_executable(name, search_path))
    }

    /// Every candidate found on `search_path`, in preference order.
    pub fn locate_all(&self, search_path: Option<&OsStr>) -> Vec<PathBuf> {
        self.candidates
            .iter()
            .filter_map(|name| find_executable(name, search_path))
            .collect()
    }
}

fn find_executable(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    match search_path {
        None => which::which(name).ok(),
        Some(paths) => {
            let cwd = std::env::current_dir().ok()?;
            which::which_in(name, Some(paths), cwd).ok()
        }
    }
}

/// Run `program` with `args` and wait for it to exit.
///
/// A spawn failure or a non-zero exit becomes [`PdfMedError::ToolFailed`]
/// carrying the exit status and the trimmed stderr.
pub fn run_tool<I, S>(program: &Path, args: I) -> Result<(), PdfMedError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    debug!("Running {:?}", cmd);

    let tool = program.display().to_string();
    let output = cmd.output().map_err(|e| PdfMedError::ToolFailed {
        tool: tool.clone(),
        status: "spawn failed".into(),
        stderr: e.to_string(),
    })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        debug!("{} stderr: {}", tool, stderr);
    }

    if !output.status.success() {
        return Err(PdfMedError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING: ExternalTool = ExternalTool {
        label: "missing",
        candidates: &["pdfmed-no-such-tool-a", "pdfmed-no-such-tool-b"],
    };

    #[test]
    fn missing_tool_is_not_located() {
        assert!(MISSING.locate(None).is_none());
        assert!(MISSING.locate_all(None).is_empty());
    }

    #[test]
    fn empty_search_path_finds_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let search = dir.path().as_os_str();
        assert!(IMAGEMAGICK.locate(Some(search)).is_none());
        assert!(FFMPEG.locate_all(Some(search)).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn search_path_overrides_process_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let fake = dir.path().join("convert");
        std::fs::write(&fake, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let found = IMAGEMAGICK.locate_all(Some(dir.path().as_os_str()));
        assert_eq!(found, vec![fake]);
    }

    #[test]
    fn spawn_failure_is_tool_failed() {
        let err = run_tool(Path::new("/definitely/not/a/tool"), ["x"]).unwrap_err();
        match err {
            PdfMedError::ToolFailed { status, .. } => assert_eq!(status, "spawn failed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_carries_stderr() {
        let sh = which::which("sh").expect("sh on PATH");
        let err = run_tool(&sh, ["-c", "echo boom >&2; exit 3"]).unwrap_err();
        match err {
            PdfMedError::ToolFailed { status, stderr, .. } => {
                assert!(status.contains('3'), "status: {status}");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_is_ok() {
        let sh = which::which("sh").expect("sh on PATH");
        run_tool(&sh, ["-c", "exit 0"]).unwrap();
    }
}
