//! Specialty-level entry points: `add` and `regen`.
//!
//! A specialty owns `foto/<slug>/` (its JPEG artifacts) and
//! `pdf/<slug>/<slug>.pdf` (the composed document). Every operation here
//! ends by rebuilding the document from scratch out of whatever the source
//! directory currently holds; nothing is patched incrementally.

use crate::config::PdfMedConfig;
use crate::date::{parse_date, AnalysisDate};
use crate::error::{ItemWarning, PdfMedError};
use crate::naming::{ensure_unique_path, sanitize};
use crate::output::{AddOutcome, GeneratedPdf, ImageArtifact, RegenReport, SpecialtyFailure};
use crate::pipeline::collect::collect;
use crate::pipeline::input::{resolve_source, SourceKind};
use crate::pipeline::rasterize::ingest_pdf_pages;
use crate::pipeline::render::compose_document;
use crate::pipeline::strategy::ConversionChain;
use chrono::{Local, NaiveTime, TimeZone};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, info, warn};

/// One `add` invocation.
#[derive(Debug, Clone)]
pub struct AddRequest {
    /// Photo, scan, video or PDF to ingest.
    pub source: PathBuf,
    /// Free-text specialty; sanitised into the slug.
    pub specialty: String,
    /// Analysis date, `DD-MM-YYYY`, `DD.MM.YYYY` or `DD/MM/YYYY`.
    pub date: String,
    /// File name prefix; defaults to the specialty.
    pub name: Option<String>,
    /// Convert only the first page of a PDF source.
    pub first_page_only: bool,
}

impl AddRequest {
    pub fn new(
        source: impl Into<PathBuf>,
        specialty: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            specialty: specialty.into(),
            date: date.into(),
            name: None,
            first_page_only: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn first_page_only(mut self, v: bool) -> Self {
        self.first_page_only = v;
        self
    }
}

/// Ingest one source into its specialty and regenerate that specialty's
/// document.
///
/// Arguments are validated before anything touches the filesystem. Any
/// failure aborts the whole invocation; a failed conversion leaves no
/// artifact behind.
pub fn add(request: &AddRequest, config: &PdfMedConfig) -> Result<AddOutcome, PdfMedError> {
    add_with(&ConversionChain::default(), request, config)
}

/// [`add`] with a caller-supplied conversion chain.
pub fn add_with(
    chain: &ConversionChain,
    request: &AddRequest,
    config: &PdfMedConfig,
) -> Result<AddOutcome, PdfMedError> {
    if request.source.as_os_str().is_empty() {
        return Err(PdfMedError::InvalidArgument("source path is required".into()));
    }
    let slug = sanitize(&request.specialty);
    if slug.is_empty() {
        return Err(PdfMedError::InvalidArgument("specialty is required".into()));
    }
    let date = parse_date(&request.date)?;
    let source = resolve_source(&request.source)?;

    let prefix = request
        .name
        .as_deref()
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slug.clone());
    let base = format!("{}_{}", prefix, date.token);

    let source_dir = config.specialty_source_dir(&slug);
    let output_dir = config.specialty_output_dir(&slug);
    for dir in [&source_dir, &output_dir] {
        fs::create_dir_all(dir).map_err(|e| PdfMedError::io(dir, e))?;
    }

    let written: Vec<PathBuf> = if source.kind == SourceKind::Pdf && !request.first_page_only {
        ingest_pdf_pages(&source, &source_dir, &base, config)?
            .into_iter()
            .map(|a| a.path)
            .collect()
    } else {
        let destination = ensure_unique_path(&source_dir.join(format!("{base}.jpg")))?;
        chain.convert(&source, &destination, config)?;
        vec![destination]
    };

    for path in &written {
        stamp_analysis_date(path, &date);
    }
    let artifacts = written
        .iter()
        .map(|p| ImageArtifact::from_path(p))
        .collect::<Result<Vec<_>, _>>()?;

    for a in &artifacts {
        info!("Added {}", a.path.display());
    }

    let pdf = regenerate(&slug, config)?;
    Ok(AddOutcome {
        specialty: slug,
        artifacts,
        pdf,
    })
}

/// Set `path`'s modification time to local midnight of the analysis date.
///
/// Best effort: the date token in the file name already fixes the order.
fn stamp_analysis_date(path: &Path, date: &AnalysisDate) {
    let Some(midnight) = Local
        .from_local_datetime(&date.date.and_time(NaiveTime::MIN))
        .earliest()
    else {
        warn!("No local midnight on {} for {}", date.date, path.display());
        return;
    };
    let result = File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(SystemTime::from(midnight)));
    if let Err(e) = result {
        warn!("Could not set modification time of {}: {}", path.display(), e);
    }
}

/// Rebuild `pdf/<slug>/<slug>.pdf` from `foto/<slug>/`.
///
/// `slug` is used verbatim as the directory name. A missing source directory
/// is [`PdfMedError::DirectoryMissing`]; an empty one yields a page-less
/// document and an [`ItemWarning::EmptySource`].
pub fn regenerate(slug: &str, config: &PdfMedConfig) -> Result<GeneratedPdf, PdfMedError> {
    let source_dir = config.specialty_source_dir(slug);
    if !source_dir.is_dir() {
        return Err(PdfMedError::DirectoryMissing { path: source_dir });
    }

    let items = collect(&source_dir)?;
    let empty = items.is_empty().then(|| ItemWarning::EmptySource {
        dir: source_dir.clone(),
    });
    if let Some(w) = &empty {
        warn!("{}", w);
    }

    let mut pdf = compose_document(slug, &items, &config.specialty_pdf_path(slug), config)?;
    if let Some(w) = empty {
        pdf.warnings.insert(0, w);
    }
    Ok(pdf)
}

/// Regenerate every specialty under the source root, one at a time in name
/// order.
///
/// A failing specialty is recorded in the report and the run continues with
/// the next one. A missing or empty source root is not an error.
pub fn regenerate_all(config: &PdfMedConfig) -> Result<RegenReport, PdfMedError> {
    let slugs = specialty_dirs(&config.foto_dir)?;
    let mut report = RegenReport::default();
    if slugs.is_empty() {
        info!(
            "Nothing to regenerate: no specialties under {}",
            config.foto_dir.display()
        );
        return Ok(report);
    }

    for slug in slugs {
        match regenerate(&slug, config) {
            Ok(pdf) => report.generated.push(pdf),
            Err(e) => {
                error!("Specialty {} failed: {}", slug, e);
                report.failures.push(SpecialtyFailure {
                    specialty: slug,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Regenerated {} specialt{} ({} pages), {} failed",
        report.generated.len(),
        if report.generated.len() == 1 { "y" } else { "ies" },
        report.total_pages(),
        report.failures.len()
    );
    Ok(report)
}

/// Names of the immediate subdirectories of `root`, sorted.
fn specialty_dirs(root: &Path) -> Result<Vec<String>, PdfMedError> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PdfMedError::ReadDirFailed {
                path: root.to_path_buf(),
                source: e,
            })
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PdfMedError::ReadDirFailed {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!("Skipping non-UTF-8 directory {:?}", raw),
        }
    }
    names.sort();
    Ok(names)
}
