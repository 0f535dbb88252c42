//! Configuration types for ingestion and PDF generation.
//!
//! Every tunable default (page geometry, JPEG quality, rasteriser density,
//! directory roots) lives in one immutable [`PdfMedConfig`], built via its
//! [`PdfMedConfigBuilder`] and passed by reference into the conversion,
//! collection and layout stages. Tests construct alternate geometries and
//! qualities without touching process-wide state.

use crate::error::PdfMedError;
use crate::progress::LayoutProgressCallback;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default root for specialty source images.
pub const DEFAULT_FOTO_DIR: &str = "foto";

/// Default root for generated documents.
pub const DEFAULT_PDF_DIR: &str = "pdf";

/// Configuration shared by every pdfmed operation.
///
/// # Example
/// ```rust
/// use pdfmed::{PageGeometry, PdfMedConfig};
///
/// let config = PdfMedConfig::builder()
///     .page(PageGeometry::letter())
///     .jpeg_quality(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.jpeg_quality, 90);
/// ```
#[derive(Clone)]
pub struct PdfMedConfig {
    /// Root holding one image directory per specialty. Default: `foto`.
    pub foto_dir: PathBuf,

    /// Root holding one document directory per specialty. Default: `pdf`.
    pub pdf_dir: PathBuf,

    /// Physical page size and margin. Default: A4 portrait, 10 mm margin.
    pub page: PageGeometry,

    /// JPEG quality for every re-encode (built-in decoder and external
    /// tools). Range: 1–100. Default: 85.
    pub jpeg_quality: u8,

    /// Density in DPI handed to the rasteriser for PDF sources. Default: 300.
    ///
    /// Scanned lab reports are usually A4 with small print; 300 DPI keeps the
    /// text legible once the page is scaled back down onto an A4 sheet.
    pub pdf_density: u32,

    /// Compress content streams of the generated document. Default: true.
    pub compress: bool,

    /// Search path for external converters, in `PATH` syntax. `None` uses
    /// the process `PATH`.
    pub tool_path: Option<OsString>,

    /// Optional per-page layout progress sink.
    pub progress_callback: Option<Arc<dyn LayoutProgressCallback>>,
}

impl Default for PdfMedConfig {
    fn default() -> Self {
        Self {
            foto_dir: PathBuf::from(DEFAULT_FOTO_DIR),
            pdf_dir: PathBuf::from(DEFAULT_PDF_DIR),
            page: PageGeometry::default(),
            jpeg_quality: 85,
            pdf_density: 300,
            compress: true,
            tool_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PdfMedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfMedConfig")
            .field("foto_dir", &self.foto_dir)
            .field("pdf_dir", &self.pdf_dir)
            .field("page", &self.page)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("pdf_density", &self.pdf_density)
            .field("compress", &self.compress)
            .field("tool_path", &self.tool_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn LayoutProgressCallback>"),
            )
            .finish()
    }
}

impl PdfMedConfig {
    /// Create a new builder for `PdfMedConfig`.
    pub fn builder() -> PdfMedConfigBuilder {
        PdfMedConfigBuilder {
            config: Self::default(),
        }
    }

    /// `foto/<slug>` for the given specialty.
    pub fn specialty_source_dir(&self, slug: &str) -> PathBuf {
        self.foto_dir.join(slug)
    }

    /// `pdf/<slug>` for the given specialty.
    pub fn specialty_output_dir(&self, slug: &str) -> PathBuf {
        self.pdf_dir.join(slug)
    }

    /// `pdf/<slug>/<slug>.pdf` for the given specialty.
    pub fn specialty_pdf_path(&self, slug: &str) -> PathBuf {
        self.specialty_output_dir(slug).join(format!("{slug}.pdf"))
    }
}

/// Builder for [`PdfMedConfig`].
#[derive(Debug)]
pub struct PdfMedConfigBuilder {
    config: PdfMedConfig,
}

impl PdfMedConfigBuilder {
    pub fn foto_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.foto_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn pdf_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.pdf_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn page(mut self, page: PageGeometry) -> Self {
        self.config.page = page;
        self
    }

    pub fn margin_mm(mut self, margin: f64) -> Self {
        self.config.page.margin_mm = margin;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn pdf_density(mut self, dpi: u32) -> Self {
        self.config.pdf_density = dpi;
        self
    }

    pub fn compress(mut self, v: bool) -> Self {
        self.config.compress = v;
        self
    }

    pub fn tool_path(mut self, path: impl Into<OsString>) -> Self {
        self.config.tool_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn LayoutProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PdfMedConfig, PdfMedError> {
        let c = &self.config;
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(PdfMedError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if !(72..=1200).contains(&c.pdf_density) {
            return Err(PdfMedError::InvalidConfig(format!(
                "PDF density must be 72–1200 DPI, got {}",
                c.pdf_density
            )));
        }
        c.page.validate()?;
        Ok(self.config)
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

/// Portrait page size and uniform margin, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin_mm: f64,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

impl PageGeometry {
    pub fn new(width_mm: f64, height_mm: f64, margin_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
            margin_mm,
        }
    }

    /// ISO A4, 210 × 297 mm, 10 mm margin.
    pub fn a4() -> Self {
        Self::new(210.0, 297.0, 10.0)
    }

    /// ISO A5, 148 × 210 mm, 10 mm margin.
    pub fn a5() -> Self {
        Self::new(148.0, 210.0, 10.0)
    }

    /// US Letter, 215.9 × 279.4 mm, 10 mm margin.
    pub fn letter() -> Self {
        Self::new(215.9, 279.4, 10.0)
    }

    /// Width of the region inside the margins.
    pub fn usable_width(&self) -> f64 {
        self.width_mm - 2.0 * self.margin_mm
    }

    /// Height of the region inside the margins.
    pub fn usable_height(&self) -> f64 {
        self.height_mm - 2.0 * self.margin_mm
    }

    fn validate(&self) -> Result<(), PdfMedError> {
        let finite = [self.width_mm, self.height_mm, self.margin_mm]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.margin_mm < 0.0 {
            return Err(PdfMedError::InvalidConfig(format!(
                "Page geometry must be finite with a non-negative margin, got {self:?}"
            )));
        }
        if self.usable_width() <= 0.0 || self.usable_height() <= 0.0 {
            return Err(PdfMedError::InvalidConfig(format!(
                "Margin {} mm leaves no usable area on a {}×{} mm page",
                self.margin_mm, self.width_mm, self.height_mm
            )));
        }
        Ok(())
    }
}

/// Named page presets accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A5,
    Letter,
}

impl PageSize {
    /// Geometry for this preset with the default 10 mm margin.
    pub fn geometry(self) -> PageGeometry {
        match self {
            PageSize::A4 => PageGeometry::a4(),
            PageSize::A5 => PageGeometry::a5(),
            PageSize::Letter => PageGeometry::letter(),
        }
    }
}
