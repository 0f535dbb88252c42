//! Conversion strategies: turn one source into one JPEG.
//!
//! A [`ConversionChain`] holds an ordered list of [`ConversionStrategy`]
//! implementations and tries them until one reports [`Attempt::Converted`].
//! The standard chain is:
//!
//! ```text
//! built-in decode ──▶ ImageMagick ──▶ ffmpeg (video) ──▶ heif-convert (HEIC)
//!   (no process)      (magick|convert)  first frame        HEIC/HEIF only
//! ```
//!
//! Strategies that do not apply to the source kind return
//! [`Attempt::NotApplicable`]; those whose executable cannot be found return
//! [`Attempt::Unavailable`]. Neither counts as a failure. Every strategy
//! writes to the same destination; whatever a failed strategy left there,
//! including `<stem>-N.<ext>` frame files from multi-frame sources, is
//! removed before the next one runs.

use crate::config::PdfMedConfig;
use crate::error::PdfMedError;
use crate::pipeline::input::{SourceItem, SourceKind};
use crate::pipeline::tools::{self, ExternalTool, FFMPEG, HEIF_CONVERT, IMAGEMAGICK};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of one strategy.
#[derive(Debug)]
pub enum Attempt {
    /// The destination now holds a JPEG.
    Converted,
    /// The strategy does not handle this kind of source.
    NotApplicable(String),
    /// The strategy applies but its executable was not found.
    Unavailable(String),
    /// The strategy ran and failed.
    Failed(PdfMedError),
}

/// One way of producing a JPEG from a source.
pub trait ConversionStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Try to write `destination` from `source`.
    fn attempt(&self, source: &SourceItem, destination: &Path, config: &PdfMedConfig) -> Attempt;
}

/// Ordered list of strategies tried until one succeeds.
pub struct ConversionChain {
    strategies: Vec<Box<dyn ConversionStrategy>>,
}

impl Default for ConversionChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl ConversionChain {
    /// Chain with custom strategies, tried in the given order.
    pub fn new(strategies: Vec<Box<dyn ConversionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Built-in decode, ImageMagick, ffmpeg, heif-convert.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(BuiltinDecode),
            Box::new(ImageMagickConvert),
            Box::new(FfmpegFirstFrame),
            Box::new(HeifConvert),
        ])
    }

    /// Names of the strategies, in order.
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Convert `source` into a JPEG at `destination`.
    ///
    /// Creates the destination's parent directory first. If no strategy
    /// succeeds the result is [`PdfMedError::ConversionExhausted`] naming the
    /// first real failure, else the last missing tool, else the last
    /// not-applicable reason. Nothing is left at `destination`.
    pub fn convert(
        &self,
        source: &SourceItem,
        destination: &Path,
        config: &PdfMedConfig,
    ) -> Result<(), PdfMedError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| PdfMedError::io(parent, e))?;
        }

        let preexisting = frame_siblings(destination);
        let mut failures: Vec<PdfMedError> = Vec::new();
        let mut skipped = 0usize;
        let mut last_unavailable: Option<String> = None;
        let mut last_not_applicable: Option<String> = None;

        for strategy in &self.strategies {
            debug!(
                "Trying {} for {} → {}",
                strategy.name(),
                source.path.display(),
                destination.display()
            );
            match strategy.attempt(source, destination, config) {
                Attempt::Converted if destination.is_file() => {
                    remove_new_frames(destination, &preexisting);
                    info!(
                        "Converted {} via {}",
                        source.path.display(),
                        strategy.name()
                    );
                    return Ok(());
                }
                Attempt::Converted => {
                    discard_partial(destination, &preexisting);
                    failures.push(PdfMedError::ToolFailed {
                        tool: strategy.name().to_string(),
                        status: "reported success".into(),
                        stderr: "no output file was written".into(),
                    });
                }
                Attempt::NotApplicable(reason) => {
                    debug!("{} skipped: {}", strategy.name(), reason);
                    skipped += 1;
                    last_not_applicable = Some(reason);
                }
                Attempt::Unavailable(reason) => {
                    debug!("{} unavailable: {}", strategy.name(), reason);
                    skipped += 1;
                    last_unavailable = Some(reason);
                }
                Attempt::Failed(e) => {
                    debug!("{} failed: {}", strategy.name(), e);
                    discard_partial(destination, &preexisting);
                    failures.push(e);
                }
            }
        }

        let leading = failures
            .first()
            .map(|e| e.to_string())
            .or(last_unavailable)
            .or(last_not_applicable)
            .unwrap_or_else(|| "no conversion strategy configured".to_string());

        Err(PdfMedError::ConversionExhausted {
            path: source.path.clone(),
            failed: failures.len(),
            skipped,
            leading,
        })
    }
}

/// Remove `destination` and any frame files written next to it.
fn discard_partial(destination: &Path, preexisting: &HashSet<PathBuf>) {
    if destination.exists() {
        remove_logged(destination);
    }
    remove_new_frames(destination, preexisting);
}

fn remove_new_frames(destination: &Path, preexisting: &HashSet<PathBuf>) {
    for frame in frame_siblings(destination) {
        if !preexisting.contains(&frame) {
            remove_logged(&frame);
        }
    }
}

fn remove_logged(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Could not remove partial output {}: {}", path.display(), e);
    }
}

/// Files named `<stem>-<digits>.<ext>` beside `destination`.
///
/// ImageMagick writes these instead of `destination` when its input has more
/// than one frame.
fn frame_siblings(destination: &Path) -> HashSet<PathBuf> {
    let (Some(parent), Some(stem)) = (
        destination.parent(),
        destination.file_stem().and_then(OsStr::to_str),
    ) else {
        return HashSet::new();
    };
    let suffix = match destination.extension().and_then(OsStr::to_str) {
        Some(ext) => format!(".{}", ext),
        None => String::new(),
    };
    let prefix = format!("{}-", stem);

    let Ok(entries) = fs::read_dir(if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    }) else {
        return HashSet::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(OsStr::to_str)
                .and_then(|name| name.strip_prefix(prefix.as_str()))
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
                .is_some_and(|digits| {
                    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
                })
        })
        .collect()
}

// ── Built-in decode ──────────────────────────────────────────────────────

/// Decode with the `image` crate and re-encode as JPEG.
///
/// Handles JPEG, PNG, GIF, WebP, BMP and TIFF without any external process.
/// EXIF orientation is applied so the output is upright like the
/// `-auto-orient` ImageMagick path.
pub struct BuiltinDecode;

impl ConversionStrategy for BuiltinDecode {
    fn name(&self) -> &str {
        "built-in decoder"
    }

    fn attempt(&self, source: &SourceItem, destination: &Path, config: &PdfMedConfig) -> Attempt {
        match source.kind {
            SourceKind::Pdf | SourceKind::Video => {
                return Attempt::NotApplicable(format!(
                    "{:?} sources need an external tool",
                    source.kind
                ))
            }
            SourceKind::Raster | SourceKind::Heif => {}
        }

        let img = match decode_upright(&source.path) {
            Ok(img) => img,
            Err(e) => return Attempt::Failed(e),
        };
        let bytes = match encode_jpeg(&img, config.jpeg_quality, &source.path) {
            Ok(b) => b,
            Err(e) => return Attempt::Failed(e),
        };
        match fs::write(destination, &bytes) {
            Ok(()) => Attempt::Converted,
            Err(e) => Attempt::Failed(PdfMedError::io(destination, e)),
        }
    }
}

fn decode_upright(path: &Path) -> Result<DynamicImage, PdfMedError> {
    let decode_err = |detail: String| PdfMedError::ImageDecode {
        path: path.to_path_buf(),
        detail,
    };

    let reader = ImageReader::open(path)
        .map_err(|e| PdfMedError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| PdfMedError::io(path, e))?;
    let mut decoder = reader.into_decoder().map_err(|e| decode_err(e.to_string()))?;
    let orientation = decoder.orientation().map_err(|e| decode_err(e.to_string()))?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| decode_err(e.to_string()))?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Encode `img` as a baseline JPEG at `quality`.
///
/// JPEG has no alpha channel, so the image is flattened to RGB (or kept as
/// grayscale) first.
pub(crate) fn encode_jpeg(
    img: &DynamicImage,
    quality: u8,
    origin: &Path,
) -> Result<Vec<u8>, PdfMedError> {
    let flattened = if img.color().has_color() {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        DynamicImage::ImageLuma8(img.to_luma8())
    };

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&flattened)
        .map_err(|e| PdfMedError::ImageEncode {
            path: origin.to_path_buf(),
            detail: e.to_string(),
        })?;
    debug!("Encoded {} → {} bytes JPEG", origin.display(), buf.len());
    Ok(buf)
}

// ── External tools ───────────────────────────────────────────────────────

/// Run `args` through every available executable of `tool` until one works.
fn attempt_with_tool(tool: &ExternalTool, args: &[OsString], config: &PdfMedConfig) -> Attempt {
    let programs = tool.locate_all(config.tool_path.as_deref());
    if programs.is_empty() {
        return Attempt::Unavailable(format!(
            "{} not found on PATH (tried {})",
            tool.label,
            tool.candidates.join(", ")
        ));
    }

    let mut last_err = None;
    for program in programs {
        match tools::run_tool(&program, args) {
            Ok(()) => return Attempt::Converted,
            Err(e) => {
                debug!("{} failed: {}", program.display(), e);
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) => Attempt::Failed(e),
        None => Attempt::Unavailable(format!("{} not found on PATH", tool.label)),
    }
}

/// ImageMagick with a fixed pipeline: auto-orient, sRGB, strip, quality.
///
/// Only the first frame (`file[0]`) is read, so multi-page and multi-frame
/// inputs still yield exactly one output file. PDF sources are rasterised at
/// the configured density.
pub struct ImageMagickConvert;

impl ImageMagickConvert {
    fn args(source: &SourceItem, destination: &Path, config: &PdfMedConfig) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if source.kind == SourceKind::Pdf {
            args.push("-density".into());
            args.push(config.pdf_density.to_string().into());
        }
        let mut first_frame = source.path.clone().into_os_string();
        first_frame.push("[0]");
        args.push(first_frame);
        args.extend(standard_magick_pipeline(config));
        args.push(destination.as_os_str().to_owned());
        args
    }
}

/// `-auto-orient -colorspace sRGB -quality Q -strip`
pub(crate) fn standard_magick_pipeline(config: &PdfMedConfig) -> Vec<OsString> {
    [
        "-auto-orient".to_string(),
        "-colorspace".to_string(),
        "sRGB".to_string(),
        "-quality".to_string(),
        config.jpeg_quality.to_string(),
        "-strip".to_string(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}

impl ConversionStrategy for ImageMagickConvert {
    fn name(&self) -> &str {
        "ImageMagick"
    }

    fn attempt(&self, source: &SourceItem, destination: &Path, config: &PdfMedConfig) -> Attempt {
        attempt_with_tool(
            &IMAGEMAGICK,
            &Self::args(source, destination, config),
            config,
        )
    }
}

/// ffmpeg: first video frame at high still quality.
pub struct FfmpegFirstFrame;

impl ConversionStrategy for FfmpegFirstFrame {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn attempt(&self, source: &SourceItem, destination: &Path, config: &PdfMedConfig) -> Attempt {
        if source.kind != SourceKind::Video {
            return Attempt::NotApplicable("not a video".into());
        }
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            source.path.clone().into_os_string(),
            "-frames:v".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            destination.as_os_str().to_owned(),
        ];
        attempt_with_tool(&FFMPEG, &args, config)
    }
}

/// heif-convert for the HEIC/HEIF family.
pub struct HeifConvert;

impl ConversionStrategy for HeifConvert {
    fn name(&self) -> &str {
        "heif-convert"
    }

    fn attempt(&self, source: &SourceItem, destination: &Path, config: &PdfMedConfig) -> Attempt {
        if source.kind != SourceKind::Heif {
            return Attempt::NotApplicable("not HEIC/HEIF".into());
        }
        let args: Vec<OsString> = vec![
            "-q".into(),
            config.jpeg_quality.to_string().into(),
            source.path.clone().into_os_string(),
            destination.as_os_str().to_owned(),
        ];
        attempt_with_tool(&HEIF_CONVERT, &args, config)
    }
}
