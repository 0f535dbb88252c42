//! CLI binary for pdfmed.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PdfMedConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfmed::{
    add, regenerate, regenerate_all, sanitize, AddRequest, GeneratedPdf, LayoutProgressCallback,
    PageSize, PdfMedConfig, ProgressCallback, RegenReport,
};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per specialty while its pages are
/// laid out, with a log line for every skipped image.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl LayoutProgressCallback for CliProgressCallback {
    fn on_layout_start(&self, specialty: &str, total: usize) {
        let style = ProgressStyle::with_template(
            "{prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} images  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix(specialty.to_string());
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn on_page_placed(&self, _index: usize, _total: usize, name: &str) {
        self.with_bar(|bar| {
            bar.set_message(name.to_string());
            bar.inc(1);
        });
    }

    fn on_item_skipped(&self, _index: usize, _total: usize, warning: &str) {
        self.with_bar(|bar| {
            bar.println(format!("  {} {}", yellow("⚠"), warning));
            bar.inc(1);
        });
    }

    fn on_layout_complete(&self, _total: usize, _pages: usize) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Add a photo to Cardiology, dated 12 March 2024
  pdfmed add -p ~/Downloads/IMG_2231.HEIC -s Cardiology -d 12-03-2024

  # Add every page of a scanned report, with a custom name prefix
  pdfmed add -p report.pdf -s "Foot & Ankle" -d 01.02.2024 -n "X ray"

  # Only the first page of a PDF
  pdfmed add -p report.pdf -s Neurology -d 05/06/2023 --first-page-only

  # Rebuild one document, or all of them
  pdfmed regen -s Cardiology
  pdfmed regen

  # Machine-readable result
  pdfmed --json regen > report.json

LAYOUT:
  foto/<specialty>/<name>_<DD_MM_YYYY>[_NN].jpg   converted images
  pdf/<specialty>/<specialty>.pdf                 one page per image, oldest first

EXTERNAL TOOLS (optional, looked up on PATH):
  magick | convert   PDF pages and fallback decoding (ImageMagick)
  ffmpeg             first frame of videos
  heif-convert       HEIC/HEIF photos

ENVIRONMENT VARIABLES:
  PDFMED_FOTO_DIR     Source image root (default: foto)
  PDFMED_PDF_DIR      Output document root (default: pdf)
  PDFMED_QUALITY      JPEG quality 1-100 (default: 85)
  PDFMED_MARGIN       Page margin in mm (default: 10)
  PDFMED_PAGE_SIZE    a4, a5 or letter (default: a4)
  RUST_LOG            Overrides the log filter
"#;

/// File medical-analysis images by specialty and keep one PDF per specialty.
#[derive(Parser, Debug)]
#[command(
    name = "pdfmed",
    version,
    about = "File medical-analysis images by specialty and keep one PDF per specialty",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory for converted images.
    #[arg(long, global = true, env = "PDFMED_FOTO_DIR", default_value = "foto")]
    foto_dir: PathBuf,

    /// Root directory for generated documents.
    #[arg(long, global = true, env = "PDFMED_PDF_DIR", default_value = "pdf")]
    pdf_dir: PathBuf,

    /// JPEG quality for converted images (1–100).
    #[arg(long, global = true, env = "PDFMED_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Page margin in millimetres.
    #[arg(long, global = true, env = "PDFMED_MARGIN")]
    margin: Option<f64>,

    /// Page size of generated documents.
    #[arg(long, global = true, env = "PDFMED_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// Rasterisation DPI for PDF sources (72–1200).
    #[arg(long, global = true, env = "PDFMED_DENSITY", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    density: u32,

    /// Directories searched for magick/convert, ffmpeg and heif-convert,
    /// in PATH syntax. Defaults to PATH.
    #[arg(long, global = true, env = "PDFMED_TOOL_PATH")]
    tool_path: Option<OsString>,

    /// Output the structured result as JSON on stdout.
    #[arg(long, global = true, env = "PDFMED_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFMED_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFMED_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFMED_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one source into a specialty and regenerate its document.
    Add(AddArgs),
    /// Regenerate one or every specialty document from its images.
    Regen(RegenArgs),
}

#[derive(Args, Debug)]
struct AddArgs {
    /// Photo, scan, video or PDF to add.
    #[arg(short = 'p', long = "path")]
    path: PathBuf,

    /// Specialty the analysis belongs to.
    #[arg(short = 's', long = "spec")]
    spec: String,

    /// Analysis date: DD-MM-YYYY, DD.MM.YYYY or DD/MM/YYYY.
    #[arg(short = 'd', long = "date")]
    date: String,

    /// File name prefix (default: the specialty).
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Convert only the first page of a PDF source.
    #[arg(long)]
    first_page_only: bool,
}

#[derive(Args, Debug)]
struct RegenArgs {
    /// Regenerate only this specialty.
    #[arg(short = 's', long = "spec")]
    spec: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    A4,
    A5,
    Letter,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::A5 => PageSize::A5,
            PageSizeArg::Letter => PageSize::Letter,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar and the summary lines carry what matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn LayoutProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    match &cli.command {
        Command::Add(args) => run_add(&cli, args, &config),
        Command::Regen(args) => run_regen(&cli, args, &config),
    }
}

fn run_add(cli: &Cli, args: &AddArgs, config: &PdfMedConfig) -> Result<ExitCode> {
    let mut request = AddRequest::new(&args.path, &args.spec, &args.date)
        .first_page_only(args.first_page_only);
    if let Some(name) = &args.name {
        request = request.name(name);
    }

    let outcome = add(&request, config)
        .with_context(|| format!("Failed to add {}", args.path.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        for artifact in &outcome.artifacts {
            eprintln!("{} Added {}", green("✔"), bold(&artifact.path.display().to_string()));
        }
        print_generated(&outcome.pdf);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_regen(cli: &Cli, args: &RegenArgs, config: &PdfMedConfig) -> Result<ExitCode> {
    let report = match &args.spec {
        Some(spec) => {
            let slug = sanitize(spec);
            anyhow::ensure!(!slug.is_empty(), "Specialty must not be empty");
            let pdf = regenerate(&slug, config)
                .with_context(|| format!("Failed to regenerate {slug}"))?;
            RegenReport {
                generated: vec![pdf],
                failures: Vec::new(),
            }
        }
        None => regenerate_all(config).context("Failed to regenerate documents")?,
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        if report.generated.is_empty() && report.failures.is_empty() {
            eprintln!(
                "Nothing to regenerate: no specialties under {}",
                config.foto_dir.display()
            );
        }
        for pdf in &report.generated {
            print_generated(pdf);
        }
        for failure in &report.failures {
            eprintln!("{} {}  {}", red("✘"), bold(&failure.specialty), red(&failure.error));
        }
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_generated(pdf: &GeneratedPdf) {
    eprintln!(
        "{} {}  {} pages  →  {}",
        if pdf.warnings.is_empty() {
            green("✔")
        } else {
            yellow("⚠")
        },
        bold(&pdf.specialty),
        pdf.pages,
        dim(&pdf.path.display().to_string()),
    );
    for warning in &pdf.warnings {
        eprintln!("   {} {}", yellow("⚠"), warning);
    }
}

/// Map CLI args to `PdfMedConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PdfMedConfig> {
    let mut builder = PdfMedConfig::builder()
        .foto_dir(&cli.foto_dir)
        .pdf_dir(&cli.pdf_dir)
        .page(PageSize::from(cli.page_size).geometry())
        .jpeg_quality(cli.quality)
        .pdf_density(cli.density);

    if let Some(margin) = cli.margin {
        builder = builder.margin_mm(margin);
    }
    if let Some(path) = &cli.tool_path {
        builder = builder.tool_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
