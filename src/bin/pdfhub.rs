//! CLI binary for pdfhub-client.
//!
//! A thin shim over the library crate: each subcommand drives one tool's
//! full Intake → Preview → Submit → Download flow against a running
//! conversion API and saves the artifact locally.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pdfhub_client::{
    CompressionLevel, DirectorySink, FileSessionStore, FlowConfig, IncomingFile, JobMetrics,
    MemorySessionStore, ProgressObserver, ProgressSnapshot, SessionStore, SubmitOptions, ToolFlow,
    ToolKind,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Narrated progress → terminal bar ─────────────────────────────────────────

/// Renders the narrated stage sequence on a single indicatif bar. The bar
/// position is the narrated percentage; the real outcome settles it.
struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        Arc::new(BarObserver { bar })
    }
}

impl ProgressObserver for BarObserver {
    fn on_update(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.percent as u64);
        self.bar.set_message(snapshot.label.clone());
        if snapshot.settled {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge two PDFs (output order = argument order)
  pdfhub merge chapter1.pdf chapter2.pdf

  # Compress with a specific level
  pdfhub compress --level extreme report.pdf scans.pdf

  # Extract pages 1, 3 and 5
  pdfhub split --pages 1,3,5 document.pdf

  # Convert a PDF to Word, saving into ./out
  pdfhub convert --to word -o out document.pdf

  # Images to a single PDF
  pdfhub convert --to pdf photo1.jpg photo2.jpg

  # Point at a different API instance
  pdfhub --api-base https://api.pdfhub.example merge a.pdf b.pdf

  # Keep the session on disk between runs (like a browser tab)
  pdfhub --session-dir ~/.cache/pdfhub merge a.pdf b.pdf

ENVIRONMENT VARIABLES:
  PDFHUB_API_BASE     Conversion API base URL
  PDFHUB_OUTPUT_DIR   Where downloaded artifacts are saved
  PDFHUB_SESSION_DIR  Persist session state in this directory
  PDFIUM_LIB_PATH     Path to a libpdfium copy for thumbnail rendering;
                      without one, flows run fine but without previews
"#;

/// Drive the PdfHub conversion tools from the terminal.
#[derive(Parser, Debug)]
#[command(
    name = "pdfhub",
    version,
    about = "Merge, split, compress and convert documents via the PdfHub API",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base URL of the conversion API.
    #[arg(
        long,
        env = "PDFHUB_API_BASE",
        default_value = "http://localhost:5011",
        global = true
    )]
    api_base: String,

    /// Directory where downloaded artifacts are saved.
    #[arg(
        short,
        long,
        env = "PDFHUB_OUTPUT_DIR",
        default_value = ".",
        global = true
    )]
    output_dir: PathBuf,

    /// Persist session state here instead of in memory.
    #[arg(long, env = "PDFHUB_SESSION_DIR", global = true)]
    session_dir: Option<PathBuf>,

    /// Disable the progress bar.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge two or more PDFs into one, in the given order.
    Merge {
        /// PDF files, in output order.
        files: Vec<PathBuf>,
    },
    /// Compress one or more PDFs.
    Compress {
        files: Vec<PathBuf>,
        /// Compression level.
        #[arg(long, value_enum, default_value = "balanced")]
        level: LevelArg,
    },
    /// Extract selected pages from a PDF.
    Split {
        file: PathBuf,
        /// 1-indexed pages to extract, e.g. 1,3,5.
        #[arg(long, value_delimiter = ',', required = true)]
        pages: Vec<usize>,
    },
    /// Convert documents to another format.
    Convert {
        files: Vec<PathBuf>,
        /// Target format.
        #[arg(long, value_enum)]
        to: TargetArg,
    },
    /// Clear a tool's saved session state.
    Reset {
        /// Tool slug, e.g. merge-pdf, compress-pdf.
        tool: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LevelArg {
    Maximum,
    Balanced,
    Extreme,
}

impl From<LevelArg> for CompressionLevel {
    fn from(v: LevelArg) -> Self {
        match v {
            LevelArg::Maximum => CompressionLevel::Maximum,
            LevelArg::Balanced => CompressionLevel::Balanced,
            LevelArg::Extreme => CompressionLevel::Extreme,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TargetArg {
    Word,
    Pdf,
    Jpg,
    Png,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The bar owns the terminal while a flow runs; keep library logs quiet
    // unless the user asks for them.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Merge { files } => {
            run_flow(&cli, ToolKind::Merge, files.clone(), SubmitOptions::default()).await
        }
        Command::Compress { files, level } => {
            let options = SubmitOptions {
                level: Some((*level).into()),
                ..Default::default()
            };
            run_flow(&cli, ToolKind::Compress, files.clone(), options).await
        }
        Command::Split { file, pages } => {
            let options = SubmitOptions {
                pages: Some(pages.clone()),
                ..Default::default()
            };
            run_flow(&cli, ToolKind::Split, vec![file.clone()], options).await
        }
        Command::Convert { files, to } => {
            let kind = conversion_tool(*to, files)?;
            run_flow(&cli, kind, files.clone(), SubmitOptions::default()).await
        }
        Command::Reset { tool } => reset_tool(&cli, tool),
    }
}

/// Map a conversion target (and, for `--to pdf`, the input extension) onto
/// the tool that serves it.
fn conversion_tool(target: TargetArg, files: &[PathBuf]) -> Result<ToolKind> {
    match target {
        TargetArg::Word => Ok(ToolKind::PdfToWord),
        TargetArg::Jpg => Ok(ToolKind::PdfToJpg),
        TargetArg::Png => Ok(ToolKind::PdfToPng),
        TargetArg::Pdf => {
            let ext = files
                .first()
                .and_then(|p| p.extension())
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            match ext.as_str() {
                "jpg" | "jpeg" => Ok(ToolKind::JpgToPdf),
                "png" => Ok(ToolKind::PngToPdf),
                "doc" | "docx" => Ok(ToolKind::WordToPdf),
                other => bail!("cannot infer a to-PDF tool from '.{other}' input"),
            }
        }
    }
}

fn session_store(cli: &Cli) -> Result<Arc<dyn SessionStore>> {
    Ok(match &cli.session_dir {
        Some(dir) => Arc::new(
            FileSessionStore::new(dir.clone())
                .with_context(|| format!("open session dir {}", dir.display()))?,
        ),
        None => Arc::new(MemorySessionStore::new()),
    })
}

/// The whole page flow, front to back: intake, preview, submit, download.
async fn run_flow(
    cli: &Cli,
    kind: ToolKind,
    files: Vec<PathBuf>,
    options: SubmitOptions,
) -> Result<()> {
    if files.is_empty() {
        bail!("no input files given");
    }

    let config = FlowConfig::builder().api_base_url(&cli.api_base).build()?;
    let mut flow = ToolFlow::new(kind, config, session_store(cli)?)?;
    let show_progress = !cli.quiet && !cli.no_progress;
    if show_progress {
        flow = flow.progress_observer(BarObserver::new());
    }

    // ── Intake ───────────────────────────────────────────────────────────
    let mut incoming = Vec::with_capacity(files.len());
    for path in &files {
        incoming.push(
            IncomingFile::from_path(path)
                .await
                .with_context(|| format!("read {}", path.display()))?,
        );
    }
    let report = flow.intake(incoming).await?;
    for (name, reason) in &report.rejected {
        eprintln!("{} {name}: {reason}", red("✗"));
    }
    if !cli.quiet {
        for entry in &flow.working().entries {
            let pages = entry
                .page_count
                .map(|n| format!(", {n} page{}", if n == 1 { "" } else { "s" }))
                .unwrap_or_default();
            eprintln!(
                "{} {} {}",
                green("✓"),
                entry.name,
                dim(&format!("({}{pages})", format_size(entry.size)))
            );
        }
    }
    flow.proceed_to_preview()?;

    // ── Preview (a fresh page load in the browser; here the same process) ─
    flow.load_preview()?;

    // ── Submit ───────────────────────────────────────────────────────────
    let result = flow.submit(&options).await?;
    if !cli.quiet {
        print_metrics(&result.metrics);
    }

    // ── Download ─────────────────────────────────────────────────────────
    let sink = DirectorySink::new(cli.output_dir.clone())?;
    let path = flow.download_artifact(&result, &sink).await?;
    println!("{}", path.display());
    if !cli.quiet {
        eprintln!(
            "{} saved — server copy expires in {}",
            green("✔"),
            bold(&flow.retention().display())
        );
    }
    Ok(())
}

fn reset_tool(cli: &Cli, slug: &str) -> Result<()> {
    let Some(&kind) = ToolKind::all().iter().find(|k| k.slug() == slug) else {
        let known: Vec<&str> = ToolKind::all().iter().map(|k| k.slug()).collect();
        bail!("unknown tool '{slug}' (known: {})", known.join(", "));
    };
    let config = FlowConfig::builder().api_base_url(&cli.api_base).build()?;
    let mut flow = ToolFlow::new(kind, config, session_store(cli)?)?;
    flow.start_over()?;
    eprintln!("{} session cleared for {kind}", green("✔"));
    Ok(())
}

fn print_metrics(metrics: &JobMetrics) {
    match metrics {
        JobMetrics::Merge {
            file_count,
            page_count,
            total_size,
        } => {
            let pages = page_count
                .map(|n| format!(", {n} pages"))
                .unwrap_or_default();
            eprintln!(
                "{} merged {file_count} files ({}{pages})",
                green("✔"),
                format_size(*total_size)
            );
        }
        JobMetrics::Compress {
            file_count,
            original_size,
            compressed_size,
            saved_percentage,
            level,
        } => {
            let after = compressed_size
                .map(|s| format_size(s))
                .unwrap_or_else(|| "?".to_string());
            let saved = saved_percentage
                .map(|p| format!(", saved {p}%"))
                .unwrap_or_default();
            eprintln!(
                "{} compressed {file_count} file(s) [{level}]: {} → {after}{saved}",
                green("✔"),
                format_size(*original_size)
            );
        }
        JobMetrics::Split {
            selected_pages,
            total_pages,
        } => {
            eprintln!(
                "{} extracted {} of {total_pages} pages",
                green("✔"),
                selected_pages.len()
            );
        }
        JobMetrics::Convert { file_count, output } => {
            eprintln!("{} converted {file_count} file(s) to {output}", green("✔"));
        }
    }
}

/// Human-readable size, matching the site's display ("2.00 MB", "340.5 KB").
fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}
