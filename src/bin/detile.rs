//! CLI binary for pdf-detile.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `DetileConfig`, renders progress events and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pdf_detile::pipeline::pdfium::PdfiumBackend;
use pdf_detile::{
    inspect_with, DetileConfig, DetileError, DetileOutput, DocumentSummary, Pipeline, PipelineEvent,
    ProgressEvent, RasterFormat, Step, VerticalCompensation,
};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

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

// ── Step progress bars ───────────────────────────────────────────────────────

/// One indicatif bar per pipeline step, stacked as the steps start.
struct StepBars {
    multi: MultiProgress,
    current: Option<(Step, ProgressBar)>,
}

impl StepBars {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current: None,
        }
    }

    fn update(&mut self, event: ProgressEvent) {
        let same_step = matches!(&self.current, Some((step, _)) if *step == event.step);
        if !same_step {
            if let Some((_, done)) = self.current.take() {
                done.finish();
            }
            let bar = self.multi.add(ProgressBar::new(event.total as u64));
            bar.set_style(
                ProgressStyle::with_template(
                    "{prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
                     ⏱ {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            bar.set_prefix(format!("{}: {}", event.step, event.step.label()));
            self.current = Some((event.step, bar));
        }
        if let Some((_, bar)) = &self.current {
            bar.set_position(event.completed as u64);
        }
    }

    fn finish(self, success: bool) {
        if let Some((_, bar)) = self.current {
            if success {
                bar.finish();
            } else {
                bar.abandon();
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # A drawing printed as 3 tiles per row
  detile house-plans.pdf -columns 3

  # Same, long form, sharper output
  detile house-plans.pdf --columns 3 --scale 2 -o house-full.pdf

  # Pull each row up by half a pixel per row, like older detilers did
  detile poster.pdf -c 4 --legacy-row-offset

  # Machine-readable progress (one JSON message per line)
  detile poster.pdf -c 4 --json

  # Page count and tile size only
  detile --inspect-only poster.pdf

EXIT CODES:
  0  composite written
  1  the input could not be detiled
  2  invalid arguments

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium; otherwise ./ then the system library
  RUST_LOG          Override the log filter (e.g. pdf_detile=debug)
"#;

/// Reassemble a tiled PDF into a single page.
#[derive(Parser, Debug)]
#[command(
    name = "detile",
    version,
    about = "Reassemble a tiled PDF into a single page",
    long_about = "Reassemble a drawing that was printed across a grid of pages. Every page \
of the input is one tile; tiles fill the grid row by row, left to right, with the given \
number of columns. The result is one PDF page holding the whole drawing.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Tiled PDF file.
    input: PathBuf,

    /// Tiles per row of the original grid (also accepted as `-columns`).
    #[arg(short, long, env = "DETILE_COLUMNS", required_unless_present = "inspect_only")]
    columns: Option<usize>,

    /// Output PDF. Default: <input stem>_detiled.pdf beside the input.
    #[arg(short, long, env = "DETILE_OUTPUT")]
    output: Option<PathBuf>,

    /// Pixels per PDF point when rasterising (1.0 = 72 DPI).
    #[arg(long, env = "DETILE_SCALE", default_value_t = 1.0)]
    scale: f32,

    /// Shift row r up by r × PX pixels.
    #[arg(long, env = "DETILE_ROW_COMPENSATION", value_name = "PX",
          conflicts_with = "legacy_row_offset")]
    row_compensation: Option<f32>,

    /// Shift row r up by r / 2 pixels.
    #[arg(long, env = "DETILE_LEGACY_ROW_OFFSET")]
    legacy_row_offset: bool,

    /// Format of the intermediate per-page rasters.
    #[arg(long, env = "DETILE_FORMAT", value_enum, default_value = "png")]
    format: FormatArg,

    /// JPEG quality (1–100) when --format jpeg.
    #[arg(long, env = "DETILE_JPEG_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Directory for intermediate rasters. Default: the system temp dir.
    #[arg(long, env = "DETILE_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DETILE_PASSWORD")]
    password: Option<String>,

    /// Print progress and the result as JSON lines on stdout.
    #[arg(long, env = "DETILE_JSON")]
    json: bool,

    /// Print page count and tile size only; write nothing.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bars.
    #[arg(long, env = "DETILE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DETILE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DETILE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    Jpeg,
}

/// Rewrite the single-dash `-columns` spelling to `--columns`.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-columns") => OsString::from("--columns"),
            Some(s) if s.starts_with("-columns=") => OsString::from(format!("-{s}")),
            _ => arg,
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    // ── Logging setup ────────────────────────────────────────────────────
    // The bars give all the feedback that matters; keep library logs quiet
    // while they are drawn.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress || cli.json {
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

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::from(exit_status(&e))
        }
    }
}

/// 2 for usage errors, 1 for everything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<DetileError>()
        .and_then(|e| u8::try_from(e.kind().exit_code()).ok())
        .unwrap_or(1)
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let summary = inspect_with(&cli.input, cli.password.clone(), PdfiumBackend::bind)
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            print_load_report(&cli.input, &summary, cli.columns);
        }
        return Ok(());
    }

    let config = build_config(cli)?;

    if !cli.quiet && !cli.json {
        let summary = inspect_with(
            &config.input_path,
            config.password.clone(),
            PdfiumBackend::bind,
        )
        .await
            .context("Failed to load PDF")?;
        print_load_report(&config.input_path, &summary, Some(config.columns));
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let mut handle = Pipeline::new(config).start();
    let mut bars = show_progress.then(StepBars::new);
    let mut outcome: Option<Result<DetileOutput, DetileError>> = None;

    while let Some(event) = handle.next_event().await {
        if cli.json {
            println!(
                "{}",
                serde_json::to_string(&event.to_wire()).context("Failed to serialize event")?
            );
        }
        match event {
            PipelineEvent::Progress(p) => {
                if let Some(bars) = bars.as_mut() {
                    bars.update(p);
                }
            }
            PipelineEvent::Completed(out) => outcome = Some(Ok(out)),
            PipelineEvent::Failed(e) => outcome = Some(Err(e)),
        }
    }
    if let Some(bars) = bars {
        bars.finish(matches!(outcome, Some(Ok(_))));
    }

    let output = outcome
        .context("Pipeline ended without a result")?
        .context("Detile failed")?;

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} Wrote {} successfully!",
            green("✔"),
            bold(&output.output_path.display().to_string())
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "{} × {} px canvas, {}ms total",
                output.stats.canvas_width_px,
                output.stats.canvas_height_px,
                output.stats.total_duration_ms
            ))
        );
    }
    Ok(())
}

/// Map CLI args to `DetileConfig`.
fn build_config(cli: &Cli) -> Result<DetileConfig> {
    // clap enforces this outside --inspect-only.
    let columns = cli.columns.context("--columns is required")?;

    let mut builder = DetileConfig::builder(&cli.input, columns).scale(cli.scale);
    if let Some(ref output) = cli.output {
        builder = builder.output_path(output);
    }
    if let Some(px_per_row) = cli.row_compensation {
        builder = builder.vertical_compensation(VerticalCompensation::Linear { px_per_row });
    } else if cli.legacy_row_offset {
        builder = builder.vertical_compensation(VerticalCompensation::legacy());
    }
    builder = builder.raster_format(match cli.format {
        FormatArg::Png => RasterFormat::Png,
        FormatArg::Jpeg => RasterFormat::Jpeg {
            quality: cli.jpeg_quality,
        },
    });
    if let Some(ref dir) = cli.staging_dir {
        builder = builder.staging_root(dir);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }

    Ok(builder.build()?)
}

fn print_load_report(path: &Path, summary: &DocumentSummary, columns: Option<usize>) {
    println!("File:         {}", path.display());
    println!("Pages:        {}", summary.page_count);
    println!(
        "Tile size:    {:.2} x {:.2} in",
        summary.tile_width_inches(),
        summary.tile_height_inches()
    );
    if !summary.uniform {
        println!("Uniform:      {}", red("no (pages differ in size)"));
    }
    if let Some(columns) = columns {
        let (c, r) = summary.grid(columns);
        println!("Output grid:  {c} x {r}");
    }
}
