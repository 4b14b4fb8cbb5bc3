//! # noteflow-pdf
//!
//! Best-effort PDF compression for NoteFlow uploads. Oversized notes are run
//! through Ghostscript with progressively more aggressive settings until
//! they fit the upload budget, and the smallest result is kept otherwise.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────┐
//!                  │  CLI (clap)  │
//!                  └──────┬───────┘
//!                         │
//!           ┌─────────────┼─────────────┐
//!           ▼             ▼             ▼
//!     ┌───────────┐ ┌────────────┐ ┌─────────┐
//!     │  Config   │ │ Compressor │ │  Probe  │
//!     │(TOML+env) │ │  (ladder)  │ │         │
//!     └─────┬─────┘ └─────┬──────┘ └────┬────┘
//!           ▼             └──────┬──────┘
//!     ┌───────────┐    ┌─────────▼──────────┐
//!     │  Locate   │    │ Ghostscript runner │
//!     │ (gs, gsw) │    │ tokio, timeout+kill│
//!     └───────────┘    └────────────────────┘
//! ```

mod compressor;
mod config;
mod error;
mod ghostscript;
mod locate;
mod profile;
mod report;

use clap::{Parser, Subcommand};
use compressor::{CompressOptions, Compressor};
use ghostscript::ProcessRunner;
use profile::QualityPreset;
use std::path::{Path, PathBuf};

/// noteflow-pdf — shrink uploaded PDFs to fit a size budget
#[derive(Parser, Debug)]
#[command(
    name = "noteflow-pdf",
    version,
    about = "Shrink uploaded PDFs to fit a size budget using Ghostscript",
    long_about = "noteflow-pdf tries a ladder of Ghostscript quality presets, from \
                  gentle to aggressive, until a PDF fits the upload budget. If none \
                  fits, the smallest result is kept.\n\n\
                  Settings come from noteflow-pdf.toml and the PDF_GS_* / \
                  PDF_CLOUDINARY_MAX_MB / GHOSTSCRIPT_PATH environment variables."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (overrides default search)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "noteflow-pdf.toml")]
        output: PathBuf,
    },

    /// Compress a PDF until it fits the budget
    Compress {
        /// PDF to compress
        input: PathBuf,

        /// Budget in megabytes (overrides configuration)
        #[arg(short, long, value_parser = parse_max_mb)]
        max_mb: Option<f64>,

        /// Move the result here instead of leaving it in the temp directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the result as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Run a single Ghostscript pass with one preset
    Shrink {
        /// PDF to compress
        input: PathBuf,

        /// Where to write the result
        #[arg(short, long)]
        output: PathBuf,

        /// Quality preset: screen, ebook, printer or prepress
        #[arg(short, long, default_value = "ebook")]
        quality: String,
    },

    /// Check whether Ghostscript can be launched
    Probe,

    /// Show the profiles and candidates that would be tried
    Plan,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", colored::Colorize::red("error:"), e);
        if matches!(&e, error::NoteflowError::Compress(c) if c.is_executable_not_found()) {
            eprintln!("  Run `noteflow-pdf probe` to see which locations were tried.");
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> error::Result<()> {
    match &cli.command {
        Command::Init { output } => cmd_init(output),
        Command::Compress {
            input,
            max_mb,
            output,
            json,
        } => cmd_compress(&cli, input, *max_mb, output.as_deref(), *json).await,
        Command::Shrink {
            input,
            output,
            quality,
        } => cmd_shrink(&cli, input, output, quality).await,
        Command::Probe => cmd_probe(&cli).await,
        Command::Plan => cmd_plan(&cli),
    }
}

// ─── Command Implementations ────────────────────────────────────────────────

fn cmd_init(output: &Path) -> error::Result<()> {
    config::init_config(output)?;
    eprintln!(
        "{} Created configuration file: {}",
        colored::Colorize::green("✓"),
        output.display(),
    );
    eprintln!("  Edit the file to tune the budget and quality ladder, then run:");
    eprintln!("  {} noteflow-pdf compress notes.pdf", colored::Colorize::bold("$"));
    Ok(())
}

async fn cmd_compress(
    cli: &Cli,
    input: &Path,
    max_mb: Option<f64>,
    output: Option<&Path>,
    json: bool,
) -> error::Result<()> {
    let cfg = load_config(cli)?;
    let compressor = Compressor::new(cfg.settings.compressor_config()).with_progress(!json);

    let options = CompressOptions {
        max_bytes: max_mb.map(config::mb_to_bytes),
    };
    let max_bytes = options.max_bytes.unwrap_or(compressor.config().max_bytes);
    let original_size = tokio::fs::metadata(input).await?.len();

    if !json {
        print_header("Compress");
    }

    let mut result = compressor.compress(input, &options).await?;

    if let Some(dest) = output {
        deliver(&result.path, dest, result.compressed).await?;
        result.path = dest.to_path_buf();
    }

    if json {
        let out = serde_json::to_string_pretty(&result)
            .map_err(|e| anyhow::anyhow!("failed to serialize result: {e}"))?;
        println!("{out}");
    } else {
        report::print_summary(original_size, max_bytes, &result);
    }

    Ok(())
}

async fn cmd_shrink(cli: &Cli, input: &Path, output: &Path, quality: &str) -> error::Result<()> {
    let cfg = load_config(cli)?;
    let quality: QualityPreset = quality.parse()?;
    let compressor_cfg = cfg.settings.compressor_config();

    print_header("Shrink");

    let data = tokio::fs::read(input).await?;
    let shrunk = ghostscript::compress_bytes(
        &ProcessRunner,
        &compressor_cfg.candidates,
        &data,
        quality,
        compressor_cfg.timeout,
        &compressor_cfg.temp_dir,
    )
    .await?;
    tokio::fs::write(output, &shrunk).await?;

    eprintln!(
        "  {} {} → {} ({}, {:.1}% ratio)",
        colored::Colorize::green("✓"),
        report::format_size(data.len() as u64),
        output.display(),
        report::format_size(shrunk.len() as u64),
        report::ratio(data.len() as u64, shrunk.len() as u64) * 100.0,
    );
    Ok(())
}

async fn cmd_probe(cli: &Cli) -> error::Result<()> {
    let cfg = load_config(cli)?;
    let candidates = cfg.settings.compressor_config().candidates;

    let found =
        ghostscript::probe_any(&ProcessRunner, &candidates, cfg.settings.probe_timeout()).await;

    match found {
        Some(exe) => eprintln!(
            "  {} Ghostscript available: {}",
            colored::Colorize::green("✓"),
            colored::Colorize::bold(exe.as_str()),
        ),
        None => {
            eprintln!("  {} Ghostscript not found. Tried:", colored::Colorize::red("✗"));
            for candidate in &candidates {
                eprintln!("    - {candidate}");
            }
            eprintln!(
                "  Install Ghostscript (Windows: gswin64c) or set {}.",
                config::ENV_GHOSTSCRIPT_PATH
            );
        }
    }
    Ok(())
}

fn cmd_plan(cli: &Cli) -> error::Result<()> {
    let cfg = load_config(cli)?;
    print_header("Plan");
    report::print_plan(&cfg.settings.compressor_config());
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn load_config(cli: &Cli) -> error::Result<config::Config> {
    if let Some(path) = &cli.config {
        config::load_config_from(path)
    } else {
        config::load_config()
    }
}

fn parse_max_mb(value: &str) -> Result<f64, error::ConfigError> {
    config::parse_megabytes("--max-mb", value)
}

/// Places the result at `dest`: a compressed temp file is moved, an
/// untouched input is copied unless `dest` already is the input.
async fn deliver(from: &Path, dest: &Path, move_file: bool) -> error::Result<()> {
    if !move_file {
        if !same_file(from, dest).await {
            tokio::fs::copy(from, dest).await?;
        }
        return Ok(());
    }
    if tokio::fs::rename(from, dest).await.is_err() {
        // Temp dir on another filesystem.
        tokio::fs::copy(from, dest).await?;
        tokio::fs::remove_file(from).await?;
    }
    Ok(())
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn print_header(action: &str) {
    eprintln!();
    eprintln!(
        "  {} noteflow-pdf v{} — {action}",
        colored::Colorize::bold("⚡"),
        env!("CARGO_PKG_VERSION"),
    );
    eprintln!();
}
