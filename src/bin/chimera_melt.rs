//! chimera-melt: Convert a bzip2 Market Change Message dump into CSV
//!
//! Usage:
//!   # Writes 1.219876543.csv next to the current directory
//!   chimera-melt 1.219876543.bz2
//!
//!   # Explicit output, UTC timestamps, LF line endings
//!   chimera-melt feed.bz2 -o feed.csv --utc --lf
//!
//!   # Read from stdin, write to stdout
//!   cat feed.bz2 | chimera-melt > feed.csv

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use chimera::naming::{csv_name_for, is_allowed_file};
use chimera::{convert_feed, FeedError, JsonBackend, LineEnding, MeltConfig, TimestampZone};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chimera-melt")]
#[command(about = "Convert bzip2 market change feeds into CSV", long_about = None)]
struct Args {
    /// Input .bz2 file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output CSV path, `-` for stdout.
    /// Defaults to the input name with .bz2 replaced by .csv, or stdout for stdin input
    #[arg(long, short = 'o')]
    output: Option<String>,

    /// Render timestamps in UTC instead of local time
    #[arg(long)]
    utc: bool,

    /// Terminate CSV rows with \n instead of \r\n
    #[arg(long)]
    lf: bool,

    /// Decode lines with simd-json
    #[arg(long)]
    simd: bool,

    /// Log skipped lines (same as RUST_LOG=debug)
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Build config
    let mut config = MeltConfig::default();
    if args.utc {
        config.zone = TimestampZone::Utc;
    }
    if args.lf {
        config.export.line_ending = LineEnding::Lf;
    }
    if args.simd {
        config.backend = JsonBackend::Simd;
    }

    let source: Box<dyn Read> = match &args.input {
        Some(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !is_allowed_file(&name) {
                bail!("Only .bz2 files allowed: {}", path.display());
            }
            Box::new(File::open(path).with_context(|| format!("Failed to open {}", path.display()))?)
        }
        None => Box::new(std::io::stdin()),
    };

    let output = match (&args.output, &args.input) {
        (Some(out), _) if out == "-" => None,
        (Some(out), _) => Some(PathBuf::from(out)),
        (None, Some(input)) => {
            let name = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            Some(PathBuf::from(csv_name_for(&name)))
        }
        (None, None) => None,
    };

    let result = match &output {
        Some(path) => convert_to_file(source, path, &config),
        None => {
            let stdout = std::io::stdout();
            convert_feed(source, BufWriter::new(stdout.lock()), &config)
                .map_err(anyhow::Error::from)
        }
    };

    match result {
        Ok(stats) => {
            info!(
                "wrote {} records from {} market change messages ({} lines skipped)",
                stats.records,
                stats.messages,
                stats.blank + stats.malformed + stats.ignored
            );
            Ok(())
        }
        Err(e) => {
            if let Some(FeedError::NoData) = e.downcast_ref::<FeedError>() {
                bail!("No valid data found in file");
            }
            Err(e)
        }
    }
}

/// Convert into a file, removing it again if the conversion does not succeed
fn convert_to_file(source: Box<dyn Read>, path: &Path, config: &MeltConfig) -> Result<chimera::MeltStats> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut sink = BufWriter::new(file);

    let result = convert_feed(source, &mut sink, config).and_then(|stats| {
        sink.flush()?;
        Ok(stats)
    });

    match result {
        Ok(stats) => {
            info!("CSV written to {}", path.display());
            Ok(stats)
        }
        Err(e) => {
            drop(sink);
            discard_partial(path);
            Err(e.into())
        }
    }
}

/// Remove a partially written output. Returns false if it could not be removed.
fn discard_partial(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("could not remove partial output {}: {}", path.display(), e);
            false
        }
    }
}
