//! CAN Signal Encoder CLI Application
//!
//! This is the command-line front end for the CAN signal encoder.
//! It uses the can-signal-encoder library and adds:
//! - Signal tables from the command line or a config.toml
//! - JSON-lines update input from a file or stdin
//! - Parallel composition of large update batches
//! - JSON-lines or shared-memory record output

use anyhow::{bail, Context, Result};
use can_signal_encoder::{Encoder, FrameSink, FrameUpdate, JsonLinesSink, RecordSink};
use clap::Parser;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

mod config;

use config::{AppConfig, OutputFormat};

/// CAN Signal Encoder - Compose CAN frames from signal updates
#[derive(Parser, Debug)]
#[command(name = "can-signal-cli")]
#[command(about = "Compose CAN frames from JSON signal updates", long_about = None)]
#[command(version)]
struct Args {
    /// Path to CSV signal table(s) (can be repeated)
    #[arg(long, value_name = "FILE")]
    csv: Vec<PathBuf>,

    /// Path to DBC file(s) (can be repeated)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON-lines file with update messages (default: stdin)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file for composed frames (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Compose every update for this message instead of reading `message`/`topic`
    #[arg(short, long, value_name = "NAME")]
    message: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Compose updates in parallel (output order is kept)
    #[arg(long)]
    parallel: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// Outcome of one run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Summary {
    composed: usize,
    failed: usize,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Signal Encoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using encoder library v{}", can_signal_encoder::VERSION);

    let settings = merge_settings(&args)?;
    let encoder = load_encoder(&settings)?;

    let reader: Box<dyn BufRead> = match &settings.input.updates {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open input: {:?}", path))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let writer: Box<dyn Write> = match &settings.output.path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create output: {:?}", path))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let mut sink = make_sink(settings.output.format, writer);

    let summary = if settings.output.parallel {
        run_parallel(&encoder, args.message.as_deref(), reader, &mut sink)?
    } else {
        run_sequential(&encoder, args.message.as_deref(), reader, &mut sink)?
    };

    sink.flush().context("Failed to flush output")?;

    log::info!(
        "Composed {} frame(s), {} update(s) failed",
        summary.composed,
        summary.failed
    );

    Ok(())
}

/// Combine the config file (if any) with command-line flags; flags win
fn merge_settings(args: &Args) -> Result<AppConfig> {
    let mut settings = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    settings.input.csv_files.extend(args.csv.iter().cloned());
    settings.input.dbc_files.extend(args.dbc.iter().cloned());

    if let Some(input) = &args.input {
        settings.input.updates = Some(input.clone());
    }
    if let Some(output) = &args.output {
        settings.output.path = Some(output.clone());
    }
    if let Some(format) = args.format {
        settings.output.format = format;
    }
    settings.output.parallel |= args.parallel;

    if settings.input.csv_files.is_empty() && settings.input.dbc_files.is_empty() {
        bail!("No signal tables given; use --csv, --dbc or --config");
    }

    Ok(settings)
}

/// Load every configured signal table
fn load_encoder(settings: &AppConfig) -> Result<Encoder> {
    let encoder_config = settings.encoder_config();
    let mut encoder = Encoder::new();

    for csv_path in &settings.input.csv_files {
        encoder
            .add_csv(csv_path, &encoder_config)
            .with_context(|| format!("Failed to load CSV table {:?}", csv_path))?;
    }

    for dbc_path in &settings.input.dbc_files {
        encoder
            .add_dbc(dbc_path, &encoder_config)
            .with_context(|| format!("Failed to load DBC file {:?}", dbc_path))?;
    }

    let stats = encoder.database_stats();
    log::info!(
        "Signal tables: {} message(s), {} signal(s)",
        stats.num_messages,
        stats.num_signals
    );

    if stats.num_messages == 0 {
        log::warn!("No messages loaded; every update will fail");
    }

    Ok(encoder)
}

fn make_sink<'a>(format: OutputFormat, writer: Box<dyn Write + 'a>) -> Box<dyn FrameSink + 'a> {
    match format {
        OutputFormat::Json => Box::new(JsonLinesSink::new(writer)),
        OutputFormat::Record => Box::new(RecordSink::new(writer)),
    }
}

/// Compose the update on one input line
fn compose_line(encoder: &Encoder, target: Option<&str>, line: &str) -> Result<FrameUpdate> {
    let msg: serde_json::Value = serde_json::from_str(line).context("Invalid JSON")?;

    let frame = match target {
        Some(message) => encoder.compose_json_for(message, &msg)?,
        None => encoder.compose_json(&msg)?,
    };

    Ok(frame)
}

/// Record one composed (or failed) line
fn emit(
    line_no: usize,
    result: Result<FrameUpdate>,
    sink: &mut dyn FrameSink,
    summary: &mut Summary,
) -> Result<()> {
    match result {
        Ok(frame) => {
            log::debug!("line {}: {}", line_no, frame);
            sink.publish(&frame).context("Failed to write frame")?;
            summary.composed += 1;
        }
        Err(e) => {
            log::error!("line {}: {:#}", line_no, e);
            summary.failed += 1;
        }
    }
    Ok(())
}

/// Compose updates one line at a time
fn run_sequential(
    encoder: &Encoder,
    target: Option<&str>,
    reader: impl BufRead,
    sink: &mut dyn FrameSink,
) -> Result<Summary> {
    let mut summary = Summary::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        emit(index + 1, compose_line(encoder, target, &line), sink, &mut summary)?;
    }

    Ok(summary)
}

/// Read every line, compose them in parallel, then write in input order
fn run_parallel(
    encoder: &Encoder,
    target: Option<&str>,
    reader: impl BufRead,
    sink: &mut dyn FrameSink,
) -> Result<Summary> {
    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if !line.trim().is_empty() {
            lines.push((index + 1, line));
        }
    }

    log::debug!("Composing {} update(s) in parallel", lines.len());

    let results: Vec<(usize, Result<FrameUpdate>)> = lines
        .par_iter()
        .map(|(line_no, line)| (*line_no, compose_line(encoder, target, line)))
        .collect();

    let mut summary = Summary::default();
    for (line_no, result) in results {
        emit(line_no, result, sink, &mut summary)?;
    }

    Ok(summary)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    // Log to stderr so stdout stays clean for frame output
    Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
