//! iqstream - SDR sample streaming CLI

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use iqstream::config::{Args, Command, Settings, DEFAULT_FREQ_HZ, DEFAULT_SAMPLE_RATE_HZ};
use iqstream::format::wav::capture_file_name;
use iqstream::format::{OutputFormat, RawHeader, RAW_HEADER_LEN};
use iqstream::stream::{Pipeline, StreamEnd, StreamSummary, TransferLimit, BYTES_PER_SAMPLE};
use iqstream::sync::CancelToken;
use iqstream::transport::{SimulatedTransport, TransferHandler};

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = load_settings(&args)?;

    // Initialize logging
    init_logging(&args, &settings)?;

    // Execute command
    match &args.command {
        Command::Receive { path } => cmd_receive(&args, &settings, path),
        Command::ReceiveWav { path } => cmd_receive_wav(&args, &settings, path.as_deref()),
        Command::Transmit { path, repeat } => cmd_transmit(&args, &settings, path, *repeat),
        Command::Cw { amplitude } => cmd_cw(&args, &settings, *amplitude),
        Command::Info { path } => cmd_info(path),
        Command::SampleConfig { write } => cmd_sample_config(write.as_deref()),
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };
    Ok(settings)
}

fn init_logging(args: &Args, settings: &Settings) -> Result<()> {
    let level = args
        .log_level()
        .map(|level| level.to_string())
        .unwrap_or_else(|| settings.log_level.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let log_file = args
        .log
        .clone()
        .or_else(|| Some(settings.log_file.clone()).filter(|f| !f.is_empty()));

    if let Some(log_file) = log_file {
        let file = File::create(&log_file)
            .with_context(|| format!("Failed to create log file '{}'", log_file))?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Cancellation token fired by Ctrl+C
fn install_ctrlc() -> Result<CancelToken> {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;
    Ok(cancel)
}

fn transfer_limit(args: &Args) -> TransferLimit {
    match args.num_samples {
        Some(samples) => TransferLimit::samples(samples),
        None => TransferLimit::unlimited(),
    }
}

fn new_pipeline(args: &Args, settings: &Settings) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new(settings.pipeline_config(transfer_limit(args)))?;
    pipeline.on_progress(|sample| println!("{}", sample));

    let limit = pipeline.config().limit;
    if limit.is_limited() {
        let bytes = limit.remaining().unwrap_or(0);
        println!("Samples to transfer: {} ({} bytes)", bytes / BYTES_PER_SAMPLE, bytes);
    }
    Ok(pipeline)
}

/// Capture to a raw file with a sweep preamble
fn cmd_receive(args: &Args, settings: &Settings, path: &Path) -> Result<()> {
    let mut header = RawHeader::default();
    if let Some(rate) = args.sample_rate {
        header.sample_rate = f64::from(rate);
    }
    if let Some(freq) = args.freq {
        header.center_freq = freq as f64;
    }

    capture(args, settings, path, OutputFormat::Raw(header))
}

/// Capture to a WAV file, naming it automatically when no path is given
fn cmd_receive_wav(args: &Args, settings: &Settings, path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let name = capture_file_name(args.freq.unwrap_or(DEFAULT_FREQ_HZ), Utc::now());
            match settings.output_dir() {
                Some(dir) => dir.join(name),
                None => PathBuf::from(name),
            }
        }
    };
    let sample_rate = args.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE_HZ);

    capture(args, settings, &path, OutputFormat::Wav { sample_rate })
}

fn capture(args: &Args, settings: &Settings, path: &Path, format: OutputFormat) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to open file '{}'", path.display()))?;

    println!("Receiving to {}", path.display());
    println!("Stop with Ctrl+C\n");

    let cancel = install_ctrlc()?;
    let mut pipeline = new_pipeline(args, settings)?;
    let mut transport =
        SimulatedTransport::receive(settings.transfer_chunk, settings.transfer_period());

    let (summary, _file) = pipeline.run_capture(&mut transport, file, format, &cancel)?;
    finish(summary)
}

/// Play a file through the transmit transport
fn cmd_transmit(args: &Args, settings: &Settings, path: &Path, repeat: bool) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file '{}'", path.display()))?;

    println!("Transmitting {}{}", path.display(), if repeat { " (repeat)" } else { "" });

    let pipeline = new_pipeline(args, settings)?;
    let producer = pipeline.playback_producer(BufReader::new(file), repeat);
    transmit(settings, pipeline, Box::new(producer))
}

/// Transmit a constant carrier
fn cmd_cw(args: &Args, settings: &Settings, amplitude: u8) -> Result<()> {
    println!("Transmitting CW with amplitude {}", amplitude);

    let pipeline = new_pipeline(args, settings)?;
    let source = pipeline.signal_source(amplitude)?;
    transmit(settings, pipeline, Box::new(source))
}

fn transmit(
    settings: &Settings,
    mut pipeline: Pipeline,
    handler: Box<dyn TransferHandler>,
) -> Result<()> {
    println!("Stop with Ctrl+C\n");

    let cancel = install_ctrlc()?;
    let mut transport = SimulatedTransport::transmit(
        settings.transfer_chunk,
        settings.transfer_period(),
        Box::new(std::io::sink()),
    );

    let summary = pipeline.run_transmit(&mut transport, handler, &cancel)?;
    finish(summary)
}

fn finish(summary: StreamSummary) -> Result<()> {
    println!();
    println!(
        "Transferred {} bytes ({} samples)",
        summary.total_bytes,
        summary.total_bytes / BYTES_PER_SAMPLE
    );
    println!("Total time: {:5.5} s", summary.elapsed.as_secs_f64());

    match summary.end {
        StreamEnd::Completed => {
            println!("Done.");
            Ok(())
        }
        StreamEnd::Cancelled => {
            println!("Stopped.");
            Ok(())
        }
        StreamEnd::Failed(e) => {
            error!("Stream failed: {}", e);
            Err(e.into())
        }
    }
}

/// Show the preamble of a raw capture
fn cmd_info(path: &Path) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file '{}'", path.display()))?;
    let mut reader = BufReader::new(file);

    let header = RawHeader::read_from(&mut reader)
        .with_context(|| format!("'{}' is not a raw capture", path.display()))?;
    let file_len = reader.seek(SeekFrom::End(0))?;
    let payload = file_len.saturating_sub(RAW_HEADER_LEN as u64);
    debug!("File length {} bytes", file_len);

    if payload % BYTES_PER_SAMPLE != 0 {
        warn!("Payload ends in half a sample");
    }

    println!("Capture Information:\n");
    println!("  Sample rate:  {:.0} Hz", header.sample_rate);
    println!("  Frequency:    {:.0} Hz", header.center_freq);
    println!("  Bandwidth:    {:.0} Hz", header.bandwidth);
    println!("  Sweep time:   {} s", header.sweep_duration);
    println!("  Flags:        {:#x}", header.flags);
    println!("  Payload:      {} bytes ({} samples)", payload, payload / BYTES_PER_SAMPLE);

    Ok(())
}

/// Print the commented sample settings, or write the defaults to a file
fn cmd_sample_config(write: Option<&Path>) -> Result<()> {
    match write {
        Some(path) => {
            Settings::default().save(path)?;
            println!("Default settings written to {}", path.display());
        }
        None => print!("{}", Settings::sample_config()),
    }
    Ok(())
}
