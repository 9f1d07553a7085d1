//! CLI argument parsing using clap

use crate::stream::{MAX_AMPLITUDE, MAX_SAMPLES};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Highest tunable center frequency
pub const FREQ_MAX_HZ: u64 = 7_250_000_000;

/// Center frequency used when `-f` is not given
pub const DEFAULT_FREQ_HZ: u64 = 900_000_000;

/// Sample rate used when `-s` is not given
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 10_000_000;

/// iqstream - SDR sample streaming between a radio transport and disk
///
/// Captures I/Q samples to raw or WAV files, or plays them back
#[derive(Parser, Debug)]
#[command(name = "iqstream")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Number of samples to transfer (decimal, 0x hex or 0b binary; default unlimited)
    #[arg(short = 'n', long, global = true, value_parser = parse_sample_count)]
    pub num_samples: Option<u64>,

    /// Sample rate in Hz (default 10 MHz)
    #[arg(short = 's', long, global = true, value_parser = parse_u32)]
    pub sample_rate: Option<u32>,

    /// Center frequency in Hz (default 900 MHz)
    #[arg(short = 'f', long, global = true, value_parser = parse_freq)]
    pub freq: Option<u64>,

    /// Settings file (default: <config dir>/iqstream/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode - only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output to file
    #[arg(long, global = true)]
    pub log: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture samples to a raw file with a sweep preamble
    Receive {
        /// Output file
        path: PathBuf,
    },

    /// Capture samples to a WAV file
    ReceiveWav {
        /// Output file; named from the time and frequency if omitted
        path: Option<PathBuf>,
    },

    /// Play samples from a file
    Transmit {
        /// Input file
        path: PathBuf,

        /// Restart from the beginning at end of file
        #[arg(short = 'R', long)]
        repeat: bool,
    },

    /// Transmit a continuous wave at a fixed DC amplitude
    Cw {
        /// Amplitude 0..=127
        #[arg(value_parser = clap::value_parser!(u8).range(0..=MAX_AMPLITUDE as i64))]
        amplitude: u8,
    },

    /// Show the preamble of a raw capture file
    Info {
        /// Raw capture file
        path: PathBuf,
    },

    /// Print a sample settings file, or write it to a path
    SampleConfig {
        /// Write the sample settings here instead of stdout
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

impl Args {
    /// Log level requested on the command line, if any
    ///
    /// `None` means the settings file decides.
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.quiet {
            Some(tracing::Level::ERROR)
        } else {
            match self.verbose {
                0 => None,
                1 => Some(tracing::Level::DEBUG),
                _ => Some(tracing::Level::TRACE),
            }
        }
    }
}

/// Parse an unsigned integer with optional `0x`/`0b` prefix
pub fn parse_u64(s: &str) -> Result<u64, String> {
    let (digits, radix) = match s.get(..2) {
        Some("0x" | "0X") if s.len() > 2 => (&s[2..], 16),
        Some("0b" | "0B") if s.len() > 2 => (&s[2..], 2),
        _ => (s, 10),
    };
    if digits.starts_with(['+', '-']) {
        return Err(format!("invalid number '{}'", s));
    }
    u64::from_str_radix(digits, radix).map_err(|e| format!("invalid number '{}': {}", s, e))
}

/// Like [`parse_u64`], limited to 32 bits
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("{} does not fit in 32 bits", value))
}

fn parse_sample_count(s: &str) -> Result<u64, String> {
    let value = parse_u64(s)?;
    if value >= MAX_SAMPLES {
        return Err(format!("sample count must be below {}", MAX_SAMPLES));
    }
    Ok(value)
}

fn parse_freq(s: &str) -> Result<u64, String> {
    let value = parse_u64(s)?;
    if value > FREQ_MAX_HZ {
        return Err(format!("frequency must be at most {} Hz", FREQ_MAX_HZ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64_prefixes() {
        assert_eq!(parse_u64("1000"), Ok(1000));
        assert_eq!(parse_u64("0x10"), Ok(16));
        assert_eq!(parse_u64("0XfF"), Ok(255));
        assert_eq!(parse_u64("0b101"), Ok(5));
        assert_eq!(parse_u64("0"), Ok(0));
        assert_eq!(parse_u64("00"), Ok(0));
    }

    #[test]
    fn test_parse_u64_rejects_garbage() {
        assert!(parse_u64("").is_err());
        assert!(parse_u64("0x").is_err());
        assert!(parse_u64("12ab").is_err());
        assert!(parse_u64("0b102").is_err());
        assert!(parse_u64("-5").is_err());
        assert!(parse_u64("0x+5").is_err());
    }

    #[test]
    fn test_sample_count_bound() {
        assert_eq!(
            parse_sample_count("0x7fffffffffffffff"),
            Ok(0x7fff_ffff_ffff_ffff)
        );
        assert!(parse_sample_count("0x8000000000000000").is_err());
    }

    #[test]
    fn test_parse_u32_overflow() {
        assert_eq!(parse_u32("10000000"), Ok(10_000_000));
        assert!(parse_u32("0x100000000").is_err());
    }

    #[test]
    fn test_cli_parses_receive() {
        let args = Args::try_parse_from([
            "iqstream", "receive", "out.bin", "-n", "0x100", "-f", "2450000000", "-vv",
        ])
        .unwrap();

        assert!(matches!(args.command, Command::Receive { ref path } if path == &PathBuf::from("out.bin")));
        assert_eq!(args.num_samples, Some(256));
        assert_eq!(args.freq, Some(2_450_000_000));
        assert_eq!(args.log_level(), Some(tracing::Level::TRACE));
    }

    #[test]
    fn test_cli_rejects_large_amplitude() {
        assert!(Args::try_parse_from(["iqstream", "cw", "128"]).is_err());
        let args = Args::try_parse_from(["iqstream", "cw", "127"]).unwrap();
        assert!(matches!(args.command, Command::Cw { amplitude: 127 }));
    }

    #[test]
    fn test_cli_transmit_repeat() {
        let args = Args::try_parse_from(["iqstream", "transmit", "-R", "in.bin", "-q"]).unwrap();
        assert!(matches!(args.command, Command::Transmit { repeat: true, .. }));
        assert_eq!(args.log_level(), Some(tracing::Level::ERROR));
    }

    #[test]
    fn test_cli_frequency_bound() {
        assert!(Args::try_parse_from(["iqstream", "receive-wav", "-f", "8000000000"]).is_err());
    }
}
