//! Command line and settings file

mod args;
mod settings;

pub use args::{
    parse_u32, parse_u64, Args, Command, DEFAULT_FREQ_HZ, DEFAULT_SAMPLE_RATE_HZ, FREQ_MAX_HZ,
};
pub use settings::{ConfigError, Settings};
