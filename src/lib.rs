//! iqstream - SDR sample streaming
//!
//! Moves I/Q samples between a real-time radio transport and disk through a
//! bounded ring buffer and a dedicated writer thread.

pub mod config;
pub mod error;
pub mod format;
pub mod report;
pub mod stream;
pub mod sync;
pub mod transport;

pub use error::{Result, StreamError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
