//! Settings file support

use crate::stream::{PipelineConfig, TransferLimit};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Settings loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ring buffer size in bytes
    pub ring_capacity: usize,

    /// Largest single write to the output file, in bytes
    pub write_chunk: usize,

    /// Transport transfer size in bytes
    pub transfer_chunk: usize,

    /// Transport transfer period in milliseconds
    pub transfer_period_ms: u64,

    /// Progress report interval in milliseconds
    pub report_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log file path (empty = no file logging)
    pub log_file: String,

    /// Directory for automatically named captures (empty = current directory)
    pub output_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ring_capacity: 50 * 1024 * 1024,
            write_chunk: 1024 * 1024,
            transfer_chunk: 256 * 1024,
            transfer_period_ms: 13,
            report_interval_ms: 1000,
            log_level: "info".to_string(),
            log_file: String::new(),
            output_dir: String::new(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load settings from the default location, or defaults if there is none
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/iqstream/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("iqstream").join("config.toml"))
    }

    /// Save settings to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;

        // Create parent directories if needed
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Pipeline configuration for a run capped at `limit`
    pub fn pipeline_config(&self, limit: TransferLimit) -> PipelineConfig {
        PipelineConfig {
            ring_capacity: self.ring_capacity,
            write_chunk: self.write_chunk,
            report_interval: Duration::from_millis(self.report_interval_ms),
            limit,
        }
    }

    pub fn transfer_period(&self) -> Duration {
        Duration::from_millis(self.transfer_period_ms)
    }

    /// Where automatically named captures go
    pub fn output_dir(&self) -> Option<&Path> {
        if self.output_dir.is_empty() {
            None
        } else {
            Some(Path::new(&self.output_dir))
        }
    }

    /// Generate a sample settings file content
    pub fn sample_config() -> String {
        r#"# iqstream settings

# Ring buffer between transport and writer, in bytes (default: 50 MiB)
ring_capacity = 52428800

# Largest single write to the output file, in bytes (default: 1 MiB)
write_chunk = 1048576

# Transport transfer size in bytes (default: 256 KiB)
transfer_chunk = 262144

# Transport transfer period in milliseconds (default: 13)
transfer_period_ms = 13

# Progress report interval in milliseconds; a silent interval aborts the stream
report_interval_ms = 1000

# Log level: trace, debug, info, warn, error (default: info)
log_level = "info"

# Log file path (empty = no file logging)
log_file = ""

# Directory for automatically named WAV captures (empty = current directory)
output_dir = ""
"#
        .to_string()
    }
}

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading/writing settings file
    #[error("Failed to access settings file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing TOML
    #[error("Failed to parse settings file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Error serializing settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_matches_defaults() {
        let parsed: Settings = toml::from_str(&Settings::sample_config()).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let parsed: Settings = toml::from_str("report_interval_ms = 250\n").unwrap();
        assert_eq!(parsed.report_interval_ms, 250);
        assert_eq!(parsed.ring_capacity, Settings::default().ring_capacity);

        let config = parsed.pipeline_config(TransferLimit::samples(10));
        assert_eq!(config.report_interval, Duration::from_millis(250));
        assert_eq!(config.limit.remaining(), Some(20));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let settings = Settings {
            output_dir: "/tmp/captures".to_string(),
            write_chunk: 4096,
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.output_dir(), Some(Path::new("/tmp/captures")));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "ring_capacity = \"lots\"").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }
}
