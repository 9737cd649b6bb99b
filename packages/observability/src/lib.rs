//! # Observability
//!
//! Logging setup for the indexer-ack binaries.
//!
//! Library code only emits `tracing` events. Binaries call
//! [`init_with_config`] once at startup to decide where those events go:
//!
//! - stderr, human-readable (`compact`) or one JSON object per line
//! - optionally, an append-only JSONL file for later inspection, by default
//!   under the per-user data directory ([`default_log_path`])
//!
//! The level filter comes from `RUST_LOG` when set, otherwise from
//! [`LogConfig::default_level`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() -> anyhow::Result<()> {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "indexer-ack-probe".into(),
//!         default_level: "debug".into(),
//!         ..Default::default()
//!     })?;
//!
//!     tracing::info!("probe started");
//!     Ok(())
//! }
//! ```

mod file_writer;
mod json_layer;

pub use file_writer::{AppendFileWriter, AppendWriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Format of stderr output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrFormat {
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// The same JSON lines written to the log file.
    Json,
    /// No stderr output.
    Off,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the binary, included in every JSON line.
    pub service_name: String,

    /// Default level filter (e.g. "debug", "info", "indexer_ack_client=trace").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    pub stderr: StderrFormat,

    /// Append JSONL to this file.
    pub log_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            stderr: StderrFormat::Compact,
            log_path: None,
        }
    }
}

impl LogConfig {
    /// Write JSONL to the per-user default location for this service.
    pub fn with_default_log_file(mut self) -> Self {
        self.log_path = default_log_path(&self.service_name);
        self
    }
}

/// `<data dir>/indexer-ack/logs/<service>.jsonl`, if the platform has a
/// data directory.
pub fn default_log_path(service_name: &str) -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| {
        dir.join("indexer-ack")
            .join("logs")
            .join(format!("{}.jsonl", service_name))
    })
}

/// Initialize logging with custom configuration.
///
/// Fails if the log file cannot be opened. Calling this more than once
/// leaves the first subscriber in place.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let file_layer = match &config.log_path {
        Some(path) => {
            let writer = AppendFileWriter::open(path)?;
            Some(
                JsonLayer::new(config.service_name.clone(), AppendWriterFactory::new(writer))
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    let compact_layer = (config.stderr == StderrFormat::Compact).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(filter())
    });

    let json_stderr_layer = (config.stderr == StderrFormat::Json)
        .then(|| JsonLayer::new(config.service_name.clone(), io::stderr).with_filter(filter()));

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(compact_layer)
        .with(json_stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        if let Some(path) = &config.log_path {
            tracing::debug!(log_path = %path.display(), "JSONL logging enabled");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert_eq!(config.stderr, StderrFormat::Compact);
        assert!(config.log_path.is_none());
    }

    #[test]
    fn test_default_log_path_is_per_service() {
        if let Some(path) = default_log_path("indexer-ack-probe") {
            assert!(path.ends_with("indexer-ack/logs/indexer-ack-probe.jsonl"));
        }
    }

    #[test]
    fn test_with_default_log_file_uses_service_name() {
        let config = LogConfig {
            service_name: "indexer-ack-probe".into(),
            ..Default::default()
        }
        .with_default_log_file();
        assert_eq!(config.log_path, default_log_path("indexer-ack-probe"));
    }

    #[test]
    fn test_init_with_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = init_with_config(LogConfig {
            service_name: "test".into(),
            stderr: StderrFormat::Off,
            log_path: Some(blocker.join("nested.jsonl")),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
