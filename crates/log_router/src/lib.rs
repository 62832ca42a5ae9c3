//! `log_router` provides a leveled logging facade that routes every record to the sinks
//! configured for its severity.
//!
//! It offers:
//! - An [`Archive`] of per-severity [`FileSink`]s backed by size-rotated [`RotatingFile`]s, with
//!   bounded backup count, maximum backup age and optional gzip compression.
//! - A [`Tee`] that fans each record out to every sink whose [`LevelEnabler`] accepts it. Archive
//!   sinks use [`ExactLevel`] enablers, so a sink only receives records of its own severity.
//! - Optional mirroring of every severity to a colorized [`ConsoleSink`] on standard error.
//! - A central [`build`] function that validates a [`Config`] and composes a [`Logger`].
//! - A process-wide logger slot in [`global`], with shortcut functions reading from it.
//! - A [`RouterLayer`] (feature `layer`) forwarding [`tracing`] events to a [`Logger`].
//!
//! # Example
//!
//! ```no_run
//! use log_router::{ArchiveConfig, Config, Severity, global};
//! use serde_json::json;
//!
//! let config = Config {
//!     level: Severity::Info,
//!     archive: Some(ArchiveConfig {
//!         directory: "/var/log/my_app".to_string(),
//!         error_file: "error.log".to_string(),
//!         info_file: "info.log".to_string(),
//!         max_size_mb: 50,
//!         max_backups: 5,
//!         max_age_days: 14,
//!         compress: true,
//!         ..ArchiveConfig::default()
//!     }),
//!     emit_to_console: true,
//!     ..Config::without_archive()
//! };
//!
//! match global::init(config) {
//!     Ok(logger) => {
//!         logger.info("service started", &[("port", json!(8080))]);
//!         global::error("lookup failed", &[("key", json!("user:42"))]);
//!
//!         if let Some(archive) = logger.archive() {
//!             archive.rotate("error").ok();
//!         }
//!     }
//!     Err(error) => eprintln!("Failed to initialize logging: {error}"),
//! }
//! ```

mod archive;
mod config;
mod encoder;
pub mod global;
#[cfg(feature = "layer")]
mod layer;
mod logger;
mod record;
mod rotation;
mod severity;
mod sink;
mod tee;

use std::sync::Arc;

pub use serde_json::Value;

#[cfg(feature = "layer")]
pub use self::layer::RouterLayer;
pub use self::{
    archive::Archive,
    config::{ArchiveConfig, Config, ConfigCheck, EncoderConfig, TimeEncoding},
    encoder::{ConsoleEncoder, JsonEncoder},
    logger::{LoggedPanic, Logger},
    record::{Caller, Record},
    rotation::{RotatingFile, RotationPolicy},
    severity::{ParseSeverityError, Severity},
    sink::{ConsoleSink, FileSink, Sink},
    tee::{ExactLevel, LevelEnabler, Tee},
};

mod keys {
    pub(crate) const HOSTNAME: &str = "hostname";
    pub(crate) const PID: &str = "pid";
}

/// Errors that can occur within the logger.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// An archive block was configured but named no destination file.
    #[error("log config error")]
    InvalidConfig,

    /// Represents any other error in configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The name passed to an archive operation is not one of `error`, `warn`, `info`, `debug`.
    #[error("invalid archive kind `{0}`")]
    InvalidKind(String),

    /// The archive has no file configured for the severity.
    #[error("no archive file is configured for `{0}` records")]
    NotArchived(Severity),

    /// Represents an error during JSON serialization.
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// Represents an I/O error while writing, rotating or closing a sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for logger operations.
pub type Result<T, E = LoggerError> = std::result::Result<T, E>;

/// Constructs a [`Logger`] from the provided [`Config`].
///
/// The configuration is validated first (see [`Config::validate`]):
/// - With no archive block, the logger only mirrors to the console, or discards everything when
///   [`Config::emit_to_console`] is `false`.
/// - With an archive block, one [`FileSink`] is built per configured severity file, followed by
///   the console cores when console output is enabled.
///
/// Archive files are created lazily, on the first record written to them.
///
/// # Errors
///
/// Returns [`LoggerError::InvalidConfig`] if the archive block is present but names no file, and
/// [`LoggerError::Configuration`] if a static field uses a reserved key. Nothing is built in
/// either case.
pub fn build(mut config: Config) -> Result<Logger> {
    let check = config.validate();
    if check == ConfigCheck::Invalid {
        return Err(LoggerError::InvalidConfig);
    }

    let static_fields = Arc::new(config.static_fields);
    let json_encoder = JsonEncoder::new(config.encoder.clone(), Arc::clone(&static_fields))?;

    let console: Option<Arc<dyn Sink>> = if config.emit_to_console {
        Some(Arc::new(ConsoleSink::stderr(static_fields)))
    } else {
        None
    };

    let archive = match (check, config.archive.as_ref()) {
        (ConfigCheck::Archive, Some(archive_config)) => {
            tracing::debug!(
                directory = %archive_config.directory,
                "Archiving log records by severity"
            );
            Some(Archive::build(archive_config, &json_encoder))
        }
        _ => None,
    };

    if archive.is_none() && console.is_none() {
        return Ok(Logger::nop());
    }

    let tee = Tee::compose(archive.as_ref(), console, config.level);
    Ok(Logger::new(tee, archive))
}
