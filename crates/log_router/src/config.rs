//! Logger configuration and its validation.

use std::{
    collections::HashMap,
    path::{self, Path, PathBuf},
};

use serde_json::Value;

use crate::{RotationPolicy, Severity};

/// Outcome of [`Config::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCheck {
    /// No archive block, or an archive block with nothing set.
    NoArchive,

    /// At least one severity file is configured.
    Archive,

    /// An archive block is present but names no file.
    Invalid,
}

/// Comprehensive configuration for a [`Logger`][crate::Logger].
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Field names and time encoding used when rendering records.
    pub encoder: EncoderConfig,

    /// Records below this severity are not delivered to any sink, console included.
    pub level: Severity,

    /// Per-severity archive files. If `None`, nothing is written to files.
    pub archive: Option<ArchiveConfig>,

    /// If `true`, records of every archivable severity are also written to standard error.
    pub emit_to_console: bool,

    /// Key-value pairs included in every rendered record.
    pub static_fields: HashMap<String, Value>,
}

/// Configuration for the per-severity archive files.
///
/// A file name left empty means records of that severity are not archived.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory holding the archive files. Defaults to `logs` under the working directory.
    pub directory: String,

    /// File receiving `error` records.
    pub error_file: String,

    /// File receiving `warn` records.
    pub warn_file: String,

    /// File receiving `info` records.
    pub info_file: String,

    /// File receiving `debug` records.
    pub debug_file: String,

    /// Size in megabytes after which a file is rotated. Zero means 100 megabytes.
    pub max_size_mb: u64,

    /// Number of rotated files kept per severity. Zero keeps all of them.
    pub max_backups: usize,

    /// Age in days after which rotated files are deleted. Zero disables age-based removal.
    pub max_age_days: u64,

    /// Whether rotated files are gzip-compressed.
    pub compress: bool,
}

/// Field names and encodings used when rendering records.
///
/// An empty key omits the corresponding field.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Key of the record timestamp.
    pub time_key: String,

    /// Key of the record severity.
    pub level_key: String,

    /// Key of the logger name.
    pub name_key: String,

    /// Key of the call site.
    pub caller_key: String,

    /// Key of the record message.
    pub message_key: String,

    /// How timestamps are written in structured output.
    pub time_encoding: TimeEncoding,
}

/// Encoding of record timestamps in structured output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEncoding {
    /// ISO 8601 string.
    #[default]
    Iso8601,

    /// RFC 3339 string.
    Rfc3339,

    /// Whole seconds since the Unix epoch.
    UnixSeconds,

    /// Milliseconds since the Unix epoch.
    UnixMillis,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            time_key: "timestamp".to_string(),
            level_key: "level".to_string(),
            name_key: "logger".to_string(),
            caller_key: "caller".to_string(),
            message_key: "content".to_string(),
            time_encoding: TimeEncoding::Iso8601,
        }
    }
}

impl EncoderConfig {
    /// The configured keys which are not omitted.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        [
            &self.time_key,
            &self.level_key,
            &self.name_key,
            &self.caller_key,
            &self.message_key,
        ]
        .into_iter()
        .map(String::as_str)
        .filter(|key| !key.is_empty())
    }
}

impl Default for Config {
    /// Development defaults: every severity from `debug` up, console output and the default
    /// archive files.
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            level: Severity::Debug,
            archive: Some(ArchiveConfig::with_default_files()),
            emit_to_console: true,
            static_fields: HashMap::new(),
        }
    }
}

impl Config {
    /// Development defaults without archive files.
    pub fn without_archive() -> Self {
        Self {
            archive: None,
            ..Self::default()
        }
    }

    /// Sets the minimum severity from its name, falling back to `info` for unknown names.
    pub fn set_level(&mut self, level: &str) {
        self.level = Severity::from_name_or_default(level);
    }

    /// Validates the archive block, normalizing its directory and file names in place.
    ///
    /// An empty directory becomes `logs` under the current working directory and trailing path
    /// separators are removed from it. Leading and trailing separators are removed from every
    /// file name. Calling this again on the result changes nothing.
    pub fn validate(&mut self) -> ConfigCheck {
        let Some(archive) = self.archive.as_mut().filter(|archive| !archive.is_unset()) else {
            return ConfigCheck::NoArchive;
        };

        archive.normalize();

        if Severity::ARCHIVED
            .into_iter()
            .all(|severity| archive.file_name(severity).is_none())
        {
            ConfigCheck::Invalid
        } else {
            ConfigCheck::Archive
        }
    }
}

impl ArchiveConfig {
    /// One file per archivable severity in the default directory, rotated at 11 megabytes,
    /// keeping 10 backups for at most 30 days.
    pub fn with_default_files() -> Self {
        Self {
            directory: String::new(),
            error_file: "error.log".to_string(),
            warn_file: "warn.log".to_string(),
            info_file: "info.log".to_string(),
            debug_file: "debug.log".to_string(),
            max_size_mb: 11,
            max_backups: 10,
            max_age_days: 30,
            compress: false,
        }
    }

    /// Whether no field has been set at all.
    pub fn is_unset(&self) -> bool {
        self.directory.is_empty()
            && self.error_file.is_empty()
            && self.warn_file.is_empty()
            && self.info_file.is_empty()
            && self.debug_file.is_empty()
            && self.max_size_mb == 0
            && self.max_backups == 0
            && self.max_age_days == 0
            && !self.compress
    }

    /// The file name configured for a severity, if any.
    pub fn file_name(&self, severity: Severity) -> Option<&str> {
        let name = match severity {
            Severity::Error => &self.error_file,
            Severity::Warn => &self.warn_file,
            Severity::Info => &self.info_file,
            Severity::Debug => &self.debug_file,
            Severity::Panic | Severity::Fatal => return None,
        };
        Some(name.as_str()).filter(|name| !name.is_empty())
    }

    /// The path of the file configured for a severity, if any.
    pub fn path(&self, severity: Severity) -> Option<PathBuf> {
        self.file_name(severity)
            .map(|name| Path::new(&self.directory).join(name))
    }

    /// Rotation policy shared by all archive files, naming backups in local time.
    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy {
            max_size_mb: self.max_size_mb,
            max_backups: self.max_backups,
            max_age_days: self.max_age_days,
            compress: self.compress,
            local_time: true,
        }
    }

    fn normalize(&mut self) {
        if self.directory.is_empty() {
            self.directory = default_directory();
            tracing::debug!(directory = %self.directory, "Using default archive directory");
        }
        self.directory = trim_trailing_separators(&self.directory);

        for name in [
            &mut self.error_file,
            &mut self.warn_file,
            &mut self.info_file,
            &mut self.debug_file,
        ] {
            *name = name.trim_matches(path::is_separator).to_string();
        }
    }
}

fn default_directory() -> String {
    std::env::current_dir()
        .map(|cwd| cwd.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("logs"))
        .to_string_lossy()
        .into_owned()
}

// The filesystem root keeps its separator.
fn trim_trailing_separators(directory: &str) -> String {
    match directory.trim_end_matches(path::is_separator) {
        "" if !directory.is_empty() => path::MAIN_SEPARATOR_STR.to_string(),
        trimmed => trimmed.to_string(),
    }
}
