//! Ordered log severities and their textual names.

use std::{fmt, str::FromStr};

/// The severity of a log record.
///
/// Severities are totally ordered, `Debug` being the least and `Fatal` the most severe. Adjacent
/// severities are exactly one [`rank`][Severity::rank] apart.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize,
)]
#[serde(from = "String")]
pub enum Severity {
    /// Verbose diagnostics, usually disabled in production.
    Debug,

    /// The default severity.
    #[default]
    Info,

    /// Something unexpected that does not need immediate attention.
    Warn,

    /// A failure that should be looked at.
    Error,

    /// Logged, then the calling thread unwinds.
    Panic,

    /// Logged, then the process exits.
    Fatal,
}

impl Severity {
    /// The severities that can be archived to a dedicated file, in routing order.
    pub const ARCHIVED: [Self; 4] = [Self::Error, Self::Warn, Self::Info, Self::Debug];

    /// Numeric rank of the severity; `Info` is zero.
    pub const fn rank(self) -> i8 {
        match self {
            Self::Debug => -1,
            Self::Info => 0,
            Self::Warn => 1,
            Self::Error => 2,
            Self::Panic => 3,
            Self::Fatal => 4,
        }
    }

    /// Lowercase name of the severity.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Panic => "panic",
            Self::Fatal => "fatal",
        }
    }

    /// Uppercase name of the severity, used for console output.
    pub const fn as_upper_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Panic => "PANIC",
            Self::Fatal => "FATAL",
        }
    }

    /// Parses a severity name case-insensitively, falling back to [`Severity::Info`] for
    /// anything unrecognized.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or(Self::Info)
    }

    /// Whether records of this severity have a dedicated archive file.
    pub const fn is_archived(self) -> bool {
        matches!(self, Self::Debug | Self::Info | Self::Warn | Self::Error)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown severity name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity `{0}`")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Debug,
            Self::Info,
            Self::Warn,
            Self::Error,
            Self::Panic,
            Self::Fatal,
        ]
        .into_iter()
        .find(|severity| severity.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| ParseSeverityError(s.to_string()))
    }
}

impl From<String> for Severity {
    fn from(name: String) -> Self {
        Self::from_name_or_default(&name)
    }
}
