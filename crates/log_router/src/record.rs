//! The log record handed to every sink.

use std::{fmt, panic::Location};

use serde_json::Value;
use time::OffsetDateTime;

use crate::Severity;

/// A single log entry, borrowed from the logging call that produced it.
#[derive(Clone, Debug)]
pub struct Record<'a> {
    /// Severity of the entry.
    pub severity: Severity,

    /// The message.
    pub message: &'a str,

    /// Name of the logger or target that produced the entry.
    pub logger_name: Option<&'a str>,

    /// Fields bound to the logger with [`Logger::with_fields`][crate::Logger::with_fields].
    pub context: &'a [(String, Value)],

    /// Fields passed to the logging call.
    pub fields: &'a [(&'a str, Value)],

    /// When the entry was produced.
    pub time: OffsetDateTime,

    /// Where the entry was produced, when known.
    pub caller: Option<Caller<'a>>,
}

impl<'a> Record<'a> {
    /// Creates a record with the current time and no fields, name or call site.
    pub fn new(severity: Severity, message: &'a str) -> Self {
        Self {
            severity,
            message,
            logger_name: None,
            context: &[],
            fields: &[],
            time: OffsetDateTime::now_utc(),
            caller: None,
        }
    }

    /// Context fields followed by call fields.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.context
            .iter()
            .map(|(key, value)| (key.as_str(), value))
            .chain(self.fields.iter().map(|(key, value)| (*key, value)))
    }
}

/// Source location of a logging call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller<'a> {
    /// Source file.
    pub file: &'a str,

    /// Line within the file.
    pub line: u32,
}

impl From<&'static Location<'static>> for Caller<'static> {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for Caller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
