//! The composed logger handed to applications.

use std::{fmt, panic::Location, sync::Arc};

use serde_json::Value;
use time::OffsetDateTime;

use crate::{Archive, Caller, LoggerError, Record, Severity, Tee};

/// Routes records through a [`Tee`] built once and shared by every clone.
///
/// Cloning is cheap. [`Logger::with_fields`] and [`Logger::named`] derive loggers sharing the same
/// sinks.
#[derive(Clone, Debug)]
pub struct Logger {
    shared: Arc<Shared>,
    context: Arc<[(String, Value)]>,
    name: Option<Arc<str>>,
}

#[derive(Debug)]
struct Shared {
    tee: Tee,
    archive: Option<Archive>,
}

/// Payload of the unwinding started by [`Logger::panic`].
///
/// Recover it with [`std::panic::catch_unwind`] and [`Box::downcast`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedPanic {
    /// The message of the `panic` record.
    pub message: String,
}

impl fmt::Display for LoggedPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LoggedPanic {}

impl Logger {
    /// Creates a logger routing through `tee`. `archive` is kept for
    /// [`rotate`][Archive::rotate] and [`stop`][Archive::stop] operations on its files.
    pub fn new(tee: Tee, archive: Option<Archive>) -> Self {
        Self {
            shared: Arc::new(Shared { tee, archive }),
            context: Arc::new([]),
            name: None,
        }
    }

    /// A logger which discards every record.
    pub fn nop() -> Self {
        Self::new(Tee::new(), None)
    }

    /// The router of this logger.
    pub fn tee(&self) -> &Tee {
        &self.shared.tee
    }

    /// The archive files of this logger, if it has any.
    pub fn archive(&self) -> Option<&Archive> {
        self.shared.archive.as_ref()
    }

    /// Whether `other` routes through the same sinks as `self`.
    pub fn shares_sinks_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether any sink accepts records of `severity`.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.shared.tee.enabled(severity)
    }

    /// A logger adding `fields` to every record, after the fields already bound to `self`.
    pub fn with_fields<K>(&self, fields: impl IntoIterator<Item = (K, Value)>) -> Self
    where
        K: Into<String>,
    {
        let context: Vec<(String, Value)> = self
            .context
            .iter()
            .cloned()
            .chain(fields.into_iter().map(|(key, value)| (key.into(), value)))
            .collect();

        Self {
            context: context.into(),
            ..self.clone()
        }
    }

    /// A logger whose records carry `name`, appended to the current name with a `.`.
    pub fn named(&self, name: &str) -> Self {
        let name = match self.name.as_deref() {
            Some(parent) => format!("{parent}.{name}"),
            None => name.to_string(),
        };

        Self {
            name: Some(name.into()),
            ..self.clone()
        }
    }

    /// Logs a record of `severity` and returns how many sinks accepted it.
    ///
    /// Neither `panic` nor `fatal` records stop the caller here; use [`Logger::panic`] and
    /// [`Logger::fatal`] for that.
    #[track_caller]
    pub fn log(&self, severity: Severity, message: &str, fields: &[(&str, Value)]) -> usize {
        self.emit(
            severity,
            message,
            fields,
            Some(Location::caller().into()),
            None,
        )
    }

    /// Logs a `debug` record.
    #[track_caller]
    pub fn debug(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Severity::Debug, message, fields);
    }

    /// Logs an `info` record.
    #[track_caller]
    pub fn info(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Severity::Info, message, fields);
    }

    /// Logs a `warn` record.
    #[track_caller]
    pub fn warn(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Severity::Warn, message, fields);
    }

    /// Logs an `error` record.
    #[track_caller]
    pub fn error(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Severity::Error, message, fields);
    }

    /// Logs a `panic` record, syncs every sink, then unwinds with a [`LoggedPanic`] payload.
    ///
    /// The unwinding happens even if no sink accepts `panic` records.
    #[track_caller]
    pub fn panic(&self, message: &str, fields: &[(&str, Value)]) -> ! {
        self.log(Severity::Panic, message, fields);
        let _ = self.sync();
        #[allow(clippy::panic)]
        std::panic::panic_any(LoggedPanic {
            message: message.to_string(),
        });
    }

    /// Logs a `fatal` record, syncs every sink, then exits the process with status 1.
    #[track_caller]
    pub fn fatal(&self, message: &str, fields: &[(&str, Value)]) -> ! {
        self.log(Severity::Fatal, message, fields);
        let _ = self.sync();
        std::process::exit(1)
    }

    /// Syncs every sink.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; every sink is synced regardless.
    pub fn sync(&self) -> Result<(), LoggerError> {
        self.shared.tee.sync()
    }

    /// Builds the record and hands it to the router. `target` names the record when the logger
    /// itself is unnamed.
    pub(crate) fn emit(
        &self,
        severity: Severity,
        message: &str,
        fields: &[(&str, Value)],
        caller: Option<Caller<'_>>,
        target: Option<&str>,
    ) -> usize {
        if !self.enabled(severity) {
            return 0;
        }

        let record = Record {
            severity,
            message,
            logger_name: self.name.as_deref().or(target),
            context: &self.context,
            fields,
            time: OffsetDateTime::now_utc(),
            caller,
        };
        self.shared.tee.deliver(&record)
    }
}
