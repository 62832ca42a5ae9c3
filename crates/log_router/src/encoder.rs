//! Renders [`Record`]s into bytes: structured JSON lines for files ([`JsonEncoder`]) and
//! human-readable, colorized lines for the console ([`ConsoleEncoder`]).

use std::{collections::HashMap, io::Write, sync::Arc};

use rustc_hash::FxHashSet;
use serde::ser::{SerializeMap, Serializer};
use serde_json::{Map, Value};
use termcolor::{Buffer, Color, ColorSpec, WriteColor};
use time::format_description::well_known::{Iso8601, Rfc3339};

use crate::{EncoderConfig, LoggerError, Record, Severity, TimeEncoding};

/// Renders records as single-line JSON objects.
///
/// Every object carries the configured message, level, time, logger name and caller keys, the
/// host name and process ID, the static fields and finally the record's own fields. Record
/// fields using a reserved key are dropped.
#[derive(Clone, Debug)]
pub struct JsonEncoder {
    config: EncoderConfig,
    static_fields: Arc<HashMap<String, Value>>,
    reserved_keys: Arc<FxHashSet<String>>,
    hostname: String,
    pid: u32,
}

impl JsonEncoder {
    /// Creates a new [`JsonEncoder`] with the specified key names and static fields.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Configuration`] if a static field uses a reserved key.
    pub fn new(
        config: EncoderConfig,
        static_fields: Arc<HashMap<String, Value>>,
    ) -> Result<Self, LoggerError> {
        let reserved_keys: FxHashSet<String> = config
            .keys()
            .chain([crate::keys::HOSTNAME, crate::keys::PID])
            .map(str::to_string)
            .collect();

        for key in static_fields.keys() {
            if reserved_keys.contains(key) {
                return Err(LoggerError::Configuration(format!(
                    "A reserved key `{key}` was included in the static fields of the logger"
                )));
            }
        }

        Ok(Self {
            config,
            static_fields,
            reserved_keys: Arc::new(reserved_keys),
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
        })
    }

    /// Appends the JSON rendering of `record` and a trailing newline to `buffer`.
    pub fn encode(&self, record: &Record<'_>, buffer: &mut Vec<u8>) -> Result<(), LoggerError> {
        let mut serializer = serde_json::Serializer::new(&mut *buffer);
        let mut map_serializer = serializer.serialize_map(None)?;

        self.serialize_implicit_fields(&mut map_serializer, record)?;

        for (key, value) in self.static_fields.iter() {
            map_serializer.serialize_entry(key, value)?;
        }

        for (key, value) in record.attributes() {
            // Reserved keys would shadow the implicit fields.
            if !self.reserved_keys.contains(key) {
                map_serializer.serialize_entry(key, value)?;
            }
        }

        map_serializer.end()?;
        buffer.push(b'\n');
        Ok(())
    }

    fn serialize_implicit_fields(
        &self,
        map_serializer: &mut impl SerializeMap<Error = serde_json::Error>,
        record: &Record<'_>,
    ) -> Result<(), LoggerError> {
        let config = &self.config;

        if !config.message_key.is_empty() {
            map_serializer.serialize_entry(&config.message_key, record.message)?;
        }
        if !config.level_key.is_empty() {
            map_serializer.serialize_entry(&config.level_key, record.severity.as_str())?;
        }
        if !config.time_key.is_empty() {
            match config.time_encoding {
                TimeEncoding::Iso8601 => {
                    if let Ok(time) = record.time.format(&Iso8601::DEFAULT) {
                        map_serializer.serialize_entry(&config.time_key, &time)?;
                    }
                }
                TimeEncoding::Rfc3339 => {
                    if let Ok(time) = record.time.format(&Rfc3339) {
                        map_serializer.serialize_entry(&config.time_key, &time)?;
                    }
                }
                TimeEncoding::UnixSeconds => {
                    let seconds = record.time.unix_timestamp();
                    map_serializer.serialize_entry(&config.time_key, &seconds)?;
                }
                TimeEncoding::UnixMillis => {
                    let millis = record.time.unix_timestamp_nanos() / 1_000_000;
                    map_serializer.serialize_entry(&config.time_key, &millis)?;
                }
            }
        }
        if let (false, Some(name)) = (config.name_key.is_empty(), record.logger_name) {
            map_serializer.serialize_entry(&config.name_key, name)?;
        }
        if let (false, Some(caller)) = (config.caller_key.is_empty(), record.caller) {
            map_serializer.serialize_entry(&config.caller_key, &format_args!("{caller}"))?;
        }

        map_serializer.serialize_entry(crate::keys::HOSTNAME, &self.hostname)?;
        map_serializer.serialize_entry(crate::keys::PID, &self.pid)?;

        Ok(())
    }
}

/// Renders records as tab-separated lines meant for a terminal, with the severity colored when
/// `ansi` is enabled.
///
/// Example: `2026-01-02T10:04:05.123Z  INFO  app  src/main.rs:12  started  {"port":8080}`
#[derive(Clone, Debug)]
pub struct ConsoleEncoder {
    static_fields: Arc<HashMap<String, Value>>,
    ansi: bool,
}

impl ConsoleEncoder {
    /// Creates a new [`ConsoleEncoder`].
    pub fn new(static_fields: Arc<HashMap<String, Value>>, ansi: bool) -> Self {
        Self {
            static_fields,
            ansi,
        }
    }

    /// Appends the console rendering of `record` and a trailing newline to `buffer`.
    pub fn encode(&self, record: &Record<'_>, buffer: &mut Vec<u8>) -> Result<(), LoggerError> {
        let mut line = if self.ansi {
            Buffer::ansi()
        } else {
            Buffer::no_color()
        };

        let time = record.time.format(&Iso8601::DEFAULT).unwrap_or_default();
        write!(line, "{time}\t")?;
        line.set_color(ColorSpec::new().set_fg(Some(level_color(record.severity))))?;
        write!(line, "{}", record.severity.as_upper_str())?;
        line.reset()?;

        if let Some(name) = record.logger_name {
            write!(line, "\t{name}")?;
        }
        if let Some(caller) = record.caller {
            write!(line, "\t{caller}")?;
        }
        write!(line, "\t{}", record.message)?;

        let mut fields: Map<String, Value> = self
            .static_fields
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        fields.extend(
            record
                .attributes()
                .map(|(key, value)| (key.to_string(), value.clone())),
        );
        if !fields.is_empty() {
            line.write_all(b"\t")?;
            serde_json::to_writer(&mut line, &fields)?;
        }
        writeln!(line)?;

        buffer.extend_from_slice(line.as_slice());
        Ok(())
    }
}

fn level_color(severity: Severity) -> Color {
    match severity {
        Severity::Debug => Color::Magenta,
        Severity::Info => Color::Blue,
        Severity::Warn => Color::Yellow,
        Severity::Error | Severity::Panic | Severity::Fatal => Color::Red,
    }
}
