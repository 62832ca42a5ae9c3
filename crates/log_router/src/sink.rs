//! Physical destinations of log records.

use std::{
    collections::HashMap,
    fmt,
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;
use serde_json::Value;
use termcolor::{BufferWriter, ColorChoice, WriteColor as _};

use crate::{ConsoleEncoder, JsonEncoder, LoggerError, Record, RotatingFile};

/// A destination which renders and writes records.
///
/// Sinks perform no routing; a [`Tee`][crate::Tee] decides which records reach them.
/// Implementations must tolerate concurrent calls.
pub trait Sink: fmt::Debug + Send + Sync {
    /// Renders `record` and writes it with a single write.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or writing fails.
    fn write_record(&self, record: &Record<'_>) -> Result<(), LoggerError>;

    /// Pushes everything written so far to its final destination.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    fn sync(&self) -> Result<(), LoggerError>;
}

/// Writes JSON lines to a [`RotatingFile`].
#[derive(Debug)]
pub struct FileSink {
    file: RotatingFile,
    encoder: JsonEncoder,
}

impl FileSink {
    /// Creates a new [`FileSink`].
    pub fn new(file: RotatingFile, encoder: JsonEncoder) -> Self {
        Self { file, encoder }
    }

    /// The underlying file.
    pub fn file(&self) -> &RotatingFile {
        &self.file
    }
}

impl Sink for FileSink {
    fn write_record(&self, record: &Record<'_>) -> Result<(), LoggerError> {
        let mut buffer = Vec::with_capacity(256);
        self.encoder.encode(record, &mut buffer)?;
        self.file.append(&buffer)?;
        Ok(())
    }

    fn sync(&self) -> Result<(), LoggerError> {
        Ok(self.file.sync()?)
    }
}

/// Writes human-readable lines to a stream, standard error by default.
///
/// Every line is written with a single `write_all` under the sink's lock, so lines from
/// concurrent callers never merge.
pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
    encoder: ConsoleEncoder,
}

impl ConsoleSink {
    /// A sink writing to standard error, colored if standard error supports it.
    pub fn stderr(static_fields: Arc<HashMap<String, Value>>) -> Self {
        let ansi = BufferWriter::stderr(ColorChoice::Auto)
            .buffer()
            .supports_color();
        Self::with_writer(io::stderr(), ConsoleEncoder::new(static_fields, ansi))
    }

    /// A sink writing to `writer`.
    pub fn with_writer(writer: impl Write + Send + 'static, encoder: ConsoleEncoder) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            encoder,
        }
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

impl Sink for ConsoleSink {
    fn write_record(&self, record: &Record<'_>) -> Result<(), LoggerError> {
        let mut buffer = Vec::with_capacity(256);
        self.encoder.encode(record, &mut buffer)?;
        self.writer.lock().write_all(&buffer)?;
        Ok(())
    }

    fn sync(&self) -> Result<(), LoggerError> {
        Ok(self.writer.lock().flush()?)
    }
}
