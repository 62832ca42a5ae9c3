//! The process-wide logger slot.
//!
//! The slot starts with a console-only logger built from [`Config::without_archive`]. Swapping it
//! is atomic: concurrent readers observe either the previous or the new logger, never a mix.

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::{Config, Logger, Result};

static CURRENT: LazyLock<ArcSwap<Logger>> = LazyLock::new(|| {
    let logger = crate::build(Config::without_archive()).unwrap_or_else(|_| Logger::nop());
    ArcSwap::from_pointee(logger)
});

/// The currently installed logger.
pub fn get() -> Logger {
    Logger::clone(&CURRENT.load())
}

/// Installs `logger` for every later call to [`get`] and the shortcut functions.
pub fn set(logger: Logger) {
    CURRENT.store(Arc::new(logger));
}

/// Installs `logger` and returns the logger it replaces.
pub fn replace(logger: Logger) -> Logger {
    Arc::unwrap_or_clone(CURRENT.swap(Arc::new(logger)))
}

/// Builds a logger from `config` and installs it.
///
/// # Errors
///
/// Returns the error from [`build`][crate::build]; the installed logger is left untouched.
pub fn init(config: Config) -> Result<Logger> {
    let logger = crate::build(config)?;
    set(logger.clone());
    Ok(logger)
}

/// The installed logger with `fields` bound to it, as string values.
///
/// The slot itself is not changed; see [`set_with_fields`].
pub fn wrap_fields(fields: &HashMap<String, String>) -> Logger {
    get().with_fields(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.as_str()))),
    )
}

/// Replaces the installed logger with [`wrap_fields`] of it.
pub fn set_with_fields(fields: &HashMap<String, String>) {
    set(wrap_fields(fields));
}

/// Logs a `debug` record to the installed logger.
#[track_caller]
pub fn debug(message: &str, fields: &[(&str, Value)]) {
    CURRENT.load().debug(message, fields);
}

/// Logs an `info` record to the installed logger.
#[track_caller]
pub fn info(message: &str, fields: &[(&str, Value)]) {
    CURRENT.load().info(message, fields);
}

/// Logs a `warn` record to the installed logger.
#[track_caller]
pub fn warn(message: &str, fields: &[(&str, Value)]) {
    CURRENT.load().warn(message, fields);
}

/// Logs an `error` record to the installed logger.
#[track_caller]
pub fn error(message: &str, fields: &[(&str, Value)]) {
    CURRENT.load().error(message, fields);
}

/// Logs a `panic` record to the installed logger, then unwinds (see [`Logger::panic`]).
#[track_caller]
pub fn panic(message: &str, fields: &[(&str, Value)]) -> ! {
    get().panic(message, fields)
}

/// Logs a `fatal` record to the installed logger, then exits the process (see
/// [`Logger::fatal`]).
#[track_caller]
pub fn fatal(message: &str, fields: &[(&str, Value)]) -> ! {
    get().fatal(message, fields)
}
