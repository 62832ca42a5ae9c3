//! Fan-out of records to the sinks whose enablers accept them.

use std::{fmt, sync::Arc};

use crate::{Archive, LoggerError, Record, Severity, Sink};

/// Decides whether a sink accepts records of a given severity.
pub trait LevelEnabler: Send + Sync {
    /// Whether records of `severity` are accepted.
    fn enabled(&self, severity: Severity) -> bool;
}

impl<F> LevelEnabler for F
where
    F: Fn(Severity) -> bool + Send + Sync,
{
    fn enabled(&self, severity: Severity) -> bool {
        self(severity)
    }
}

/// Accepts records of exactly one severity, and only if that severity is at or above a minimum.
///
/// Unlike a threshold, an `ExactLevel` for `warn` rejects `error` records. An `ExactLevel`
/// whose severity is below the minimum accepts nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactLevel {
    level: Severity,
    minimum: Severity,
}

impl ExactLevel {
    /// Creates a new [`ExactLevel`].
    pub fn new(level: Severity, minimum: Severity) -> Self {
        Self { level, minimum }
    }
}

impl LevelEnabler for ExactLevel {
    fn enabled(&self, severity: Severity) -> bool {
        severity == self.level && self.level.rank() - self.minimum.rank() >= 0
    }
}

struct Core {
    sink: Arc<dyn Sink>,
    enabler: Box<dyn LevelEnabler>,
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

/// An ordered set of sinks, each paired with a [`LevelEnabler`].
///
/// Every record is delivered independently to every sink whose enabler accepts its severity;
/// an error from one sink does not keep the record from the others.
#[derive(Debug, Default)]
pub struct Tee {
    cores: Vec<Core>,
}

impl Tee {
    /// Creates an empty [`Tee`], which discards every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes the records accepted by `enabler` to `sink`.
    pub fn push(&mut self, sink: Arc<dyn Sink>, enabler: impl LevelEnabler + 'static) {
        self.cores.push(Core {
            sink,
            enabler: Box::new(enabler),
        });
    }

    /// Routes each archive sink its own severity, then, if a console sink is given, every
    /// archivable severity to the console. Nothing below `minimum` is routed anywhere.
    ///
    /// Archive cores come first in the order error, warn, info, debug, followed by the console
    /// cores in the same order.
    pub fn compose(
        archive: Option<&Archive>,
        console: Option<Arc<dyn Sink>>,
        minimum: Severity,
    ) -> Self {
        let mut tee = Self::new();

        for (severity, sink) in archive.into_iter().flat_map(Archive::sinks) {
            tee.push(sink.clone(), ExactLevel::new(severity, minimum));
        }

        if let Some(console) = console {
            for severity in Severity::ARCHIVED {
                tee.push(Arc::clone(&console), ExactLevel::new(severity, minimum));
            }
        }

        tee
    }

    /// Whether any sink accepts records of `severity`.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.cores.iter().any(|core| core.enabler.enabled(severity))
    }

    /// Writes `record` to every accepting sink and returns how many sinks accepted it.
    ///
    /// Write errors are dropped; each sink is responsible for its own failures.
    pub fn deliver(&self, record: &Record<'_>) -> usize {
        let mut delivered = 0;
        for core in &self.cores {
            if core.enabler.enabled(record.severity) {
                let _ = core.sink.write_record(record);
                delivered += 1;
            }
        }
        delivered
    }

    /// Syncs every sink.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; every sink is synced regardless.
    #[allow(clippy::manual_try_fold)] // Every sink is synced.
    pub fn sync(&self) -> Result<(), LoggerError> {
        self.cores
            .iter()
            .fold(Ok(()), |result, core| result.and(core.sink.sync()))
    }

    /// Number of (sink, enabler) pairs.
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    /// Whether no sink was added.
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }
}
