//! Per-severity archive files.

use std::sync::Arc;

use crate::{
    ArchiveConfig, FileSink, JsonEncoder, LoggerError, RotatingFile, Severity, Sink as _,
};

/// The file sinks built from an [`ArchiveConfig`], at most one per archivable severity.
///
/// Sinks are closed only through [`Archive::stop`]; routing never closes them.
#[derive(Debug, Default)]
pub struct Archive {
    sinks: Vec<(Severity, Arc<FileSink>)>,
}

impl Archive {
    /// Builds one [`FileSink`] per severity with a file name, in the order error, warn, info,
    /// debug. Severities without a file name get no sink.
    ///
    /// The configuration is expected to be validated already (see
    /// [`Config::validate`][crate::Config::validate]). No file is opened before its first record.
    pub fn build(config: &ArchiveConfig, encoder: &JsonEncoder) -> Self {
        let policy = config.rotation_policy();
        let sinks = Severity::ARCHIVED
            .into_iter()
            .filter_map(|severity| {
                let path = config.path(severity)?;
                let sink = FileSink::new(RotatingFile::new(path, policy), encoder.clone());
                Some((severity, Arc::new(sink)))
            })
            .collect();

        Self { sinks }
    }

    /// The sink archiving records of `severity`, if one was built.
    pub fn sink(&self, severity: Severity) -> Option<&Arc<FileSink>> {
        self.sinks
            .iter()
            .find_map(|(archived, sink)| (*archived == severity).then_some(sink))
    }

    /// The built sinks, in routing order.
    pub fn sinks(&self) -> impl Iterator<Item = (Severity, &Arc<FileSink>)> {
        self.sinks.iter().map(|(severity, sink)| (*severity, sink))
    }

    /// Number of built sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sink was built.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Rotates the file of the named kind (`error`, `warn`, `info` or `debug`) right away,
    /// regardless of its size.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidKind`] for any other name, [`LoggerError::NotArchived`] if
    /// that kind has no file, or the I/O error from rotating.
    pub fn rotate(&self, kind: &str) -> Result<(), LoggerError> {
        self.lookup(kind)?.file().rotate()?;
        Ok(())
    }

    /// Closes the file of the named kind (`error`, `warn`, `info` or `debug`), waiting for
    /// pending backup compression. A later record opens the file again.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidKind`] for any other name, [`LoggerError::NotArchived`] if
    /// that kind has no file, or the I/O error from closing.
    pub fn stop(&self, kind: &str) -> Result<(), LoggerError> {
        self.lookup(kind)?.file().close()?;
        Ok(())
    }

    /// Closes every archive file.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; every file is closed regardless.
    #[allow(clippy::manual_try_fold)] // Every file is closed.
    pub fn stop_all(&self) -> Result<(), LoggerError> {
        self.sinks.iter().fold(Ok(()), |result, (_, sink)| {
            let closed = sink.file().close().map_err(LoggerError::from);
            result.and(closed)
        })
    }

    /// Syncs every archive file to disk.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; every file is synced regardless.
    #[allow(clippy::manual_try_fold)] // Every file is synced.
    pub fn sync(&self) -> Result<(), LoggerError> {
        self.sinks
            .iter()
            .fold(Ok(()), |result, (_, sink)| result.and(sink.sync()))
    }

    fn lookup(&self, kind: &str) -> Result<&Arc<FileSink>, LoggerError> {
        let severity = kind
            .parse::<Severity>()
            .ok()
            .filter(|severity| severity.is_archived())
            .ok_or_else(|| LoggerError::InvalidKind(kind.to_string()))?;
        self.sink(severity)
            .ok_or(LoggerError::NotArchived(severity))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{EncoderConfig, Record, Sink};

    fn archive(dir: &std::path::Path, config: ArchiveConfig) -> Archive {
        let config = ArchiveConfig {
            directory: dir.to_string_lossy().into_owned(),
            ..config
        };
        let encoder = JsonEncoder::new(EncoderConfig::default(), Arc::default()).unwrap();
        Archive::build(&config, &encoder)
    }

    #[test]
    fn builds_sinks_only_for_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(
            dir.path(),
            ArchiveConfig {
                error_file: "error.log".to_string(),
                info_file: "info.log".to_string(),
                ..ArchiveConfig::default()
            },
        );

        let built: Vec<Severity> = archive.sinks().map(|(severity, _)| severity).collect();
        assert_eq!(built, [Severity::Error, Severity::Info]);
        assert!(archive.sink(Severity::Warn).is_none());
        assert_eq!(
            archive.sink(Severity::Info).map(|sink| sink.file().path().to_path_buf()),
            Some(dir.path().join("info.log"))
        );
        assert!(!dir.path().join("info.log").exists());
    }

    #[test]
    fn rotation_policy_comes_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(dir.path(), ArchiveConfig::with_default_files());

        let policy = archive.sink(Severity::Debug).map(|sink| *sink.file().policy());
        assert_eq!(
            policy,
            Some(crate::RotationPolicy {
                max_size_mb: 11,
                max_backups: 10,
                max_age_days: 30,
                compress: false,
                local_time: true,
            })
        );
    }

    #[test]
    fn rotate_and_stop_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(
            dir.path(),
            ArchiveConfig {
                warn_file: "warn.log".to_string(),
                ..ArchiveConfig::default()
            },
        );
        let sink = archive.sink(Severity::Warn).unwrap();
        sink.write_record(&Record::new(Severity::Warn, "before"))
            .unwrap();

        archive.rotate("WARN").unwrap();
        assert_eq!(fs::metadata(dir.path().join("warn.log")).unwrap().len(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);

        archive.stop("warn").unwrap();
        sink.write_record(&Record::new(Severity::Warn, "after"))
            .unwrap();
        let contents = fs::read_to_string(dir.path().join("warn.log")).unwrap();
        assert!(contents.contains("after"));
        archive.stop_all().unwrap();
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(
            dir.path(),
            ArchiveConfig {
                error_file: "error.log".to_string(),
                ..ArchiveConfig::default()
            },
        );

        assert!(matches!(
            archive.rotate("access"),
            Err(LoggerError::InvalidKind(kind)) if kind == "access"
        ));
        assert!(matches!(
            archive.stop("fatal"),
            Err(LoggerError::InvalidKind(_))
        ));
        assert!(matches!(
            archive.rotate("info"),
            Err(LoggerError::NotArchived(Severity::Info))
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
