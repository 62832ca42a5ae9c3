//! Size-based rotation of log files, with bounded retention of the rotated-out backups.
//!
//! A [`RotatingFile`] appends to the file at its path until the next write would exceed
//! [`RotationPolicy::max_bytes`]. The file is then renamed to
//! `<stem>-<YYYY-MM-DDTHH-MM-SS.mmm><extension>` next to it and a fresh file is opened at the
//! original path. After each rotation the backups beyond [`RotationPolicy::max_backups`] or
//! older than [`RotationPolicy::max_age_days`] are removed, and the remaining ones are
//! gzip-compressed on a background thread if [`RotationPolicy::compress`] is set.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
};

use flate2::{Compression, write::GzEncoder};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, macros::format_description};

const MEGABYTE: u64 = 1024 * 1024;
const DEFAULT_MAX_SIZE_MB: u64 = 100;
const COMPRESS_SUFFIX: &str = ".gz";
// Keeps the age cutoff representable.
const MAX_AGE_DAYS_LIMIT: u64 = 3_650_000;

/// When a [`RotatingFile`] is rotated and how many of its backups are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Size in megabytes after which the file is rotated. Zero means 100 megabytes.
    pub max_size_mb: u64,

    /// Number of backups kept. Zero keeps all of them.
    pub max_backups: usize,

    /// Age in days after which backups are removed. Zero disables age-based removal.
    pub max_age_days: u64,

    /// Whether backups are gzip-compressed.
    pub compress: bool,

    /// Whether backup names use local time rather than UTC.
    pub local_time: bool,
}

impl RotationPolicy {
    /// Size in bytes after which the file is rotated.
    pub fn max_bytes(&self) -> u64 {
        match self.max_size_mb {
            0 => DEFAULT_MAX_SIZE_MB * MEGABYTE,
            size => size.saturating_mul(MEGABYTE),
        }
    }

    fn now(&self) -> OffsetDateTime {
        if self.local_time {
            OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
        } else {
            OffsetDateTime::now_utc()
        }
    }
}

/// A log file which rotates itself according to a [`RotationPolicy`].
///
/// The file is opened on the first write. Writes, rotations and closing are serialized by a lock
/// held by the file, so concurrent writers never interleave within a write and no write is lost
/// or duplicated across a rotation.
///
/// Compression runs in the background, but a rotation first waits, under the lock, for the
/// compressions started by the previous one. Writers can therefore block on a slow gzip when
/// rotations follow each other closely. Compression failures are logged through [`tracing`] once
/// the lock is released.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    policy: RotationPolicy,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    file: Option<File>,
    size: u64,
    compressions: Vec<JoinHandle<io::Result<()>>>,
    failed_compressions: Vec<io::Error>,
}

#[derive(Debug)]
struct Backup {
    path: PathBuf,
    timestamp: PrimitiveDateTime,
    compressed: bool,
}

impl RotatingFile {
    /// Creates a rotating file at `path`, without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            state: Mutex::new(State::default()),
        }
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The rotation policy of this file.
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Appends `buf` to the active file with a single write, rotating first if the file would
    /// grow past the size limit.
    ///
    /// # Errors
    ///
    /// Fails if `buf` alone is larger than the size limit, or on any I/O error while opening,
    /// rotating or writing.
    pub fn append(&self, buf: &[u8]) -> io::Result<()> {
        let len = u64::try_from(buf.len()).unwrap_or(u64::MAX);
        let max_bytes = self.policy.max_bytes();
        if len > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("write of {len} bytes exceeds the maximum file size of {max_bytes} bytes"),
            ));
        }

        let (result, failures) = {
            let mut state = self.state.lock();
            let result = self.append_locked(&mut state, buf, len, max_bytes);
            (result, std::mem::take(&mut state.failed_compressions))
        };
        self.report_compression_failures(&failures);
        result
    }

    /// Closes the active file, moves it to a backup and opens a fresh file at the original path.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from renaming or creating the file.
    pub fn rotate(&self) -> io::Result<()> {
        let (result, failures) = {
            let mut state = self.state.lock();
            let result = self.rotate_locked(&mut state);
            (result, std::mem::take(&mut state.failed_compressions))
        };
        self.report_compression_failures(&failures);
        result
    }

    /// Flushes the active file's contents to disk.
    ///
    /// # Errors
    ///
    /// Returns any I/O error reported by the operating system.
    pub fn sync(&self) -> io::Result<()> {
        let state = self.state.lock();
        match state.file.as_ref() {
            Some(file) => file.sync_all(),
            None => Ok(()),
        }
    }

    /// Syncs and closes the active file and waits for pending backup compression. The next write
    /// opens the file again.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error from syncing the file or compressing a backup.
    pub fn close(&self) -> io::Result<()> {
        let (synced, compressions, mut failures) = {
            let mut state = self.state.lock();
            state.size = 0;
            let synced = state.file.take().map_or(Ok(()), |file| file.sync_all());
            (
                synced,
                std::mem::take(&mut state.compressions),
                std::mem::take(&mut state.failed_compressions),
            )
        };

        // Joined outside the lock, compression failures may be logged through this very file.
        failures.extend(join_compressions(compressions));
        self.report_compression_failures(&failures);

        synced?;
        match failures.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn append_locked(
        &self,
        state: &mut State,
        buf: &[u8],
        len: u64,
        max_bytes: u64,
    ) -> io::Result<()> {
        if state.file.is_none() {
            self.open_existing_or_new(state, len)?;
        } else if state.size.saturating_add(len) > max_bytes {
            self.rotate_locked(state)?;
        }

        let State { file, size, .. } = state;
        let file = file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file is not open"))?;
        file.write_all(buf)?;
        *size = size.saturating_add(len);
        Ok(())
    }

    /// Must not be called while holding the lock.
    fn report_compression_failures(&self, failures: &[io::Error]) {
        for error in failures {
            tracing::warn!(
                path = %self.path.display(),
                %error,
                "Failed to compress log backup"
            );
        }
    }

    fn open_existing_or_new(&self, state: &mut State, write_len: u64) -> io::Result<()> {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return self.open_new(state);
            }
            Err(error) => return Err(error),
        };

        if metadata.len().saturating_add(write_len) >= self.policy.max_bytes() {
            return self.rotate_locked(state);
        }

        match OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => {
                state.file = Some(file);
                state.size = metadata.len();
                Ok(())
            }
            // Start over if the existing file cannot be appended to.
            Err(_) => self.open_new(state),
        }
    }

    fn rotate_locked(&self, state: &mut State) -> io::Result<()> {
        state.file = None;
        self.open_new(state)?;
        self.remove_and_compress_backups(state)
    }

    fn open_new(&self, state: &mut State) -> io::Result<()> {
        fs::create_dir_all(self.directory())?;

        if self.path.exists() {
            fs::rename(&self.path, self.backup_path()?)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        state.file = Some(file);
        state.size = 0;
        Ok(())
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn name_parts(&self) -> (String, String) {
        let stem = self
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .path
            .extension()
            .map(|extension| format!(".{}", extension.to_string_lossy()))
            .unwrap_or_default();
        (stem, extension)
    }

    /// A backup path which is free, compressed or not.
    fn backup_path(&self) -> io::Result<PathBuf> {
        let (stem, extension) = self.name_parts();
        let mut timestamp = self.policy.now();

        loop {
            let name = format!("{stem}-{}{extension}", format_backup_time(timestamp)?);
            let candidate = self.directory().join(&name);
            let compressed = self.directory().join(format!("{name}{COMPRESS_SUFFIX}"));
            if !candidate.exists() && !compressed.exists() {
                return Ok(candidate);
            }
            timestamp += Duration::milliseconds(1);
        }
    }

    /// Backups of this file, newest first.
    fn backups(&self) -> io::Result<Vec<Backup>> {
        let (stem, extension) = self.name_parts();
        let prefix = format!("{stem}-");
        let mut backups = Vec::new();

        for entry in fs::read_dir(self.directory())? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            let (name, compressed) = match name.strip_suffix(COMPRESS_SUFFIX) {
                Some(name) => (name, true),
                None => (name, false),
            };
            let timestamp = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&extension))
                .and_then(parse_backup_time);

            if let Some(timestamp) = timestamp {
                backups.push(Backup {
                    path: entry.path(),
                    timestamp,
                    compressed,
                });
            }
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    fn remove_and_compress_backups(&self, state: &mut State) -> io::Result<()> {
        let RotationPolicy {
            max_backups,
            max_age_days,
            compress,
            ..
        } = self.policy;
        if max_backups == 0 && max_age_days == 0 && !compress {
            return Ok(());
        }

        // A backup still being compressed must not be compressed or counted twice.
        let compressions = std::mem::take(&mut state.compressions);
        state
            .failed_compressions
            .extend(join_compressions(compressions));

        let mut remaining = self.backups()?;
        let mut expired = Vec::new();

        if max_backups > 0 {
            let mut kept = FxHashSet::default();
            let (keep, remove): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|backup| {
                kept.insert(backup.timestamp);
                kept.len() <= max_backups
            });
            remaining = keep;
            expired.extend(remove);
        }

        if max_age_days > 0 {
            let now = self.policy.now();
            let now = PrimitiveDateTime::new(now.date(), now.time());
            let days = i64::try_from(max_age_days.min(MAX_AGE_DAYS_LIMIT)).unwrap_or_default();
            if let Some(cutoff) = now.checked_sub(Duration::days(days)) {
                let (keep, remove): (Vec<_>, Vec<_>) = remaining
                    .into_iter()
                    .partition(|backup| backup.timestamp >= cutoff);
                remaining = keep;
                expired.extend(remove);
            }
        }

        for backup in &expired {
            match fs::remove_file(&backup.path) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(error),
            }
        }

        if compress {
            for backup in remaining.into_iter().filter(|backup| !backup.compressed) {
                state
                    .compressions
                    .push(thread::spawn(move || compress_backup(&backup.path)));
            }
        }

        Ok(())
    }
}

impl Write for &RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf).map(|()| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "layer")]
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingFile {
    type Writer = &'a Self;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

fn format_backup_time(timestamp: OffsetDateTime) -> io::Result<String> {
    timestamp
        .format(format_description!(
            "[year]-[month]-[day]T[hour]-[minute]-[second].[subsecond digits:3]"
        ))
        .map_err(io::Error::other)
}

fn parse_backup_time(timestamp: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        timestamp,
        format_description!("[year]-[month]-[day]T[hour]-[minute]-[second].[subsecond digits:3]"),
    )
    .ok()
}

/// Gzips `path` into `<path>.gz` and removes `path`. A partial archive is removed on failure.
/// Waits for every compression and returns the failures.
fn join_compressions(compressions: Vec<JoinHandle<io::Result<()>>>) -> Vec<io::Error> {
    compressions
        .into_iter()
        .filter_map(|compression| {
            compression
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("backup compression panicked")))
                .err()
        })
        .collect()
}

fn compress_backup(path: &Path) -> io::Result<()> {
    let mut destination = path.as_os_str().to_owned();
    destination.push(COMPRESS_SUFFIX);
    let destination = PathBuf::from(destination);

    let result = gzip(path, &destination);
    if result.is_err() {
        let _ = fs::remove_file(&destination);
        return result;
    }
    fs::remove_file(path)
}

fn gzip(source: &Path, destination: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;
    let mut encoder = GzEncoder::new(File::create(destination)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.sync_all()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{io::Read, sync::Arc};

    use flate2::read::GzDecoder;

    use super::*;

    fn policy(max_backups: usize) -> RotationPolicy {
        RotationPolicy {
            max_size_mb: 1,
            max_backups,
            ..RotationPolicy::default()
        }
    }

    fn backup_names(file: &RotatingFile) -> Vec<String> {
        file.backups()
            .unwrap()
            .into_iter()
            .filter_map(|backup| {
                backup
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect()
    }

    #[test]
    fn max_bytes_defaults_to_100_megabytes() {
        assert_eq!(RotationPolicy::default().max_bytes(), 100 * MEGABYTE);
        assert_eq!(policy(0).max_bytes(), MEGABYTE);
    }

    #[test]
    fn backup_time_round_trips_through_names() {
        let timestamp = time::macros::datetime!(2026-03-04 05:06:07.089 UTC);
        let formatted = format_backup_time(timestamp).unwrap();
        assert_eq!(formatted, "2026-03-04T05-06-07.089");
        assert_eq!(
            parse_backup_time(&formatted),
            Some(time::macros::datetime!(2026-03-04 05:06:07.089))
        );
        assert_eq!(parse_backup_time("latest"), None);
    }

    #[test]
    fn file_is_created_on_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("app.log");
        let file = RotatingFile::new(&path, policy(0));
        assert!(!path.exists());

        file.append(b"first\n").unwrap();
        file.append(b"second\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn existing_file_is_appended_to() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "before\n").unwrap();

        let file = RotatingFile::new(&path, policy(0));
        file.append(b"after\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "before\nafter\n");
        assert!(backup_names(&file).is_empty());
    }

    #[test]
    fn exceeding_the_size_limit_rotates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let file = RotatingFile::new(&path, policy(0));
        let chunk = vec![b'x'; 300 * 1024];

        for _ in 0..4 {
            file.append(&chunk).unwrap();
        }

        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 1);
        let backup_len = backups.first().map(|backup| fs::metadata(&backup.path).unwrap().len());
        assert_eq!(backup_len, Some(3 * 300 * 1024));
        assert_eq!(fs::metadata(&path).unwrap().len(), 300 * 1024);
    }

    #[test]
    fn oversized_write_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = RotatingFile::new(dir.path().join("app.log"), policy(0));

        let error = file.append(&vec![b'x'; 2 * 1024 * 1024]).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn explicit_rotation_leaves_an_empty_active_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let file = RotatingFile::new(&path, policy(0));

        file.append(b"record\n").unwrap();
        file.rotate().unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        let names = backup_names(&file);
        assert_eq!(names.len(), 1);
        assert!(names.iter().all(|name| name.starts_with("app-") && name.ends_with(".log")));
    }

    #[test]
    fn oldest_backup_is_removed_beyond_max_backups() {
        let dir = tempfile::tempdir().unwrap();
        let file = RotatingFile::new(dir.path().join("app.log"), policy(2));

        file.append(b"one\n").unwrap();
        file.rotate().unwrap();
        let oldest = file.backups().unwrap().remove(0).path;

        for record in [b"two\n".as_slice(), b"three\n".as_slice()] {
            file.append(record).unwrap();
            file.rotate().unwrap();
        }

        assert!(!oldest.exists());
        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 2);
        let contents: Vec<String> = backups
            .iter()
            .map(|backup| fs::read_to_string(&backup.path).unwrap())
            .collect();
        assert_eq!(contents, ["three\n", "two\n"]);
    }

    #[test]
    fn expired_backups_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("app-2000-01-01T00-00-00.000.log");
        let unrelated = dir.path().join("other-2000-01-01T00-00-00.000.log");
        fs::write(&stale, "old\n").unwrap();
        fs::write(&unrelated, "old\n").unwrap();

        let file = RotatingFile::new(
            dir.path().join("app.log"),
            RotationPolicy {
                max_age_days: 30,
                ..policy(0)
            },
        );
        file.append(b"fresh\n").unwrap();
        file.rotate().unwrap();

        assert!(!stale.exists());
        assert!(unrelated.exists());
        assert_eq!(file.backups().unwrap().len(), 1);
    }

    #[test]
    fn backups_are_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let file = RotatingFile::new(
            dir.path().join("app.log"),
            RotationPolicy {
                compress: true,
                ..policy(0)
            },
        );

        file.append(b"compress me\n").unwrap();
        file.rotate().unwrap();
        file.close().unwrap();

        let backups = file.backups().unwrap();
        assert_eq!(backups.len(), 1);
        let backup = backups.first().unwrap();
        assert!(backup.compressed);
        assert!(backup.path.to_string_lossy().ends_with(".log.gz"));

        let mut contents = String::new();
        GzDecoder::new(File::open(&backup.path).unwrap())
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "compress me\n");
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_compressions_are_collected() {
        let failures = join_compressions(vec![
            thread::spawn(|| Ok(())),
            thread::spawn(|| Err(io::Error::other("disk full"))),
        ]);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures.first().map(ToString::to_string).as_deref(), Some("disk full"));
    }

    #[test]
    fn compression_failure_is_reported_by_the_next_rotation() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in place of the archive makes compressing this backup fail.
        let backup = "app-2026-01-01T00-00-00.000.log";
        fs::write(dir.path().join(backup), "old\n").unwrap();
        fs::create_dir(dir.path().join(format!("{backup}.gz"))).unwrap();

        let file = RotatingFile::new(
            dir.path().join("app.log"),
            RotationPolicy {
                compress: true,
                ..policy(0)
            },
        );
        file.append(b"one\n").unwrap();

        let output = SharedBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer({
                let output = output.clone();
                move || output.clone()
            })
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            file.rotate().unwrap();
            file.rotate().unwrap();
        });

        let logged = String::from_utf8(output.0.lock().clone()).unwrap();
        assert!(logged.contains("Failed to compress log backup"), "{logged}");
        assert!(file.close().is_err());
        assert!(dir.path().join(backup).exists());
    }

    #[test]
    fn closed_file_reopens_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let file = RotatingFile::new(&path, policy(0));

        file.append(b"one\n").unwrap();
        file.close().unwrap();
        file.append(b"two\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }
}
