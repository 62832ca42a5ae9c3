#![allow(clippy::unwrap_used, clippy::indexing_slicing, missing_docs)]

use std::{
    collections::HashMap,
    fs,
    panic::{self, AssertUnwindSafe},
    path::Path,
    process::Command,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use log_router::{ArchiveConfig, Config, LoggedPanic, Logger, Severity, Value, global};
use serial_test::serial;

/// Set when this test binary is re-run to exercise [`global::fatal`] in a child process.
const FATAL_DIR_VAR: &str = "LOG_ROUTER_FATAL_DIR";

fn error_archive(dir: &Path) -> Config {
    Config {
        archive: Some(ArchiveConfig {
            directory: dir.to_string_lossy().into_owned(),
            error_file: "error.log".to_string(),
            ..ArchiveConfig::default()
        }),
        emit_to_console: false,
        ..Config::default()
    }
}

fn read_json_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
#[serial]
fn shortcuts_follow_the_installed_logger() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let logger = global::init(error_archive(first.path())).unwrap();
    global::error("to the first", &[]);

    let previous = global::replace(log_router::build(error_archive(second.path())).unwrap());
    assert!(previous.shares_sinks_with(&logger));
    global::error("to the second", &[]);
    global::get().sync().unwrap();
    previous.sync().unwrap();

    let first_lines = read_json_lines(&first.path().join("error.log"));
    let second_lines = read_json_lines(&second.path().join("error.log"));
    assert_eq!(first_lines.len(), 1);
    assert_eq!(first_lines[0]["content"], "to the first");
    assert_eq!(second_lines.len(), 1);
    assert_eq!(second_lines[0]["content"], "to the second");
    assert!(
        second_lines[0]["caller"]
            .as_str()
            .unwrap()
            .contains("tests/global.rs:")
    );

    global::set(Logger::nop());
}

#[test]
#[serial]
fn set_with_fields_binds_string_fields() {
    let dir = tempfile::tempdir().unwrap();
    global::init(error_archive(dir.path())).unwrap();

    global::set_with_fields(&HashMap::from([(
        "region".to_string(),
        "eu-west-1".to_string(),
    )]));
    global::error("with region", &[]);
    global::get().sync().unwrap();

    let lines = read_json_lines(&dir.path().join("error.log"));
    assert_eq!(lines[0]["region"], "eu-west-1");

    global::set(Logger::nop());
}

#[test]
#[serial]
fn panic_shortcut_unwinds_with_the_message() {
    global::set(Logger::nop());

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        global::panic("cannot continue", &[]);
    }));

    let payload = result.unwrap_err().downcast::<LoggedPanic>().unwrap();
    assert_eq!(payload.message, "cannot continue");
}

#[test]
#[serial]
fn readers_never_observe_a_partial_swap() {
    let dir = tempfile::tempdir().unwrap();
    let archived = log_router::build(error_archive(dir.path())).unwrap();
    global::set(archived.clone());

    let done = Arc::new(AtomicBool::new(false));
    let swapper = {
        let done = Arc::clone(&done);
        let archived = archived.clone();
        thread::spawn(move || {
            for round in 0..500 {
                if round % 2 == 0 {
                    global::set(Logger::nop());
                } else {
                    global::set(archived.clone());
                }
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    while !done.load(Ordering::SeqCst) {
        let current = global::get();
        let nop = !current.enabled(Severity::Error);
        assert!(nop || current.shares_sinks_with(&archived));
    }
    swapper.join().unwrap();

    global::set(Logger::nop());
}

#[test]
fn fatal_syncs_then_exits_with_status_one() {
    if let Ok(dir) = std::env::var(FATAL_DIR_VAR) {
        global::init(error_archive(Path::new(&dir))).unwrap();
        global::error("last words", &[]);
        global::fatal("giving up", &[]);
    }

    let dir = tempfile::tempdir().unwrap();
    let status = Command::new(std::env::current_exe().unwrap())
        .args(["fatal_syncs_then_exits_with_status_one", "--exact"])
        .arg("--nocapture")
        .env(FATAL_DIR_VAR, dir.path())
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    let lines = read_json_lines(&dir.path().join("error.log"));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["content"], "last words");
}
