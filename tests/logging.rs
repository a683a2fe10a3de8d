//! Integration tests for log output and its verbosity levels.

use log::{Level, LevelFilter, Log, Metadata, Record};
use ndarray::{array, Array1};
use newuoa_rs::{Newuoa, NewuoaConfig, Verbosity};
use std::sync::Mutex;

/// Keeps every record emitted by this crate.
struct CaptureLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if record.target().starts_with("newuoa_rs") {
            self.records
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};

fn take_records() -> Vec<(Level, String)> {
    std::mem::take(&mut *LOGGER.records.lock().unwrap())
}

// The logger is global, so everything runs in a single test.
#[test]
fn test_verbosity_gates_log_output() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    // A budget this large forces the history to be clamped.
    let clamped = |verbosity| NewuoaConfig {
        maxfun: Some(usize::MAX / 2),
        verbosity,
        ..Default::default()
    };
    let config = clamped(Verbosity::None).resolve(3).unwrap();
    assert!(config.maxhist < config.maxfun);
    assert!(take_records().is_empty());

    clamped(Verbosity::Exit).resolve(3).unwrap();
    let records = take_records();
    assert!(records
        .iter()
        .any(|(level, msg)| *level == Level::Warn && msg.contains("maxhist reduced")));

    let mut sphere = |x: &Array1<f64>| x.dot(x);
    let x0 = array![1.0, -1.0, 0.5];
    let quiet = Newuoa::new()
        .with_verbosity(Verbosity::None)
        .minimize(&mut sphere, &x0)
        .unwrap();
    assert!(take_records().is_empty());

    let verbose = Newuoa::new()
        .with_verbosity(Verbosity::Fevl)
        .minimize(&mut sphere, &x0)
        .unwrap();
    let records = take_records();
    let evaluations = records
        .iter()
        .filter(|(level, _)| *level == Level::Trace)
        .count();
    assert_eq!(evaluations, verbose.nf);
    assert!(records
        .iter()
        .any(|(level, msg)| *level == Level::Info && msg.contains("rho reduced")));
    assert!(records
        .iter()
        .any(|(level, msg)| *level == Level::Info && msg.contains("NEWUOA finished")));

    // Logging never changes the iterates.
    assert_eq!(quiet.x, verbose.x);
    assert_eq!(quiet.nf, verbose.nf);
}
