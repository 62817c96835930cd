//! Integration tests for science-core.

use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use science_core::{
    by_key, Experiment, ExperimentOptions, ExperimentReport, JsonEquality, JsonReporter,
    Reporters, Run, SimpleReporter,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
struct User {
    id: String,
    name: String,
}

fn user(id: &str, name: &str) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Snapshot of what the reporter was handed.
#[derive(Debug, Clone)]
struct Seen {
    experiment: String,
    matched: bool,
    control_ms: Duration,
    candidate_ms: Duration,
    candidate_error: Option<String>,
    candidate_panicked: bool,
}

type Log = Arc<Mutex<Vec<Seen>>>;

fn options_with_log(log: &Log) -> ExperimentOptions<User, String> {
    let log = Arc::clone(log);
    ExperimentOptions::default().with_reporter(
        move |experiment: &str, matched: bool, control: &Run<User, String>, candidate: &Run<User, String>| {
            log.lock().unwrap().push(Seen {
                experiment: experiment.to_string(),
                matched,
                control_ms: control.duration(),
                candidate_ms: candidate.duration(),
                candidate_error: candidate.error().map(|e| e.to_string()),
                candidate_panicked: candidate.abnormally_terminated(),
            });
        },
    )
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_matching_users_after_delay() {
    let log = Log::default();
    let mut experiment = Experiment::with_options("fetch_users", options_with_log(&log));
    experiment.control(|| {
        thread::sleep(Duration::from_millis(10));
        Ok(user("user-456", "Chris"))
    });
    experiment.candidate(|| {
        thread::sleep(Duration::from_millis(5));
        Ok(user("user-456", "Chris"))
    });

    assert_eq!(experiment.run(), Ok(user("user-456", "Chris")));

    let seen = log.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].experiment, "fetch_users");
    assert!(seen[0].matched);
    assert!(seen[0].control_ms >= Duration::from_millis(8));
    assert!(seen[0].control_ms <= Duration::from_millis(40));
    assert!(seen[0].candidate_ms >= Duration::from_millis(4));
}

#[test]
fn test_candidate_error_does_not_leak() {
    let log = Log::default();
    let mut experiment = Experiment::with_options("fetch_users", options_with_log(&log));
    experiment.control(|| Ok(user("user-123", "Chris")));
    experiment.candidate(|| Err("fetch failed".to_string()));

    assert_eq!(experiment.run(), Ok(user("user-123", "Chris")));

    let seen = log.lock().unwrap();
    assert!(!seen[0].matched);
    assert_eq!(seen[0].candidate_error.as_deref(), Some("fetch failed"));
}

#[test]
fn test_candidate_panic_reported_not_raised() {
    let log = Log::default();
    let mut experiment = Experiment::with_options("fetch_users", options_with_log(&log));
    experiment.control(|| Ok(user("user-123", "Chris")));
    experiment.candidate(|| {
        thread::sleep(Duration::from_millis(10));
        panic!("index out of range");
    });

    assert_eq!(experiment.run(), Ok(user("user-123", "Chris")));

    let seen = log.lock().unwrap();
    assert!(seen[0].candidate_panicked);
    assert!(!seen[0].candidate_error.as_deref().unwrap_or("").is_empty());
    assert!(seen[0].candidate_ms >= Duration::from_millis(8));
}

#[test]
fn test_control_panic_propagates_after_single_report() {
    let log = Log::default();
    let mut experiment = Experiment::with_options("fetch_users", options_with_log(&log));
    experiment.control(|| panic!("database unavailable"));
    experiment.candidate(|| Ok(user("user-123", "Chris")));

    let result = panic::catch_unwind(AssertUnwindSafe(|| experiment.run()));
    assert!(result.is_err());
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn test_no_candidate_compares_against_nothing() {
    let log = Log::default();
    let mut experiment = Experiment::with_options("fetch_users", options_with_log(&log));
    experiment.control(|| Ok(user("user-123", "Chris")));

    assert_eq!(experiment.run(), Ok(user("user-123", "Chris")));

    let seen = log.lock().unwrap();
    assert!(!seen[0].matched);
    assert_eq!(seen[0].candidate_ms, Duration::ZERO);
    assert!(seen[0].candidate_error.is_none());
}

#[test]
fn test_simple_reporter_line() {
    let buf = SharedBuf::default();
    let options = ExperimentOptions::new(JsonEquality, SimpleReporter::new(buf.clone()));
    let mut experiment: Experiment<User, String> = Experiment::with_options("fetch_users", options);
    experiment.control(|| Ok(user("user-123", "Chris")));
    experiment.candidate(|| Err("unable to fetch user".to_string()));

    experiment.run().unwrap();

    let out = buf.contents();
    assert!(out.starts_with(
        "experiment: fetch_users, equal: false, control: returned User { id: \"user-123\", name: \"Chris\" } in "
    ));
    assert!(out.contains(", candidate: returned error \"unable to fetch user\" in "));
}

#[test]
fn test_fanout_to_json_and_text() {
    let text = SharedBuf::default();
    let json = SharedBuf::default();
    let reporters = Reporters::new()
        .with(SimpleReporter::new(text.clone()))
        .with(JsonReporter::new(json.clone()));
    let comparer = by_key(|u: &User| u.id.clone());

    let mut experiment = Experiment::with_options("renames", ExperimentOptions::new(comparer, reporters));
    experiment.control(|| Ok(user("user-1", "Chris")));
    experiment.candidate(|| Ok(user("user-1", "Christopher")));

    assert_eq!(experiment.run(), Ok::<_, String>(user("user-1", "Chris")));

    assert!(text.contents().contains("equal: true"));
    let report: ExperimentReport = serde_json::from_str(json.contents().trim()).unwrap();
    assert!(report.matched);
    assert_eq!(report.experiment, "renames");
    assert_eq!(
        report.candidate.value,
        Some(serde_json::json!({"id": "user-1", "name": "Christopher"}))
    );
}

#[test]
fn test_shared_experiment_across_threads() {
    let log = Log::default();
    let mut experiment = Experiment::with_options("concurrent_callers", options_with_log(&log));
    experiment.control(|| Ok(user("user-1", "Chris")));
    experiment.candidate(|| Ok(user("user-1", "Chris")));
    let experiment = Arc::new(experiment);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let experiment = Arc::clone(&experiment);
            thread::spawn(move || experiment.run())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(user("user-1", "Chris")));
    }

    let seen = log.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|s| s.matched));
}
