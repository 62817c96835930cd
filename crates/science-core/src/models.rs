//! Serializable report models and the JSON-lines reporter.

use std::fmt::Display;
use std::io::{self, Stdout, Write};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::reporter::{lock, Reporter};
use crate::run::Run;

/// Serializable view of a single [`Run`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The returned value as JSON, `None` when the run produced no value.
    pub value: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: f64,
    #[serde(default)]
    pub panicked: bool,
}

impl RunSummary {
    pub fn from_run<T: Serialize, E: Display>(run: &Run<T, E>) -> Result<Self> {
        let value = run.value().map(serde_json::to_value).transpose()?;
        Ok(Self {
            value,
            error: run.error().map(|e| e.to_string()),
            duration_ms: run.duration().as_secs_f64() * 1000.0,
            panicked: run.abnormally_terminated(),
        })
    }
}

/// Both sides of one experiment run, as written by [`JsonReporter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub id: Uuid,
    pub experiment: String,
    pub matched: bool,
    pub timestamp: DateTime<Utc>,
    pub control: RunSummary,
    pub candidate: RunSummary,
}

impl ExperimentReport {
    pub fn new<T: Serialize, E: Display>(
        experiment: &str,
        matched: bool,
        control: &Run<T, E>,
        candidate: &Run<T, E>,
    ) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            experiment: experiment.to_string(),
            matched,
            timestamp: Utc::now(),
            control: RunSummary::from_run(control)?,
            candidate: RunSummary::from_run(candidate)?,
        })
    }
}

// ─── JSON lines reporter ─────────────────────────────────────────────────────

/// Writes one [`ExperimentReport`] JSON object per line.
pub struct JsonReporter<W> {
    output: Mutex<W>,
}

impl JsonReporter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn new(output: W) -> Self {
        Self {
            output: Mutex::new(output),
        }
    }

    pub fn into_inner(self) -> W {
        self.output
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_report(&self, report: &ExperimentReport) -> Result<()> {
        let mut output = lock(&self.output);
        serde_json::to_writer(&mut *output, report)?;
        writeln!(output)?;
        output.flush()?;
        Ok(())
    }
}

impl<T, E, W> Reporter<T, E> for JsonReporter<W>
where
    T: Serialize,
    E: Display,
    W: Write + Send,
{
    fn report(&self, experiment: &str, matched: bool, control: &Run<T, E>, candidate: &Run<T, E>) {
        let result = ExperimentReport::new(experiment, matched, control, candidate)
            .and_then(|report| self.write_report(&report));
        if let Err(e) = result {
            warn!(experiment, "Failed to write JSON report: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct User {
        id: String,
        name: String,
    }

    fn user_run() -> Run<User, String> {
        Run::capture(|| {
            Ok(User {
                id: "user-456".to_string(),
                name: "Chris".to_string(),
            })
        })
    }

    #[test]
    fn test_run_summary_value() {
        let summary = RunSummary::from_run(&user_run()).unwrap();
        assert_eq!(
            summary.value,
            Some(serde_json::json!({"id": "user-456", "name": "Chris"}))
        );
        assert!(summary.error.is_none());
        assert!(!summary.panicked);
        assert!(summary.duration_ms >= 0.0);
    }

    #[test]
    fn test_run_summary_panic() {
        let run: Run<User, String> = Run::capture(|| panic!("boom"));
        let summary = RunSummary::from_run(&run).unwrap();
        assert!(summary.value.is_none());
        assert!(summary.panicked);
        assert_eq!(summary.error.as_deref(), Some("panic: boom"));
    }

    #[test]
    fn test_run_summary_unserializable_value() {
        let run: Run<HashMap<(u8, u8), u8>, String> = Run::capture(|| {
            let mut map = HashMap::new();
            map.insert((1, 2), 3);
            Ok(map)
        });
        assert!(RunSummary::from_run(&run).is_err());
    }

    #[test]
    fn test_json_reporter_writes_lines() {
        let reporter = JsonReporter::new(Vec::new());
        let empty: Run<User, String> = Run::empty();
        reporter.report("fetch_users", false, &user_run(), &empty);
        reporter.report("fetch_users", true, &user_run(), &user_run());

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let reports: Vec<ExperimentReport> = out
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].experiment, "fetch_users");
        assert!(!reports[0].matched);
        assert!(reports[0].candidate.value.is_none());
        assert!(reports[1].matched);
        assert_ne!(reports[0].id, reports[1].id);
    }
}
