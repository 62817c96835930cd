//! Reporters: where experiment outcomes go.
//!
//! Reporting is best-effort telemetry. A reporter never panics and never hands an
//! error back to the experiment; failures are logged with `tracing` and dropped.

use std::fmt::{Debug, Display};
use std::io::{self, Stderr, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::run::Run;

/// Consumes the result of one experiment run.
pub trait Reporter<T, E>: Send + Sync {
    fn report(&self, experiment: &str, matched: bool, control: &Run<T, E>, candidate: &Run<T, E>);
}

impl<T, E, F> Reporter<T, E> for F
where
    F: Fn(&str, bool, &Run<T, E>, &Run<T, E>) + Send + Sync,
{
    fn report(&self, experiment: &str, matched: bool, control: &Run<T, E>, candidate: &Run<T, E>) {
        self(experiment, matched, control, candidate)
    }
}

impl<T, E, R> Reporter<T, E> for Arc<R>
where
    R: Reporter<T, E> + ?Sized,
{
    fn report(&self, experiment: &str, matched: bool, control: &Run<T, E>, candidate: &Run<T, E>) {
        (**self).report(experiment, matched, control, candidate)
    }
}

pub(crate) fn lock<W>(output: &Mutex<W>) -> MutexGuard<'_, W> {
    // A panic while holding the lock leaves the sink usable for later lines.
    output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── Simple text reporter ────────────────────────────────────────────────────

/// Writes one human-readable line per experiment run to an output sink.
pub struct SimpleReporter<W> {
    output: Mutex<W>,
}

impl SimpleReporter<Stderr> {
    /// Reporter writing to standard error. The default reporter.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> SimpleReporter<W> {
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
}

impl<T, E, W> Reporter<T, E> for SimpleReporter<W>
where
    T: Debug,
    E: Display,
    W: Write + Send,
{
    fn report(&self, experiment: &str, matched: bool, control: &Run<T, E>, candidate: &Run<T, E>) {
        let line = format_report(experiment, matched, control, candidate);
        let mut output = lock(&self.output);
        if let Err(e) = writeln!(output, "{}", line) {
            warn!(experiment, "Failed to write experiment report: {}", e);
        }
    }
}

/// `experiment: <name>, equal: <bool>, control: <run>, candidate: <run>`
pub fn format_report<T: Debug, E: Display>(
    experiment: &str,
    matched: bool,
    control: &Run<T, E>,
    candidate: &Run<T, E>,
) -> String {
    format!(
        "experiment: {}, equal: {}, control: {}, candidate: {}",
        experiment,
        matched,
        format_run(control),
        format_run(candidate)
    )
}

/// Describe a single run, preferring its error over its value.
pub fn format_run<T: Debug, E: Display>(run: &Run<T, E>) -> String {
    match (run.error(), run.value()) {
        (Some(err), _) => format!("returned error {:?} in {:?}", err.to_string(), run.duration()),
        (None, Some(value)) => format!("returned {:?} in {:?}", value, run.duration()),
        (None, None) => format!("returned nothing in {:?}", run.duration()),
    }
}

// ─── Tracing reporter ────────────────────────────────────────────────────────

/// Emits one structured `tracing` event per run: `info` on a match, `warn` on a
/// mismatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl<T, E: Display> Reporter<T, E> for TracingReporter {
    fn report(&self, experiment: &str, matched: bool, control: &Run<T, E>, candidate: &Run<T, E>) {
        let control_ms = control.duration().as_secs_f64() * 1000.0;
        let candidate_ms = candidate.duration().as_secs_f64() * 1000.0;
        let control_error = describe_error(control);
        let candidate_error = describe_error(candidate);

        if matched {
            info!(
                experiment,
                matched,
                control_ms,
                candidate_ms,
                "experiment matched"
            );
        } else {
            warn!(
                experiment,
                matched,
                control_ms,
                candidate_ms,
                control_error = %control_error,
                candidate_error = %candidate_error,
                candidate_panicked = candidate.abnormally_terminated(),
                "experiment mismatched"
            );
        }
    }
}

fn describe_error<T, E: Display>(run: &Run<T, E>) -> String {
    run.error().map(|e| e.to_string()).unwrap_or_default()
}

// ─── Fan-out ─────────────────────────────────────────────────────────────────

/// Forwards every report to each contained reporter, in order.
pub struct Reporters<T, E> {
    reporters: Vec<Box<dyn Reporter<T, E>>>,
}

impl<T, E> Reporters<T, E> {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn with(mut self, reporter: impl Reporter<T, E> + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl<T, E> Default for Reporters<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Reporter<T, E> for Reporters<T, E> {
    fn report(&self, experiment: &str, matched: bool, control: &Run<T, E>, candidate: &Run<T, E>) {
        for reporter in &self.reporters {
            reporter.report(experiment, matched, control, candidate);
        }
    }
}
