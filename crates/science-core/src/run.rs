//! Run capture: execute one operation once, time it, and turn a panic into data.
//!
//! A [`Run`] is the uniform record both sides of an experiment produce. Capturing
//! never lets a panic escape; the experiment decides afterwards whether a panic
//! from the control path should be raised again.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// Why a run did not produce a value.
#[derive(Error, Debug)]
pub enum RunError<E> {
    /// The operation returned `Err`, or panicked with an `E` as payload.
    #[error("{0}")]
    Returned(E),
    /// The operation panicked; holds the rendered panic payload.
    #[error("panic: {0}")]
    Panic(String),
}

impl<E: 'static> RunError<E> {
    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<E>() {
            Ok(err) => RunError::Returned(*err),
            Err(payload) => RunError::Panic(panic_message(payload.as_ref())),
        }
    }
}

/// Render a panic payload the way the standard panic hook does for strings.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug)]
pub(crate) enum Outcome<T, E> {
    Value(T),
    Error(RunError<E>),
    Empty,
}

/// The outcome and timing of executing one operation once.
#[derive(Debug)]
pub struct Run<T, E> {
    outcome: Outcome<T, E>,
    duration: Duration,
    panicked: bool,
}

impl<T, E: 'static> Run<T, E> {
    /// Execute `operation` exactly once and record what happened.
    ///
    /// The elapsed time is taken after the call has fully resolved, so a
    /// panicking operation still reports how long it ran.
    ///
    /// The panic is contained, but the process panic hook still runs first, so
    /// the default hook prints `thread '...' panicked at ...` to stderr. Install
    /// a quieter hook with [`std::panic::set_hook`] if candidate panics should
    /// only surface through the reporter.
    pub fn capture<F>(operation: F) -> Self
    where
        F: FnOnce() -> Result<T, E>,
    {
        Self::capture_since(Instant::now(), operation)
    }

    /// Like [`Run::capture`], but measured from an earlier `started` instant.
    pub(crate) fn capture_since<F>(started: Instant, operation: F) -> Self
    where
        F: FnOnce() -> Result<T, E>,
    {
        let result = panic::catch_unwind(AssertUnwindSafe(operation));
        let duration = started.elapsed();

        let run = match result {
            Ok(Ok(value)) => Self {
                outcome: Outcome::Value(value),
                duration,
                panicked: false,
            },
            Ok(Err(err)) => Self {
                outcome: Outcome::Error(RunError::Returned(err)),
                duration,
                panicked: false,
            },
            Err(payload) => Self::aborted(duration, payload),
        };

        debug!(
            duration_us = run.duration.as_micros() as u64,
            panicked = run.panicked,
            "operation captured"
        );
        run
    }

    /// A run for an operation that unwound with `payload` after `duration`.
    pub(crate) fn aborted(duration: Duration, payload: Box<dyn Any + Send>) -> Self {
        Self {
            outcome: Outcome::Error(RunError::from_panic(payload)),
            duration,
            panicked: true,
        }
    }
}

impl<T, E> Run<T, E> {
    /// The run of an operation that was never configured: no value, no error,
    /// zero duration.
    pub fn empty() -> Self {
        Self {
            outcome: Outcome::Empty,
            duration: Duration::ZERO,
            panicked: false,
        }
    }

    /// The value the operation returned, if it returned one.
    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The error the operation returned, or the one synthesized from its panic.
    pub fn error(&self) -> Option<&RunError<E>> {
        match &self.outcome {
            Outcome::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Wall-clock time the operation took.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether the operation panicked instead of returning.
    pub fn abnormally_terminated(&self) -> bool {
        self.panicked
    }

    /// Whether the operation returned a value without error.
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Value(_))
    }

    pub(crate) fn into_outcome(self) -> (Outcome<T, E>, bool) {
        (self.outcome, self.panicked)
    }
}

impl<T, E: fmt::Display> Outcome<T, E> {
    /// Human-readable description used when re-raising a control panic.
    pub(crate) fn describe(&self) -> String {
        match self {
            Outcome::Error(err) => err.to_string(),
            Outcome::Value(_) => "returned a value".to_string(),
            Outcome::Empty => "produced nothing".to_string(),
        }
    }
}
