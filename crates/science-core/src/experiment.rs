//! Experiment orchestration: run the control and the candidate, compare them,
//! report, and hand the caller exactly what the control produced.
//!
//! The candidate is fully isolated. Its errors and panics reach the outside
//! world only through the [`Reporter`]. A panic in the control is reported
//! first and then raised again, so callers observe the same failure they would
//! have seen calling the control directly.

use std::fmt::{Debug, Display};
use std::thread;
use std::time::Instant;

use tracing::{debug, error};

use crate::comparer::{Comparer, DeepEquality};
use crate::error::ScienceError;
use crate::reporter::{Reporter, SimpleReporter};
use crate::run::{Outcome, Run, RunError};

type Operation<T, E> = Box<dyn Fn() -> Result<T, E> + Send + Sync>;

/// Comparer and reporter used by an [`Experiment`].
pub struct ExperimentOptions<T, E> {
    /// Decides whether control and candidate values match.
    pub comparer: Box<dyn Comparer<T>>,
    /// Receives every run of the experiment.
    pub reporter: Box<dyn Reporter<T, E>>,
}

impl<T, E> ExperimentOptions<T, E> {
    /// Options with an explicit comparer and reporter.
    pub fn new(
        comparer: impl Comparer<T> + 'static,
        reporter: impl Reporter<T, E> + 'static,
    ) -> Self {
        Self {
            comparer: Box::new(comparer),
            reporter: Box::new(reporter),
        }
    }

    /// Replace the comparer.
    pub fn with_comparer(mut self, comparer: impl Comparer<T> + 'static) -> Self {
        self.comparer = Box::new(comparer);
        self
    }

    /// Replace the reporter.
    pub fn with_reporter(mut self, reporter: impl Reporter<T, E> + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }
}

/// Deep equality, reporting one line per run to standard error.
impl<T, E> Default for ExperimentOptions<T, E>
where
    T: PartialEq + Debug + 'static,
    E: Display + 'static,
{
    fn default() -> Self {
        Self::new(DeepEquality, SimpleReporter::stderr())
    }
}

/// A single code path refactoring: the trusted control and the candidate
/// replacing it.
pub struct Experiment<T, E> {
    name: String,
    control: Option<Operation<T, E>>,
    candidate: Option<Operation<T, E>>,
    comparer: Box<dyn Comparer<T>>,
    reporter: Box<dyn Reporter<T, E>>,
}

impl<T, E> Experiment<T, E>
where
    T: PartialEq + Debug + 'static,
    E: Display + 'static,
{
    /// Create an experiment with the default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, ExperimentOptions::default())
    }
}

impl<T, E> Experiment<T, E>
where
    E: Display + 'static,
{
    pub fn with_options(name: impl Into<String>, options: ExperimentOptions<T, E>) -> Self {
        Self {
            name: name.into(),
            control: None,
            candidate: None,
            comparer: options.comparer,
            reporter: options.reporter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the control: the existing code being refactored away.
    pub fn control<F>(&mut self, control: F)
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.control = Some(Box::new(control));
    }

    /// Set the candidate: the new code under evaluation.
    pub fn candidate<F>(&mut self, candidate: F)
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.candidate = Some(Box::new(candidate));
    }

    /// Run the control and then the candidate, report, and return the control's
    /// result.
    ///
    /// # Panics
    ///
    /// Panics if no control has been set, and re-raises a panic from the
    /// control after it has been reported.
    pub fn run(&self) -> Result<T, E> {
        match self.try_run() {
            Ok(result) => result,
            Err(e) => panic!("{}", e),
        }
    }

    /// Like [`Experiment::run`], but a missing control is returned as
    /// [`ScienceError::MissingControl`] instead of panicking.
    pub fn try_run(&self) -> crate::error::Result<Result<T, E>> {
        let control = self.control_operation()?;

        let control_run = Run::capture(control);
        let candidate_run = match &self.candidate {
            Some(candidate) => Run::capture(candidate),
            None => Run::empty(),
        };

        Ok(self.conclude(control_run, candidate_run))
    }

    /// Run the control on the calling thread while the candidate runs on a
    /// scoped thread, then report and return the control's result.
    ///
    /// Both durations include scheduling overhead. A candidate panic stays on
    /// its own thread.
    ///
    /// # Panics
    ///
    /// Same as [`Experiment::run`].
    pub fn run_concurrent(&self) -> Result<T, E>
    where
        T: Send,
        E: Send,
    {
        let control = match self.control_operation() {
            Ok(control) => control,
            Err(e) => panic!("{}", e),
        };

        let (control_run, candidate_run) = thread::scope(|scope| {
            let started = Instant::now();
            let candidate = self
                .candidate
                .as_ref()
                .map(|candidate| scope.spawn(move || Run::capture_since(started, candidate)));

            let control_run = Run::capture(control);
            let candidate_run = match candidate {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|payload| Run::aborted(started.elapsed(), payload)),
                None => Run::empty(),
            };
            (control_run, candidate_run)
        });

        self.conclude(control_run, candidate_run)
    }

    fn control_operation(&self) -> Result<&Operation<T, E>, ScienceError> {
        self.control.as_ref().ok_or_else(|| {
            error!(experiment = %self.name, "experiment has no control function");
            ScienceError::MissingControl(self.name.clone())
        })
    }

    /// Compare, report, then resolve to the control's outcome.
    fn conclude(&self, control: Run<T, E>, candidate: Run<T, E>) -> Result<T, E> {
        let matched = self.comparer.compare(control.value(), candidate.value());
        debug!(experiment = %self.name, matched, "experiment compared");

        self.reporter.report(&self.name, matched, &control, &candidate);

        match control.into_outcome() {
            (Outcome::Value(value), false) => Ok(value),
            (Outcome::Error(RunError::Returned(err)), false) => Err(err),
            (outcome, _) => {
                let description = outcome.describe();
                error!(experiment = %self.name, error = %description, "control panicked");
                panic!("experiment {} panicked: {}", self.name, description);
            }
        }
    }
}
