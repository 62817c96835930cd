//! science-core: experiment engine for science-rs.
//!
//! An [`Experiment`] runs the trusted control and a candidate replacement for
//! the same logical call, times both, compares their values, and reports the
//! outcome. The caller always gets the control's result back; the candidate can
//! only be observed through the [`Reporter`].

pub mod comparer;
pub mod error;
pub mod experiment;
pub mod models;
pub mod reporter;
pub mod run;
pub mod statsd;

pub use comparer::{by_key, Comparer, DeepEquality, JsonEquality, Tolerance};
pub use error::ScienceError;
pub use experiment::{Experiment, ExperimentOptions};
pub use models::{ExperimentReport, JsonReporter, RunSummary};
pub use reporter::{Reporter, Reporters, SimpleReporter, TracingReporter};
pub use run::{Run, RunError};
pub use statsd::{StatsReporter, StatsSink, StatsdConfig, StatsdSink};
