//! Metrics reporting over the DogStatsD line protocol.
//!
//! Each experiment run emits three measurements, all tagged with the
//! experiment name so results can be aggregated across experiments:
//!
//! - `<prefix>.control_time`: timing of the control path
//! - `<prefix>.candidate_time`: timing of the candidate path
//! - `<prefix>.match` / `<prefix>.mismatch`: counter of outcomes

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ScienceError};
use crate::reporter::Reporter;
use crate::run::Run;

/// Where and under which prefix metrics are sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatsdConfig {
    /// Agent address (default: "127.0.0.1:8125")
    pub address: String,
    /// Metric name prefix (default: "science")
    pub prefix: String,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8125".to_string(),
            prefix: "science".to_string(),
        }
    }
}

impl StatsdConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// A destination for timing and counter measurements.
pub trait StatsSink: Send + Sync {
    fn timing(&self, name: &str, value: Duration, tags: &[String]) -> Result<()>;
    fn incr(&self, name: &str, tags: &[String]) -> Result<()>;
}

/// Format a timing metric, e.g. `science.control_time:10.5|ms|#experiment:x`.
pub fn format_timing(name: &str, value: Duration, tags: &[String]) -> String {
    with_tags(
        format!("{}:{}|ms", name, value.as_nanos() as f64 / 1_000_000.0),
        tags,
    )
}

/// Format a counter increment, e.g. `science.match:1|c|#experiment:x`.
pub fn format_incr(name: &str, tags: &[String]) -> String {
    with_tags(format!("{}:1|c", name), tags)
}

fn with_tags(mut line: String, tags: &[String]) -> String {
    if !tags.is_empty() {
        line.push_str("|#");
        line.push_str(&tags.join(","));
    }
    line
}

/// UDP client for a StatsD / DogStatsD agent.
#[derive(Debug)]
pub struct StatsdSink {
    socket: UdpSocket,
}

impl StatsdSink {
    pub fn connect(address: &str) -> Result<Self> {
        let target: SocketAddr = address
            .to_socket_addrs()
            .map_err(|e| ScienceError::InvalidAddress(format!("{}: {}", address, e)))?
            .next()
            .ok_or_else(|| ScienceError::InvalidAddress(address.to_string()))?;

        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)?;
        socket.connect(target)?;
        debug!(%target, "statsd sink connected");
        Ok(Self { socket })
    }

    fn send(&self, line: &str) -> Result<()> {
        self.socket.send(line.as_bytes())?;
        Ok(())
    }
}

impl StatsSink for StatsdSink {
    fn timing(&self, name: &str, value: Duration, tags: &[String]) -> Result<()> {
        self.send(&format_timing(name, value, tags))
    }

    fn incr(&self, name: &str, tags: &[String]) -> Result<()> {
        self.send(&format_incr(name, tags))
    }
}

/// Reporter that turns each experiment run into timing and counter metrics.
pub struct StatsReporter<S> {
    sink: S,
    prefix: String,
}

impl StatsReporter<StatsdSink> {
    pub fn from_config(config: &StatsdConfig) -> Result<Self> {
        Ok(Self::new(StatsdSink::connect(&config.address)?, &config.prefix))
    }
}

impl<S: StatsSink> StatsReporter<S> {
    pub fn new(sink: S, prefix: &str) -> Self {
        Self {
            sink,
            prefix: prefix.to_string(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<T, E, S: StatsSink> Reporter<T, E> for StatsReporter<S> {
    fn report(&self, experiment: &str, matched: bool, control: &Run<T, E>, candidate: &Run<T, E>) {
        let outcome = if matched { "match" } else { "mismatch" };
        let experiment_tag = format!("experiment:{}", experiment);
        let timing_tags = [experiment_tag.clone(), format!("result:{}", outcome)];

        let results = [
            self.sink.timing(
                &format!("{}.control_time", self.prefix),
                control.duration(),
                &timing_tags,
            ),
            self.sink.timing(
                &format!("{}.candidate_time", self.prefix),
                candidate.duration(),
                &timing_tags,
            ),
            self.sink
                .incr(&format!("{}.{}", self.prefix, outcome), &[experiment_tag]),
        ];

        for result in results {
            if let Err(e) = result {
                warn!(experiment, "Failed to emit experiment metric: {}", e);
            }
        }
    }
}
