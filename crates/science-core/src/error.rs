//! Error types for science-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScienceError {
    #[error("experiment {0} has no control function provided")]
    MissingControl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid statsd address: {0}")]
    InvalidAddress(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScienceError>;
