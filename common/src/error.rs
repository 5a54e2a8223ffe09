use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("No FPS available: neither configured nor reported by the stream")]
    NoFpsAvailable,

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to write log file {path}: {source}")]
    SinkWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Frame source error: {0}")]
    Source(String),

    #[error("Parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MonitorError {
    pub fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MonitorError::SinkWriteError {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
