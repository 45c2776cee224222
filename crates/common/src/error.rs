use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid candle at {opentime}: {reason}")]
    InvalidCandle {
        opentime: DateTime<Utc>,
        reason: String,
    },

    #[error("Out-of-order candle: opentime {got} precedes last opentime {last}")]
    OutOfOrderCandle {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    #[error("Insufficient history: requested {requested} bars, {available} available")]
    InsufficientHistory { requested: usize, available: usize },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine is no longer running")]
    EngineClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
