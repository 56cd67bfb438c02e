// src/error.rs

//! Unified error handling for the ranking crawler.

use std::fmt;

use thiserror::Error;

use crate::models::ExitStatus;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed for a reason other than timeout or refusal
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Trend cache database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Response body could not be decrypted or parsed
    #[error("Decode error: {0}")]
    Decode(String),

    /// API answered with a non-success code
    #[error("API error for {context}: code={code}, message={message}")]
    Api {
        context: String,
        code: String,
        message: String,
    },

    /// Request timed out
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    /// Remote host refused the connection
    #[error("Connection refused: {url}")]
    Refused { url: String },

    /// Remote host answered with an error status
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a decode error.
    pub fn decode(message: impl fmt::Display) -> Self {
        Self::Decode(message.to_string())
    }

    /// Create an API error with context.
    pub fn api(
        context: impl Into<String>,
        code: impl fmt::Display,
        message: impl fmt::Display,
    ) -> Self {
        Self::Api {
            context: context.into(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error must shut the whole pipeline instance down.
    pub fn is_fatal(&self) -> bool {
        self.exit_status().is_some()
    }

    /// The termination reason a fatal transport error maps to.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Self::Timeout { .. } => Some(ExitStatus::RateLimited),
            Self::Refused { .. } => Some(ExitStatus::ConnectionRefused),
            _ => None,
        }
    }
}
