//! Error types for the Commvault exporter.
//!
//! This module defines custom error types using `thiserror` for structured
//! error handling throughout the application.

use thiserror::Error;

/// Main error type for Commvault exporter operations.
#[derive(Debug, Error)]
pub enum CommvaultError {
    /// Error communicating with the Commvault API
    #[error("Commvault API error: {0}")]
    Api(#[from] reqwest::Error),

    /// Error parsing a Commvault API response
    #[error("Failed to parse Commvault API response: {0}")]
    ParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A single record in an otherwise valid response could not be rendered
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Metrics error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<prometheus::Error> for CommvaultError {
    fn from(e: prometheus::Error) -> Self {
        CommvaultError::Metrics(e.to_string())
    }
}

/// Result type alias for Commvault exporter operations.
pub type Result<T> = std::result::Result<T, CommvaultError>;
