//! Error types for DataChat
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for DataChat operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, turn streaming, session registry calls,
/// and interrupt-gate handling.
#[derive(Error, Debug)]
pub enum DatachatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport errors on the streaming turn channel (network failure,
    /// aborted fetch, non-success status)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Authentication errors (e.g., 401 Unauthorized)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Session registry errors (list/history/rename/delete)
    #[error("Session error: {0}")]
    Session(String),

    /// A free-form submission arrived while a SQL review was outstanding
    #[error("Input is suspended while a SQL review is pending")]
    GateClosed,

    /// A review decision arrived while no SQL review was outstanding
    #[error("No SQL review is pending")]
    NoPendingReview,

    /// Thread-id store errors (persisting the local thread identifier)
    #[error("Thread store error: {0}")]
    ThreadStore(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for DataChat operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
