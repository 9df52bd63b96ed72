//! Core error types for stretchflow-core.
//!
//! Most failures in a guided session are recoverable: storage hiccups default
//! to a safe value and speech failures drop a single utterance. The types
//! here carry those failures up to the point where they are logged and
//! swallowed, and describe the few that are rejected outright (bad routines).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for stretchflow-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Key-value storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Routine validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session task has already shut down
    #[error("Session is no longer running")]
    SessionClosed,
}

/// Persistence adapter errors.
///
/// Always transient from the session's point of view: readers fall back to
/// defaults, writers log and move on.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Generic backend failure
    #[error("Storage backend failure: {0}")]
    Backend(String),

    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored value could not be decoded
    #[error("Corrupt value under key '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Blocking storage worker panicked or was cancelled
    #[error("Storage worker failed: {0}")]
    Worker(String),
}

/// Speech backend failure. Suppressed for that single utterance.
#[derive(Error, Debug)]
#[error("Narration unavailable: {0}")]
pub struct SpeechError(pub String);

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dotted key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Routine validation errors, raised before a session starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Routine has no steps
    #[error("Routine '{title}' has no steps")]
    EmptyRoutine { title: String },

    /// A step has a zero duration
    #[error("Step {index} ('{name}') must have a positive duration")]
    NonPositiveDuration { index: usize, name: String },
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Worker(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
