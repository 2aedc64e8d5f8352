//! Result and error types for Ensayo.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Ensayo operations
pub type EnsayoResult<T> = Result<T, EnsayoError>;

/// Errors that can occur in Ensayo
#[derive(Debug, Error)]
pub enum EnsayoError {
    /// Classifier pattern failed to compile
    #[error("Invalid classifier pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern source
        pattern: String,
        /// Regex compiler message
        message: String,
    },

    /// A test spec did not resolve to any node of the tree
    #[error("No such test: {spec}")]
    UnknownSpec {
        /// Spec as given by the user
        spec: String,
    },

    /// Function discovery failed
    #[error("Discovery failed for {path}: {message}")]
    Discovery {
        /// Binary or manifest being introspected
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Could not create an execution context (fatal to the run)
    #[error("Failed to start execution context for {test}: {message}")]
    Spawn {
        /// Full name of the test being started
        test: String,
        /// Error message
        message: String,
    },

    /// Malformed message on the worker channel
    #[error("Worker protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// Worker-side failure (node missing, channel closed)
    #[error("Worker error: {message}")]
    Worker {
        /// Error message
        message: String,
    },

    /// A function could not be invoked
    #[error("Cannot invoke {function}: {message}")]
    Invoke {
        /// Function name
        function: String,
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl EnsayoError {
    /// Create a discovery error
    #[must_use]
    pub fn discovery(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Discovery {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a worker error
    #[must_use]
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
