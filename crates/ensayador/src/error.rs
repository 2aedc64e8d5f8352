//! Errors surfaced by the `ensayador` front end

use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Why a CLI invocation stopped before producing an exit status of its own
#[derive(Debug, Error)]
pub enum CliError {
    /// An environment override or flag had an unusable value
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with it
        message: String,
    },

    /// The memory checker could not be started
    #[error("Cannot relaunch under {}: {source}", tool.display())]
    Relaunch {
        /// Checker executable
        tool: PathBuf,
        /// Spawn failure
        source: std::io::Error,
    },

    /// A report file could not be written after the run
    #[error("Cannot write report {}: {source}", path.display())]
    Report {
        /// Report destination
        path: PathBuf,
        /// Write failure
        source: std::io::Error,
    },

    /// Locating the executable or the working directory failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Discovery, planning or the run itself failed
    #[error(transparent)]
    Ensayo(#[from] ensayo::EnsayoError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_config_error() {
        let err = CliError::config("ENSAYO_COLLAPSE=2 is not 0 or 1");
        assert_eq!(
            err.to_string(),
            "Configuration error: ENSAYO_COLLAPSE=2 is not 0 or 1"
        );
    }

    #[test]
    fn test_relaunch_names_tool() {
        let err = CliError::Relaunch {
            tool: PathBuf::from("/usr/bin/valgrind"),
            source: IoError::new(ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.to_string(), "Cannot relaunch under /usr/bin/valgrind: not found");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_report_names_path() {
        let err = CliError::Report {
            path: PathBuf::from("out/junit.xml"),
            source: IoError::new(ErrorKind::NotFound, "no such directory"),
        };
        assert!(err.to_string().starts_with("Cannot write report out/junit.xml"));
    }

    #[test]
    fn test_engine_error_is_transparent() {
        let err: CliError = ensayo::EnsayoError::UnknownSpec {
            spec: "suite.nope".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            ensayo::EnsayoError::UnknownSpec {
                spec: "suite.nope".to_string()
            }
            .to_string()
        );
    }

    #[test]
    fn test_io_error_from() {
        let cli_err: CliError = IoError::new(ErrorKind::NotFound, "file not found").into();
        assert!(matches!(cli_err, CliError::Io(_)));
        assert!(cli_err.to_string().starts_with("I/O error"));
    }
}
