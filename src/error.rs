//! Crate-level error types.

use thiserror::Error;

/// Errors raised while resolving configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// An environment variable is set but is not valid unicode.
    #[error("Environment variable {key} is not valid unicode")]
    NotUnicode {
        /// Variable name.
        key: String,
    },

    /// A `.env` file could not be read or parsed.
    #[error("Failed to load env file {path}: {reason}")]
    EnvFile {
        /// Path of the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },
}
