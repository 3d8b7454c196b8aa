//! Configuration Error Types

use thiserror::Error;

/// Errors produced while building or reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required key is absent from the bag
    #[error("Configuration error: missing key '{key}'")]
    MissingKey { key: String },

    /// A key is present but holds a value of the wrong type
    #[error("Configuration error: key '{key}' expected {expected}, found '{found}'")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: String,
    },

    /// The configuration source could not be parsed
    #[error("Configuration parse error: {message}")]
    Parse { message: String },

    /// The configuration file could not be read
    #[error("Configuration I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
