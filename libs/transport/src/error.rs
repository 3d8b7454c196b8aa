//! Transport Error Types
//!
//! One taxonomy for everything that can go wrong between peers. The
//! split that matters operationally: `is_retryable()` errors let the
//! producer drop one connection and try the next, everything else is a
//! process-fatal condition that propagates to the role loop.

use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// A peer sent a tag that is invalid for the current protocol phase.
    /// Always a backend or logic bug, never recoverable.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Internal invariant broken (e.g. a buffer that cannot hold a
    /// payload after growth). Should be unreachable.
    #[error("Consistency error: {message}")]
    Consistency { message: String },

    /// Connection management errors
    #[error("Connection error: {message} (peer: {peer:?})")]
    Connection {
        message: String,
        peer: Option<usize>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    /// Configuration errors (unknown transport name, missing option, ...)
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// The peer pool drained below what the operation needs
    #[error("Resource exhausted: {resource}: {message}")]
    Exhausted { resource: String, message: String },

    /// Capability absent in this backend
    #[error("Feature '{feature}' not implemented by the {backend} transport")]
    NotImplemented {
        feature: String,
        backend: &'static str,
    },

    /// Payload encode/decode failure
    #[error("Codec error: {0}")]
    Codec(#[from] codec::CodecError),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, peer: Option<usize>) -> Self {
        Self::Connection {
            message: message.into(),
            peer,
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        peer: Option<usize>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            peer,
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a resource exhausted error
    pub fn exhausted(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exhausted {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a not implemented error
    pub fn not_implemented(feature: impl Into<String>, backend: &'static str) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
            backend,
        }
    }

    /// Retryable errors let the TCP producer disconnect one peer and
    /// carry on with the rest of the pool.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Protocol { .. } => false,
            TransportError::Consistency { .. } => false,
            TransportError::Configuration { .. } => false,
            TransportError::Exhausted { .. } => false,
            TransportError::NotImplemented { .. } => false,
            TransportError::Codec(_) => false,
        }
    }

    /// Get error category for diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Protocol { .. } => "protocol",
            TransportError::Consistency { .. } => "consistency",
            TransportError::Connection { .. } => "connection",
            TransportError::Io { .. } => "io",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Exhausted { .. } => "exhausted",
            TransportError::NotImplemented { .. } => "not_implemented",
            TransportError::Codec(_) => "codec",
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}
