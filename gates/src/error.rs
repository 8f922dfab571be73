//! Error types for gate operations.
//!
//! This module defines `GateError`, the error type for gate geometry, chain
//! evaluation and mask algebra. It uses `thiserror` for convenient error
//! construction and implements standard error traits for integration with
//! error handling libraries.

use std::error::Error as StdError;
use thiserror::Error;

/// Custom error type for gate operations.
///
/// All gate operations return `Result<T, GateError>`.
#[derive(Debug, Error)]
pub enum GateError {
    /// Geometry validation failures
    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    /// Missing required channel
    #[error("Missing channel '{channel}' in context: {context}")]
    MissingChannel { channel: String, context: String },

    /// Invalid coordinate values
    #[error("Invalid coordinate '{coordinate}': value {value} is not finite")]
    InvalidCoordinate { coordinate: String, value: f32 },

    /// Masks or event arrays that must line up do not
    #[error("Length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Gate chain construction or evaluation failures
    #[error("Hierarchy error: {message}")]
    HierarchyError { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error with context (for wrapping other errors)
    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl GateError {
    /// Create an InvalidGeometry error with a message
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: message.into(),
        }
    }

    /// Create a MissingChannel error
    pub fn missing_channel(channel: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingChannel {
            channel: channel.into(),
            context: context.into(),
        }
    }

    /// Create an InvalidCoordinate error
    pub fn invalid_coordinate(coordinate: impl Into<String>, value: f32) -> Self {
        Self::InvalidCoordinate {
            coordinate: coordinate.into(),
            value,
        }
    }

    pub fn length_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Create a HierarchyError with a message
    pub fn hierarchy_error(message: impl Into<String>) -> Self {
        Self::HierarchyError {
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        match self {
            Self::InvalidGeometry { message } => Self::InvalidGeometry {
                message: format!("{}: {}", context.into(), message),
            },
            Self::MissingChannel {
                channel,
                context: ctx,
            } => Self::MissingChannel {
                channel,
                context: format!("{}: {}", context.into(), ctx),
            },
            Self::InvalidCoordinate { coordinate, value } => {
                Self::InvalidCoordinate { coordinate, value }
            }
            Self::LengthMismatch {
                context: ctx,
                expected,
                actual,
            } => Self::LengthMismatch {
                context: format!("{}: {}", context.into(), ctx),
                expected,
                actual,
            },
            Self::HierarchyError { message } => Self::HierarchyError {
                message: format!("{}: {}", context.into(), message),
            },
            Self::SerializationError(e) => Self::Other {
                message: format!("{}: {}", context.into(), e),
                source: Some(Box::new(e)),
            },
            Self::Other { message, source } => Self::Other {
                message: format!("{}: {}", context.into(), message),
                source,
            },
        }
    }
}

// Conversion from anyhow::Error for convenience
impl From<anyhow::Error> for GateError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            message: err.to_string(),
            source: None, // anyhow::Error already contains the full context
        }
    }
}

// Type alias for Result using GateError
pub type Result<T> = std::result::Result<T, GateError>;
