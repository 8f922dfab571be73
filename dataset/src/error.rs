//! Error types for dataset operations.
//!
//! Every public operation validates its inputs before touching the dataset, so
//! any `DatasetError` returned means nothing was changed. [`DatasetError::kind`]
//! groups the variants into the broad categories callers usually branch on.

use flowset_gates::GateError;
use polars::error::PolarsError;
use std::error::Error as StdError;
use std::path::PathBuf;
use strum_macros::Display;
use thiserror::Error;

/// Broad category of a [`DatasetError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    /// Malformed or missing input
    Validation,
    /// A channel, gate, data type or metadata column that is not registered
    UnknownReference,
    /// A collection size or array length invariant was violated
    CountMismatch,
    /// The operation needs a step that has not run yet
    PreconditionNotMet,
    /// A file argument does not exist
    FileNotFound,
    /// An array length disagrees with a sample's cell count
    ShapeMismatch,
    /// An external routine (fitter, compensator, deriver, ...) failed
    Collaborator,
    /// Serialization or I/O failures
    Io,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Invalid input: {message}")]
    Validation { message: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Unknown gate: {0}")]
    UnknownGate(String),

    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    #[error("Unknown sample map column: {0}")]
    UnknownColumn(String),

    #[error("Sample index {index} is out of range (1..={len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid bin edges for channel {channel}: {message}")]
    InvalidBinEdges { channel: String, message: String },

    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error("Count mismatch for {context}: expected {expected}, got {actual}")]
    CountMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Shape mismatch for {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Expected exactly one sample for {combination}, found {matches}")]
    SampleLookup { combination: String, matches: usize },

    #[error("{stage} failed: {message}")]
    Collaborator {
        stage: String,
        message: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn count_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::CountMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub fn shape_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionNotMet(message.into())
    }

    pub fn invalid_bin_edges(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidBinEdges {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Wrap a failure reported by an external routine
    pub fn collaborator(stage: impl Into<String>, err: anyhow::Error) -> Self {
        Self::Collaborator {
            stage: stage.into(),
            message: format!("{err:#}"),
            source: err.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. }
            | Self::IndexOutOfRange { .. }
            | Self::InvalidBinEdges { .. }
            | Self::InvalidMethod(_) => ErrorKind::Validation,
            Self::UnknownChannel(_)
            | Self::UnknownGate(_)
            | Self::UnknownDataType(_)
            | Self::UnknownColumn(_) => ErrorKind::UnknownReference,
            Self::CountMismatch { .. } | Self::SampleLookup { .. } => ErrorKind::CountMismatch,
            Self::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::PreconditionNotMet(_) => ErrorKind::PreconditionNotMet,
            Self::FileNotFound(_) => ErrorKind::FileNotFound,
            Self::Collaborator { .. } => ErrorKind::Collaborator,
            Self::Gate(GateError::LengthMismatch { .. }) => ErrorKind::ShapeMismatch,
            Self::Gate(GateError::MissingChannel { .. }) => ErrorKind::UnknownReference,
            Self::Gate(_) => ErrorKind::Validation,
            Self::Polars(_) => ErrorKind::Validation,
            Self::Serialization(_) | Self::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
