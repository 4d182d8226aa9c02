//! Error types for bandstore
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using BandError
pub type Result<T> = std::result::Result<T, BandError>;

/// Unified error type for bandstore operations
///
/// Cloneable so a failed lazy initialisation of the global environment can
/// be reported to every caller that races on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BandError {
    // -------------------------------------------------------------------------
    // Device Errors
    // -------------------------------------------------------------------------
    #[error("Device {path} unavailable: {reason}")]
    DeviceUnavailable { path: PathBuf, reason: String },

    #[error("Device layout mismatch: {0}")]
    Layout(String),

    // -------------------------------------------------------------------------
    // File Errors
    // -------------------------------------------------------------------------
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error on {file}: {reason}")]
    Io { file: String, reason: String },

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BandError {
    pub(crate) fn device(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DeviceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Io {
            file: file.into(),
            reason: reason.into(),
        }
    }
}
