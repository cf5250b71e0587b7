//! Error types
//!
//! Every failure in this crate is local and synchronous: a bad configuration
//! is rejected at construction, and shape problems are reported by the first
//! layer that sees them.

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors raised by layers, networks and configuration
#[derive(Error, Debug)]
pub enum NetError {
    /// Input shape does not fit the layer it was fed to
    #[error("dimension mismatch in {op}: expected {expected}, found {found}")]
    DimensionMismatch {
        op: &'static str,
        expected: String,
        found: String,
    },

    /// A label is outside `[0, num_classes)`
    #[error("label {label} at index {index} is out of range for {num_classes} classes")]
    InvalidLabel {
        index: usize,
        label: usize,
        num_classes: usize,
    },

    /// Invalid network or layer configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Parameter name that does not exist in the store
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetError {
    pub(crate) fn mismatch(
        op: &'static str,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        NetError::DimensionMismatch {
            op,
            expected: expected.into(),
            found: found.into(),
        }
    }
}
