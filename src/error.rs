//! Crate-wide error type.
//!
//! Tensor kernels panic on shape mismatches (see [`crate::backprop`]); the
//! fallible surface is configuration, network entry points and model I/O.

use thiserror::Error;

/// Errors returned by network construction, validation and persistence.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A per-layer hyperparameter list does not match the network depth.
    #[error("`{name}` has {found} values but depth is {expected}")]
    LayerCount {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    /// A tensor does not have the shape the layer expects.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// A parameter file holds a different number of tensors than the module.
    #[error("expected {expected} parameter tensors, found {found}")]
    ParamCount { expected: usize, found: usize },
    /// The file does not start with the parameter file magic.
    #[error("invalid magic header")]
    BadMagic,
    /// The file is structurally broken.
    #[error("corrupt parameter file: {0}")]
    Corrupt(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
