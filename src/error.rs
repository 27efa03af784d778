//! Error types for recurro.

use thiserror::Error;

/// Recurro error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Array dimensions inconsistent with the declared channel sizes.
    #[error("shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Edge references a node outside `[0, num_nodes)`.
    #[error("edge index {index} out of range for {num_nodes} nodes")]
    IndexOutOfRange { index: i64, num_nodes: usize },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
