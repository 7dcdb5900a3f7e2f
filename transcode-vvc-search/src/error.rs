//! Error types for the VVC mode-decision core.
//!
//! Only setup faults are reported through [`SearchError`]: a configuration the
//! search cannot honour, or picture buffers whose geometry does not match what
//! the caller declared. Once a search has started, broken invariants are caller
//! bugs and abort through assertions instead.

use thiserror::Error;

/// Error type for configuring and preparing a search.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// Invalid search configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Picture dimensions the search cannot tile.
    #[error("Invalid picture dimensions {width}x{height}: {reason}")]
    Dimensions {
        /// Picture width in luma samples.
        width: u32,
        /// Picture height in luma samples.
        height: u32,
        /// Why the dimensions were rejected.
        reason: &'static str,
    },

    /// A plane buffer whose length does not match the picture geometry.
    #[error("Plane {plane} has {actual} samples, expected {expected}")]
    PlaneSize {
        /// Plane name (`Y`, `U` or `V`).
        plane: &'static str,
        /// Expected number of samples.
        expected: usize,
        /// Number of samples supplied.
        actual: usize,
    },

    /// Quantization parameter outside the supported range.
    #[error("QP {0} is outside 0..=63")]
    Qp(i32),

    /// Unsupported feature combination.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Result type for search setup operations.
pub type Result<T> = std::result::Result<T, SearchError>;
