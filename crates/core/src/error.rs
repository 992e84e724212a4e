//! Error types for the packing engine.

use thiserror::Error;

/// Errors raised while building compartment grids or running a packing.
///
/// A rejected placement attempt or an exhausted ingredient is a normal
/// outcome of the scheduler and is never reported through this type.
#[derive(Debug, Error)]
pub enum Error {
    /// Recipe, ingredient or engine configuration is invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A point could not be classified with confidence.
    #[error("ambiguous classification at grid point {index}: {reason}")]
    ClassificationAmbiguity {
        /// Grid point index.
        index: usize,
        /// What made the classification ambiguous.
        reason: String,
    },

    /// Grid arrays disagree with each other or an index is out of range.
    #[error("grid inconsistency: {0}")]
    GridInconsistency(String),

    /// Mesh data is malformed (bad face indices, empty, non-finite vertices).
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
}

/// Result type alias for packing operations.
pub type Result<T> = std::result::Result<T, Error>;
