use thiserror::Error;

/// Errors that can occur during grid detection loss computation.
///
/// Only shape errors are fatal: the loss is total for shape-valid input, and
/// numeric degeneracies (near-zero unions, square roots at zero) are bounded
/// by the configured epsilon instead of being reported.
#[derive(Debug, Error)]
pub enum GridDetectionLossError {
    /// An input tensor does not match the configured grid geometry.
    #[error("tensor does not match the configured grid: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The shape required by the configured grid.
        expected: String,
        /// The shape that was provided.
        actual: String,
    },

    /// Predictions and targets disagree with each other.
    #[error("incompatible tensor shapes: predictions shape {pred_shape:?} does not match targets shape {target_shape:?}")]
    IncompatibleShapes {
        pred_shape: Vec<usize>,
        target_shape: Vec<usize>,
    },
}
