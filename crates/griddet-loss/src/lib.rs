//! Grid-cell regression loss for single-stage object detection.
//!
//! This crate implements the training loss of a detector that predicts, for
//! every cell of a fixed S×S grid, a set of class scores and two candidate
//! boxes with objectness scores. Given a batch of predicted cell encodings
//! and the matching ground-truth encodings it produces one differentiable
//! scalar, built from four squared-error terms:
//!
//! - box geometry of the slot with the higher IoU against ground truth,
//!   compared in square-root size space and weighted by `lambda_coord`
//! - objectness of that responsible slot in cells containing an object
//! - objectness of both slots in empty cells, weighted by `lambda_noobj`
//! - class scores in cells containing an object
//!
//! All math is expressed as Burn tensor operations, so the loss is backend
//! agnostic and usable as the root of a backpropagation pass on any autodiff
//! backend.
//!
//! ## Usage Example
//!
//! ```rust
//! use griddet_loss::GridDetectionLossConfig;
//!
//! fn create_loss() -> griddet_loss::GridDetectionLoss {
//!     GridDetectionLossConfig::new()
//!         .with_grid_size(7)
//!         .with_num_classes(20)
//!         .init()
//! }
//! ```
//!
//! The crate has no model, data-loading, or evaluation code; it is the loss
//! component a training loop calls once per batch.

mod detection;
mod error;
mod iou;

pub use detection::{GridDetectionLoss, GridDetectionLossConfig};
pub use error::GridDetectionLossError;
pub use iou::intersection_over_union;
