//! Grid-cell regression loss for single-stage object detection.
//!
//! The detector divides an image into an S×S grid. Every cell predicts `C`
//! class scores followed by two box slots, each carrying an objectness score
//! and a center-encoded box `(x, y, w, h)`. Ground truth populates only the
//! first slot's region, and channel `C` flags whether the cell contains an
//! object at all. The slot with the higher IoU against the ground-truth box
//! is made responsible for the cell, and four squared-error terms are summed:
//!
//! ```text
//! loss = lambda_coord * box + object + lambda_noobj * no_object + class
//! ```
//!
//! Every reduction is a plain sum, not a mean, so term magnitudes scale with
//! batch and grid size. All operations are composable tensor ops, which keeps
//! the returned scalar differentiable on autodiff backends.

use std::collections::HashMap;

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, cast::ToElement, Tensor},
};

use crate::{error::GridDetectionLossError, iou::intersection_over_union};

/// Configuration for creating a [grid detection loss](GridDetectionLoss).
#[derive(Config, Debug)]
pub struct GridDetectionLossConfig {
    /// Number of grid cells along each spatial axis. Default: 7
    #[config(default = 7)]
    pub grid_size: usize,
    /// Number of predicted box slots per cell. Only two slots are supported.
    #[config(default = 2)]
    pub num_boxes: usize,
    /// Number of object classes. Default: 20
    #[config(default = 20)]
    pub num_classes: usize,
    /// Weight on the box-coordinate term. Default: 5.0
    #[config(default = 5.0)]
    pub lambda_coord: f64,
    /// Weight on the no-object confidence term. Default: 0.5
    #[config(default = 0.5)]
    pub lambda_noobj: f64,
    /// Epsilon guarding the IoU denominator and the size square root. Default: 1e-6
    #[config(default = 1e-6)]
    pub eps: f64,
}

impl GridDetectionLossConfig {
    /// Initialize a [grid detection loss](GridDetectionLoss).
    pub fn init(&self) -> GridDetectionLoss {
        self.assertions();
        GridDetectionLoss {
            grid_size: self.grid_size,
            num_boxes: self.num_boxes,
            num_classes: self.num_classes,
            lambda_coord: self.lambda_coord,
            lambda_noobj: self.lambda_noobj,
            eps: self.eps,
        }
    }

    fn assertions(&self) {
        assert!(
            self.grid_size > 0,
            "Grid size for GridDetectionLoss must be positive, got {}",
            self.grid_size
        );
        assert!(
            self.num_boxes == 2,
            "GridDetectionLoss supports exactly 2 box slots per cell, got {}",
            self.num_boxes
        );
        assert!(
            self.num_classes > 0,
            "Number of classes for GridDetectionLoss must be positive, got {}",
            self.num_classes
        );
        assert!(
            self.lambda_coord > 0.0,
            "lambda_coord for GridDetectionLoss must be positive, got {}",
            self.lambda_coord
        );
        assert!(
            self.lambda_noobj > 0.0,
            "lambda_noobj for GridDetectionLoss must be positive, got {}",
            self.lambda_noobj
        );
        assert!(
            self.eps > 0.0,
            "Epsilon for GridDetectionLoss must be positive, got {}",
            self.eps
        );
    }
}

/// Grid-cell regression loss for single-stage object detection.
///
/// Stateless aside from its hyperparameters: every call is an independent,
/// referentially transparent reduction of the two input tensors to a scalar.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct GridDetectionLoss {
    /// Number of grid cells along each spatial axis.
    pub grid_size: usize,
    /// Number of predicted box slots per cell.
    pub num_boxes: usize,
    /// Number of object classes.
    pub num_classes: usize,
    /// Weight on the box-coordinate term.
    pub lambda_coord: f64,
    /// Weight on the no-object confidence term.
    pub lambda_noobj: f64,
    /// Epsilon guarding the IoU denominator and the size square root.
    pub eps: f64,
}

impl Default for GridDetectionLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for GridDetectionLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("grid_size", &self.grid_size)
            .add("num_boxes", &self.num_boxes)
            .add("num_classes", &self.num_classes)
            .add("lambda_coord", &self.lambda_coord)
            .add("lambda_noobj", &self.lambda_noobj)
            .optional()
    }
}

/// Unweighted loss terms shared by the public entry points.
struct LossTerms<B: Backend> {
    box_loss: Tensor<B, 1>,
    object_loss: Tensor<B, 1>,
    no_object_loss: Tensor<B, 1>,
    class_loss: Tensor<B, 1>,
}

impl GridDetectionLoss {
    /// Create a new grid detection loss with default configuration.
    pub fn new() -> Self {
        GridDetectionLossConfig::new().init()
    }

    /// Per-cell channel depth of the grid encoding.
    pub const fn cell_depth(&self) -> usize {
        self.num_classes + 5 * self.num_boxes
    }

    /// Compute the loss from flat per-sample predictions.
    ///
    /// The flat feature dimension is reshaped to the 4-D cell grid before the
    /// loss is evaluated.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, S * S * (C + 5 * B)]`
    /// - targets: `[batch_size, S, S, C + 5 * B]`
    /// - output: `[1]`
    ///
    /// # Errors
    ///
    /// Returns [`GridDetectionLossError::DimensionMismatch`] when the feature
    /// dimension cannot be reshaped to the configured grid, and the grid
    /// entry point's errors otherwise.
    pub fn forward<B: Backend>(
        &self,
        predictions: Tensor<B, 2>,
        targets: Tensor<B, 4>,
    ) -> Result<Tensor<B, 1>, GridDetectionLossError> {
        let [batch_size, features] = predictions.dims();
        let expected = self.grid_size * self.grid_size * self.cell_depth();
        if features != expected {
            return Err(GridDetectionLossError::DimensionMismatch {
                expected: format!("[batch_size, {expected}]"),
                actual: format!("[{batch_size}, {features}]"),
            });
        }

        let predictions =
            predictions.reshape([batch_size, self.grid_size, self.grid_size, self.cell_depth()]);
        self.forward_grid(predictions, targets)
    }

    /// Compute the loss from predictions already laid out on the cell grid.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch_size, S, S, C + 5 * B]`
    /// - targets: `[batch_size, S, S, C + 5 * B]`
    /// - output: `[1]`
    ///
    /// # Errors
    ///
    /// Returns [`GridDetectionLossError::DimensionMismatch`] when predictions
    /// do not match the configured grid geometry and
    /// [`GridDetectionLossError::IncompatibleShapes`] when the two inputs
    /// disagree.
    pub fn forward_grid<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Result<Tensor<B, 1>, GridDetectionLossError> {
        let terms = self.loss_terms(predictions, targets)?;
        Ok(self.total(&terms))
    }

    /// Compute the loss together with its per-term breakdown.
    ///
    /// The map carries the raw (unweighted) `"box"`, `"object"`,
    /// `"no_object"` and `"class"` terms plus the weighted `"total"` as
    /// detached scalars for monitoring; the returned tensor is the same
    /// differentiable total as [`forward_grid`](Self::forward_grid).
    ///
    /// # Errors
    ///
    /// Same as [`forward_grid`](Self::forward_grid).
    pub fn forward_detailed<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Result<(Tensor<B, 1>, HashMap<String, f64>), GridDetectionLossError> {
        let terms = self.loss_terms(predictions, targets)?;
        let total = self.total(&terms);

        let mut loss_dict = HashMap::new();
        loss_dict.insert(
            "box".to_owned(),
            terms.box_loss.clone().into_scalar().to_f64(),
        );
        loss_dict.insert(
            "object".to_owned(),
            terms.object_loss.clone().into_scalar().to_f64(),
        );
        loss_dict.insert(
            "no_object".to_owned(),
            terms.no_object_loss.clone().into_scalar().to_f64(),
        );
        loss_dict.insert(
            "class".to_owned(),
            terms.class_loss.clone().into_scalar().to_f64(),
        );
        loss_dict.insert("total".to_owned(), total.clone().into_scalar().to_f64());

        Ok((total, loss_dict))
    }

    fn total<B: Backend>(&self, terms: &LossTerms<B>) -> Tensor<B, 1> {
        terms.box_loss.clone().mul_scalar(self.lambda_coord)
            + terms.object_loss.clone()
            + terms.no_object_loss.clone().mul_scalar(self.lambda_noobj)
            + terms.class_loss.clone()
    }

    fn loss_terms<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Result<LossTerms<B>, GridDetectionLossError> {
        self.check_shapes(&predictions, &targets)?;

        let [batch_size, rows, cols, _] = predictions.dims();
        let c = self.num_classes;

        let pred_box1 = predictions
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, c + 1..c + 5]);
        let pred_box2 = predictions
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, c + 6..c + 10]);
        let target_box = targets
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, c + 1..c + 5]);

        let iou_slot1 = intersection_over_union(pred_box1.clone(), target_box.clone(), self.eps);
        let iou_slot2 = intersection_over_union(pred_box2.clone(), target_box.clone(), self.eps);

        // Slot 1 becomes responsible only on strictly higher overlap, so
        // ties always keep slot 0.
        let bestbox = iou_slot2.greater(iou_slot1).float();
        let other_slot = Tensor::ones_like(&bestbox) - bestbox.clone();

        let exists_box = targets
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, c..c + 1]);
        let no_object = Tensor::ones_like(&exists_box) - exists_box.clone();

        // Box coordinate term. The responsible slot's geometry is compared
        // against ground truth, with sizes mapped into square-root space. The
        // sign of raw network sizes is preserved through the square root.
        let box_predictions =
            exists_box.clone() * (bestbox.clone() * pred_box2 + other_slot.clone() * pred_box1);
        let box_targets = exists_box.clone() * target_box;

        let pred_xy = box_predictions
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, 0..2]);
        let pred_wh = box_predictions.slice([0..batch_size, 0..rows, 0..cols, 2..4]);
        let pred_wh = pred_wh.clone().sign() * pred_wh.abs().add_scalar(self.eps).sqrt();

        let target_xy = box_targets
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, 0..2]);
        let target_wh = box_targets
            .slice([0..batch_size, 0..rows, 0..cols, 2..4])
            .sqrt();

        let box_loss = (Tensor::cat(vec![pred_xy, pred_wh], 3)
            - Tensor::cat(vec![target_xy, target_wh], 3))
        .powi_scalar(2)
        .sum();

        // Object confidence term, attributed to the responsible slot.
        let pred_conf1 = predictions
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, c..c + 1]);
        let pred_conf2 = predictions
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, c + 5..c + 6]);
        let target_conf = targets
            .clone()
            .slice([0..batch_size, 0..rows, 0..cols, c..c + 1]);

        let pred_conf = bestbox * pred_conf2.clone() + other_slot * pred_conf1.clone();
        let object_loss = (exists_box.clone() * pred_conf
            - exists_box.clone() * target_conf.clone())
        .powi_scalar(2)
        .sum();

        // Empty cells push BOTH slots' confidences toward the target value,
        // regardless of which slot won the overlap comparison.
        let no_object_loss = (no_object.clone() * pred_conf1
            - no_object.clone() * target_conf.clone())
        .powi_scalar(2)
        .sum()
            + (no_object.clone() * pred_conf2 - no_object * target_conf)
                .powi_scalar(2)
                .sum();

        // Class term over cells that contain an object.
        let pred_classes = predictions.slice([0..batch_size, 0..rows, 0..cols, 0..c]);
        let target_classes = targets.slice([0..batch_size, 0..rows, 0..cols, 0..c]);
        let class_loss = (exists_box.clone() * pred_classes - exists_box * target_classes)
            .powi_scalar(2)
            .sum();

        Ok(LossTerms {
            box_loss,
            object_loss,
            no_object_loss,
            class_loss,
        })
    }

    fn check_shapes<B: Backend>(
        &self,
        predictions: &Tensor<B, 4>,
        targets: &Tensor<B, 4>,
    ) -> Result<(), GridDetectionLossError> {
        let pred_dims = predictions.dims();
        let target_dims = targets.dims();
        let depth = self.cell_depth();

        if pred_dims[1] != self.grid_size || pred_dims[2] != self.grid_size || pred_dims[3] != depth
        {
            return Err(GridDetectionLossError::DimensionMismatch {
                expected: format!(
                    "[batch_size, {}, {}, {}]",
                    self.grid_size, self.grid_size, depth
                ),
                actual: format!("{pred_dims:?}"),
            });
        }

        if pred_dims != target_dims {
            return Err(GridDetectionLossError::IncompatibleShapes {
                pred_shape: pred_dims.to_vec(),
                target_shape: target_dims.to_vec(),
            });
        }

        Ok(())
    }
}
