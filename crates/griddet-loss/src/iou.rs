//! Intersection over Union (IoU) for center-encoded boxes.
//!
//! Boxes are given as `(x, y, w, h)` in the last tensor dimension, where
//! `(x, y)` is the box center and `(w, h)` its size. The overlap ratio is
//! computed elementwise over arbitrarily shaped box batches:
//!
//! ```text
//! IoU = intersection / (union + eps)
//! ```

use burn::tensor::{backend::Backend, Tensor};

/// Compute the Intersection over Union between two batches of boxes.
///
/// Both inputs carry `(x, y, w, h)` center-encoded boxes in their last
/// dimension; the result replaces that dimension with a single IoU channel.
/// The per-axis overlap is clamped to zero before the areas are combined, the
/// union is padded with `eps` against division by zero, and the final ratio
/// is clamped to be non-negative. Areas are taken as absolute values so a
/// degenerate box with negative raw size cannot produce a negative union.
///
/// # Shapes
///
/// - boxes_a: `[..., 4]`
/// - boxes_b: `[..., 4]`
/// - output: `[..., 1]`
///
/// # Panics
///
/// Panics if the shapes differ, the last dimension is not 4, or `eps` is not
/// positive.
pub fn intersection_over_union<B: Backend, const D: usize>(
    boxes_a: Tensor<B, D>,
    boxes_b: Tensor<B, D>,
    eps: f64,
) -> Tensor<B, D> {
    let dims_a = boxes_a.dims();
    let dims_b = boxes_b.dims();
    assert_eq!(
        dims_a, dims_b,
        "Shape of boxes_a ({dims_a:?}) must match boxes_b ({dims_b:?})"
    );
    assert_eq!(
        dims_a[D - 1],
        4,
        "Boxes must carry (x, y, w, h) in the last dimension, got {} channels",
        dims_a[D - 1]
    );
    assert!(eps > 0.0, "Epsilon for IoU must be positive, got {eps}");

    let axis = D - 1;

    let ax = boxes_a.clone().narrow(axis, 0, 1);
    let ay = boxes_a.clone().narrow(axis, 1, 1);
    let aw = boxes_a.clone().narrow(axis, 2, 1);
    let ah = boxes_a.narrow(axis, 3, 1);

    let bx = boxes_b.clone().narrow(axis, 0, 1);
    let by = boxes_b.clone().narrow(axis, 1, 1);
    let bw = boxes_b.clone().narrow(axis, 2, 1);
    let bh = boxes_b.narrow(axis, 3, 1);

    // Corner form: (x1, y1) top-left, (x2, y2) bottom-right.
    let a_x1 = ax.clone() - aw.clone().div_scalar(2.0);
    let a_x2 = ax + aw.div_scalar(2.0);
    let a_y1 = ay.clone() - ah.clone().div_scalar(2.0);
    let a_y2 = ay + ah.div_scalar(2.0);

    let b_x1 = bx.clone() - bw.clone().div_scalar(2.0);
    let b_x2 = bx + bw.div_scalar(2.0);
    let b_y1 = by.clone() - bh.clone().div_scalar(2.0);
    let b_y2 = by + bh.div_scalar(2.0);

    let overlap_x = (a_x2.clone().min_pair(b_x2.clone()) - a_x1.clone().max_pair(b_x1.clone()))
        .clamp_min(0.0);
    let overlap_y = (a_y2.clone().min_pair(b_y2.clone()) - a_y1.clone().max_pair(b_y1.clone()))
        .clamp_min(0.0);
    let intersection = overlap_x * overlap_y;

    let area_a = ((a_x2 - a_x1) * (a_y2 - a_y1)).abs();
    let area_b = ((b_x2 - b_x1) * (b_y2 - b_y1)).abs();
    let union = area_a + area_b - intersection.clone();

    (intersection / union.add_scalar(eps)).clamp_min(0.0)
}
