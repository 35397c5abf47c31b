//! Region-of-interest operators over NCHW feature maps.
//!
//! Both operators map a variable-sized rectangular region of one feature-map
//! slice into a fixed (channels, pooled_h, pooled_w) tile: `pool` by
//! max-pooling over quantized bins, `align` by averaging bilinear samples at
//! sub-pixel positions. Both provide backward passes that scatter-add
//! gradients into a caller-shaped feature-gradient buffer.

use crate::feature::{ArgmaxGrid, FeatureShape, TileGrid};
use crate::util::{DetOpsError, DetOpsResult};

pub mod align;
pub mod pool;
#[cfg(feature = "rayon")]
pub mod rayon;

/// Region descriptor: a rectangle in feature-map coordinate space plus the
/// index of the batch slice it selects.
///
/// Coordinates are pre-scale; the operators multiply them by their
/// `spatial_scale` argument to land in feature-map space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    /// Index into the feature map's batch dimension.
    pub batch: usize,
    /// Left edge of the region.
    pub x1: f32,
    /// Top edge of the region.
    pub y1: f32,
    /// Right edge of the region.
    pub x2: f32,
    /// Bottom edge of the region.
    pub y2: f32,
}

impl Region {
    /// Creates a region descriptor.
    pub fn new(batch: usize, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { batch, x1, y1, x2, y2 }
    }
}

/// Checks batch range and corner ordering for every region.
pub(crate) fn validate_regions(regions: &[Region], shape: FeatureShape) -> DetOpsResult<()> {
    for (i, r) in regions.iter().enumerate() {
        if r.batch >= shape.batch() {
            return Err(DetOpsError::BatchIndexOutOfRange {
                region: i,
                index: r.batch,
                len: shape.batch(),
            });
        }
        if r.x2 < r.x1 {
            return Err(DetOpsError::MalformedRegion {
                region: i,
                reason: "x2 < x1",
            });
        }
        if r.y2 < r.y1 {
            return Err(DetOpsError::MalformedRegion {
                region: i,
                reason: "y2 < y1",
            });
        }
    }
    Ok(())
}

pub(crate) fn validate_pooled(pooled_h: usize, pooled_w: usize) -> DetOpsResult<()> {
    if pooled_h == 0 || pooled_w == 0 {
        return Err(DetOpsError::EmptyPooledOutput { pooled_h, pooled_w });
    }
    Ok(())
}

pub(crate) fn validate_scale(spatial_scale: f32) -> DetOpsResult<()> {
    if spatial_scale <= 0.0 || !spatial_scale.is_finite() {
        return Err(DetOpsError::ParameterOutOfDomain {
            name: "spatial_scale",
            value: spatial_scale,
            reason: "must be finite and positive",
        });
    }
    Ok(())
}

/// Checks an upstream-gradient grid against the expected tile dimensions.
pub(crate) fn validate_grad_dims(
    grad: &TileGrid,
    regions: usize,
    shape: FeatureShape,
    pooled_h: usize,
    pooled_w: usize,
) -> DetOpsResult<()> {
    let expected = (regions, shape.channels(), pooled_h, pooled_w);
    if grad.dims() != expected {
        return Err(DetOpsError::LengthMismatch {
            context: "upstream gradient tiles",
            expected: expected.0 * expected.1 * expected.2 * expected.3,
            got: grad.as_slice().len(),
        });
    }
    Ok(())
}

/// Checks that a recorded argmax grid matches its gradient grid.
pub(crate) fn validate_argmax_dims(grad: &TileGrid, argmax: &ArgmaxGrid) -> DetOpsResult<()> {
    if grad.dims() != argmax.dims() {
        return Err(DetOpsError::LengthMismatch {
            context: "argmax grid vs gradient tiles",
            expected: grad.as_slice().len(),
            got: argmax.as_slice().len(),
        });
    }
    Ok(())
}
