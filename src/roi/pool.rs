//! ROI Pool: quantized max-pooling of feature-map regions.
//!
//! Region corners are rounded into the integer feature grid, the region is
//! split into a pooled_h x pooled_w grid of integer bins, and each output
//! cell takes the maximum feature value over its bin, recording the flat
//! plane index of the winning cell for the backward pass.
//!
//! Convention (pinned): corners map through `round(coord * scale)`, the
//! integer extent is inclusive and clamped to at least 1 cell, and bin `p`
//! spans `[floor(p * bin), ceil((p + 1) * bin))` shifted by the region start
//! and clamped to the feature extent. A bin whose clamped span is empty
//! yields `f32::MIN` with argmax `-1` and contributes nothing backward.

use crate::feature::{ArgmaxGrid, FeatureShape, FeatureView, TileGrid};
use crate::roi::{
    validate_argmax_dims, validate_grad_dims, validate_pooled, validate_regions, validate_scale,
    Region,
};
use crate::trace::{trace_event, trace_span};
use crate::util::{DetOpsError, DetOpsResult};

/// Max-pools every region into a fixed-size tile.
///
/// Returns the pooled tiles and the recorded argmax indices consumed by
/// [`roi_pool_backward`].
pub fn roi_pool_forward(
    features: FeatureView<'_>,
    regions: &[Region],
    spatial_scale: f32,
    pooled_h: usize,
    pooled_w: usize,
) -> DetOpsResult<(TileGrid, ArgmaxGrid)> {
    let shape = features.shape();
    validate_scale(spatial_scale)?;
    validate_pooled(pooled_h, pooled_w)?;
    validate_regions(regions, shape)?;
    let _span = trace_span!("roi_pool_forward", regions = regions.len()).entered();

    let mut tiles = TileGrid::filled(
        f32::MIN,
        regions.len(),
        shape.channels(),
        pooled_h,
        pooled_w,
    );
    let mut argmax = ArgmaxGrid::filled(-1, regions.len(), shape.channels(), pooled_h, pooled_w);
    let tile_len = tiles.tile_len();

    for (r, region) in regions.iter().enumerate() {
        let out = &mut tiles.as_mut_slice()[r * tile_len..(r + 1) * tile_len];
        let arg = &mut argmax.as_mut_slice()[r * tile_len..(r + 1) * tile_len];
        pool_region(features, region, spatial_scale, pooled_h, pooled_w, out, arg);
    }

    trace_event!("roi_pool_tiles", count = regions.len());
    Ok((tiles, argmax))
}

/// Scatter-adds upstream tile gradients back to the feature map.
///
/// Each output cell routes its gradient to the source cell recorded in
/// `argmax`; cells marked `-1` (empty bins) contribute nothing. Multiple
/// output cells pointing at the same source cell accumulate.
pub fn roi_pool_backward(
    grad_output: &TileGrid,
    argmax: &ArgmaxGrid,
    regions: &[Region],
    shape: FeatureShape,
) -> DetOpsResult<Vec<f32>> {
    validate_backward_inputs(grad_output, argmax, regions, shape)?;
    let _span = trace_span!("roi_pool_backward", regions = regions.len()).entered();

    let mut grad_features = vec![0.0f32; shape.element_count()];
    for (r, region) in regions.iter().enumerate() {
        scatter_region(grad_output, argmax, r, region, shape, &mut grad_features);
    }
    Ok(grad_features)
}

pub(crate) fn validate_backward_inputs(
    grad_output: &TileGrid,
    argmax: &ArgmaxGrid,
    regions: &[Region],
    shape: FeatureShape,
) -> DetOpsResult<()> {
    validate_argmax_dims(grad_output, argmax)?;
    validate_grad_dims(
        grad_output,
        regions.len(),
        shape,
        grad_output.pooled_h(),
        grad_output.pooled_w(),
    )?;
    validate_regions(regions, shape)?;
    // Recorded indices must address the given feature plane; a violation
    // means the argmax came from a forward pass over a different shape.
    let plane_len = shape.plane_len() as i64;
    if let Some(&worst) = argmax.as_slice().iter().max() {
        if worst >= plane_len {
            return Err(DetOpsError::LengthMismatch {
                context: "argmax indices vs feature plane",
                expected: plane_len as usize,
                got: worst as usize + 1,
            });
        }
    }
    Ok(())
}

/// Pools one region into its `channels * pooled_h * pooled_w` output slice.
pub(crate) fn pool_region(
    features: FeatureView<'_>,
    region: &Region,
    spatial_scale: f32,
    pooled_h: usize,
    pooled_w: usize,
    out: &mut [f32],
    argmax: &mut [i64],
) {
    let shape = features.shape();
    let height = shape.height() as isize;
    let width = shape.width() as isize;

    let x1 = (region.x1 * spatial_scale).round() as isize;
    let y1 = (region.y1 * spatial_scale).round() as isize;
    let x2 = (region.x2 * spatial_scale).round() as isize;
    let y2 = (region.y2 * spatial_scale).round() as isize;

    // Inclusive integer extent, never below one cell.
    let region_h = (y2 - y1 + 1).max(1) as f32;
    let region_w = (x2 - x1 + 1).max(1) as f32;
    let bin_h = region_h / pooled_h as f32;
    let bin_w = region_w / pooled_w as f32;

    let rows: Vec<(usize, usize)> = (0..pooled_h)
        .map(|py| bin_span(py, bin_h, y1, height))
        .collect();
    let cols: Vec<(usize, usize)> = (0..pooled_w)
        .map(|px| bin_span(px, bin_w, x1, width))
        .collect();

    let w = shape.width();
    for c in 0..shape.channels() {
        let plane = features.plane(region.batch, c);
        for (py, &(y_lo, y_hi)) in rows.iter().enumerate() {
            for (px, &(x_lo, x_hi)) in cols.iter().enumerate() {
                let mut max_val = f32::MIN;
                let mut max_idx = -1i64;
                for y in y_lo..y_hi {
                    for x in x_lo..x_hi {
                        let v = plane[y * w + x];
                        if max_idx < 0 || v > max_val {
                            max_val = v;
                            max_idx = (y * w + x) as i64;
                        }
                    }
                }
                let cell = (c * pooled_h + py) * pooled_w + px;
                out[cell] = max_val;
                argmax[cell] = max_idx;
            }
        }
    }
}

/// Scatter-adds one region's tile gradients into the feature gradient.
pub(crate) fn scatter_region(
    grad_output: &TileGrid,
    argmax: &ArgmaxGrid,
    region_idx: usize,
    region: &Region,
    shape: FeatureShape,
    grad_features: &mut [f32],
) {
    let grad = grad_output.as_slice();
    let arg = argmax.as_slice();
    for c in 0..grad_output.channels() {
        let base = shape.plane_offset(region.batch, c);
        for py in 0..grad_output.pooled_h() {
            for px in 0..grad_output.pooled_w() {
                let cell = grad_output.index(region_idx, c, py, px);
                let src = arg[cell];
                if src >= 0 {
                    grad_features[base + src as usize] += grad[cell];
                }
            }
        }
    }
}

/// Clamped source span of one pooled bin along one axis.
fn bin_span(p: usize, bin: f32, start: isize, extent: isize) -> (usize, usize) {
    let lo = (p as f32 * bin).floor() as isize + start;
    let hi = ((p + 1) as f32 * bin).ceil() as isize + start;
    (
        lo.clamp(0, extent) as usize,
        hi.clamp(0, extent) as usize,
    )
}
