//! Rayon-parallel ROI operators (feature-gated).
//!
//! Forward passes parallelize over regions: every region owns a disjoint
//! slice of the output grid, so no synchronization is needed. Backward
//! passes contend on the shared feature-gradient buffer instead; they use
//! per-thread partial buffers merged by an element-wise reduction, so the
//! accumulated value is a plain sum of contributions no matter how work was
//! interleaved.

use crate::feature::{ArgmaxGrid, FeatureShape, FeatureView, TileGrid};
use crate::roi::align::{align_region, align_region_backward};
use crate::roi::pool::{pool_region, scatter_region, validate_backward_inputs};
use crate::roi::{validate_grad_dims, validate_pooled, validate_regions, validate_scale, Region};
use crate::trace::{trace_event, trace_span};
use crate::util::DetOpsResult;
use rayon::prelude::*;

/// Parallel twin of [`crate::roi_pool_forward`]; bit-identical output.
pub fn roi_pool_forward_par(
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
    let _span = trace_span!("roi_pool_forward", regions = regions.len(), parallel = true).entered();

    let mut tiles = TileGrid::filled(
        f32::MIN,
        regions.len(),
        shape.channels(),
        pooled_h,
        pooled_w,
    );
    let mut argmax = ArgmaxGrid::filled(-1, regions.len(), shape.channels(), pooled_h, pooled_w);
    let tile_len = tiles.tile_len();
    let arg_len = argmax.tile_len();

    tiles
        .as_mut_slice()
        .par_chunks_mut(tile_len)
        .zip(argmax.as_mut_slice().par_chunks_mut(arg_len))
        .zip(regions.par_iter())
        .for_each(|((out, arg), region)| {
            pool_region(features, region, spatial_scale, pooled_h, pooled_w, out, arg);
        });

    trace_event!("roi_pool_tiles", count = regions.len());
    Ok((tiles, argmax))
}

/// Parallel twin of [`crate::roi_pool_backward`].
///
/// Scatter-adds run into per-thread partial buffers that are merged
/// element-wise afterwards, the race-free fallback for targets without a
/// native atomic float add.
pub fn roi_pool_backward_par(
    grad_output: &TileGrid,
    argmax: &ArgmaxGrid,
    regions: &[Region],
    shape: FeatureShape,
) -> DetOpsResult<Vec<f32>> {
    validate_backward_inputs(grad_output, argmax, regions, shape)?;
    let _span =
        trace_span!("roi_pool_backward", regions = regions.len(), parallel = true).entered();

    let len = shape.element_count();
    let grad_features = regions
        .par_iter()
        .enumerate()
        .fold(
            || vec![0.0f32; len],
            |mut acc, (r, region)| {
                scatter_region(grad_output, argmax, r, region, shape, &mut acc);
                acc
            },
        )
        .reduce(|| vec![0.0f32; len], merge_partials);
    Ok(grad_features)
}

/// Parallel twin of [`crate::roi_align_forward`]; bit-identical output.
pub fn roi_align_forward_par(
    features: FeatureView<'_>,
    regions: &[Region],
    spatial_scale: f32,
    pooled_h: usize,
    pooled_w: usize,
    samples_per_bin: u32,
) -> DetOpsResult<TileGrid> {
    let shape = features.shape();
    validate_scale(spatial_scale)?;
    validate_pooled(pooled_h, pooled_w)?;
    validate_regions(regions, shape)?;
    let _span =
        trace_span!("roi_align_forward", regions = regions.len(), parallel = true).entered();

    let mut tiles = TileGrid::filled(0.0, regions.len(), shape.channels(), pooled_h, pooled_w);
    let tile_len = tiles.tile_len();

    tiles
        .as_mut_slice()
        .par_chunks_mut(tile_len)
        .zip(regions.par_iter())
        .for_each(|(out, region)| {
            align_region(
                features,
                region,
                spatial_scale,
                pooled_h,
                pooled_w,
                samples_per_bin,
                out,
            );
        });

    trace_event!("roi_align_tiles", count = regions.len());
    Ok(tiles)
}

/// Parallel twin of [`crate::roi_align_backward`], using the same
/// per-thread partial-buffer reduction as the pool backward.
pub fn roi_align_backward_par(
    grad_output: &TileGrid,
    regions: &[Region],
    spatial_scale: f32,
    pooled_h: usize,
    pooled_w: usize,
    samples_per_bin: u32,
    shape: FeatureShape,
) -> DetOpsResult<Vec<f32>> {
    validate_scale(spatial_scale)?;
    validate_pooled(pooled_h, pooled_w)?;
    validate_regions(regions, shape)?;
    validate_grad_dims(grad_output, regions.len(), shape, pooled_h, pooled_w)?;
    let _span =
        trace_span!("roi_align_backward", regions = regions.len(), parallel = true).entered();

    let len = shape.element_count();
    let tile_len = grad_output.tile_len();
    let grad_features = regions
        .par_iter()
        .enumerate()
        .fold(
            || vec![0.0f32; len],
            |mut acc, (r, region)| {
                let grad_tile = &grad_output.as_slice()[r * tile_len..(r + 1) * tile_len];
                align_region_backward(
                    grad_tile,
                    region,
                    spatial_scale,
                    pooled_h,
                    pooled_w,
                    samples_per_bin,
                    shape,
                    &mut acc,
                );
                acc
            },
        )
        .reduce(|| vec![0.0f32; len], merge_partials);
    Ok(grad_features)
}

fn merge_partials(mut into: Vec<f32>, from: Vec<f32>) -> Vec<f32> {
    for (dst, src) in into.iter_mut().zip(from) {
        *dst += src;
    }
    into
}
