//! ROI Align: sub-pixel average pooling via bilinear sampling.
//!
//! Coordinates stay real-valued throughout: the scaled region is split into
//! pooled_h x pooled_w bins of fractional extent, each bin is evaluated at a
//! small grid of evenly spaced sample points by bilinear interpolation
//! against the four surrounding feature cells, and the bin output is the
//! sample mean. The backward pass pushes each output gradient, divided by
//! the sample count, through the same bilinear weights, so forward and
//! backward agree by construction.

use crate::feature::{FeatureShape, FeatureView, TileGrid};
use crate::roi::{validate_grad_dims, validate_pooled, validate_regions, validate_scale, Region};
use crate::trace::{trace_event, trace_span};
use crate::util::DetOpsResult;

/// Average-pools every region into a fixed-size tile by bilinear sampling.
///
/// `samples_per_bin` is the per-axis sample count inside each bin; `0`
/// selects an adaptive count of `ceil(region_extent / pooled_extent)` per
/// axis. Samples outside the feature map contribute zero.
pub fn roi_align_forward(
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
    let _span = trace_span!("roi_align_forward", regions = regions.len()).entered();

    let mut tiles = TileGrid::filled(0.0, regions.len(), shape.channels(), pooled_h, pooled_w);
    let tile_len = tiles.tile_len();

    for (r, region) in regions.iter().enumerate() {
        let out = &mut tiles.as_mut_slice()[r * tile_len..(r + 1) * tile_len];
        align_region(
            features,
            region,
            spatial_scale,
            pooled_h,
            pooled_w,
            samples_per_bin,
            out,
        );
    }

    trace_event!("roi_align_tiles", count = regions.len());
    Ok(tiles)
}

/// Distributes upstream tile gradients back to the feature map.
///
/// The derivative of each bilinear sample with respect to its four source
/// cells is exactly the forward interpolation weight, so each output cell's
/// gradient is divided by the sample count and scatter-added through those
/// weights, accumulating across all regions and bins.
pub fn roi_align_backward(
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
    let _span = trace_span!("roi_align_backward", regions = regions.len()).entered();

    let mut grad_features = vec![0.0f32; shape.element_count()];
    let tile_len = grad_output.tile_len();
    for (r, region) in regions.iter().enumerate() {
        let grad_tile = &grad_output.as_slice()[r * tile_len..(r + 1) * tile_len];
        align_region_backward(
            grad_tile,
            region,
            spatial_scale,
            pooled_h,
            pooled_w,
            samples_per_bin,
            shape,
            &mut grad_features,
        );
    }
    Ok(grad_features)
}

/// Bin geometry shared by the forward and backward passes.
struct BinLayout {
    y1: f32,
    x1: f32,
    bin_h: f32,
    bin_w: f32,
    grid_h: usize,
    grid_w: usize,
    count: f32,
}

impl BinLayout {
    fn new(
        region: &Region,
        spatial_scale: f32,
        pooled_h: usize,
        pooled_w: usize,
        samples_per_bin: u32,
    ) -> Self {
        let x1 = region.x1 * spatial_scale;
        let y1 = region.y1 * spatial_scale;
        let region_w = (region.x2 * spatial_scale - x1).max(0.0);
        let region_h = (region.y2 * spatial_scale - y1).max(0.0);
        let bin_h = region_h / pooled_h as f32;
        let bin_w = region_w / pooled_w as f32;
        let (grid_h, grid_w) = if samples_per_bin > 0 {
            (samples_per_bin as usize, samples_per_bin as usize)
        } else {
            (
                (region_h / pooled_h as f32).ceil().max(1.0) as usize,
                (region_w / pooled_w as f32).ceil().max(1.0) as usize,
            )
        };
        Self {
            y1,
            x1,
            bin_h,
            bin_w,
            grid_h,
            grid_w,
            count: (grid_h * grid_w) as f32,
        }
    }

    fn sample_y(&self, py: usize, iy: usize) -> f32 {
        self.y1 + py as f32 * self.bin_h + (iy as f32 + 0.5) * self.bin_h / self.grid_h as f32
    }

    fn sample_x(&self, px: usize, ix: usize) -> f32 {
        self.x1 + px as f32 * self.bin_w + (ix as f32 + 0.5) * self.bin_w / self.grid_w as f32
    }
}

/// Four source-cell indices and bilinear weights of one sample point.
pub(crate) struct BilinearSample {
    pub idx: [usize; 4],
    pub w: [f32; 4],
}

/// Bilinear neighborhood of the point `(y, x)` in an `height x width` plane.
///
/// Returns `None` when the point lies outside the valid window
/// (`y < -1`, `y > height`, likewise for `x`), in which case the sample
/// contributes zero. In-bounds weights always sum to 1: coordinates clamp
/// to zero from below, and at the high edge the two neighbors collapse onto
/// the border cell with the fractional offset forced to zero.
pub(crate) fn bilinear_sample(
    height: usize,
    width: usize,
    y: f32,
    x: f32,
) -> Option<BilinearSample> {
    if y < -1.0 || y > height as f32 || x < -1.0 || x > width as f32 {
        return None;
    }
    let y = y.max(0.0);
    let x = x.max(0.0);

    let mut y_low = y as usize;
    let mut x_low = x as usize;
    let (y_high, ly);
    if y_low >= height - 1 {
        y_low = height - 1;
        y_high = height - 1;
        ly = 0.0;
    } else {
        y_high = y_low + 1;
        ly = y - y_low as f32;
    }
    let (x_high, lx);
    if x_low >= width - 1 {
        x_low = width - 1;
        x_high = width - 1;
        lx = 0.0;
    } else {
        x_high = x_low + 1;
        lx = x - x_low as f32;
    }
    let hy = 1.0 - ly;
    let hx = 1.0 - lx;

    Some(BilinearSample {
        idx: [
            y_low * width + x_low,
            y_low * width + x_high,
            y_high * width + x_low,
            y_high * width + x_high,
        ],
        w: [hy * hx, hy * lx, ly * hx, ly * lx],
    })
}

/// Pools one region into its `channels * pooled_h * pooled_w` output slice.
pub(crate) fn align_region(
    features: FeatureView<'_>,
    region: &Region,
    spatial_scale: f32,
    pooled_h: usize,
    pooled_w: usize,
    samples_per_bin: u32,
    out: &mut [f32],
) {
    let shape = features.shape();
    let height = shape.height();
    let width = shape.width();
    let layout = BinLayout::new(region, spatial_scale, pooled_h, pooled_w, samples_per_bin);

    for c in 0..shape.channels() {
        let plane = features.plane(region.batch, c);
        for py in 0..pooled_h {
            for px in 0..pooled_w {
                let mut acc = 0.0f32;
                for iy in 0..layout.grid_h {
                    let sy = layout.sample_y(py, iy);
                    for ix in 0..layout.grid_w {
                        let sx = layout.sample_x(px, ix);
                        if let Some(s) = bilinear_sample(height, width, sy, sx) {
                            acc += s.w[0] * plane[s.idx[0]]
                                + s.w[1] * plane[s.idx[1]]
                                + s.w[2] * plane[s.idx[2]]
                                + s.w[3] * plane[s.idx[3]];
                        }
                    }
                }
                out[(c * pooled_h + py) * pooled_w + px] = acc / layout.count;
            }
        }
    }
}

/// Scatter-adds one region's tile gradients into the feature gradient.
#[allow(clippy::too_many_arguments)]
pub(crate) fn align_region_backward(
    grad_tile: &[f32],
    region: &Region,
    spatial_scale: f32,
    pooled_h: usize,
    pooled_w: usize,
    samples_per_bin: u32,
    shape: FeatureShape,
    grad_features: &mut [f32],
) {
    let height = shape.height();
    let width = shape.width();
    let layout = BinLayout::new(region, spatial_scale, pooled_h, pooled_w, samples_per_bin);

    for c in 0..shape.channels() {
        let base = shape.plane_offset(region.batch, c);
        for py in 0..pooled_h {
            for px in 0..pooled_w {
                let g = grad_tile[(c * pooled_h + py) * pooled_w + px] / layout.count;
                for iy in 0..layout.grid_h {
                    let sy = layout.sample_y(py, iy);
                    for ix in 0..layout.grid_w {
                        let sx = layout.sample_x(px, ix);
                        if let Some(s) = bilinear_sample(height, width, sy, sx) {
                            for k in 0..4 {
                                grad_features[base + s.idx[k]] += g * s.w[k];
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::bilinear_sample;

    #[test]
    fn in_bounds_weights_sum_to_one() {
        for &(y, x) in &[(0.3f32, 0.7f32), (1.5, 2.9), (3.99, 0.01), (-0.5, -0.9)] {
            let s = bilinear_sample(4, 4, y, x).unwrap();
            let sum: f32 = s.w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "weights at ({y}, {x}) sum to {sum}");
        }
    }

    #[test]
    fn out_of_window_points_yield_no_sample() {
        assert!(bilinear_sample(4, 4, -1.5, 0.0).is_none());
        assert!(bilinear_sample(4, 4, 0.0, 4.1).is_none());
        assert!(bilinear_sample(4, 4, 5.0, 5.0).is_none());
    }

    #[test]
    fn high_edge_collapses_onto_the_border_cell() {
        // y = height exactly is still in the window and clamps to row 3.
        let s = bilinear_sample(4, 4, 4.0, 1.5).unwrap();
        assert_eq!(s.idx[0], 3 * 4 + 1);
        assert_eq!(s.idx[2], 3 * 4 + 1);
        let sum: f32 = s.w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn interpolation_matches_hand_computed_value() {
        // Plane value v(y, x) = 4y + x; bilinear of a linear field is exact.
        let plane: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let s = bilinear_sample(4, 4, 1.25, 2.5).unwrap();
        let v: f32 = (0..4).map(|k| s.w[k] * plane[s.idx[k]]).sum();
        assert!((v - (4.0 * 1.25 + 2.5)).abs() < 1e-5);
    }
}
