//! NCHW feature-map views and pooled output buffers.
//!
//! `FeatureView` is a borrowed 4-D view into a flat `f32` buffer laid out in
//! (batch, channel, row, column) order. Views are shape-checked at
//! construction; the kernels index them without further bounds checks.
//! `TileGrid` and `ArgmaxGrid` are the owned per-region outputs of the ROI
//! operators, with one fixed-size tile per region.

use crate::util::{DetOpsError, DetOpsResult};

/// Dimensions of a 4-D feature tensor in NCHW order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureShape {
    batch: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl FeatureShape {
    /// Creates a shape, rejecting zero dimensions and overflowing extents.
    pub fn new(
        batch: usize,
        channels: usize,
        height: usize,
        width: usize,
    ) -> DetOpsResult<Self> {
        let invalid = DetOpsError::InvalidDimensions {
            batch,
            channels,
            height,
            width,
        };
        if batch == 0 || channels == 0 || height == 0 || width == 0 {
            return Err(invalid);
        }
        batch
            .checked_mul(channels)
            .and_then(|v| v.checked_mul(height))
            .and_then(|v| v.checked_mul(width))
            .ok_or(invalid)?;
        Ok(Self {
            batch,
            channels,
            height,
            width,
        })
    }

    /// Number of images in the batch dimension.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Number of channels per image.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Feature-map height in rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Feature-map width in columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Total element count of the tensor.
    pub fn element_count(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    /// Elements in one (batch, channel) plane.
    pub(crate) fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// Flat offset of the start of one (batch, channel) plane.
    pub(crate) fn plane_offset(&self, n: usize, c: usize) -> usize {
        (n * self.channels + c) * self.plane_len()
    }
}

/// Borrowed, shape-checked view of an NCHW feature tensor.
#[derive(Clone, Copy)]
pub struct FeatureView<'a> {
    data: &'a [f32],
    shape: FeatureShape,
}

impl<'a> FeatureView<'a> {
    /// Wraps a flat buffer under a shape, rejecting short buffers.
    pub fn new(data: &'a [f32], shape: FeatureShape) -> DetOpsResult<Self> {
        let needed = shape.element_count();
        if data.len() < needed {
            return Err(DetOpsError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self { data, shape })
    }

    /// Returns the view's shape.
    pub fn shape(&self) -> FeatureShape {
        self.shape
    }

    /// Returns the backing slice.
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Contiguous (height * width) plane for one (batch, channel) pair.
    ///
    /// Callers guarantee `n` and `c` are in range.
    pub(crate) fn plane(&self, n: usize, c: usize) -> &'a [f32] {
        let start = self.shape.plane_offset(n, c);
        &self.data[start..start + self.shape.plane_len()]
    }
}

/// Owned per-region output tiles of shape (regions, channels, ph, pw).
///
/// Every region produces a tile of identical shape regardless of the
/// region's original size.
#[derive(Clone, Debug, PartialEq)]
pub struct TileGrid {
    data: Vec<f32>,
    regions: usize,
    channels: usize,
    pooled_h: usize,
    pooled_w: usize,
}

impl TileGrid {
    /// Allocates a grid with every element set to `value`.
    pub fn filled(
        value: f32,
        regions: usize,
        channels: usize,
        pooled_h: usize,
        pooled_w: usize,
    ) -> Self {
        Self {
            data: vec![value; regions * channels * pooled_h * pooled_w],
            regions,
            channels,
            pooled_h,
            pooled_w,
        }
    }

    /// Wraps an existing buffer, rejecting a length that does not match the
    /// declared dimensions. Used to hand upstream gradients to the backward
    /// kernels.
    pub fn from_vec(
        data: Vec<f32>,
        regions: usize,
        channels: usize,
        pooled_h: usize,
        pooled_w: usize,
    ) -> DetOpsResult<Self> {
        let needed = regions * channels * pooled_h * pooled_w;
        if data.len() != needed {
            return Err(DetOpsError::LengthMismatch {
                context: "tile grid buffer",
                expected: needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            regions,
            channels,
            pooled_h,
            pooled_w,
        })
    }

    /// Number of region tiles.
    pub fn regions(&self) -> usize {
        self.regions
    }

    /// Channels per tile.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Pooled tile height.
    pub fn pooled_h(&self) -> usize {
        self.pooled_h
    }

    /// Pooled tile width.
    pub fn pooled_w(&self) -> usize {
        self.pooled_w
    }

    /// Logical dimensions as (regions, channels, ph, pw).
    pub fn dims(&self) -> (usize, usize, usize, usize) {
        (self.regions, self.channels, self.pooled_h, self.pooled_w)
    }

    /// Returns the flat backing buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Element at (region, channel, py, px) if in range.
    pub fn get(&self, region: usize, channel: usize, py: usize, px: usize) -> Option<f32> {
        if region >= self.regions
            || channel >= self.channels
            || py >= self.pooled_h
            || px >= self.pooled_w
        {
            return None;
        }
        Some(self.data[self.index(region, channel, py, px)])
    }

    /// Elements in one region's tile.
    pub(crate) fn tile_len(&self) -> usize {
        self.channels * self.pooled_h * self.pooled_w
    }

    pub(crate) fn index(&self, region: usize, channel: usize, py: usize, px: usize) -> usize {
        ((region * self.channels + channel) * self.pooled_h + py) * self.pooled_w + px
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// Recorded argmax indices, one `i64` slot per output cell of a [`TileGrid`].
///
/// Each slot holds the flat `row * width + column` offset of the source cell
/// that produced the forward maximum within its (batch, channel) plane, or
/// `-1` for an output cell whose bin never saw a valid source value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgmaxGrid {
    data: Vec<i64>,
    regions: usize,
    channels: usize,
    pooled_h: usize,
    pooled_w: usize,
}

impl ArgmaxGrid {
    pub(crate) fn filled(
        value: i64,
        regions: usize,
        channels: usize,
        pooled_h: usize,
        pooled_w: usize,
    ) -> Self {
        Self {
            data: vec![value; regions * channels * pooled_h * pooled_w],
            regions,
            channels,
            pooled_h,
            pooled_w,
        }
    }

    /// Logical dimensions as (regions, channels, ph, pw).
    pub fn dims(&self) -> (usize, usize, usize, usize) {
        (self.regions, self.channels, self.pooled_h, self.pooled_w)
    }

    /// Returns the flat backing buffer.
    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }

    /// Recorded source index at (region, channel, py, px) if in range.
    pub fn get(&self, region: usize, channel: usize, py: usize, px: usize) -> Option<i64> {
        if region >= self.regions
            || channel >= self.channels
            || py >= self.pooled_h
            || px >= self.pooled_w
        {
            return None;
        }
        let idx = ((region * self.channels + channel) * self.pooled_h + py) * self.pooled_w + px;
        Some(self.data[idx])
    }

    pub(crate) fn tile_len(&self) -> usize {
        self.channels * self.pooled_h * self.pooled_w
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [i64] {
        &mut self.data
    }
}
