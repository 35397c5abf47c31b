//! Error types for detops.

use thiserror::Error;

/// Result alias for detops operations.
pub type DetOpsResult<T> = std::result::Result<T, DetOpsError>;

/// Errors that can occur when running detops kernels.
///
/// All kernels are pure functions: every variant reports a caller
/// programming error, surfaced before any output is produced. Nothing is
/// retried and there is no partial-success mode.
#[derive(Debug, Error, PartialEq)]
pub enum DetOpsError {
    /// Two index-aligned inputs have different lengths.
    #[error("length mismatch for {context}: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    /// A tensor dimension is zero.
    #[error("invalid feature dimensions: {batch}x{channels}x{height}x{width}")]
    InvalidDimensions {
        batch: usize,
        channels: usize,
        height: usize,
        width: usize,
    },
    /// A backing buffer is shorter than its declared shape requires.
    #[error("buffer too small: needed {needed} elements, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A region descriptor references an image outside the batch dimension.
    #[error("region {region} references batch {index}, feature map has {len} images")]
    BatchIndexOutOfRange {
        region: usize,
        index: usize,
        len: usize,
    },
    /// A region descriptor violates the corner ordering invariant.
    #[error("region {region} is malformed: {reason}")]
    MalformedRegion {
        region: usize,
        reason: &'static str,
    },
    /// A scalar parameter lies outside its valid domain.
    #[error("{name} out of domain: {value} ({reason})")]
    ParameterOutOfDomain {
        name: &'static str,
        value: f32,
        reason: &'static str,
    },
    /// The requested pooled output has a zero dimension.
    #[error("pooled output must be non-empty, got {pooled_h}x{pooled_w}")]
    EmptyPooledOutput { pooled_h: usize, pooled_w: usize },
}
