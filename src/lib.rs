//! detops is a CPU-first library of detection primitive kernels.
//!
//! This crate packages the three numeric operators used inside
//! object-detection inference pipelines: non-maximum suppression of scored
//! candidate boxes, ROI Pool (quantized max-pooling of feature-map regions
//! into fixed-size tiles, with an argmax side-channel and a scatter-add
//! backward pass), and ROI Align (sub-pixel bilinear average pooling with an
//! analytic backward pass). All kernels are pure, stateless transforms over
//! caller-owned flat buffers, with optional parallelism via the `rayon`
//! feature.

pub mod boxes;
pub mod feature;
pub mod nms;
pub mod roi;
mod trace;
pub mod util;

pub use boxes::{iou, BBox};
pub use feature::{ArgmaxGrid, FeatureShape, FeatureView, TileGrid};
pub use nms::{nms, nms_batched, soft_nms, SoftNmsMethod};
pub use roi::align::{roi_align_backward, roi_align_forward};
pub use roi::pool::{roi_pool_backward, roi_pool_forward};
pub use roi::Region;
pub use util::{DetOpsError, DetOpsResult};

#[cfg(feature = "rayon")]
pub use nms::rayon::nms_par;
#[cfg(feature = "rayon")]
pub use roi::rayon::{
    roi_align_backward_par, roi_align_forward_par, roi_pool_backward_par, roi_pool_forward_par,
};
