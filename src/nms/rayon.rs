//! Rayon-parallel NMS (feature-gated).
//!
//! The pairwise suppression decisions are independent, so the mask of
//! "candidate i would suppress candidate j" bits is computed row-parallel.
//! Only the final keep/drop reduction is sequential: later decisions depend
//! on which earlier candidates were kept, so it walks the sorted order once,
//! ORing the mask rows of kept candidates into an accumulated bitmap.

use crate::boxes::{iou, sort_indices_desc, BBox};
use crate::nms::validate_inputs;
use crate::trace::{trace_event, trace_span};
use crate::util::DetOpsResult;
use rayon::prelude::*;

const BLOCK_BITS: usize = u64::BITS as usize;

/// Parallel twin of [`crate::nms`]; returns exactly the sequential result.
pub fn nms_par(boxes: &[BBox], scores: &[f32], iou_threshold: f32) -> DetOpsResult<Vec<usize>> {
    validate_inputs(boxes, scores, iou_threshold)?;
    let _span = trace_span!("nms", boxes = boxes.len(), parallel = true).entered();

    let n = boxes.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let order = sort_indices_desc(scores);
    let blocks = n.div_ceil(BLOCK_BITS);

    // Row i: bitmask over sorted positions j > i that candidate i suppresses.
    let mask_rows: Vec<Vec<u64>> = (0..n)
        .into_par_iter()
        .map(|pos| {
            let candidate = boxes[order[pos]];
            let mut row = vec![0u64; blocks];
            for (later, &idx) in order.iter().enumerate().skip(pos + 1) {
                if iou(&candidate, &boxes[idx]) > iou_threshold {
                    row[later / BLOCK_BITS] |= 1u64 << (later % BLOCK_BITS);
                }
            }
            row
        })
        .collect();

    // Sequential reduction in score order.
    let mut removed = vec![0u64; blocks];
    let mut keep = Vec::new();
    for (pos, &idx) in order.iter().enumerate() {
        if removed[pos / BLOCK_BITS] >> (pos % BLOCK_BITS) & 1 == 1 {
            continue;
        }
        keep.push(idx);
        for (acc, row) in removed.iter_mut().zip(&mask_rows[pos]) {
            *acc |= row;
        }
    }

    trace_event!("nms_survivors", count = keep.len());
    Ok(keep)
}
