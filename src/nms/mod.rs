//! Non-maximum suppression over scored candidate boxes.
//!
//! All variants consume an index-aligned pair of box and score slices and
//! operate in a deterministic descending-score order (ties broken by
//! original index). The input set is assumed to be scoped to a single
//! image; [`nms_batched`] offers the coordinate-offset technique for
//! running one pass over boxes from several images.

use crate::boxes::{iou, sort_indices_desc, BBox};
use crate::trace::{trace_event, trace_span};
use crate::util::{DetOpsError, DetOpsResult};

#[cfg(feature = "rayon")]
pub mod rayon;

/// Hard non-maximum suppression.
///
/// Walks candidates in descending score order; each not-yet-suppressed
/// candidate is kept and suppresses every later candidate whose IoU with it
/// strictly exceeds `iou_threshold`. Returns surviving original indices
/// ordered by descending score.
///
/// A threshold of 0 lets any positive overlap suppress; a threshold of 1
/// suppresses nothing, since IoU never exceeds 1.
pub fn nms(boxes: &[BBox], scores: &[f32], iou_threshold: f32) -> DetOpsResult<Vec<usize>> {
    validate_inputs(boxes, scores, iou_threshold)?;
    let _span = trace_span!("nms", boxes = boxes.len()).entered();

    let n = boxes.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let order = sort_indices_desc(scores);
    let mut suppressed = vec![false; n];
    let mut keep = Vec::new();

    for (pos, &idx) in order.iter().enumerate() {
        if suppressed[idx] {
            continue;
        }
        keep.push(idx);
        let kept_box = boxes[idx];
        for &later in &order[pos + 1..] {
            if suppressed[later] {
                continue;
            }
            if iou(&kept_box, &boxes[later]) > iou_threshold {
                suppressed[later] = true;
            }
        }
    }

    trace_event!("nms_survivors", count = keep.len());
    Ok(keep)
}

/// Score-decay strategy for [`soft_nms`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoftNmsMethod {
    /// Multiply overlapping scores by `1 - iou` when IoU exceeds the
    /// threshold.
    Linear,
    /// Multiply every overlapping score by `exp(-iou^2 / sigma)`.
    Gaussian,
}

/// Soft non-maximum suppression.
///
/// Instead of discarding overlapping boxes outright, decays their scores by
/// the chosen method, repeatedly selecting the highest currently-scored
/// remaining box. Selection stops once the best remaining decayed score
/// falls below `score_threshold`. Returns the kept original indices in
/// selection order together with their final (possibly decayed) scores.
pub fn soft_nms(
    boxes: &[BBox],
    scores: &[f32],
    method: SoftNmsMethod,
    sigma: f32,
    iou_threshold: f32,
    score_threshold: f32,
) -> DetOpsResult<(Vec<usize>, Vec<f32>)> {
    validate_inputs(boxes, scores, iou_threshold)?;
    if sigma <= 0.0 || !sigma.is_finite() {
        return Err(DetOpsError::ParameterOutOfDomain {
            name: "sigma",
            value: sigma,
            reason: "must be finite and positive",
        });
    }
    let _span = trace_span!("soft_nms", boxes = boxes.len()).entered();

    let n = boxes.len();
    let mut updated = scores.to_vec();
    let mut order: Vec<usize> = (0..n).collect();
    let mut keep = Vec::new();
    let mut kept_scores = Vec::new();

    for pos in 0..n {
        // Select the best remaining candidate under the decayed scores.
        let mut best = pos;
        for later in pos + 1..n {
            let (a, b) = (order[later], order[best]);
            if updated[a]
                .total_cmp(&updated[b])
                .then_with(|| b.cmp(&a))
                .is_gt()
            {
                best = later;
            }
        }
        order.swap(pos, best);
        let current = order[pos];
        let current_score = updated[current];
        if current_score < score_threshold {
            break;
        }
        keep.push(current);
        kept_scores.push(current_score);

        let current_box = boxes[current];
        for &later in &order[pos + 1..] {
            let overlap = iou(&current_box, &boxes[later]);
            if overlap <= 0.0 {
                continue;
            }
            match method {
                SoftNmsMethod::Linear => {
                    if overlap > iou_threshold {
                        updated[later] *= 1.0 - overlap;
                    }
                }
                SoftNmsMethod::Gaussian => {
                    updated[later] *= (-overlap * overlap / sigma).exp();
                }
            }
        }
    }

    trace_event!("soft_nms_survivors", count = keep.len());
    Ok((keep, kept_scores))
}

/// Hard NMS over boxes drawn from several images of a batch.
///
/// Shifts each box by `batch_id * span` on both axes, where `span` exceeds
/// the total coordinate extent of the input set, so boxes from different
/// images can never overlap; a single [`nms`] pass then runs over the whole
/// set. Equivalent to per-image suppression, in one call.
pub fn nms_batched(
    boxes: &[BBox],
    scores: &[f32],
    batch_ids: &[usize],
    iou_threshold: f32,
) -> DetOpsResult<Vec<usize>> {
    validate_inputs(boxes, scores, iou_threshold)?;
    if batch_ids.len() != boxes.len() {
        return Err(DetOpsError::LengthMismatch {
            context: "boxes vs batch_ids",
            expected: boxes.len(),
            got: batch_ids.len(),
        });
    }
    if boxes.is_empty() {
        return Ok(Vec::new());
    }

    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for b in boxes {
        lo = lo.min(b.x1).min(b.y1);
        hi = hi.max(b.x2).max(b.y2);
    }
    let span = hi - lo + 1.0;

    let shifted: Vec<BBox> = boxes
        .iter()
        .zip(batch_ids)
        .map(|(b, &id)| {
            let offset = id as f32 * span;
            BBox::new(b.x1 + offset, b.y1 + offset, b.x2 + offset, b.y2 + offset)
        })
        .collect();

    nms(&shifted, scores, iou_threshold)
}

pub(crate) fn validate_inputs(
    boxes: &[BBox],
    scores: &[f32],
    iou_threshold: f32,
) -> DetOpsResult<()> {
    if boxes.len() != scores.len() {
        return Err(DetOpsError::LengthMismatch {
            context: "boxes vs scores",
            expected: boxes.len(),
            got: scores.len(),
        });
    }
    if !(0.0..=1.0).contains(&iou_threshold) {
        return Err(DetOpsError::ParameterOutOfDomain {
            name: "iou_threshold",
            value: iou_threshold,
            reason: "must lie in [0, 1]",
        });
    }
    Ok(())
}
