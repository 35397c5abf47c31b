//! Axis-aligned boxes and overlap geometry.

use std::cmp::Ordering;

/// Corner-coordinate bounding box in a shared image space.
///
/// Well-formed boxes satisfy `x1 <= x2` and `y1 <= y2`; geometry helpers
/// clamp negative extents to zero so malformed boxes behave as zero-area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    /// Left edge (column) of the box.
    pub x1: f32,
    /// Top edge (row) of the box.
    pub y1: f32,
    /// Right edge (column) of the box.
    pub x2: f32,
    /// Bottom edge (row) of the box.
    pub y2: f32,
}

impl BBox {
    /// Creates a box from its corner coordinates.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box area, clamped at zero for degenerate extents.
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// Intersection-over-union of two boxes.
///
/// Defined as intersection / (areaA + areaB - intersection). A zero-area
/// box has IoU 0 with any other box, including an identical copy of itself.
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

fn score_cmp_desc(scores: &[f32], a: usize, b: usize) -> Ordering {
    scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(&b))
}

/// Returns box indices ordered by descending score, ties broken by
/// ascending original index so the ordering is fully deterministic.
pub(crate) fn sort_indices_desc(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| score_cmp_desc(scores, a, b));
    order
}

#[cfg(test)]
mod tests {
    use super::{iou, sort_indices_desc, BBox};

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_zero_area_box_is_zero() {
        let a = BBox::new(5.0, 5.0, 5.0, 5.0);
        let b = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
        assert_eq!(iou(&a, &a), 0.0);
    }

    #[test]
    fn iou_matches_hand_computed_overlap() {
        // 9x9 intersection of two 10x10 boxes shifted by one.
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(1.0, 1.0, 11.0, 11.0);
        let expected = 81.0 / (100.0 + 100.0 - 81.0);
        assert!((iou(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn sort_is_descending_with_index_tiebreak() {
        let scores = [0.5f32, 0.9, 0.5, 0.1];
        assert_eq!(sort_indices_desc(&scores), vec![1, 0, 2, 3]);
    }
}
