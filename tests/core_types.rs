use detops::{
    nms, nms_batched, roi_align_forward, roi_pool_backward, roi_pool_forward, soft_nms, BBox,
    DetOpsError, FeatureShape, FeatureView, Region, SoftNmsMethod, TileGrid,
};

fn unit_map() -> (Vec<f32>, FeatureShape) {
    let shape = FeatureShape::new(1, 1, 4, 4).unwrap();
    ((0..16).map(|v| v as f32).collect(), shape)
}

#[test]
fn nms_rejects_mismatched_scores() {
    let boxes = [BBox::new(0.0, 0.0, 1.0, 1.0)];
    let err = nms(&boxes, &[0.9, 0.8], 0.5).err().unwrap();
    assert_eq!(
        err,
        DetOpsError::LengthMismatch {
            context: "boxes vs scores",
            expected: 1,
            got: 2,
        }
    );
}

#[test]
fn nms_rejects_out_of_domain_threshold() {
    let boxes = [BBox::new(0.0, 0.0, 1.0, 1.0)];
    for bad in [-0.1f32, 1.1] {
        let err = nms(&boxes, &[0.9], bad).err().unwrap();
        assert!(matches!(
            err,
            DetOpsError::ParameterOutOfDomain {
                name: "iou_threshold",
                ..
            }
        ));
    }
}

#[test]
fn soft_nms_rejects_non_positive_sigma() {
    let boxes = [BBox::new(0.0, 0.0, 1.0, 1.0)];
    let err = soft_nms(&boxes, &[0.9], SoftNmsMethod::Gaussian, 0.0, 0.3, 0.001)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        DetOpsError::ParameterOutOfDomain { name: "sigma", .. }
    ));
}

#[test]
fn batched_nms_rejects_mismatched_batch_ids() {
    let boxes = [BBox::new(0.0, 0.0, 1.0, 1.0)];
    let err = nms_batched(&boxes, &[0.9], &[0, 1], 0.5).err().unwrap();
    assert_eq!(
        err,
        DetOpsError::LengthMismatch {
            context: "boxes vs batch_ids",
            expected: 1,
            got: 2,
        }
    );
}

#[test]
fn roi_pool_rejects_out_of_range_batch_index() {
    let (data, shape) = unit_map();
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [Region::new(3, 0.0, 0.0, 2.0, 2.0)];
    let err = roi_pool_forward(view, &regions, 1.0, 2, 2).err().unwrap();
    assert_eq!(
        err,
        DetOpsError::BatchIndexOutOfRange {
            region: 0,
            index: 3,
            len: 1,
        }
    );
}

#[test]
fn roi_pool_rejects_inverted_corners() {
    let (data, shape) = unit_map();
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [Region::new(0, 2.0, 0.0, 1.0, 2.0)];
    let err = roi_pool_forward(view, &regions, 1.0, 2, 2).err().unwrap();
    assert_eq!(
        err,
        DetOpsError::MalformedRegion {
            region: 0,
            reason: "x2 < x1",
        }
    );
}

#[test]
fn roi_align_rejects_empty_pooled_output() {
    let (data, shape) = unit_map();
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [Region::new(0, 0.0, 0.0, 2.0, 2.0)];
    let err = roi_align_forward(view, &regions, 1.0, 0, 2, 2)
        .err()
        .unwrap();
    assert_eq!(
        err,
        DetOpsError::EmptyPooledOutput {
            pooled_h: 0,
            pooled_w: 2,
        }
    );
}

#[test]
fn roi_align_rejects_non_positive_scale() {
    let (data, shape) = unit_map();
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [Region::new(0, 0.0, 0.0, 2.0, 2.0)];
    let err = roi_align_forward(view, &regions, 0.0, 2, 2, 2)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        DetOpsError::ParameterOutOfDomain {
            name: "spatial_scale",
            ..
        }
    ));
}

#[test]
fn roi_pool_backward_rejects_mismatched_gradient_shape() {
    let (data, shape) = unit_map();
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [
        Region::new(0, 0.0, 0.0, 3.0, 3.0),
        Region::new(0, 1.0, 1.0, 2.0, 2.0),
    ];
    let (_, argmax) = roi_pool_forward(view, &regions, 1.0, 2, 2).unwrap();

    // Gradient sized for one region cannot drive a two-region argmax.
    let grad = TileGrid::filled(1.0, 1, 1, 2, 2);
    let err = roi_pool_backward(&grad, &argmax, &regions, shape)
        .err()
        .unwrap();
    assert!(matches!(err, DetOpsError::LengthMismatch { .. }));
}
