use detops::{roi_pool_backward, roi_pool_forward, FeatureShape, FeatureView, Region, TileGrid};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn arange_map(shape: FeatureShape) -> Vec<f32> {
    (0..shape.element_count()).map(|v| v as f32).collect()
}

#[test]
fn full_region_equals_plain_max_pool() {
    let shape = FeatureShape::new(1, 2, 4, 4).unwrap();
    let data = arange_map(shape);
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [Region::new(0, 0.0, 0.0, 3.0, 3.0)];

    let (tiles, argmax) = roi_pool_forward(view, &regions, 1.0, 2, 2).unwrap();

    // Channel 0 holds 0..16 row-major; quadrant maxima sit at the
    // bottom-right cell of each 2x2 block.
    assert_eq!(tiles.get(0, 0, 0, 0), Some(5.0));
    assert_eq!(tiles.get(0, 0, 0, 1), Some(7.0));
    assert_eq!(tiles.get(0, 0, 1, 0), Some(13.0));
    assert_eq!(tiles.get(0, 0, 1, 1), Some(15.0));
    // Channel 1 is the same pattern offset by 16, same plane indices.
    assert_eq!(tiles.get(0, 1, 1, 1), Some(31.0));
    assert_eq!(argmax.get(0, 0, 0, 0), Some(5));
    assert_eq!(argmax.get(0, 1, 1, 1), Some(15));
}

#[test]
fn spatial_scale_maps_image_coordinates_into_the_feature_grid() {
    let shape = FeatureShape::new(1, 1, 4, 4).unwrap();
    let data = arange_map(shape);
    let view = FeatureView::new(&data, shape).unwrap();

    // Image-space region (0,0)-(6,6) at scale 0.5 covers feature cells
    // (0,0)-(3,3): identical to pooling the full map.
    let scaled = [Region::new(0, 0.0, 0.0, 6.0, 6.0)];
    let (tiles, _) = roi_pool_forward(view, &scaled, 0.5, 2, 2).unwrap();
    assert_eq!(tiles.as_slice(), &[5.0, 7.0, 13.0, 15.0]);
}

#[test]
fn every_region_gets_the_same_tile_shape() {
    let shape = FeatureShape::new(2, 3, 16, 16).unwrap();
    let data = arange_map(shape);
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [
        Region::new(0, 0.0, 0.0, 15.0, 15.0),
        Region::new(0, 2.0, 2.0, 3.0, 3.0),
        Region::new(1, 5.0, 1.0, 5.4, 14.0),
    ];

    let (tiles, argmax) = roi_pool_forward(view, &regions, 1.0, 7, 7).unwrap();
    assert_eq!(tiles.dims(), (3, 3, 7, 7));
    assert_eq!(argmax.dims(), (3, 3, 7, 7));
    assert_eq!(tiles.as_slice().len(), 3 * 3 * 7 * 7);
}

#[test]
fn backward_of_ones_counts_argmax_multiplicity() {
    let shape = FeatureShape::new(1, 1, 6, 6).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let data: Vec<f32> = (0..shape.element_count())
        .map(|_| rng.random_range(-1.0f32..1.0))
        .collect();
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [
        Region::new(0, 0.0, 0.0, 5.0, 5.0),
        Region::new(0, 1.0, 1.0, 4.0, 4.0),
        Region::new(0, 2.0, 0.0, 5.0, 3.0),
    ];

    let (tiles, argmax) = roi_pool_forward(view, &regions, 1.0, 3, 3).unwrap();
    let ones = TileGrid::filled(1.0, 3, 1, 3, 3);
    let grad = roi_pool_backward(&ones, &argmax, &regions, shape).unwrap();

    let mut counts = vec![0usize; shape.element_count()];
    for &a in argmax.as_slice() {
        assert!(a >= 0, "full-coverage regions leave no empty bins");
        counts[a as usize] += 1;
    }
    for (g, &c) in grad.iter().zip(&counts) {
        assert_eq!(*g, c as f32);
    }
    // Total mass equals the number of output cells.
    let total: f32 = grad.iter().sum();
    assert_eq!(total, tiles.as_slice().len() as f32);
}

#[test]
fn region_outside_the_map_yields_sentinel_tiles_and_zero_gradient() {
    let shape = FeatureShape::new(1, 1, 4, 4).unwrap();
    let data = arange_map(shape);
    let view = FeatureView::new(&data, shape).unwrap();
    let regions = [Region::new(0, 100.0, 100.0, 110.0, 110.0)];

    let (tiles, argmax) = roi_pool_forward(view, &regions, 1.0, 2, 2).unwrap();
    assert!(tiles.as_slice().iter().all(|&v| v == f32::MIN));
    assert!(argmax.as_slice().iter().all(|&a| a == -1));

    let ones = TileGrid::filled(1.0, 1, 1, 2, 2);
    let grad = roi_pool_backward(&ones, &argmax, &regions, shape).unwrap();
    assert!(grad.iter().all(|&g| g == 0.0));
}

#[test]
fn sub_cell_region_still_fills_the_whole_tile() {
    let shape = FeatureShape::new(1, 1, 4, 4).unwrap();
    let data = arange_map(shape);
    let view = FeatureView::new(&data, shape).unwrap();
    // Width and height round to a single cell at (2, 2).
    let regions = [Region::new(0, 2.2, 2.2, 2.4, 2.4)];

    let (tiles, argmax) = roi_pool_forward(view, &regions, 1.0, 2, 2).unwrap();
    assert_eq!(tiles.as_slice(), &[10.0; 4]);
    assert_eq!(argmax.as_slice(), &[10; 4]);
}

#[test]
fn gradients_accumulate_when_regions_share_argmax_cells() {
    let shape = FeatureShape::new(1, 1, 4, 4).unwrap();
    let data = arange_map(shape);
    let view = FeatureView::new(&data, shape).unwrap();
    // Two identical full-map regions double every gradient.
    let regions = [
        Region::new(0, 0.0, 0.0, 3.0, 3.0),
        Region::new(0, 0.0, 0.0, 3.0, 3.0),
    ];

    let (_, argmax) = roi_pool_forward(view, &regions, 1.0, 2, 2).unwrap();
    let ones = TileGrid::filled(1.0, 2, 1, 2, 2);
    let grad = roi_pool_backward(&ones, &argmax, &regions, shape).unwrap();

    for cell in [5usize, 7, 13, 15] {
        assert_eq!(grad[cell], 2.0);
    }
    let total: f32 = grad.iter().sum();
    assert_eq!(total, 8.0);
}
