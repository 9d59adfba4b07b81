use approx::assert_relative_eq;
use stationcloud_core::{colorize_by_height, heat_map_color, BudgetConfig, Point, StoreConfig};
use stationcloud_filters::{voxel_downsample, SpatialDensityIndex};
use stationcloud_registration::RigidTransform;
use stationcloud_store::{MarkerUpdate, PointStore, ViewMode};

fn config(budget: usize) -> StoreConfig {
    StoreConfig {
        voxel_size: 1.0,
        budget: BudgetConfig {
            initial: budget,
            lower: 10,
            upper: budget,
            step: 10,
            ..BudgetConfig::default()
        },
        ..StoreConfig::default()
    }
}

/// Two raw samples per unit voxel along x, both at the voxel's centre.
fn scan_line(n: usize) -> Vec<[f32; 3]> {
    (0..n)
        .flat_map(|i| {
            let p = [i as f32 + 0.5, 0.5, i as f32 * 0.1];
            [p, p]
        })
        .collect()
}

/// End-to-end: colourize → downsample → commit → finalize two stations → merged
#[test]
fn two_station_capture_merges_into_global_frame() {
    let mut store = PointStore::new(&config(1_000));

    // Station "0", recorded at the origin.
    let raw = colorize_by_height(&scan_line(20));
    assert_eq!(raw.len(), 40);
    let outcome = store.append_incoming(&raw, None);
    assert_eq!(outcome.appended, 20);
    assert_eq!(store.visible_len(), 20);

    let token = store.scene_token();
    let update = store.finalize_station(&RigidTransform::translation(1.0, 0.0, 0.0));
    match update {
        MarkerUpdate::Add(markers) => assert_eq!(markers.len(), 1),
        MarkerUpdate::Remove => panic!("finalize must add markers"),
    }
    assert_ne!(store.scene_token(), token);
    assert_eq!(store.view_mode(), ViewMode::Merged);
    assert_eq!(store.merged_len(), 20);
    assert_relative_eq!(store.merged()[0].position[0], -0.5, epsilon = 1e-5);

    // Station "1".
    assert_eq!(store.switch_to_station("1"), MarkerUpdate::Remove);
    assert!(store.visible().is_empty());
    store.append_incoming(&colorize_by_height(&scan_line(5)), None);
    assert_eq!(store.visible_len(), 5);
    store.finalize_station(&RigidTransform::translation(0.0, 1.0, 0.0));

    assert_eq!(store.merged_len(), 25);
    assert_eq!(store.station_transforms().len(), 2);

    // Station "1" points are mapped through inverse(T1) · inverse(T2).
    let p = store.merged()[20].position;
    assert_relative_eq!(p[0], -0.5, epsilon = 1e-5);
    assert_relative_eq!(p[1], -0.5, epsilon = 1e-5);

    let origin = store
        .accumulated_transform()
        .apply_to_position(&[0.0, 0.0, 0.0]);
    assert_relative_eq!(origin[0], -1.0, epsilon = 1e-5);
    assert_relative_eq!(origin[1], -1.0, epsilon = 1e-5);
    assert_relative_eq!(origin[2], 0.0, epsilon = 1e-5);
}

#[test]
fn finalize_from_text_matches_typed_transform() {
    let raw = colorize_by_height(&scan_line(8));

    let mut typed = PointStore::new(&config(1_000));
    typed.append_incoming(&raw, None);
    typed.finalize_station(&RigidTransform::translation(2.0, 0.0, -1.0));

    let mut parsed = PointStore::new(&config(1_000));
    parsed.append_incoming(&raw, None);
    parsed
        .finalize_station_from_text("1 0 0 2\n0 1 0 0\n0 0 1 -1\n0 0 0 1")
        .unwrap();

    assert_eq!(typed.merged_len(), parsed.merged_len());
    for (a, b) in typed.merged().iter().zip(parsed.merged()) {
        for axis in 0..3 {
            assert_relative_eq!(a.position[axis], b.position[axis], epsilon = 1e-5);
        }
        assert_eq!(a.color, b.color);
    }
}

#[test]
fn station_buffers_hold_global_coordinates_after_finalize() {
    let mut store = PointStore::new(&config(1_000));
    store.append_incoming(&colorize_by_height(&scan_line(3)), None);
    store.finalize_station(&RigidTransform::translation(0.0, 0.0, 4.0));

    let station = store.station_points("0").unwrap();
    assert_eq!(station.len(), 3);
    assert_eq!(station, store.merged());
    assert_relative_eq!(station[0].position[2], -4.0, epsilon = 1e-5);

    // Revisiting the station shows its transformed buffer.
    store.switch_to_station("0");
    assert_eq!(store.visible(), store.merged());
}

#[test]
fn merged_view_is_bounded_by_budget() {
    let mut store = PointStore::new(&config(30));
    store.append_incoming(&colorize_by_height(&scan_line(25)), None);
    store.finalize_station(&RigidTransform::identity());
    store.switch_to_station("1");
    store.append_incoming(&colorize_by_height(&scan_line(25)), None);
    store.finalize_station(&RigidTransform::identity());

    assert_eq!(store.merged_len(), 50);
    assert_eq!(store.visible_len(), 30);
    // The visible buffer is the newest tail of the merged cloud.
    assert_eq!(store.visible(), &store.merged()[20..]);
}

#[test]
fn downsampled_capture_feeds_density_index() {
    let raw = colorize_by_height(&scan_line(200));
    let points = voxel_downsample(&raw, 1.0);

    let mut index = SpatialDensityIndex::new(StoreConfig::default().density);
    index.insert(&points);
    assert_eq!(index.len(), 200);

    // Nothing reaches the per-object threshold, so thinning keeps everything.
    let thinned = index.thin_seeded(3);
    assert_eq!(thinned.len(), 200);
}

#[test]
fn height_colouring_survives_downsampling() {
    let raw: Vec<Point> = colorize_by_height(&[[0.5, 0.5, 0.0], [5.5, 0.5, 10.0]]);
    let points = voxel_downsample(&raw, 1.0);
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].color, raw[0].color);
    assert_eq!(points[1].color, raw[1].color);
}

#[test]
fn budget_occupancy_maps_onto_heat_ramp() {
    let mut store = PointStore::new(&config(20));
    let fill = |store: &PointStore| store.visible_len() as f32 / store.budget() as f32;

    assert_eq!(heat_map_color(fill(&store)), [0, 0, 255]);
    store.append_incoming(&colorize_by_height(&scan_line(20)), None);
    assert_eq!(heat_map_color(fill(&store)), [255, 0, 0]);
}
