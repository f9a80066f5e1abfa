use photo_wallpaper::processing::blur_levels::{MAX_LEVELS, level_count, plan_levels};
use photo_wallpaper::processing::weights::{MAX_TAPS, compressed_taps};

#[test]
fn level_counts_per_radius_band() {
    assert_eq!(level_count(0.0), 0);
    assert_eq!(level_count(0.9), 0);
    assert_eq!(level_count(1.0), 1);
    assert_eq!(level_count(9.9), 1);
    assert_eq!(level_count(10.0), 2);
    assert_eq!(level_count(39.9), 2);
    // The band boundary must not dip back to one level.
    assert_eq!(level_count(40.0), 2);
    assert_eq!(level_count(80.0), 2);
    assert_eq!(level_count(81.0), 3);
    assert_eq!(level_count(120.0), 3);
    assert_eq!(level_count(121.0), 4);
    assert_eq!(level_count(1000.0), MAX_LEVELS);
}

#[test]
fn radii_are_strictly_increasing() {
    for max in [1.0, 12.0, 55.0, 100.0, 160.0] {
        let plans = plan_levels(max, 160.0);
        for pair in plans.windows(2) {
            assert!(
                pair[0].radius < pair[1].radius,
                "radii not increasing at max={max}"
            );
        }
    }
}

#[test]
fn tap_weights_normalized_for_all_radii() {
    for radius in 1..=200 {
        let table = compressed_taps(radius);
        assert!(!table.is_empty());
        assert!(table.len() <= MAX_TAPS);
        // Center tap counts once, every off-center tap twice (mirrored).
        let sum = table.weights[0] + 2.0 * table.weights[1..].iter().sum::<f32>();
        assert!(
            (sum - 1.0).abs() < 1e-4,
            "weights for radius {radius} sum to {sum}"
        );
    }
}

#[test]
fn large_radius_stays_within_tap_cap() {
    let table = compressed_taps(160);
    assert_eq!(table.len(), MAX_TAPS);
    // Offsets strictly increase so the bilinear taps never overlap.
    for pair in table.offsets.windows(2) {
        assert!(pair[0] < pair[1]);
    }
}
