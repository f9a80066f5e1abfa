use photo_wallpaper::render::projection::{ViewTransform, build};

fn close(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "mismatch: {a} vs {b}");
}

#[test]
fn square_image_on_square_viewport_is_unit() {
    let vt = build(1.0, 1.0, 0.5, 1.8);
    close(vt.zoom, 1.0, 1e-6);
    close(vt.scaled_aspect, 1.0, 1e-6);
    close(vt.bounds.left, -1.0, 1e-6);
    close(vt.bounds.right, 1.0, 1e-6);
    close(vt.bounds.bottom, -1.0, 1e-6);
    close(vt.bounds.top, 1.0, 1e-6);
}

#[test]
fn wide_viewport_zooms_to_cover() {
    // 16:9 viewport, 4:3 image: viewport is wider, so the image must be
    // zoomed until it covers the full width.
    let vt = build(16.0 / 9.0, 4.0 / 3.0, 0.5, 1.8);
    let ratio = (16.0 / 9.0) / (4.0 / 3.0);
    close(vt.zoom, ratio, 1e-5);
    // Window is always 2 wide; height shrinks by the zoom.
    close(vt.bounds.right - vt.bounds.left, 2.0, 1e-6);
    close(vt.bounds.top - vt.bounds.bottom, 2.0 / vt.zoom, 1e-6);
}

#[test]
fn window_width_never_shrinks_below_zoomed_extent() {
    // Invariant: right - left >= 2 / zoom, for arbitrary aspect pairs.
    for (va, ia) in [
        (16.0 / 9.0, 4.0 / 3.0),
        (9.0 / 16.0, 3.0),
        (2.0, 0.4),
        (0.6, 2.4),
        (1.0, 1.0),
    ] {
        for pan in [0.0, 0.25, 0.5, 1.0] {
            let vt = build(va, ia, pan, 1.8);
            assert!(
                vt.bounds.right - vt.bounds.left >= 2.0 / vt.zoom - 1e-5,
                "width invariant broken for va={va} ia={ia} pan={pan}"
            );
        }
    }
}

#[test]
fn pan_sweep_stays_inside_image() {
    // Tall viewport over a panorama: large pan range, but the window must
    // never show past either image edge.
    for pan in [0.0, 0.1, 0.3, 0.5, 0.7, 0.9, 1.0] {
        let vt = build(9.0 / 16.0, 3.0, pan, 100.0);
        assert!(vt.bounds.left >= -vt.scaled_aspect - 1e-5);
        assert!(vt.bounds.right <= vt.scaled_aspect + 1e-5);
    }
}

#[test]
fn pan_is_monotonic_in_offset() {
    let mut last = f32::NEG_INFINITY;
    for pan in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
        let center = {
            let vt = build(9.0 / 16.0, 3.0, pan, 2.0);
            (vt.bounds.left + vt.bounds.right) / 2.0
        };
        assert!(center >= last, "pan centers must not move backwards");
        last = center;
    }
}

#[test]
fn travel_capped_by_screen_widths() {
    // Huge panorama but a tight cap: travel is limited to one screen width
    // (= 2 quad units), so edge-to-edge centers sit 2 apart.
    let left_edge = build(9.0 / 16.0, 10.0, 0.0, 1.0);
    let right_edge = build(9.0 / 16.0, 10.0, 1.0, 1.0);
    let travel = (right_edge.bounds.left + right_edge.bounds.right) / 2.0
        - (left_edge.bounds.left + left_edge.bounds.right) / 2.0;
    close(travel, 2.0, 1e-4);
}

#[test]
fn zero_cap_pins_window_to_center() {
    let vt = build(9.0 / 16.0, 3.0, 1.0, 0.0);
    close((vt.bounds.left + vt.bounds.right) / 2.0, 0.0, 1e-6);
}

#[test]
fn nan_and_nonpositive_aspects_degrade_to_unit() {
    for bad in [f32::NAN, f32::INFINITY, 0.0, -1.0] {
        assert_eq!(build(bad, 1.5, 0.5, 1.8), ViewTransform::UNIT);
        assert_eq!(build(1.5, bad, 0.5, 1.8), ViewTransform::UNIT);
    }
}

#[test]
fn nonfinite_pan_defaults_to_center() {
    let centered = build(9.0 / 16.0, 3.0, 0.5, 2.0);
    let fallback = build(9.0 / 16.0, 3.0, f32::NAN, 2.0);
    assert_eq!(centered, fallback);
}
