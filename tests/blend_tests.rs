use photo_wallpaper::render::blend::layer_alphas;

/// Sequential over-compositing of two layers onto a background.
fn composite(bg: f32, floor: f32, ceil: f32, alphas: Option<(f32, f32)>) -> f32 {
    let Some((a_floor, a_ceil)) = alphas else {
        return bg;
    };
    let after_floor = floor * a_floor + bg * (1.0 - a_floor);
    ceil * a_ceil + after_floor * (1.0 - a_ceil)
}

#[test]
fn matches_crossfade_then_fade_reference() {
    // Reference: blend floor and ceil by the fraction first, then composite
    // that result at the global alpha. The two-draw algebra must produce the
    // same pixel for any (global, fraction) pair.
    let bg = 0.25;
    let floor = 0.8;
    let ceil = 0.3;
    for g_step in 1..=10 {
        for f_step in 0..=10 {
            let g = g_step as f32 / 10.0;
            let f = f_step as f32 / 10.0;
            let reference = {
                let crossfaded = floor * (1.0 - f) + ceil * f;
                crossfaded * g + bg * (1.0 - g)
            };
            let actual = composite(bg, floor, ceil, layer_alphas(g, f));
            assert!(
                (actual - reference).abs() < 1e-4,
                "divergence at g={g} f={f}: {actual} vs {reference}"
            );
        }
    }
}

#[test]
fn invisible_layer_draws_nothing() {
    assert_eq!(layer_alphas(0.0, 0.5), None);
    assert_eq!(layer_alphas(-1.0, 0.5), None);
}

#[test]
fn opaque_layer_floor_draw_is_opaque() {
    // At full global alpha the floor draw must blot out the backdrop
    // entirely; the ceil draw then mixes by the fraction.
    let (a, b) = layer_alphas(1.0, 0.3).unwrap();
    assert!((a - 1.0).abs() < 1e-6);
    assert!((b - 0.3).abs() < 1e-6);
}

#[test]
fn zero_fraction_is_floor_only() {
    let (a, b) = layer_alphas(0.6, 0.0).unwrap();
    assert!((a - 0.6).abs() < 1e-6);
    assert_eq!(b, 0.0);
}

#[test]
fn full_fraction_is_ceil_only() {
    let (a, b) = layer_alphas(0.6, 1.0).unwrap();
    assert_eq!(a, 0.0);
    assert!((b - 0.6).abs() < 1e-6);
}

#[test]
fn alphas_stay_in_unit_range() {
    for g_step in 1..=20 {
        for f_step in 0..=20 {
            let g = g_step as f32 / 20.0;
            let f = f_step as f32 / 20.0;
            if let Some((a, b)) = layer_alphas(g, f) {
                assert!((0.0..=1.0).contains(&a), "floor alpha out of range at g={g} f={f}");
                assert!((0.0..=1.0).contains(&b), "ceil alpha out of range at g={g} f={f}");
            }
        }
    }
}
