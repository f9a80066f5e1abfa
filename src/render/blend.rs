//! Alpha algebra for compositing two blur levels without an offscreen buffer.
//!
//! Blending level A (floor) and level B (ceil) by fraction `f`, then applying
//! a global layer alpha `g`, would normally need an intermediate render
//! target. Drawing A then B directly with the alphas below reproduces the
//! same result under standard sequential alpha blending.

/// Returns `(alpha_floor, alpha_ceil)` for the two sequential draws, or
/// `None` when the layer is fully transparent and both draws can be skipped.
pub fn layer_alphas(global: f32, fraction: f32) -> Option<(f32, f32)> {
    let g = if global.is_finite() { global.clamp(0.0, 1.0) } else { 0.0 };
    let f = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };

    if g <= 0.0 {
        return None;
    }
    if f >= 1.0 {
        // The floor draw would be fully covered; skip it.
        return Some((0.0, g));
    }
    // Derived so that: B over (A over D) == g*(f*B + (1-f)*A) + (1-g)*D.
    // The denominator g*f - 1 is negative for g <= 1, f < 1.
    Some((g * (f - 1.0) / (g * f - 1.0), g * f))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Standard "source over" for one channel.
    fn over(src: f32, alpha: f32, dst: f32) -> f32 {
        alpha * src + (1.0 - alpha) * dst
    }

    #[test]
    fn matches_crossfade_then_global_alpha() {
        let backdrop = 0.3f32;
        let a = 0.9f32;
        let b = 0.1f32;
        for gi in 0..=10 {
            for fi in 0..=10 {
                let g = gi as f32 / 10.0;
                let f = fi as f32 / 10.0;
                let composited = match layer_alphas(g, f) {
                    None => backdrop,
                    Some((alpha_a, alpha_b)) => over(b, alpha_b, over(a, alpha_a, backdrop)),
                };
                let expected = g * (f * b + (1.0 - f) * a) + (1.0 - g) * backdrop;
                assert!(
                    (composited - expected).abs() < 1e-5,
                    "g={g} f={f}: {composited} vs {expected}"
                );
            }
        }
    }

    #[test]
    fn opaque_layer_overwrites_backdrop() {
        // At g = 1 the floor draw must be fully opaque or the backdrop
        // bleeds through the second draw.
        assert_eq!(layer_alphas(1.0, 0.25), Some((1.0, 0.25)));
    }

    #[test]
    fn transparent_layer_skips_draws() {
        assert_eq!(layer_alphas(0.0, 0.5), None);
    }

    #[test]
    fn zero_fraction_draws_floor_only() {
        let (a, b) = layer_alphas(0.6, 0.0).unwrap();
        assert!((a - 0.6).abs() < 1e-6);
        assert_eq!(b, 0.0);
    }

    #[test]
    fn garbage_input_coerced() {
        assert_eq!(layer_alphas(f32::NAN, 0.5), None);
        // Non-finite fraction coerces to 0, out-of-range global clamps to 1.
        let (a, b) = layer_alphas(2.0, f32::INFINITY).unwrap();
        assert_eq!((a, b), (1.0, 0.0));
    }
}
