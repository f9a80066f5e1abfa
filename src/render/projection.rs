//! Pan-aware orthographic projection over an image quad.
//!
//! The image is modeled as a quad spanning `[-scaled_aspect, scaled_aspect]`
//! horizontally and `[-1, 1]` vertically (the compositor applies the
//! horizontal scale as a model transform). The projection window is always
//! `2` units wide and `2 / zoom` tall, shifted horizontally by the pan
//! offset, and clamped so no empty space is ever exposed at either edge.

/// Orthographic bounds. Vertical bounds are symmetric about zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
}

impl Projection {
    pub const UNIT: Self = Self {
        left: -1.0,
        right: 1.0,
        bottom: -1.0,
        top: 1.0,
    };
}

/// Projection bounds plus the horizontal model scale the compositor bakes
/// into the final matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub bounds: Projection,
    pub scaled_aspect: f32,
    pub zoom: f32,
}

impl ViewTransform {
    pub const UNIT: Self = Self {
        bounds: Projection::UNIT,
        scaled_aspect: 1.0,
        zoom: 1.0,
    };
}

/// Builds the view transform for the given aspect ratios and normalized pan
/// offset (`0` shows the image's left edge, `1` its right edge).
///
/// `max_pan_screen_widths` caps the total pan travel, expressed in screen
/// widths. Invalid aspect input degrades to the unit square.
pub fn build(
    viewport_aspect: f32,
    image_aspect: f32,
    pan_offset: f32,
    max_pan_screen_widths: f32,
) -> ViewTransform {
    if !viewport_aspect.is_finite()
        || !image_aspect.is_finite()
        || viewport_aspect <= 0.0
        || image_aspect <= 0.0
    {
        return ViewTransform::UNIT;
    }

    let ratio = viewport_aspect / image_aspect;
    let zoom = ratio.max(1.0);
    let scaled_aspect = zoom / ratio;

    // Excess half-width on each side of the window; one screen width is two
    // units in quad space.
    let excess = (scaled_aspect - 1.0).max(0.0);
    let cap = if max_pan_screen_widths.is_finite() {
        max_pan_screen_widths.max(0.0)
    } else {
        0.0
    };
    let travel = (2.0 * excess).min(2.0 * cap);

    let offset = if pan_offset.is_finite() {
        pan_offset.clamp(0.0, 1.0)
    } else {
        0.5
    };
    let center = -travel / 2.0 + travel * offset;

    ViewTransform {
        bounds: Projection {
            left: center - 1.0,
            right: center + 1.0,
            bottom: -1.0 / zoom,
            top: 1.0 / zoom,
        },
        scaled_aspect,
        zoom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_aspect_falls_back_to_unit_square() {
        for bad in [f32::NAN, 0.0, -2.0, f32::INFINITY] {
            assert_eq!(build(1.6, bad, 0.5, 1.8), ViewTransform::UNIT);
            assert_eq!(build(bad, 1.6, 0.5, 1.8), ViewTransform::UNIT);
        }
    }

    #[test]
    fn pan_never_exposes_empty_space() {
        // Panoramic image on a portrait viewport: plenty of pan range.
        let vt = build(9.0 / 16.0, 3.0, 1.0, 100.0);
        assert!(vt.bounds.right <= vt.scaled_aspect + 1e-5);
        let vt = build(9.0 / 16.0, 3.0, 0.0, 100.0);
        assert!(vt.bounds.left >= -vt.scaled_aspect - 1e-5);
    }
}
