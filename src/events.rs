//! Messages between the host-facing handle, the GPU-thread viewer, and the
//! background generation worker. Handoff payloads are finished, immutable
//! CPU bitmaps only; live GPU handles never cross a thread boundary.

use std::sync::Arc;

use image::RgbaImage;

/// One photo prepared for display: the unblurred original plus an ordered
/// sequence of progressively blurrier, resolution-reduced copies.
#[derive(Debug)]
pub struct ImageSet {
    pub original: RgbaImage,
    /// Ordered by increasing blur radius. May be empty (blur disabled or
    /// generation failed); the compositor then shows the original for every
    /// blur state.
    pub blur_levels: Vec<RgbaImage>,
    /// Width / height of the original.
    pub aspect: f32,
}

impl ImageSet {
    pub fn new(original: RgbaImage, blur_levels: Vec<RgbaImage>) -> Self {
        let (w, h) = original.dimensions();
        let aspect = if h == 0 { 1.0 } else { w as f32 / h as f32 };
        Self {
            original,
            blur_levels,
            aspect,
        }
    }

    /// Number of blur levels; the blur animator travels over `0..=count`.
    pub fn level_count(&self) -> usize {
        self.blur_levels.len()
    }
}

/// Duotone remap request: per-pixel luminance picks between two colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuotoneTarget {
    pub enabled: bool,
    /// `false` ties the effect's opacity to blur progress; `true` decouples
    /// it.
    pub always_on: bool,
    pub light: [f32; 3],
    pub dark: [f32; 3],
    pub blend: DuotoneBlend,
    pub animate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuotoneBlend {
    Normal,
    Multiply,
}

/// Commands marshaled onto the GPU-context thread.
#[derive(Debug)]
pub enum Command {
    SetImage(Arc<ImageSet>),
    SetBlurEnabled(bool),
    ToggleBlur,
    SetDimAmount(f32),
    SetDuotone(DuotoneTarget),
    SetParallaxOffset(f32),
    SetTouchPoint(f32, f32),
    RequestRedraw,
}

/// Outbound signals from the renderer core to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Ask the host to schedule a draw.
    RequestRender,
    /// The pending image was consumed; the next photo may be submitted.
    ReadyForNextImage,
}

/// Drained command batch: stateful kinds keep only the latest value, while
/// one-shot commands (blur toggles) stay FIFO-counted.
#[derive(Debug, Default)]
pub struct Coalesced {
    pub image: Option<Arc<ImageSet>>,
    pub blur_enabled: Option<bool>,
    pub toggles: u32,
    pub dim: Option<f32>,
    pub duotone: Option<DuotoneTarget>,
    pub parallax: Option<f32>,
    pub touch: Option<(f32, f32)>,
    pub redraw: bool,
}

impl Coalesced {
    pub fn absorb(&mut self, cmd: Command) {
        match cmd {
            Command::SetImage(set) => self.image = Some(set),
            Command::SetBlurEnabled(on) => {
                // An explicit target supersedes earlier queued toggles.
                self.toggles = 0;
                self.blur_enabled = Some(on);
            }
            Command::ToggleBlur => self.toggles += 1,
            Command::SetDimAmount(v) => self.dim = Some(v),
            Command::SetDuotone(target) => self.duotone = Some(target),
            Command::SetParallaxOffset(v) => self.parallax = Some(v),
            Command::SetTouchPoint(x, y) => self.touch = Some((x, y)),
            Command::RequestRedraw => self.redraw = true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none()
            && self.blur_enabled.is_none()
            && self.toggles == 0
            && self.dim.is_none()
            && self.duotone.is_none()
            && self.parallax.is_none()
            && self.touch.is_none()
            && !self.redraw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_set() -> Arc<ImageSet> {
        Arc::new(ImageSet::new(RgbaImage::new(2, 1), Vec::new()))
    }

    #[test]
    fn latest_wins_per_kind() {
        let mut batch = Coalesced::default();
        batch.absorb(Command::SetDimAmount(0.2));
        batch.absorb(Command::SetDimAmount(0.8));
        batch.absorb(Command::SetParallaxOffset(0.1));
        batch.absorb(Command::SetParallaxOffset(0.9));
        assert_eq!(batch.dim, Some(0.8));
        assert_eq!(batch.parallax, Some(0.9));
    }

    #[test]
    fn only_latest_image_survives() {
        let mut batch = Coalesced::default();
        let a = tiny_set();
        let b = tiny_set();
        batch.absorb(Command::SetImage(a));
        batch.absorb(Command::SetImage(b.clone()));
        assert!(Arc::ptr_eq(batch.image.as_ref().unwrap(), &b));
    }

    #[test]
    fn toggles_accumulate_until_explicit_target() {
        let mut batch = Coalesced::default();
        batch.absorb(Command::ToggleBlur);
        batch.absorb(Command::ToggleBlur);
        assert_eq!(batch.toggles, 2);
        batch.absorb(Command::SetBlurEnabled(true));
        assert_eq!(batch.toggles, 0);
        assert_eq!(batch.blur_enabled, Some(true));
    }

    #[test]
    fn duplicate_redraw_requests_collapse() {
        let mut batch = Coalesced::default();
        batch.absorb(Command::RequestRedraw);
        batch.absorb(Command::RequestRedraw);
        assert!(batch.redraw);
    }

    #[test]
    fn aspect_computed_from_dimensions() {
        let set = ImageSet::new(RgbaImage::new(4, 2), Vec::new());
        assert!((set.aspect - 2.0).abs() < 1e-6);
    }
}
