//! Per-frame compositing of the current and outgoing image sets.
//!
//! The compositor owns all mutable rendering state and is only ever touched
//! from the GPU-context thread; hosts marshal calls through the command
//! channel. It ticks the animators, rebuilds projections, and issues the
//! blended draws; a redraw is requested only while something still animates.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel as xchan;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::events::{DuotoneTarget, HostEvent, ImageSet};
use crate::render::animator::{Animator, Easing};
use crate::render::blend;
use crate::render::pipelines::{DrawParams, PARAM_SLOTS, Pipelines};
use crate::render::projection;
use crate::render::texture_store::TextureStore;

struct GpuCtx {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: Pipelines,
    width: u32,
    height: u32,
}

struct Picture {
    set: Arc<ImageSet>,
    store: TextureStore,
}

impl Picture {
    fn images(set: &ImageSet) -> Vec<&RgbaImage> {
        std::iter::once(&set.original)
            .chain(set.blur_levels.iter())
            .collect()
    }
}

pub struct Compositor {
    cfg: Configuration,
    host_tx: xchan::Sender<HostEvent>,

    // Ready iff `gpu` is populated.
    gpu: Option<GpuCtx>,
    current: Option<Picture>,
    outgoing: Option<Picture>,
    /// Image assigned before the context existed, applied once Ready.
    pending_image: Option<Arc<ImageSet>>,
    /// Latest image, kept as CPU bitmaps for replay after context loss.
    replay_image: Option<Arc<ImageSet>>,

    blur_enabled: bool,
    blur: Animator,
    crossfade: Animator,
    duotone_mix: Animator,
    touch: Animator,

    duotone_target: DuotoneTarget,
    /// Snapshot the current color interpolation restarts from, so a
    /// re-triggered color change never snaps.
    duotone_from: ([f32; 3], [f32; 3]),

    dim_amount: f32,
    parallax: f32,
    touch_point: [f32; 2],

    frame_serial: u32,
    dirty: bool,
}

impl Compositor {
    pub fn new(cfg: &Configuration, host_tx: xchan::Sender<HostEvent>) -> Self {
        let duotone_target = cfg.duotone.target(false);
        Self {
            host_tx,
            gpu: None,
            current: None,
            outgoing: None,
            pending_image: None,
            replay_image: None,
            blur_enabled: false,
            blur: Animator::new(0.0, cfg.blur_animation, Easing::EaseInOut),
            crossfade: Animator::new(0.0, cfg.crossfade, Easing::Linear),
            duotone_mix: Animator::new(1.0, cfg.duotone_animation, Easing::Linear),
            touch: Animator::new(0.0, cfg.touch_decay, Easing::EaseInOut),
            duotone_from: (duotone_target.light, duotone_target.dark),
            duotone_target,
            dim_amount: cfg.dim_amount,
            parallax: 0.5,
            touch_point: [0.5, 0.5],
            frame_serial: 0,
            dirty: false,
            cfg: cfg.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.gpu.is_some()
    }

    /// Whether the host should schedule another draw.
    pub fn needs_frame(&self) -> bool {
        self.gpu.is_some() && (self.dirty || self.animating())
    }

    fn animating(&self) -> bool {
        self.blur.is_running()
            || self.crossfade.is_running()
            || self.duotone_mix.is_running()
            || self.touch.is_running()
    }

    fn level_count(&self) -> usize {
        self.current
            .as_ref()
            .map(|pic| pic.set.level_count())
            .unwrap_or(0)
    }

    fn send(&self, event: HostEvent) {
        let _ = self.host_tx.send(event);
    }

    // ---- surface lifecycle ------------------------------------------------

    /// Transitions to Ready and replays the latest command of each kind
    /// against the fresh context: the buffered/last image, blur target, and
    /// duotone colors (all applied without animation).
    pub fn surface_created(
        &mut self,
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        (width, height): (u32, u32),
    ) {
        let pipelines = Pipelines::new(&device, format);
        self.gpu = Some(GpuCtx {
            device,
            queue,
            pipelines,
            width: width.max(1),
            height: height.max(1),
        });
        if let Some(set) = self.pending_image.take().or_else(|| self.replay_image.clone()) {
            self.apply_image(set, Instant::now(), false);
        }
        let levels = self.level_count() as f32;
        self.blur
            .snap_to(if self.blur_enabled { levels } else { 0.0 });
        self.duotone_mix.snap_to(1.0);
        self.duotone_from = (self.duotone_target.light, self.duotone_target.dark);
        self.touch.snap_to(0.0);
        self.dirty = true;
    }

    pub fn surface_resized(&mut self, (width, height): (u32, u32)) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.width = width.max(1);
            gpu.height = height.max(1);
            self.dirty = true;
        }
    }

    /// Back to Uninitialized. CPU-side replay state survives; GPU resources
    /// die with the context.
    pub fn surface_destroyed(&mut self) {
        self.gpu = None;
        self.current = None;
        self.outgoing = None;
    }

    // ---- inbound operations ----------------------------------------------

    pub fn set_image(&mut self, set: Arc<ImageSet>, now: Instant) {
        self.replay_image = Some(set.clone());
        if self.gpu.is_none() {
            self.pending_image = Some(set);
            return;
        }
        self.apply_image(set, now, true);
    }

    fn apply_image(&mut self, set: Arc<ImageSet>, now: Instant, animate: bool) {
        let Some(gpu) = self.gpu.as_ref() else { return };

        // Same photo re-prepared (e.g. re-blurred): update the resident set
        // in place without a crossfade. The store picks the cheapest upload.
        if let Some(cur) = self.current.as_mut() {
            let same_photo = cur.set.original.dimensions() == set.original.dimensions()
                && cur.set.original.as_raw() == set.original.as_raw();
            if same_photo {
                let images = Picture::images(&set);
                let outcome = cur.store.load(&gpu.device, &gpu.queue, &gpu.pipelines, &images);
                debug!(?outcome, "image set updated in place");
                cur.set = set;
                self.clamp_blur_to_levels(now);
                self.send(HostEvent::ReadyForNextImage);
                self.send(HostEvent::RequestRender);
                self.dirty = true;
                return;
            }
        }

        let mut store = TextureStore::new(&gpu.device, self.cfg.tile_size_ceiling);
        let images = Picture::images(&set);
        store.load(&gpu.device, &gpu.queue, &gpu.pipelines, &images);
        let fresh = Picture { set, store };

        if animate {
            if let Some(prev) = self.current.take() {
                // A single outgoing slot: a set superseded mid-crossfade
                // releases right away instead of queueing.
                if let Some(mut stale) = self.outgoing.replace(prev) {
                    stale.store.release();
                }
            }
            self.crossfade.start_from(0.0, 1.0, now);
        } else {
            self.outgoing = None;
            self.crossfade.snap_to(1.0);
        }
        self.current = Some(fresh);
        self.clamp_blur_to_levels(now);
        self.send(HostEvent::ReadyForNextImage);
        self.send(HostEvent::RequestRender);
        self.dirty = true;
    }

    /// Keeps the blur animator inside the new level range while preserving
    /// mid-flight continuity.
    fn clamp_blur_to_levels(&mut self, now: Instant) {
        let levels = self.level_count() as f32;
        if self.blur.value() > levels {
            self.blur.snap_to(levels);
        }
        let target = if self.blur_enabled { levels } else { 0.0 };
        if (self.blur.target() - target).abs() > f32::EPSILON {
            self.blur.start(target, now);
        }
    }

    /// Starts the blur animation toward fully-enabled or fully-disabled,
    /// always from the current value so mid-animation reversal is smooth.
    pub fn set_blur_target(&mut self, enabled: bool, now: Instant) {
        self.blur_enabled = enabled;
        let levels = self.level_count() as f32;
        self.blur
            .start(if enabled { levels } else { 0.0 }, now);
        self.dirty = true;
    }

    pub fn toggle_blur(&mut self, now: Instant) {
        self.set_blur_target(!self.blur_enabled, now);
    }

    /// Stored directly; the darkening overlay rides the blur animation.
    pub fn set_dim_amount(&mut self, amount: f32) {
        self.dim_amount = coerce_unit(amount, 0.0);
        self.dirty = true;
    }

    pub fn set_duotone_target(&mut self, target: DuotoneTarget, now: Instant) {
        let target = sanitize_duotone(target);
        let colors_changed = target.light != self.duotone_target.light
            || target.dark != self.duotone_target.dark;
        if colors_changed && target.animate && self.gpu.is_some() {
            // Restart from the last interpolated color, not the stale start.
            self.duotone_from = self.duotone_colors();
            self.duotone_target = target;
            self.duotone_mix.start_from(0.0, 1.0, now);
        } else {
            self.duotone_from = (target.light, target.dark);
            self.duotone_target = target;
            self.duotone_mix.snap_to(1.0);
        }
        self.dirty = true;
    }

    /// Not animated: the projection is rebuilt on the next draw.
    pub fn set_parallax_offset(&mut self, offset: f32) {
        self.parallax = coerce_unit(offset, 0.5);
        self.dirty = true;
    }

    pub fn set_touch_point(&mut self, x: f32, y: f32, now: Instant) {
        self.touch_point = [coerce_unit(x, 0.5), coerce_unit(y, 0.5)];
        self.touch.start_from(1.0, 0.0, now);
        self.dirty = true;
    }

    /// Redraw hint; the next draw happens if anything is dirty or animating.
    pub fn request_redraw(&mut self) {
        self.dirty = true;
    }

    fn duotone_colors(&self) -> ([f32; 3], [f32; 3]) {
        let t = self.duotone_mix.value().clamp(0.0, 1.0);
        (
            lerp3(self.duotone_from.0, self.duotone_target.light, t),
            lerp3(self.duotone_from.1, self.duotone_target.dark, t),
        )
    }

    // ---- drawing ----------------------------------------------------------

    /// Draws one frame into `view`. Returns `true` while animations still
    /// run and another frame should be scheduled. A GPU error marks the
    /// compositor not-ready; it never propagates to the host.
    pub fn draw(&mut self, view: &wgpu::TextureView, now: Instant) -> bool {
        if self.gpu.is_none() {
            return false;
        }

        self.blur.tick(now);
        self.crossfade.tick(now);
        self.duotone_mix.tick(now);
        self.touch.tick(now);

        // The outgoing set is released only once its crossfade-out has both
        // finished and reached full alpha; rapid re-entrant swaps are handled
        // at assignment time.
        if !self.crossfade.is_running() && self.crossfade.value() >= 1.0 {
            if let Some(mut out) = self.outgoing.take() {
                out.store.release();
                debug!("outgoing image set released");
            }
        }

        let levels = self.level_count() as f32;
        let blur_value = self.blur.value().clamp(0.0, levels.max(0.0));
        let blur_progress = if levels > 0.0 { blur_value / levels } else { 0.0 };
        let dim_alpha = self.dim_amount * blur_progress;
        let crossfade = self.crossfade.value().clamp(0.0, 1.0);
        let (light, dark) = self.duotone_colors();
        let duo_opacity = if self.duotone_target.enabled {
            if self.duotone_target.always_on { 1.0 } else { blur_progress }
        } else {
            0.0
        };
        let blend_flag = match self.duotone_target.blend {
            crate::events::DuotoneBlend::Normal => 0.0,
            crate::events::DuotoneBlend::Multiply => 1.0,
        };
        let grain_seed = (self.frame_serial % 997) as f32;
        let touch_strength = self.touch.value();

        let failed = {
            let Some(gpu) = self.gpu.as_ref() else {
                return false;
            };
            let viewport_aspect = gpu.width as f32 / gpu.height as f32;

            let mut slot = 0u32;
            let mut plan: Vec<(&TextureStore, usize, u32)> = Vec::new();
            let layers = [
                (self.outgoing.as_ref(), 1.0 - crossfade),
                (self.current.as_ref(), crossfade),
            ];
            for (picture, global_alpha) in layers {
                let Some(picture) = picture else { continue };
                for (level, alpha) in
                    layer_draws(picture.set.level_count(), blur_value, global_alpha)
                {
                    if slot >= PARAM_SLOTS {
                        break;
                    }
                    let vt = projection::build(
                        viewport_aspect,
                        picture.set.aspect,
                        self.parallax,
                        self.cfg.max_pan_screen_widths,
                    );
                    gpu.pipelines.write_draw_params(
                        &gpu.queue,
                        slot,
                        &DrawParams {
                            mvp: mvp_matrix(&vt),
                            duo_light: [light[0], light[1], light[2], duo_opacity],
                            duo_dark: [dark[0], dark[1], dark[2], blend_flag],
                            effects: [
                                alpha,
                                self.cfg.grain_strength,
                                grain_seed,
                                touch_strength,
                            ],
                            touch: [self.touch_point[0], self.touch_point[1], 0.0, 0.0],
                        },
                    );
                    plan.push((&picture.store, level, slot));
                    slot += 1;
                }
            }

            gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
            gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

            if dim_alpha > 0.0 {
                gpu.pipelines
                    .write_overlay_color(&gpu.queue, [0.0, 0.0, 0.0, dim_alpha]);
            }

            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("compositor-encoder"),
                });
            {
                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("compositor-pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                if !plan.is_empty() {
                    rpass.set_pipeline(&gpu.pipelines.photo);
                    for (store, level, slot) in &plan {
                        gpu.pipelines.bind_globals(&mut rpass, *slot);
                        store.draw_level(&mut rpass, *level);
                    }
                }
                if dim_alpha > 0.0 {
                    gpu.pipelines.draw_overlay(&mut rpass);
                }
            }
            gpu.queue.submit([encoder.finish()]);

            let mut failed = false;
            for scope in ["out-of-memory", "validation"] {
                if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
                    warn!("GPU {scope} error during draw, suspending: {err}");
                    failed = true;
                }
            }
            failed
        };

        if failed {
            // Not-ready until the next surface lifecycle hook; the latest
            // state of each command kind is replayed then.
            self.gpu = None;
            return false;
        }

        self.frame_serial = self.frame_serial.wrapping_add(1);
        self.dirty = false;
        self.animating()
    }
}

/// Level draws for one image set layer: blends between the floor and ceil
/// blur levels by the fractional remainder, re-weighted against the layer's
/// own global alpha. Level index 0 is the unblurred original.
fn layer_draws(level_count: usize, blur_value: f32, global_alpha: f32) -> Vec<(usize, f32)> {
    let cap = level_count as f32;
    let value = blur_value.clamp(0.0, cap);
    let floor = value.floor();
    let fraction = value - floor;
    let Some((floor_alpha, ceil_alpha)) = blend::layer_alphas(global_alpha, fraction) else {
        return Vec::new();
    };
    let mut draws = Vec::with_capacity(2);
    if floor_alpha > 0.0 {
        draws.push((floor as usize, floor_alpha));
    }
    if ceil_alpha > 0.0 {
        draws.push(((floor as usize + 1).min(level_count), ceil_alpha));
    }
    draws
}

/// Orthographic projection combined with the horizontal image scale.
/// Column-major, matching WGSL `mat4x4<f32>` memory layout.
fn mvp_matrix(vt: &projection::ViewTransform) -> [[f32; 4]; 4] {
    let b = &vt.bounds;
    let sx = 2.0 / (b.right - b.left);
    let sy = 2.0 / (b.top - b.bottom);
    [
        [sx * vt.scaled_aspect, 0.0, 0.0, 0.0],
        [0.0, sy, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [
            -(b.right + b.left) / (b.right - b.left),
            -(b.top + b.bottom) / (b.top - b.bottom),
            0.0,
            1.0,
        ],
    ]
}

fn coerce_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn sanitize_duotone(mut target: DuotoneTarget) -> DuotoneTarget {
    for c in target.light.iter_mut().chain(target.dark.iter_mut()) {
        *c = coerce_unit(*c, 0.0);
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_blurred_draws_single_level() {
        let draws = layer_draws(3, 3.0, 1.0);
        assert_eq!(draws, vec![(3, 1.0)]);
    }

    #[test]
    fn mid_blur_draws_floor_and_ceil() {
        // At full global alpha the floor draw is opaque and the ceil draw
        // mixes by the fraction; anything less lets the clear color bleed
        // through the pair.
        let draws = layer_draws(3, 1.5, 1.0);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].0, 1);
        assert_eq!(draws[1].0, 2);
        assert!((draws[0].1 - 1.0).abs() < 1e-6);
        assert!((draws[1].1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn transparent_layer_draws_nothing() {
        assert!(layer_draws(3, 1.5, 0.0).is_empty());
    }

    #[test]
    fn no_levels_draws_original_only() {
        let draws = layer_draws(0, 2.0, 0.7);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].0, 0);
        assert!((draws[0].1 - 0.7).abs() < 1e-6);
    }

    #[test]
    fn unit_projection_matrix_is_identity_scaled() {
        let m = mvp_matrix(&projection::ViewTransform::UNIT);
        assert_eq!(m[0][0], 1.0);
        assert_eq!(m[1][1], 1.0);
        assert_eq!(m[3][0], 0.0);
    }
}
