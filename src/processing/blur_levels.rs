//! Offline blur-level generation.
//!
//! Per photo, produces a small ordered set of progressively blurred,
//! resolution-reduced copies of the source on an isolated, short-lived GPU
//! context. Each level is a three-pass pipeline: pass-through resample to
//! the level's target size, then separable horizontal and vertical blur
//! passes ping-ponging between two offscreen targets.

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use std::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use crate::processing::weights::{MAX_TAPS, WeightCache};

/// Hard cap on levels regardless of requested radius.
pub const MAX_LEVELS: usize = 4;

/// Target radius and downscale divisor for one level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPlan {
    pub radius: f32,
    pub divisor: u32,
}

/// One generated level: the blurred bitmap and the radius it was blurred at.
#[derive(Debug)]
pub struct BlurLevel {
    pub image: RgbaImage,
    pub radius: f32,
}

/// Level count for a requested maximum radius. Radii under 1 produce no
/// levels (callers show the unblurred source).
pub fn level_count(max_radius: f32) -> usize {
    if !max_radius.is_finite() || max_radius < 1.0 {
        0
    } else if max_radius < 10.0 {
        1
    } else if max_radius < 40.0 {
        2
    } else {
        // Lower clamp of 2 keeps the count from dropping below the <40 band
        // at the boundary.
        ((max_radius / 40.0).ceil() as usize).clamp(2, MAX_LEVELS)
    }
}

/// Plans the per-level radii and downscale divisors.
///
/// Radii follow `max * (k/n)^2`: quadratic easing intentionally compresses
/// the most-blurred states together and spreads the sharp-to-slightly-blurred
/// range across more of the animation.
pub fn plan_levels(max_radius: f32, ceiling: f32) -> Vec<LevelPlan> {
    let ceiling = if ceiling.is_finite() { ceiling.max(0.0) } else { 0.0 };
    let max_radius = if max_radius.is_finite() {
        max_radius.clamp(0.0, ceiling)
    } else {
        0.0
    };
    let count = level_count(max_radius);
    (1..=count)
        .map(|k| {
            let t = k as f32 / count as f32;
            let radius = max_radius * t * t;
            LevelPlan {
                radius,
                divisor: divisor_for(radius),
            }
        })
        .collect()
}

/// Downscale divisor in `[2, 8]`, proportional to `radius / 40`.
fn divisor_for(radius: f32) -> u32 {
    ((radius / 40.0) * 8.0).round().clamp(2.0, 8.0) as u32
}

/// Generates the blur levels for `source`. Returns an empty vector when no
/// blur is requested or when any GPU step fails; the caller then falls back
/// to the unblurred source for every level. Cancellation is checked between
/// levels and abandons the remaining ones.
pub fn generate(
    source: &RgbaImage,
    max_radius: f32,
    ceiling: f32,
    cancel: &CancellationToken,
) -> Vec<BlurLevel> {
    let plans = plan_levels(max_radius, ceiling);
    if plans.is_empty() {
        return Vec::new();
    }

    // Throwaway context; everything it owns is released when this function
    // returns, success or failure.
    let ctx = match GeneratorContext::new() {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!("blur generation unavailable: {err:?}");
            return Vec::new();
        }
    };

    let source_tex = match ctx.upload_source(source) {
        Ok(tex) => tex,
        Err(err) => {
            warn!("blur source upload failed: {err:?}");
            return Vec::new();
        }
    };

    let mut cache = WeightCache::new();
    let mut levels = Vec::with_capacity(plans.len());
    for plan in &plans {
        if cancel.is_cancelled() {
            debug!("blur generation cancelled after {} levels", levels.len());
            break;
        }
        match ctx.render_level(&source_tex, source.dimensions(), *plan, &mut cache) {
            Ok(image) => levels.push(BlurLevel {
                image,
                radius: plan.radius,
            }),
            Err(err) => {
                warn!("blur generation aborted: {err:?}");
                return Vec::new();
            }
        }
    }
    levels
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurParams {
    /// `(weight, offset, 0, 0)` per compressed tap.
    taps: [[f32; 4]; MAX_TAPS],
    /// Step per tap unit, in UV space: `(1/w, 0)` or `(0, 1/h)`.
    dir: [f32; 2],
    tap_count: u32,
    _pad: u32,
}

struct GeneratorContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    copy_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    copy_layout: wgpu::BindGroupLayout,
    blur_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

const LEVEL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

impl GeneratorContext {
    fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("request headless adapter")?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("blur-level-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("request headless device")?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blur-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let copy_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur-copy-layout"),
            entries: &[texture_entry(0), sampler_entry(1)],
        });
        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur-pass-layout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let copy_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blur-copy-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/passthrough.wgsl").into()),
        });
        let blur_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blur-pass-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blur.wgsl").into()),
        });

        let make_pipeline = |label: &str,
                             layout: &wgpu::BindGroupLayout,
                             shader: &wgpu::ShaderModule|
         -> wgpu::RenderPipeline {
            let pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipe_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: LEVEL_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let copy_pipeline = make_pipeline("blur-copy-pipeline", &copy_layout, &copy_shader);
        let blur_pipeline = make_pipeline("blur-pass-pipeline", &blur_layout, &blur_shader);

        Ok(Self {
            device,
            queue,
            copy_pipeline,
            blur_pipeline,
            copy_layout,
            blur_layout,
            sampler,
        })
    }

    fn upload_source(&self, source: &RgbaImage) -> Result<wgpu::Texture> {
        let (w, h) = source.dimensions();
        let max_dim = self.device.limits().max_texture_dimension_2d;
        if w == 0 || h == 0 || w > max_dim || h > max_dim {
            return Err(anyhow!("source {w}x{h} outside device texture limits"));
        }
        let size = wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        };
        let tex = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("blur-source"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: LEVEL_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            tex.as_image_copy(),
            source.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * w),
                rows_per_image: Some(h),
            },
            size,
        );
        Ok(tex)
    }

    fn render_level(
        &self,
        source_tex: &wgpu::Texture,
        source_size: (u32, u32),
        plan: LevelPlan,
        cache: &mut WeightCache,
    ) -> Result<RgbaImage> {
        let target_w = (source_size.0 / plan.divisor).max(1);
        let target_h = (source_size.1 / plan.divisor).max(1);
        // Radius expressed in target-resolution texels.
        let texel_radius = (plan.radius / plan.divisor as f32).round() as u32;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let make_target = |label: &str| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: target_w,
                    height: target_h,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: LEVEL_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        };
        // Ping-pong pair: A receives the resample and the vertical pass,
        // B holds the horizontal pass output.
        let tex_a = make_target("blur-ping");
        let tex_b = make_target("blur-pong");
        let view_a = tex_a.create_view(&wgpu::TextureViewDescriptor::default());
        let view_b = tex_b.create_view(&wgpu::TextureViewDescriptor::default());
        let source_view = source_tex.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blur-level-encoder"),
            });

        // Pass A: full-resolution source resampled by the GPU into the
        // target-resolution buffer.
        let copy_bind = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur-copy-bind"),
            layout: &self.copy_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.fullscreen_pass(&mut encoder, &self.copy_pipeline, &copy_bind, &view_a);

        if texel_radius >= 1 {
            let table = cache.get(texel_radius);
            let mut taps = [[0.0f32; 4]; MAX_TAPS];
            for (slot, (w, o)) in taps
                .iter_mut()
                .zip(table.weights.iter().zip(table.offsets.iter()))
            {
                slot[0] = *w;
                slot[1] = *o;
            }
            let params_for = |dir: [f32; 2]| {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("blur-params"),
                        contents: bytemuck::bytes_of(&BlurParams {
                            taps,
                            dir,
                            tap_count: table.len() as u32,
                            _pad: 0,
                        }),
                        usage: wgpu::BufferUsages::UNIFORM,
                    })
            };

            // Pass B: horizontal, A -> B. Pass C: vertical, B -> A.
            let horizontal = params_for([1.0 / target_w as f32, 0.0]);
            let bind_b = self.blur_bind(&view_a, &horizontal);
            self.fullscreen_pass(&mut encoder, &self.blur_pipeline, &bind_b, &view_b);

            let vertical = params_for([0.0, 1.0 / target_h as f32]);
            let bind_c = self.blur_bind(&view_b, &vertical);
            self.fullscreen_pass(&mut encoder, &self.blur_pipeline, &bind_c, &view_a);
        }

        // Read back the final buffer, honoring the 256-byte row alignment.
        let bytes_per_row = (4 * target_w).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blur-readback"),
            size: u64::from(bytes_per_row) * u64::from(target_h),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            tex_a.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(target_h),
                },
            },
            wgpu::Extent3d {
                width: target_w,
                height: target_h,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit([encoder.finish()]);

        for scope in ["out-of-memory", "validation"] {
            if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
                return Err(anyhow!("GPU {scope} error during blur level: {err}"));
            }
        }

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        let _ = self.device.poll(wgpu::PollType::Wait);
        receiver
            .recv()
            .context("receive map result")?
            .context("map readback buffer")?;

        let mut pixels = Vec::with_capacity((4 * target_w * target_h) as usize);
        {
            let data = slice.get_mapped_range();
            for row in 0..target_h {
                let start = (row * bytes_per_row) as usize;
                pixels.extend_from_slice(&data[start..start + (4 * target_w) as usize]);
            }
        }
        readback.unmap();

        RgbaImage::from_raw(target_w, target_h, pixels)
            .ok_or_else(|| anyhow!("readback size mismatch for {target_w}x{target_h}"))
    }

    fn blur_bind(&self, input: &wgpu::TextureView, params: &wgpu::Buffer) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur-pass-bind"),
            layout: &self.blur_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    }

    fn fullscreen_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        bind: &wgpu::BindGroup,
        target: &wgpu::TextureView,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blur-fullscreen-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
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
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind, &[]);
        pass.draw(0..3, 0..1);
    }
}
