//! Per-context shader program registry.
//!
//! Owns the render pipelines, bind group layouts, sampler, and the
//! dynamic-offset uniform slab used for per-draw parameters. Created once
//! per surface context and dropped with it on context loss; deliberately
//! not a process-wide static.

use bytemuck::{Pod, Zeroable};

/// Distinct per-draw parameter slots available per frame: outgoing
/// floor/ceil level, current floor/ceil level.
pub const PARAM_SLOTS: u32 = 4;
/// Slot stride; matches the minimum dynamic uniform offset alignment.
pub const PARAM_STRIDE: u64 = 256;

/// Uniform block for one photo-layer draw. Layout mirrors `photo.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DrawParams {
    pub mvp: [[f32; 4]; 4],
    /// rgb = duotone light color, w = duotone opacity.
    pub duo_light: [f32; 4],
    /// rgb = duotone dark color, w = blend mode (0 normal, 1 multiply).
    pub duo_dark: [f32; 4],
    /// x = layer alpha, y = grain strength, z = grain seed, w = touch
    /// distortion strength.
    pub effects: [f32; 4],
    /// xy = touch point in image UV space.
    pub touch: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OverlayParams {
    color: [f32; 4],
}

pub struct Pipelines {
    pub photo: wgpu::RenderPipeline,
    pub overlay: wgpu::RenderPipeline,
    /// Group 1 layout: one texture view per tile.
    pub tile_layout: wgpu::BindGroupLayout,
    globals: wgpu::BindGroup,
    overlay_bind: wgpu::BindGroup,
    params: wgpu::Buffer,
    overlay_params: wgpu::Buffer,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("photo-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw-params"),
            size: PARAM_STRIDE * u64::from(PARAM_SLOTS),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let overlay_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay-params"),
            size: std::mem::size_of::<OverlayParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<DrawParams>() as u64
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let tile_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tile-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let overlay_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let globals = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals-bind"),
            layout: &globals_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &params,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<DrawParams>() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        let overlay_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overlay-bind"),
            layout: &overlay_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: overlay_params.as_entire_binding(),
            }],
        });

        let photo_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("photo-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/photo.wgsl").into()),
        });
        let overlay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/overlay.wgsl").into()),
        });

        let photo_pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("photo-pipe-layout"),
            bind_group_layouts: &[&globals_layout, &tile_layout],
            push_constant_ranges: &[],
        });
        let photo = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("photo-pipeline"),
            layout: Some(&photo_pipe_layout),
            vertex: wgpu::VertexState {
                module: &photo_shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: 16,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &photo_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let overlay_pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay-pipe-layout"),
            bind_group_layouts: &[&overlay_layout],
            push_constant_ranges: &[],
        });
        let overlay = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay-pipeline"),
            layout: Some(&overlay_pipe_layout),
            vertex: wgpu::VertexState {
                module: &overlay_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &overlay_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            photo,
            overlay,
            tile_layout,
            globals,
            overlay_bind,
            params,
            overlay_params,
        }
    }

    pub fn write_draw_params(&self, queue: &wgpu::Queue, slot: u32, params: &DrawParams) {
        debug_assert!(slot < PARAM_SLOTS);
        queue.write_buffer(
            &self.params,
            PARAM_STRIDE * u64::from(slot),
            bytemuck::bytes_of(params),
        );
    }

    pub fn write_overlay_color(&self, queue: &wgpu::Queue, color: [f32; 4]) {
        queue.write_buffer(
            &self.overlay_params,
            0,
            bytemuck::bytes_of(&OverlayParams { color }),
        );
    }

    /// Binds the shared globals for one photo draw at the given slot.
    pub fn bind_globals(&self, rpass: &mut wgpu::RenderPass<'_>, slot: u32) {
        rpass.set_bind_group(0, &self.globals, &[(PARAM_STRIDE * u64::from(slot)) as u32]);
    }

    /// Draws the flat overlay quad with the color previously written via
    /// [`Self::write_overlay_color`].
    pub fn draw_overlay(&self, rpass: &mut wgpu::RenderPass<'_>) {
        rpass.set_pipeline(&self.overlay);
        rpass.set_bind_group(0, &self.overlay_bind, &[]);
        rpass.draw(0..3, 0..1);
    }
}
