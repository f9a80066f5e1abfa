//! GPU textures for one image set: the original plus its blur levels, each
//! split into tiles when larger than the device texture limit.

use std::hash::{DefaultHasher, Hash, Hasher};

use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::processing::tiling::{TileRect, tile_edge, tile_grid};
use crate::render::pipelines::Pipelines;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileVertex {
    /// Position in quad space: the whole image spans `[-1, 1]` each axis.
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Identical content already resident; nothing uploaded.
    Unchanged,
    /// Same shape; pixel data re-uploaded in place.
    Reuploaded,
    /// Tile layout changed; everything reallocated.
    Reallocated,
}

struct Tile {
    rect: TileRect,
    texture: wgpu::Texture,
    bind: wgpu::BindGroup,
    vbuf: wgpu::Buffer,
}

struct Level {
    size: (u32, u32),
    hash: u64,
    tiles: Vec<Tile>,
}

pub struct TextureStore {
    levels: Vec<Level>,
    tile_edge: u32,
    released: bool,
}

impl TextureStore {
    pub fn new(device: &wgpu::Device, tile_ceiling: u32) -> Self {
        Self {
            levels: Vec::new(),
            tile_edge: tile_edge(device.limits().max_texture_dimension_2d, tile_ceiling),
            released: false,
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Content hash of level 0 (the unblurred original); used to detect
    /// same-photo updates.
    pub fn original_hash(&self) -> Option<u64> {
        self.levels.first().map(|level| level.hash)
    }

    /// Makes `images` resident. No-op when the identical content already is;
    /// re-uploads in place when only pixel data changed (same shapes, e.g. a
    /// re-blurred variant of the same photo); otherwise reallocates and
    /// re-tiles.
    pub fn load(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        images: &[&RgbaImage],
    ) -> LoadOutcome {
        self.released = false;
        let hashes: Vec<u64> = images.iter().map(|img| hash_image(img)).collect();

        if self.levels.len() == images.len()
            && self
                .levels
                .iter()
                .zip(&hashes)
                .all(|(level, hash)| level.hash == *hash)
        {
            return LoadOutcome::Unchanged;
        }

        if self.levels.len() == images.len()
            && self
                .levels
                .iter()
                .zip(images)
                .all(|(level, img)| level.size == img.dimensions())
        {
            for ((level, img), hash) in self.levels.iter_mut().zip(images).zip(&hashes) {
                if level.hash != *hash {
                    for tile in &level.tiles {
                        write_tile(queue, &tile.texture, img, tile.rect);
                    }
                    level.hash = *hash;
                }
            }
            return LoadOutcome::Reuploaded;
        }

        self.levels = images
            .iter()
            .zip(&hashes)
            .map(|(img, hash)| self.build_level(device, queue, pipelines, img, *hash))
            .collect();
        LoadOutcome::Reallocated
    }

    fn build_level(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pipelines: &Pipelines,
        image: &RgbaImage,
        hash: u64,
    ) -> Level {
        let (w, h) = image.dimensions();
        let tiles = tile_grid(w, h, self.tile_edge)
            .into_iter()
            .map(|rect| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("photo-tile"),
                    size: wgpu::Extent3d {
                        width: rect.w,
                        height: rect.h,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8UnormSrgb,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                write_tile(queue, &texture, image, rect);
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("photo-tile-bind"),
                    layout: &pipelines.tile_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    }],
                });
                let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("photo-tile-quad"),
                    contents: bytemuck::cast_slice(&tile_quad(rect, w, h)),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                Tile {
                    rect,
                    texture,
                    bind,
                    vbuf,
                }
            })
            .collect();
        Level {
            size: (w, h),
            hash,
            tiles,
        }
    }

    /// Issues one draw per tile of the given level. Out-of-range levels and
    /// released stores are a no-op, not an error.
    pub fn draw_level(&self, rpass: &mut wgpu::RenderPass<'_>, level: usize) {
        if self.released {
            return;
        }
        let Some(level) = self.levels.get(level) else {
            return;
        };
        for tile in &level.tiles {
            rpass.set_bind_group(1, &tile.bind, &[]);
            rpass.set_vertex_buffer(0, tile.vbuf.slice(..));
            rpass.draw(0..4, 0..1);
        }
    }

    /// Frees all GPU handles; safe to call more than once, frees once.
    pub fn release(&mut self) {
        if !self.released {
            self.levels.clear();
            self.released = true;
        }
    }
}

/// Uploads one tile's sub-rectangle straight from the full image buffer by
/// offsetting into it and striding over full rows.
fn write_tile(queue: &wgpu::Queue, texture: &wgpu::Texture, image: &RgbaImage, rect: TileRect) {
    let (w, h) = image.dimensions();
    debug_assert!(rect.x + rect.w <= w && rect.y + rect.h <= h);
    queue.write_texture(
        texture.as_image_copy(),
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 4 * (u64::from(rect.y) * u64::from(w) + u64::from(rect.x)),
            bytes_per_row: Some(4 * w),
            rows_per_image: Some(h),
        },
        wgpu::Extent3d {
            width: rect.w,
            height: rect.h,
            depth_or_array_layers: 1,
        },
    );
}

/// Triangle-strip quad for one tile, in whole-image quad space.
fn tile_quad(rect: TileRect, image_w: u32, image_h: u32) -> [TileVertex; 4] {
    let x0 = -1.0 + 2.0 * rect.x as f32 / image_w as f32;
    let x1 = -1.0 + 2.0 * (rect.x + rect.w) as f32 / image_w as f32;
    let y0 = 1.0 - 2.0 * rect.y as f32 / image_h as f32;
    let y1 = 1.0 - 2.0 * (rect.y + rect.h) as f32 / image_h as f32;
    [
        TileVertex { pos: [x0, y1], uv: [0.0, 1.0] }, // bottom-left
        TileVertex { pos: [x1, y1], uv: [1.0, 1.0] }, // bottom-right
        TileVertex { pos: [x0, y0], uv: [0.0, 0.0] }, // top-left
        TileVertex { pos: [x1, y0], uv: [1.0, 0.0] }, // top-right
    ]
}

fn hash_image(image: &RgbaImage) -> u64 {
    let mut hasher = DefaultHasher::new();
    image.dimensions().hash(&mut hasher);
    image.as_raw().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_quad_spans_full_image_for_single_tile() {
        let quad = tile_quad(TileRect { x: 0, y: 0, w: 100, h: 50 }, 100, 50);
        assert_eq!(quad[0].pos, [-1.0, -1.0]);
        assert_eq!(quad[3].pos, [1.0, 1.0]);
    }

    #[test]
    fn tile_quads_abut_without_gap() {
        // Two horizontal tiles: right edge of the first equals left edge of
        // the second.
        let left = tile_quad(TileRect { x: 0, y: 0, w: 512, h: 512 }, 1024, 512);
        let right = tile_quad(TileRect { x: 512, y: 0, w: 512, h: 512 }, 1024, 512);
        assert_eq!(left[1].pos[0], right[0].pos[0]);
        assert_eq!(left[1].pos[0], 0.0);
    }

    #[test]
    fn hash_distinguishes_content() {
        let black = RgbaImage::new(4, 4);
        let mut red = RgbaImage::new(4, 4);
        red.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        assert_ne!(hash_image(&black), hash_image(&red));
        assert_eq!(hash_image(&black), hash_image(&RgbaImage::new(4, 4)));
    }
}
