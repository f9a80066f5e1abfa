//! Tile-grid math for images larger than the device texture limit.

/// One GPU-texture-sized rectangle of a larger source image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Effective tile edge: the device limit capped by the configured ceiling so
/// low-end devices keep uploads and per-tile memory bounded.
pub fn tile_edge(device_max: u32, ceiling: u32) -> u32 {
    device_max.min(ceiling).max(1)
}

/// Partitions a `width x height` image into non-overlapping, gap-free tiles
/// of at most `tile x tile` pixels, row-major. Edge tiles are clipped to the
/// remaining pixels.
pub fn tile_grid(width: u32, height: u32, tile: u32) -> Vec<TileRect> {
    let tile = tile.max(1);
    let cols = width.div_ceil(tile).max(1);
    let rows = height.div_ceil(tile).max(1);
    let mut tiles = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let x = col * tile;
            let y = row * tile;
            tiles.push(TileRect {
                x,
                y,
                w: tile.min(width.saturating_sub(x)).max(1),
                h: tile.min(height.saturating_sub(y)).max(1),
            });
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tile_when_image_fits() {
        let tiles = tile_grid(300, 200, 512);
        assert_eq!(tiles, vec![TileRect { x: 0, y: 0, w: 300, h: 200 }]);
    }

    #[test]
    fn tile_count_matches_ceil_formula() {
        for (w, h, t) in [(1024, 768, 512), (513, 512, 512), (2000, 100, 256), (7, 7, 2)] {
            let tiles = tile_grid(w, h, t);
            let expected = w.div_ceil(t) * h.div_ceil(t);
            assert_eq!(tiles.len() as u32, expected, "{w}x{h} tile {t}");
        }
    }

    #[test]
    fn tiles_cover_image_exactly() {
        let (w, h, t) = (1300u32, 700u32, 512u32);
        let tiles = tile_grid(w, h, t);
        let mut covered = vec![false; (w * h) as usize];
        for tile in &tiles {
            for y in tile.y..tile.y + tile.h {
                for x in tile.x..tile.x + tile.w {
                    let idx = (y * w + x) as usize;
                    assert!(!covered[idx], "overlap at ({x},{y})");
                    covered[idx] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c), "gap in tile coverage");
    }

    #[test]
    fn edge_tiles_clipped() {
        let tiles = tile_grid(513, 512, 512);
        assert_eq!(tiles[1].w, 1);
        assert_eq!(tiles[1].h, 512);
    }

    #[test]
    fn tile_edge_caps_device_limit() {
        assert_eq!(tile_edge(4096, 512), 512);
        assert_eq!(tile_edge(256, 512), 256);
        assert_eq!(tile_edge(0, 512), 1);
    }
}
