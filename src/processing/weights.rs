//! Compressed Gaussian sampling weights for the separable blur passes.
//!
//! A naive kernel of radius `r` needs `2r + 1` texture reads per pixel. With a
//! filtering sampler, two adjacent taps can be folded into a single read at
//! their weighted centroid, roughly halving the read count. The table for a
//! given radius is pure data, so it is memoized per integer radius.

use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound on compressed taps per kernel (center tap included).
pub const MAX_TAPS: usize = 16;

/// One-sided compressed kernel: `weights[0]`/`offsets[0]` is the center tap,
/// every further entry is mirrored across the center by the shader.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    pub weights: Vec<f32>,
    pub offsets: Vec<f32>,
}

impl WeightTable {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Builds the compressed kernel for an integer `radius >= 1`.
///
/// Callers must skip the blur entirely for `radius < 1`; this function treats
/// such input as radius 1.
pub fn compressed_taps(radius: u32) -> WeightTable {
    let radius = radius.max(1);
    let sigma = (radius as f32 / 3.0).max(0.5);

    // Standard one-sided Gaussian, normalized so w0 + 2*sum(w1..) == 1.
    let mut raw = Vec::with_capacity(radius as usize + 1);
    for i in 0..=radius {
        let x = i as f32;
        raw.push((-0.5 * x * x / (sigma * sigma)).exp());
    }
    let norm = raw[0] + 2.0 * raw[1..].iter().sum::<f32>();
    for w in &mut raw {
        *w /= norm;
    }

    // Merge consecutive pairs (1,2), (3,4), ... into centroid taps.
    let mut weights = vec![raw[0]];
    let mut offsets = vec![0.0f32];
    let mut i = 1usize;
    while i <= radius as usize {
        let a = raw[i];
        if i + 1 <= radius as usize {
            let b = raw[i + 1];
            let combined = a + b;
            weights.push(combined);
            offsets.push((a * i as f32 + b * (i + 1) as f32) / combined);
        } else {
            weights.push(a);
            offsets.push(i as f32);
        }
        i += 2;
    }

    // Deterministic truncation, then renormalize so the invariant
    // w0 + 2*sum(rest) == 1 survives the dropped tail.
    weights.truncate(MAX_TAPS);
    offsets.truncate(weights.len());
    let sum = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
    if sum > 0.0 {
        for w in &mut weights {
            *w /= sum;
        }
    }

    WeightTable { weights, offsets }
}

/// Per-radius memoization of [`compressed_taps`]. Owned by whoever runs blur
/// passes; intentionally not a process-wide static.
#[derive(Debug, Default)]
pub struct WeightCache {
    entries: HashMap<u32, Arc<WeightTable>>,
}

impl WeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, radius: u32) -> Arc<WeightTable> {
        self.entries
            .entry(radius.max(1))
            .or_insert_with(|| Arc::new(compressed_taps(radius)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirrored_sum(table: &WeightTable) -> f32 {
        table.weights[0] + 2.0 * table.weights[1..].iter().sum::<f32>()
    }

    #[test]
    fn weights_sum_to_one_for_all_radii() {
        for r in 1..=200u32 {
            let table = compressed_taps(r);
            let sum = mirrored_sum(&table);
            assert!(
                (sum - 1.0).abs() <= 1e-4,
                "radius {r}: mirrored sum {sum}"
            );
        }
    }

    #[test]
    fn offsets_strictly_increasing() {
        for r in [1, 2, 3, 7, 15, 40, 120] {
            let table = compressed_taps(r);
            for pair in table.offsets.windows(2) {
                assert!(pair[0] < pair[1], "radius {r}: offsets {:?}", table.offsets);
            }
        }
    }

    #[test]
    fn tap_count_capped() {
        for r in 1..=400u32 {
            assert!(compressed_taps(r).len() <= MAX_TAPS);
        }
    }

    #[test]
    fn merged_offsets_sit_between_source_taps() {
        // The centroid of taps (1, 2) must land inside (1.0, 2.0).
        let table = compressed_taps(8);
        assert!(table.offsets[1] > 1.0 && table.offsets[1] < 2.0);
    }

    #[test]
    fn center_tap_unmerged() {
        for r in 1..=32u32 {
            let table = compressed_taps(r);
            assert_eq!(table.offsets[0], 0.0);
        }
    }

    #[test]
    fn cache_returns_same_entry() {
        let mut cache = WeightCache::new();
        let a = cache.get(9);
        let b = cache.get(9);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
