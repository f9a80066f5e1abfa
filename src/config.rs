use std::path::Path;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::events::{DuotoneBlend, DuotoneTarget};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Cross-fade duration between two image sets.
    #[serde(with = "humantime_serde")]
    pub crossfade: Duration,
    /// Blur enable/disable animation duration.
    #[serde(with = "humantime_serde")]
    pub blur_animation: Duration,
    /// Duotone color-change animation duration.
    #[serde(with = "humantime_serde")]
    pub duotone_animation: Duration,
    /// Decay time of the touch-driven chromatic distortion.
    #[serde(with = "humantime_serde")]
    pub touch_decay: Duration,
    /// Time an image remains on screen before the next photo is requested.
    #[serde(with = "humantime_serde")]
    pub dwell: Duration,
    /// Requested maximum blur radius (source-resolution pixels).
    pub max_blur_radius: f32,
    /// Hard ceiling the generator clamps any requested radius to.
    pub blur_radius_ceiling: f32,
    /// Tile-size ceiling; the effective tile edge is
    /// `min(device-max-texture-size, ceiling)`.
    pub tile_size_ceiling: u32,
    /// Maximum horizontal pan travel, in screen widths.
    pub max_pan_screen_widths: f32,
    /// Darkening overlay strength in `[0, 1]`; rides the blur animation.
    pub dim_amount: f32,
    /// Film grain strength in `[0, 1]`.
    pub grain_strength: f32,
    /// Duotone color remap settings.
    pub duotone: DuotoneOptions,
    /// Optional deterministic seed for the initial playlist shuffle.
    pub startup_shuffle_seed: Option<u64>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde
    /// defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(!self.crossfade.is_zero(), "crossfade must be positive");
        ensure!(
            !self.blur_animation.is_zero(),
            "blur-animation must be positive"
        );
        ensure!(
            self.max_blur_radius.is_finite() && self.max_blur_radius >= 0.0,
            "max-blur-radius must be a non-negative number"
        );
        ensure!(
            self.blur_radius_ceiling.is_finite() && self.blur_radius_ceiling >= 1.0,
            "blur-radius-ceiling must be at least 1"
        );
        ensure!(self.tile_size_ceiling >= 64, "tile-size-ceiling must be >= 64");
        ensure!(
            self.max_pan_screen_widths.is_finite() && self.max_pan_screen_widths >= 0.0,
            "max-pan-screen-widths must be non-negative"
        );
        ensure!(
            (0.0..=1.0).contains(&self.dim_amount),
            "dim-amount must be within [0, 1]"
        );
        ensure!(
            (0.0..=1.0).contains(&self.grain_strength),
            "grain-strength must be within [0, 1]"
        );
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            crossfade: Duration::from_millis(1200),
            blur_animation: Duration::from_millis(750),
            duotone_animation: Duration::from_millis(450),
            touch_decay: Duration::from_millis(800),
            dwell: Duration::from_secs(8),
            max_blur_radius: 100.0,
            blur_radius_ceiling: 160.0,
            tile_size_ceiling: 512,
            max_pan_screen_widths: 1.8,
            dim_amount: 0.4,
            grain_strength: 0.04,
            duotone: DuotoneOptions::default(),
            startup_shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DuotoneOptions {
    pub enabled: bool,
    /// Decouple duotone opacity from blur progress.
    pub always_on: bool,
    pub light: [u8; 3],
    pub dark: [u8; 3],
    pub blend: DuotoneBlendOption,
}

impl DuotoneOptions {
    /// Runtime target with colors in normalized linear-ish `[0, 1]` floats.
    pub fn target(&self, animate: bool) -> DuotoneTarget {
        DuotoneTarget {
            enabled: self.enabled,
            always_on: self.always_on,
            light: normalize_rgb(self.light),
            dark: normalize_rgb(self.dark),
            blend: self.blend.into(),
            animate,
        }
    }
}

impl Default for DuotoneOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            always_on: false,
            light: [255, 241, 211],
            dark: [22, 30, 51],
            blend: DuotoneBlendOption::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuotoneBlendOption {
    Normal,
    Multiply,
}

impl From<DuotoneBlendOption> for DuotoneBlend {
    fn from(value: DuotoneBlendOption) -> Self {
        match value {
            DuotoneBlendOption::Normal => Self::Normal,
            DuotoneBlendOption::Multiply => Self::Multiply,
        }
    }
}

pub fn normalize_rgb(rgb: [u8; 3]) -> [f32; 3] {
    [
        f32::from(rgb[0]) / 255.0,
        f32::from(rgb[1]) / 255.0,
        f32::from(rgb[2]) / 255.0,
    ]
}
