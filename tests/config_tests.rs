use std::io::Write;
use std::time::Duration;

use photo_wallpaper::config::{Configuration, DuotoneBlendOption};
use photo_wallpaper::events::DuotoneBlend;

#[test]
fn defaults_are_valid() {
    let cfg = Configuration::default().validated().unwrap();
    assert_eq!(cfg.crossfade, Duration::from_millis(1200));
    assert_eq!(cfg.dwell, Duration::from_secs(8));
    assert!((cfg.max_blur_radius - 100.0).abs() < f32::EPSILON);
    assert!(!cfg.duotone.enabled);
}

#[test]
fn parse_kebab_case_with_humantime_durations() {
    let yaml = r#"
crossfade: 2s
blur-animation: 500ms
dwell: 1m
max-blur-radius: 60
dim-amount: 0.25
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.crossfade, Duration::from_secs(2));
    assert_eq!(cfg.blur_animation, Duration::from_millis(500));
    assert_eq!(cfg.dwell, Duration::from_secs(60));
    assert!((cfg.max_blur_radius - 60.0).abs() < f32::EPSILON);
    assert!((cfg.dim_amount - 0.25).abs() < f32::EPSILON);
    // Unmentioned fields keep their defaults.
    assert_eq!(cfg.tile_size_ceiling, 512);
}

#[test]
fn parse_duotone_block() {
    let yaml = r#"
duotone:
  enabled: true
  always-on: true
  light: [255, 241, 211]
  dark: [22, 30, 51]
  blend: multiply
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.duotone.enabled);
    assert!(cfg.duotone.always_on);
    assert_eq!(cfg.duotone.blend, DuotoneBlendOption::Multiply);

    let target = cfg.duotone.target(true);
    assert_eq!(target.blend, DuotoneBlend::Multiply);
    assert!(target.animate);
    // Colors normalized to [0, 1].
    assert!((target.light[0] - 1.0).abs() < 1e-6);
    assert!((target.dark[0] - 22.0 / 255.0).abs() < 1e-6);
}

#[test]
fn parse_startup_shuffle_seed() {
    let cfg: Configuration = serde_yaml::from_str("startup-shuffle-seed: 7\n").unwrap();
    assert_eq!(cfg.startup_shuffle_seed, Some(7));
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.startup_shuffle_seed, None);
}

#[test]
fn from_yaml_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "crossfade: 750ms\nmax-pan-screen-widths: 2.5").unwrap();
    let cfg = Configuration::from_yaml_file(file.path())
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.crossfade, Duration::from_millis(750));
    assert!((cfg.max_pan_screen_widths - 2.5).abs() < f32::EPSILON);
}

#[test]
fn validation_rejects_out_of_range_values() {
    let cfg: Configuration = serde_yaml::from_str("dim-amount: 1.5").unwrap();
    assert!(cfg.validated().is_err());

    let cfg: Configuration = serde_yaml::from_str("crossfade: 0s").unwrap();
    assert!(cfg.validated().is_err());

    let cfg: Configuration = serde_yaml::from_str("tile-size-ceiling: 16").unwrap();
    assert!(cfg.validated().is_err());

    let cfg: Configuration = serde_yaml::from_str("max-blur-radius: -1").unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn missing_file_is_an_error() {
    assert!(Configuration::from_yaml_file("/nonexistent/config.yaml").is_err());
}
