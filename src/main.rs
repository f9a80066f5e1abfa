//! Binary entrypoint for the photo wallpaper.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::{ArgAction, Parser};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use photo_wallpaper::config::Configuration;
use photo_wallpaper::render::viewer;

/// Simple CLI
#[derive(Debug, Parser)]
#[command(name = "photo-wallpaper", about = "Animated GPU photo wallpaper")]
struct Cli {
    /// Photos to display, in order
    #[arg(value_name = "PHOTO", required = true)]
    photos: Vec<PathBuf>,

    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Shuffle the photo order at startup
    #[arg(long)]
    shuffle: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("photo_wallpaper={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = match &cli.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?
            .validated()
            .context("validating configuration")?,
        None => Configuration::default().validated()?,
    };

    let mut photos = cli.photos;
    ensure!(!photos.is_empty(), "at least one photo is required");
    if cli.shuffle {
        match cfg.startup_shuffle_seed {
            Some(seed) => photos.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed)),
            None => photos.shuffle(&mut rand::rng()),
        }
        info!("photo order shuffled");
    }

    viewer::run_windowed(cfg, photos)
}
