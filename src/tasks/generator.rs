//! Background decode and blur-generation worker.
//!
//! Runs on its own tokio runtime so the GPU thread never blocks on I/O or
//! the blur readbacks. At most one photo is in flight: the next decode only
//! starts after the renderer acknowledged the previous one with
//! `ReadyForNextImage`, followed by the configured dwell.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel as xchan;
use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::Configuration;
use crate::events::{HostEvent, ImageSet};
use crate::processing::blur_levels;
use crate::render::viewer::RendererHandle;

pub fn spawn(
    cfg: Configuration,
    photos: Vec<PathBuf>,
    handle: RendererHandle,
    host_rx: xchan::Receiver<HostEvent>,
    cancel: CancellationToken,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("worker runtime failed to start: {err}");
                return;
            }
        };
        runtime.block_on(run(cfg, photos, handle, host_rx, cancel));
    })
}

async fn run(
    cfg: Configuration,
    photos: Vec<PathBuf>,
    handle: RendererHandle,
    host_rx: xchan::Receiver<HostEvent>,
    cancel: CancellationToken,
) {
    if photos.is_empty() {
        warn!("no photos to display");
        return;
    }
    let mut index = 0usize;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let path = photos[index % photos.len()].clone();
        index += 1;

        match prepare(&cfg, &path, &cancel).await {
            Ok(set) => {
                debug!(
                    path = %path.display(),
                    levels = set.level_count(),
                    "image prepared"
                );
                handle.set_image(Arc::new(set));
            }
            Err(err) => {
                warn!(path = %path.display(), "skipping photo: {err:#}");
                continue;
            }
        }

        if !wait_ready(&host_rx, &cancel).await {
            return;
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(cfg.dwell) => {}
        }
    }
}

/// Decodes the photo and generates its blur levels, both off the async
/// threads. Blur failure degrades to the unblurred source.
async fn prepare(
    cfg: &Configuration,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<ImageSet> {
    let decoded = {
        let path = path.to_owned();
        tokio::task::spawn_blocking(move || decode_rgba8_apply_exif(&path))
            .await
            .context("decode task aborted")??
    };

    let max_radius = cfg.max_blur_radius;
    let ceiling = cfg.blur_radius_ceiling;
    let cancel = cancel.clone();
    let (original, levels) = tokio::task::spawn_blocking(move || {
        let levels = blur_levels::generate(&decoded, max_radius, ceiling, &cancel);
        (decoded, levels)
    })
    .await
    .context("blur task aborted")?;

    Ok(ImageSet::new(
        original,
        levels.into_iter().map(|level| level.image).collect(),
    ))
}

/// Blocks (off-runtime) until the renderer asks for the next image.
/// Returns `false` on cancellation or channel teardown.
async fn wait_ready(host_rx: &xchan::Receiver<HostEvent>, cancel: &CancellationToken) -> bool {
    let rx = host_rx.clone();
    let cancel = cancel.clone();
    let waited = tokio::task::spawn_blocking(move || {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(HostEvent::ReadyForNextImage) => return true,
                // The winit host paces its own redraws.
                Ok(HostEvent::RequestRender) => {}
                Err(xchan::RecvTimeoutError::Timeout) => {}
                Err(xchan::RecvTimeoutError::Disconnected) => return false,
            }
        }
    })
    .await;
    waited.unwrap_or(false)
}

// Decodes an image to RGBA8 and applies EXIF orientation if available.
// Orientation handling is best-effort; missing metadata leaves the pixels
// as decoded.
fn decode_rgba8_apply_exif(path: &Path) -> Result<RgbaImage> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let mut img = img.to_rgba8();

    let orientation: u16 = read_orientation(path).unwrap_or(1);
    match orientation {
        2 => img = image::imageops::flip_horizontal(&img),
        3 => img = image::imageops::rotate180(&img),
        4 => img = image::imageops::flip_vertical(&img),
        5 => {
            img = image::imageops::rotate90(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        6 => img = image::imageops::rotate90(&img),
        7 => {
            img = image::imageops::rotate270(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        8 => img = image::imageops::rotate270(&img),
        _ => {}
    }
    Ok(img)
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    debug!("exif orientation {} for {}", value, path.display());
    Some(value as u16)
}
