//! Winit host application owning the GPU-context thread.
//!
//! All compositor calls happen here; other threads talk through a
//! [`RendererHandle`], whose commands are drained each frame with
//! latest-wins coalescing per kind.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel as xchan;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use crate::config::Configuration;
use crate::events::{Coalesced, Command, DuotoneTarget, HostEvent};
use crate::render::compositor::Compositor;
use crate::tasks::generator;

/// User event that wakes the loop when a command was enqueued.
#[derive(Debug, Clone, Copy)]
pub struct WakeUp;

/// Cloneable, channel-backed handle for driving the renderer from any
/// thread. Commands are applied on the GPU thread in submission order,
/// with later values of the same kind superseding earlier ones.
#[derive(Clone)]
pub struct RendererHandle {
    tx: xchan::Sender<Command>,
    proxy: EventLoopProxy<WakeUp>,
}

impl RendererHandle {
    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_ok() {
            let _ = self.proxy.send_event(WakeUp);
        }
    }

    pub fn set_image(&self, set: Arc<crate::events::ImageSet>) {
        self.send(Command::SetImage(set));
    }

    pub fn set_blur_enabled(&self, enabled: bool) {
        self.send(Command::SetBlurEnabled(enabled));
    }

    pub fn toggle_blur(&self) {
        self.send(Command::ToggleBlur);
    }

    pub fn set_dim_amount(&self, amount: f32) {
        self.send(Command::SetDimAmount(amount));
    }

    pub fn set_duotone_target(&self, target: DuotoneTarget) {
        self.send(Command::SetDuotone(target));
    }

    pub fn set_parallax_offset(&self, offset: f32) {
        self.send(Command::SetParallaxOffset(offset));
    }

    pub fn set_touch_point(&self, x: f32, y: f32) {
        self.send(Command::SetTouchPoint(x, y));
    }

    pub fn request_redraw(&self) {
        self.send(Command::RequestRedraw);
    }
}

/// Runs the wallpaper windowed until closed: spawns the background decode
/// and blur worker, then hands the thread to winit.
///
/// # Errors
/// Returns an error if the event loop cannot be created or fails while
/// running.
pub fn run_windowed(cfg: Configuration, photos: Vec<std::path::PathBuf>) -> Result<()> {
    info!(count = photos.len(), "starting wallpaper viewer");
    let event_loop = EventLoop::<WakeUp>::with_user_event()
        .build()
        .context("creating event loop")?;

    let (cmd_tx, cmd_rx) = xchan::unbounded::<Command>();
    let (host_tx, host_rx) = xchan::unbounded::<HostEvent>();
    let handle = RendererHandle {
        tx: cmd_tx,
        proxy: event_loop.create_proxy(),
    };
    let cancel = CancellationToken::new();
    let worker = generator::spawn(cfg.clone(), photos, handle.clone(), host_rx, cancel.clone());

    let mut app = App::new(cfg, cmd_rx, host_tx, cancel.clone());
    let run = event_loop.run_app(&mut app);

    cancel.cancel();
    if worker.join().is_err() {
        warn!("background worker panicked during shutdown");
    }
    run.context("event loop failed")
}

struct SurfaceCtx {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    config: wgpu::SurfaceConfiguration,
}

struct App {
    cfg: Configuration,
    compositor: Compositor,
    cmd_rx: xchan::Receiver<Command>,
    cancel: CancellationToken,

    window: Option<Arc<Window>>,
    gpu: Option<SurfaceCtx>,

    // Demo interaction state.
    cursor: (f64, f64),
    parallax: f32,
    dim_on: bool,
    duotone_on: bool,
}

impl App {
    fn new(
        cfg: Configuration,
        cmd_rx: xchan::Receiver<Command>,
        host_tx: xchan::Sender<HostEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let compositor = Compositor::new(&cfg, host_tx);
        let duotone_on = cfg.duotone.enabled;
        Self {
            compositor,
            cmd_rx,
            cancel,
            window: None,
            gpu: None,
            cursor: (0.0, 0.0),
            parallax: 0.5,
            dim_on: true,
            duotone_on,
            cfg,
        }
    }

    /// Drains pending commands, coalescing latest-wins per kind, and applies
    /// them to the compositor in one batch.
    fn apply_commands(&mut self) {
        let mut batch = Coalesced::default();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            batch.absorb(cmd);
        }
        if batch.is_empty() {
            return;
        }
        let now = Instant::now();
        if let Some(set) = batch.image {
            self.compositor.set_image(set, now);
        }
        if let Some(enabled) = batch.blur_enabled {
            self.compositor.set_blur_target(enabled, now);
        }
        if batch.toggles % 2 == 1 {
            self.compositor.toggle_blur(now);
        }
        if let Some(dim) = batch.dim {
            self.compositor.set_dim_amount(dim);
        }
        if let Some(target) = batch.duotone {
            self.compositor.set_duotone_target(target, now);
        }
        if let Some(offset) = batch.parallax {
            self.compositor.set_parallax_offset(offset);
        }
        if let Some((x, y)) = batch.touch {
            self.compositor.set_touch_point(x, y, now);
        }
        if batch.redraw {
            self.compositor.request_redraw();
        }
    }

    fn schedule_if_needed(&self) {
        if self.compositor.needs_frame()
            && let Some(window) = &self.window
        {
            window.request_redraw();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        self.apply_commands();
        let Some(window) = self.window.clone() else {
            return;
        };
        let Some(gpu) = &self.gpu else { return };
        match gpu.surface.get_current_texture() {
            Ok(frame) => {
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                let more = self.compositor.draw(&view, Instant::now());
                frame.present();
                if more || self.compositor.needs_frame() {
                    window.request_redraw();
                }
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                window.request_redraw();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("surface out of memory, shutting down");
                self.cancel.cancel();
                event_loop.exit();
            }
            Err(err) => warn!("surface frame unavailable: {err}"),
        }
    }

    fn handle_key(&mut self, code: KeyCode, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        match code {
            KeyCode::Escape | KeyCode::KeyQ => {
                self.cancel.cancel();
                event_loop.exit();
            }
            KeyCode::Space => self.compositor.toggle_blur(now),
            KeyCode::KeyD => {
                self.dim_on = !self.dim_on;
                let amount = if self.dim_on { self.cfg.dim_amount } else { 0.0 };
                self.compositor.set_dim_amount(amount);
            }
            KeyCode::KeyT => {
                self.duotone_on = !self.duotone_on;
                let mut target = self.cfg.duotone.target(true);
                target.enabled = self.duotone_on;
                self.compositor.set_duotone_target(target, now);
            }
            KeyCode::ArrowLeft => {
                self.parallax = (self.parallax - 0.1).max(0.0);
                self.compositor.set_parallax_offset(self.parallax);
            }
            KeyCode::ArrowRight => {
                self.parallax = (self.parallax + 0.1).min(1.0);
                self.compositor.set_parallax_offset(self.parallax);
            }
            _ => {}
        }
        self.schedule_if_needed();
    }
}

impl ApplicationHandler<WakeUp> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let attrs = WindowAttributes::default().with_title("photo wallpaper");
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                error!("window creation failed: {err}");
                event_loop.exit();
                return;
            }
        };
        let monitor = window.current_monitor();
        window.set_fullscreen(Some(Fullscreen::Borderless(monitor)));
        self.window = Some(window.clone());

        match pollster::block_on(init_surface(window.clone())) {
            Ok((ctx, queue, format)) => {
                let size = (ctx.config.width, ctx.config.height);
                self.compositor
                    .surface_created(ctx.device.clone(), queue, format, size);
                self.gpu = Some(ctx);
                info!(width = size.0, height = size.1, "surface ready");
                window.request_redraw();
            }
            Err(err) => {
                error!("GPU initialization failed: {err:#}");
                self.cancel.cancel();
                event_loop.exit();
            }
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        // The surface dies with the context; CPU-side state is replayed on
        // the next resume.
        self.compositor.surface_destroyed();
        self.gpu = None;
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, _event: WakeUp) {
        self.apply_commands();
        self.schedule_if_needed();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.cancel.cancel();
                event_loop.exit();
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if width > 0
                    && height > 0
                    && let Some(gpu) = &mut self.gpu
                {
                    gpu.config.width = width;
                    gpu.config.height = height;
                    gpu.surface.configure(&gpu.device, &gpu.config);
                    self.compositor.surface_resized((width, height));
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && !event.repeat
                    && let PhysicalKey::Code(code) = event.physical_key
                {
                    self.handle_key(code, event_loop);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                let size = window.inner_size();
                if size.width > 0 && size.height > 0 {
                    let x = (self.cursor.0 / f64::from(size.width)) as f32;
                    let y = (self.cursor.1 / f64::from(size.height)) as f32;
                    self.compositor.set_touch_point(x, y, Instant::now());
                    self.schedule_if_needed();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.apply_commands();
        self.schedule_if_needed();
    }
}

async fn init_surface(
    window: Arc<Window>,
) -> Result<(SurfaceCtx, wgpu::Queue, wgpu::TextureFormat)> {
    let instance = wgpu::Instance::default();
    let surface = instance
        .create_surface(window.clone())
        .context("creating surface")?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .context("no compatible GPU adapter found")?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("wallpaper-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        })
        .await
        .context("requesting device")?;

    let caps = surface.get_capabilities(&adapter);
    let format = caps
        .formats
        .iter()
        .copied()
        .find(wgpu::TextureFormat::is_srgb)
        .unwrap_or(caps.formats[0]);
    let PhysicalSize { width, height } = window.inner_size();
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 1,
    };
    surface.configure(&device, &config);

    Ok((
        SurfaceCtx {
            surface,
            device,
            config,
        },
        queue,
        format,
    ))
}
