use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use effectconfig::BackdropConfig;
use tracing::{debug, error, info, warn};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{Event, StartCause, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::window::{Window, WindowBuilder};

use crate::events::{EventHub, HostEvent, PointerEvent};
use crate::gpu::{Compositor, GpuContext};
use crate::lifecycle::{HostEnvironment, HostOptions};
use crate::schedule::FrameScheduler;
use crate::stage::{GpuLayerFactory, PumpReport, Stage};
use crate::types::Container;

/// Redraw interval while every layer is hidden or nothing drew.
const IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the preview window needs to start.
#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    pub config: BackdropConfig,
    pub host: HostOptions,
}

/// Commands accepted by a running preview window.
#[derive(Debug, Clone)]
pub enum StageCommand {
    Reconfigure(BackdropConfig),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pacing {
    RedrawNow,
    WaitUntil(Instant),
    Idle,
}

/// Keeps the loop at display rate while layers draw and drops to a slow
/// heartbeat while they are hidden, so hidden layers still reschedule.
#[derive(Debug, Clone, Copy)]
struct FramePacer {
    idle_interval: Duration,
    active: bool,
    last_frame: Option<Instant>,
}

impl FramePacer {
    fn new(idle_interval: Duration) -> Self {
        Self {
            idle_interval,
            active: true,
            last_frame: None,
        }
    }

    fn record(&mut self, report: PumpReport, now: Instant) {
        self.active = report.drew_anything();
        self.last_frame = Some(now);
    }

    fn wake(&mut self) {
        self.active = true;
    }

    fn poll(&self, now: Instant, has_pending: bool) -> Pacing {
        if !has_pending {
            return Pacing::Idle;
        }
        if self.active {
            return Pacing::RedrawNow;
        }
        match self.last_frame {
            None => Pacing::RedrawNow,
            Some(last) => {
                let deadline = last + self.idle_interval;
                if now >= deadline {
                    Pacing::RedrawNow
                } else {
                    Pacing::WaitUntil(deadline)
                }
            }
        }
    }
}

/// Handle to the preview window running on its own thread.
pub struct WindowRuntime {
    proxy: EventLoopProxy<StageCommand>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl WindowRuntime {
    /// Starts the window thread and waits until the stage is mounted.
    pub fn spawn(options: PreviewOptions) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("neonx-window".into())
            .spawn(move || run_window_thread(options, ready_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let proxy = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            join_handle: Some(handle),
        })
    }

    /// Sends a new configuration to the stage.
    pub fn reconfigure(&self, config: BackdropConfig) -> Result<()> {
        self.proxy
            .send_event(StageCommand::Reconfigure(config))
            .map_err(|err| anyhow!("window is gone: {err}"))
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Blocks until the window closes.
    pub fn wait(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(StageCommand::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for WindowRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(StageCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

// Field order is drop order: layers and the surface go before the window.
struct WindowState {
    stage: Stage,
    compositor: Compositor,
    context: GpuContext,
    env: HostEnvironment,
    pacer: FramePacer,
    window: Arc<Window>,
}

impl WindowState {
    fn new(window: Arc<Window>, options: &PreviewOptions) -> Result<Self> {
        let config = &options.config;
        let scale = window.scale_factor();
        let physical = window.inner_size();
        let context = GpuContext::new(
            window.as_ref(),
            physical,
            config.window.antialias.into(),
            config.window.power.into(),
        )?;

        let logical = physical.to_logical::<f64>(scale);
        let env = HostEnvironment {
            scheduler: FrameScheduler::shared(),
            hub: EventHub::new(),
            container: Container::new(logical.width, logical.height, scale),
        };
        let factory = GpuLayerFactory::new(context.device().clone(), options.host);
        let stage = Stage::new(env.clone(), Box::new(factory), config)?;
        let compositor = Compositor::new(
            context.device(),
            context.surface_format(),
            config.stage.background,
        );

        Ok(Self {
            stage,
            compositor,
            context,
            env,
            pacer: FramePacer::new(IDLE_INTERVAL),
            window,
        })
    }

    fn reconfigure(&mut self, config: &BackdropConfig) {
        if let Err(err) = self.stage.reconfigure(config) {
            error!("failed to apply configuration: {err:?}");
        }
        self.compositor.set_background(self.stage.background());
        self.pacer.wake();
        self.window.request_redraw();
    }

    fn pointer_moved(&self, position: winit::dpi::PhysicalPosition<f64>) {
        let logical = position.to_logical::<f64>(self.window.scale_factor());
        let viewport = self.env.container.measure();
        self.env.hub.publish(HostEvent::PointerMoved(PointerEvent {
            client_x: logical.x,
            client_y: logical.y,
            viewport_width: viewport.width,
            viewport_height: viewport.height,
        }));
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.context.resize(size);
        if size.width == 0 || size.height == 0 {
            return;
        }
        let scale = self.window.scale_factor();
        let logical = size.to_logical::<f64>(scale);
        self.env.container.set_size(logical.width, logical.height);
        self.env.container.set_device_pixel_ratio(scale);
        self.env.hub.publish(HostEvent::Resized);
        self.pacer.wake();
        self.window.request_redraw();
    }

    fn set_visible(&mut self, visible: bool) {
        debug!(visible, "window visibility changed");
        self.env.hub.publish(HostEvent::VisibilityChanged(visible));
        if visible {
            self.pacer.wake();
            self.window.request_redraw();
        }
    }

    /// Runs due frames, then composites and presents unless every layer was
    /// hidden. Returns false when the window should close.
    fn redraw(&mut self) -> bool {
        let report = self.stage.pump();
        self.pacer.record(report, Instant::now());
        if report.hidden > 0 && report.drawn == 0 {
            return true;
        }

        let frame = match self.context.acquire() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                self.window.request_redraw();
                return true;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("surface out of memory; closing preview");
                return false;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout; retrying next frame");
                return true;
            }
            Err(other) => {
                warn!("surface error: {other:?}; retrying next frame");
                return true;
            }
        };
        let view = self.context.target_view(&frame);
        let layers = self.stage.composite_layers(Instant::now());
        self.compositor.draw(self.context.device(), &view, &layers);
        frame.present();
        true
    }

    fn close(&mut self) {
        self.stage.unmount_all();
    }
}

fn run_window_thread(
    options: PreviewOptions,
    ready_tx: Sender<Result<EventLoopProxy<StageCommand>, anyhow::Error>>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<StageCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let message = format!("failed to create event loop: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    let proxy = event_loop.create_proxy();

    let settings = &options.config.window;
    let window = WindowBuilder::new()
        .with_title(settings.title.clone())
        .with_inner_size(LogicalSize::new(
            f64::from(settings.width),
            f64::from(settings.height),
        ))
        .build(&event_loop);
    let window = match window {
        Ok(window) => Arc::new(window),
        Err(err) => {
            let message = format!("failed to create preview window: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let mut state = match WindowState::new(window.clone(), &options) {
        Ok(state) => state,
        Err(err) => {
            let wrapped = anyhow!("failed to initialise preview: {err:?}");
            let message = wrapped.to_string();
            let _ = ready_tx.send(Err(anyhow!(message)));
            return Err(wrapped);
        }
    };
    info!(
        layers = ?state.stage.layer_kinds(),
        adapter = %state.context.adapter_profile().name,
        "preview window ready"
    );
    let _ = ready_tx.send(Ok(proxy));
    window.request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(StageCommand::Reconfigure(config)) => {
            info!("configuration reloaded");
            state.reconfigure(&config);
        }
        Event::UserEvent(StageCommand::Shutdown) => {
            state.close();
            elwt.exit();
        }
        Event::NewEvents(StartCause::ResumeTimeReached { .. }) => {
            state.window.request_redraw();
        }
        Event::WindowEvent { window_id, event } if window_id == state.window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                state.close();
                elwt.exit();
            }
            WindowEvent::CursorMoved { position, .. } => state.pointer_moved(position),
            WindowEvent::Resized(size) => state.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = state.window.inner_size();
                state.resize(size);
            }
            WindowEvent::Occluded(occluded) => state.set_visible(!occluded),
            WindowEvent::RedrawRequested => {
                if !state.redraw() {
                    state.close();
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            match state.pacer.poll(now, state.stage.has_pending_frames()) {
                Pacing::RedrawNow => {
                    state.window.request_redraw();
                    elwt.set_control_flow(ControlFlow::Wait);
                }
                Pacing::WaitUntil(deadline) => {
                    tracing::trace!("idle; next frame at {deadline:?}");
                    elwt.set_control_flow(ControlFlow::WaitUntil(deadline));
                }
                Pacing::Idle => elwt.set_control_flow(ControlFlow::Wait),
            }
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(drawn: usize, hidden: usize) -> PumpReport {
        PumpReport {
            drawn,
            hidden,
            failed: 0,
        }
    }

    #[test]
    fn pacer_redraws_immediately_while_layers_draw() {
        let mut pacer = FramePacer::new(IDLE_INTERVAL);
        let now = Instant::now();
        assert_eq!(pacer.poll(now, true), Pacing::RedrawNow);
        pacer.record(report(2, 0), now);
        assert_eq!(pacer.poll(now, true), Pacing::RedrawNow);
    }

    #[test]
    fn pacer_slows_down_while_hidden() {
        let mut pacer = FramePacer::new(IDLE_INTERVAL);
        let now = Instant::now();
        pacer.record(report(0, 2), now);
        assert_eq!(pacer.poll(now, true), Pacing::WaitUntil(now + IDLE_INTERVAL));
        assert_eq!(pacer.poll(now + IDLE_INTERVAL, true), Pacing::RedrawNow);
        pacer.wake();
        assert_eq!(pacer.poll(now, true), Pacing::RedrawNow);
    }

    #[test]
    fn pacer_idles_without_pending_frames() {
        let pacer = FramePacer::new(IDLE_INTERVAL);
        assert_eq!(pacer.poll(Instant::now(), false), Pacing::Idle);
    }
}
