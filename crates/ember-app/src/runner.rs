//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use ember_gpu::command::{end_command_buffer, submit_commands};
use ember_gpu::deletion::DeviceReleaser;
use ember_gpu::GpuContextBuilder;
use ember_gpu::GpuError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::EmberApp;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Run an `EmberApp` with the given configuration.
///
/// Initializes logging, creates the window and GPU context, and runs the
/// event loop until the application exits.
pub fn run_app<A: EmberApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal application runner implementing winit's `ApplicationHandler`.
struct AppRunner<A: EmberApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

struct AppState<A: EmberApp> {
    ctx: AppContext,
    app: A,
    target_frame_time: Option<Duration>,
}

impl<A: EmberApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // The app gets first refusal on every event.
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let mut fatal = false;
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        // Partial GPU submission states are not recoverable
                        // without a device reset, so every render error
                        // terminates the run.
                        error!("Render error, shutting down: {e}");
                        fatal = true;
                    } else {
                        state.ctx.window.request_redraw();
                    }
                }
                if fatal {
                    if let Some(mut state) = self.state.take() {
                        state.shutdown();
                    }
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e}");
                    }
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            state.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: EmberApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        let mut ctx = unsafe { AppContext::new(window, gpu, self.config.vsync)? };

        let app = A::init(&mut ctx)?;

        let target_frame_time = self
            .config
            .target_fps
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)));

        Ok(AppState {
            ctx,
            app,
            target_frame_time,
        })
    }
}

impl<A: EmberApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let size = self.ctx.window.inner_size();
        if size.width == 0 || size.height == 0 {
            // Minimized; nothing to present until the window has area again.
            return Ok(());
        }

        let frame_start = Instant::now();

        let dt = frame_start
            .duration_since(self.ctx.last_frame_time)
            .as_secs_f32();
        self.ctx.last_frame_time = frame_start;

        self.app.update(&self.ctx, dt);

        // Recycle the current frame slot: fence wait, deferred release
        // flush, descriptor pool clear, command buffer restart.
        let cmd = {
            let device = self.ctx.gpu.device();
            let mut allocator = self.ctx.gpu.allocator().lock();
            // SAFETY: begin_frame waits the slot's fence before releasing
            // anything.
            let mut releaser = unsafe { DeviceReleaser::new(device, &mut allocator) };
            // SAFETY: Device and scheduler belong together.
            unsafe { self.ctx.scheduler.begin_frame(device, &mut releaser)? }
        };

        let acquire_semaphore = self.ctx.scheduler.current().acquire_semaphore;
        // SAFETY: Swapchain and semaphore are valid.
        let acquired = unsafe {
            self.ctx.swapchain.acquire_next_image(
                &self.ctx.surface.swapchain_loader,
                acquire_semaphore,
                u64::MAX,
            )
        };
        let (image_index, _suboptimal) = match acquired {
            Ok(v) => v,
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR)) => {
                return self.abandon_frame(cmd);
            }
            Err(e) => return Err(e.into()),
        };

        let mut frame_ctx = FrameContext::new(
            cmd,
            image_index,
            self.ctx.swapchain.images[image_index as usize],
            dt,
            self.ctx.scheduler.frame_number(),
        );

        self.app.render(&mut self.ctx, &mut frame_ctx)?;

        let render_finished = self.ctx.render_finished_semaphores[image_index as usize];

        // Submit and advance to the next slot.
        {
            let device = self.ctx.gpu.device();
            let queue = self.ctx.gpu.graphics_queue();
            // SAFETY: Recording is done and the handles are valid.
            unsafe {
                self.ctx
                    .scheduler
                    .end_frame(device, queue, render_finished)?;
            }
        }

        // SAFETY: The submission above signals render_finished.
        let rebuild = unsafe {
            self.ctx.swapchain.present(
                &self.ctx.surface.swapchain_loader,
                self.ctx.gpu.graphics_queue(),
                image_index,
                &[render_finished],
            )?
        };
        if rebuild {
            let size = self.ctx.window.inner_size();
            self.handle_resize(size.width, size.height)?;
        }

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    /// Retire a frame whose swapchain image could not be acquired.
    ///
    /// The slot's fence was already reset by `begin_frame`, so the restarted
    /// command buffer is submitted empty, with no semaphores, purely to
    /// signal the fence. The slot is reused next frame; the swapchain is
    /// rebuilt now.
    fn abandon_frame(&mut self, cmd: vk::CommandBuffer) -> anyhow::Result<()> {
        {
            let device = self.ctx.gpu.device();
            let queue = self.ctx.gpu.graphics_queue();
            let fence = self.ctx.scheduler.current().render_fence;
            // SAFETY: The command buffer is recording and nothing waits on
            // the acquire semaphore.
            unsafe {
                end_command_buffer(device, cmd)?;
                submit_commands(
                    device,
                    queue,
                    cmd,
                    vk::Semaphore::null(),
                    vk::PipelineStageFlags2::NONE,
                    vk::Semaphore::null(),
                    vk::PipelineStageFlags2::NONE,
                    fence,
                )?;
            }
        }

        let size = self.ctx.window.inner_size();
        self.handle_resize(size.width, size.height)
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.ctx.gpu.wait_idle()?;
        // SAFETY: The device is idle.
        unsafe {
            self.ctx.recreate_swapchain(width, height)?;
        }

        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn shutdown(&mut self) {
        info!(
            frames = self.ctx.scheduler.frame_number(),
            "Starting cleanup"
        );

        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);

        // SAFETY: The device is idle.
        if let Err(e) = unsafe { self.ctx.cleanup() } {
            error!("Cleanup error: {e}");
        }

        info!("Cleanup complete");
    }
}
