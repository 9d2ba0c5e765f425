//! `EmberApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// Trait for Ember applications.
///
/// Implement this trait to create an application on the Ember renderer. The
/// framework handles window creation, GPU initialization, swapchain
/// management, frame scheduling, and the event loop.
pub trait EmberApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the GPU context, window, and frame scheduler exist.
    /// Long-lived resources created here should queue their release on
    /// `ctx.global_deletion` so shutdown tears them down in reverse order.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering.
    ///
    /// # Arguments
    /// * `ctx` - Application context with GPU and window access
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Render a frame.
    ///
    /// Called with the frame's command buffer already recording. Resources
    /// retired mid-frame go on the current slot's deletion queue
    /// (`ctx.scheduler.current().deletion`); transient descriptor sets come
    /// from the slot's allocator and are valid for this frame only.
    ///
    /// The framework acquires the swapchain image, submits the command
    /// buffer, and presents. The application records rendering commands and
    /// blits its output to `frame.swapchain_image`.
    fn render(&mut self, ctx: &mut AppContext, frame: &mut FrameContext) -> anyhow::Result<()>;

    /// Handle window resize.
    ///
    /// The framework recreates the swapchain before calling this; override
    /// to rebuild other size-dependent resources.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was consumed.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Handle device events (raw input).
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Cleanup resources before shutdown.
    ///
    /// The device is idle when this is called. Anything queued on the global
    /// deletion queue is released by the framework afterwards.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
