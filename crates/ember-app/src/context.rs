//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use ember_gpu::command::ImmediateSubmit;
use ember_gpu::deletion::{DeletionQueue, DeviceReleaser};
use ember_gpu::descriptors::{GrowableDescriptorAllocator, PoolSizeRatio};
use ember_gpu::frame::{FrameScheduler, FRAME_OVERLAP};
use ember_gpu::swapchain::Swapchain;
use ember_gpu::sync::create_semaphore;
use ember_gpu::{GpuContext, SurfaceContext};
use winit::window::Window;

/// Initial set capacity of each frame slot's descriptor allocator.
const FRAME_DESCRIPTOR_SETS: u32 = 1000;

/// Initial set capacity of the global descriptor allocator.
const GLOBAL_DESCRIPTOR_SETS: u32 = 10;

fn frame_descriptor_ratios() -> Vec<PoolSizeRatio> {
    vec![
        PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 3.0),
        PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
    ]
}

fn global_descriptor_ratios() -> Vec<PoolSizeRatio> {
    vec![
        PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
        PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
        PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1.0),
    ]
}

/// Application context shared across all app methods.
///
/// Owns the GPU context, window, swapchain, and the resource lifecycle
/// machinery: the frame scheduler with its per-slot deletion queues and
/// descriptor allocators, plus the process-lifetime global counterparts.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device and queue.
    pub gpu: GpuContext,
    /// Surface context for windowed rendering.
    pub surface: SurfaceContext,
    /// Current swapchain.
    pub swapchain: Swapchain,
    /// Frame scheduler with per-slot lifecycle state.
    pub scheduler: FrameScheduler,
    /// Releases queued here run once, at shutdown, after a device idle wait.
    pub global_deletion: DeletionQueue,
    /// Descriptor allocator for process-lifetime sets.
    pub global_descriptors: GrowableDescriptorAllocator,
    /// Blocking one-off submission context for load-time transfers.
    pub immediate: ImmediateSubmit,
    /// Per-swapchain-image render finished semaphores.
    pub(crate) render_finished_semaphores: Vec<vk::Semaphore>,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
    /// Whether vsync is enabled.
    pub vsync: bool,
}

impl AppContext {
    /// Create a new application context.
    ///
    /// # Safety
    /// The window must have valid handles.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        // SAFETY: Caller guarantees window handles are valid.
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: GPU context is valid.
        let swapchain = unsafe { surface.create_swapchain(&gpu, width, height, vsync, None)? };

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len()
        );

        // SAFETY: Device and queue family are valid.
        let (scheduler, global_descriptors, immediate) = unsafe {
            (
                FrameScheduler::new(
                    gpu.device(),
                    gpu.graphics_queue_family(),
                    FRAME_OVERLAP,
                    FRAME_DESCRIPTOR_SETS,
                    &frame_descriptor_ratios(),
                )?,
                GrowableDescriptorAllocator::new(
                    gpu.device(),
                    GLOBAL_DESCRIPTOR_SETS,
                    &global_descriptor_ratios(),
                )?,
                ImmediateSubmit::new(gpu.device(), gpu.graphics_queue_family())?,
            )
        };

        let render_finished_semaphores = unsafe { make_semaphores(&gpu, swapchain.images.len())? };

        Ok(Self {
            window,
            gpu,
            surface,
            swapchain,
            scheduler,
            global_deletion: DeletionQueue::new(),
            global_descriptors,
            immediate,
            render_finished_semaphores,
            last_frame_time: Instant::now(),
            vsync,
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Get the swapchain width.
    pub fn width(&self) -> u32 {
        self.swapchain.extent.width
    }

    /// Get the swapchain height.
    pub fn height(&self) -> u32 {
        self.swapchain.extent.height
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height as f32
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.scheduler.overlap()
    }

    /// Recreate the swapchain (e.g. after resize).
    ///
    /// Image count can change across recreation, so the per-image semaphores
    /// are rebuilt with it.
    ///
    /// # Safety
    /// The GPU must be idle.
    pub(crate) unsafe fn recreate_swapchain(
        &mut self,
        width: u32,
        height: u32,
    ) -> anyhow::Result<()> {
        // SAFETY: Caller guarantees the GPU is idle.
        unsafe {
            self.swapchain
                .destroy(self.gpu.device(), &self.surface.swapchain_loader);
            self.swapchain =
                self.surface
                    .create_swapchain(&self.gpu, width, height, self.vsync, None)?;

            for sem in self.render_finished_semaphores.drain(..) {
                self.gpu.device().destroy_semaphore(sem, None);
            }
            self.render_finished_semaphores =
                make_semaphores(&self.gpu, self.swapchain.images.len())?;
        }

        tracing::info!(
            "Swapchain recreated: {}x{}",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );

        Ok(())
    }

    /// Cleanup all resources.
    ///
    /// Frame slots are torn down first (flushing their remaining deferred
    /// releases), then the global queue, then the windowing resources.
    ///
    /// # Safety
    /// The GPU must be idle.
    pub(crate) unsafe fn cleanup(&mut self) -> anyhow::Result<()> {
        let device = self.gpu.device();

        {
            let mut allocator = self.gpu.allocator().lock();
            // SAFETY: Caller guarantees the GPU is idle.
            let mut releaser = unsafe { DeviceReleaser::new(device, &mut allocator) };
            // SAFETY: As above.
            unsafe {
                self.scheduler.destroy(device, &mut releaser)?;
            }
            self.global_deletion.flush(&mut releaser)?;
            // SAFETY: As above.
            unsafe { self.global_descriptors.destroy_pools(device) };
        }

        // SAFETY: As above.
        unsafe {
            self.immediate.destroy(device);

            for sem in self.render_finished_semaphores.drain(..) {
                device.destroy_semaphore(sem, None);
            }

            self.swapchain
                .destroy(device, &self.surface.swapchain_loader);
            self.surface.destroy();
        }

        Ok(())
    }
}

/// # Safety
/// The device must be valid.
unsafe fn make_semaphores(gpu: &GpuContext, count: usize) -> anyhow::Result<Vec<vk::Semaphore>> {
    let mut semaphores = Vec::with_capacity(count);
    for _ in 0..count {
        // SAFETY: Caller guarantees the device is valid.
        semaphores.push(unsafe { create_semaphore(gpu.device())? });
    }
    Ok(semaphores)
}
