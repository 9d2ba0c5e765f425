//! Surface management for windowed rendering.
//!
//! Wraps Vulkan surface creation so application code never touches
//! raw-window-handle plumbing directly.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{calculate_extent, select_present_mode, select_surface_format, Swapchain};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Surface context for windowed rendering.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
    // Kept alive for the surface_loader's function pointers.
    #[allow(dead_code)]
    entry: ash::Entry,
}

impl SurfaceContext {
    /// Create a surface context from a window.
    ///
    /// # Safety
    /// The GPU context must be valid and the window must have valid handles.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan entry: {e}")))?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        // SAFETY: Caller guarantees the window handles are valid.
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                gpu.instance(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(&entry, gpu.instance());
        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());

        Ok(Self {
            surface,
            surface_loader,
            swapchain_loader,
            entry,
        })
    }

    /// Query what the surface supports on this device.
    pub fn support(&self, gpu: &GpuContext) -> Result<SurfaceSupport> {
        // SAFETY: Surface and physical device live as long as self and gpu.
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_loader
                    .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)?,
                formats: self
                    .surface_loader
                    .get_physical_device_surface_formats(gpu.physical_device(), self.surface)?,
                present_modes: self
                    .surface_loader
                    .get_physical_device_surface_present_modes(
                        gpu.physical_device(),
                        self.surface,
                    )?,
            })
        }
    }

    /// Create a swapchain for this surface.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Swapchain> {
        let support = self.support(gpu)?;

        let surface_format = select_surface_format(&support.formats);
        let present_mode = select_present_mode(&support.present_modes, vsync);
        let extent = calculate_extent(&support.capabilities, width, height);

        // SAFETY: Caller guarantees the GPU context is valid.
        unsafe {
            Swapchain::new(
                gpu.device(),
                &self.swapchain_loader,
                self.surface,
                &support.capabilities,
                surface_format,
                present_mode,
                extent,
                old_swapchain,
                gpu.graphics_queue_family(),
            )
        }
    }

    /// Recreate the swapchain with new dimensions.
    ///
    /// # Safety
    /// The old swapchain must not be in use.
    pub unsafe fn recreate_swapchain(
        &self,
        gpu: &GpuContext,
        old_swapchain: &mut Swapchain,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Swapchain> {
        // SAFETY: Caller guarantees the old swapchain is idle.
        unsafe {
            old_swapchain.destroy(gpu.device(), &self.swapchain_loader);
            self.create_swapchain(gpu, width, height, vsync, None)
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use and every swapchain on it must already
    /// be destroyed.
    pub unsafe fn destroy(&self) {
        // SAFETY: Caller guarantees the surface is unused.
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

/// Surface support query result.
pub struct SurfaceSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
