//! Synchronization primitives.

use crate::error::{GpuError, Result};
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    // SAFETY: Caller guarantees the device is valid.
    let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
    Ok(semaphore)
}

/// Create a fence, optionally already signaled.
///
/// Per-frame fences start signaled so the first wait on a never-submitted
/// slot returns immediately.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    // SAFETY: Caller guarantees the device is valid.
    let fence = unsafe { device.create_fence(&create_info, None)? };
    Ok(fence)
}

/// Block until `fence` signals, within `timeout_ns`.
///
/// Exceeding the budget surfaces as [`GpuError::DeviceTimeout`]; it means the
/// device is hung or lost and callers treat it as fatal.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    // SAFETY: Caller guarantees device and fence are valid.
    match unsafe { device.wait_for_fences(&[fence], true, timeout_ns) } {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(GpuError::DeviceTimeout {
            budget_ns: timeout_ns,
        }),
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Reset a fence to the unsignaled state.
///
/// # Safety
/// The device and fence must be valid, and the fence must not be in use by a
/// pending submission.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    // SAFETY: Caller guarantees device and fence are valid.
    unsafe { device.reset_fences(&[fence])? };
    Ok(())
}
