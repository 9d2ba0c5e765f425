//! Command buffer management and submission.

use crate::error::Result;
use crate::sync;
use ash::vk;

/// Wait budget for the immediate-submit fence.
const IMMEDIATE_TIMEOUT_NS: u64 = 10_000_000_000;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        // SAFETY: Caller guarantees the device is valid.
        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self { pool })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        // SAFETY: Caller guarantees the device is valid.
        let buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };
        Ok(buffers[0])
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and no buffer from this pool may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: Caller guarantees the pool is no longer in use.
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    // SAFETY: Caller guarantees the handles are valid.
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    // SAFETY: Caller guarantees the handles are valid.
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// Submit one command buffer via `vkQueueSubmit2` with a single GPU-side
/// wait/signal semaphore pair and a CPU-side fence signal.
///
/// Null semaphore handles skip the corresponding wait/signal.
///
/// # Safety
/// All handles must be valid and the command buffer must have finished
/// recording.
pub unsafe fn submit_commands(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait_semaphore: vk::Semaphore,
    wait_stage: vk::PipelineStageFlags2,
    signal_semaphore: vk::Semaphore,
    signal_stage: vk::PipelineStageFlags2,
    fence: vk::Fence,
) -> Result<()> {
    let cmd_info = vk::CommandBufferSubmitInfo::default().command_buffer(cmd);

    let wait_info = vk::SemaphoreSubmitInfo::default()
        .semaphore(wait_semaphore)
        .stage_mask(wait_stage);
    let signal_info = vk::SemaphoreSubmitInfo::default()
        .semaphore(signal_semaphore)
        .stage_mask(signal_stage);

    let mut submit_info =
        vk::SubmitInfo2::default().command_buffer_infos(std::slice::from_ref(&cmd_info));
    if wait_semaphore != vk::Semaphore::null() {
        submit_info = submit_info.wait_semaphore_infos(std::slice::from_ref(&wait_info));
    }
    if signal_semaphore != vk::Semaphore::null() {
        submit_info = submit_info.signal_semaphore_infos(std::slice::from_ref(&signal_info));
    }

    // SAFETY: Caller guarantees all handles are valid.
    unsafe { device.queue_submit2(queue, std::slice::from_ref(&submit_info), fence)? };
    Ok(())
}

/// One-off synchronous submission context.
///
/// Owns a dedicated command pool, buffer, and fence. [`Self::execute`]
/// records, submits, and blocks the calling thread until the work completes.
/// That blocking wait makes it unsuitable for hot per-frame use; it exists
/// for occasional transfer work such as uploads at load time.
pub struct ImmediateSubmit {
    pool: CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl ImmediateSubmit {
    /// Create the immediate-submit context.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        // SAFETY: Caller guarantees device and queue family.
        let pool = unsafe {
            CommandPool::new(
                device,
                queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };
        // SAFETY: As above.
        let command_buffer = unsafe { pool.allocate_command_buffer(device)? };
        // SAFETY: As above.
        let fence = unsafe { sync::create_fence(device, false)? };

        Ok(Self {
            pool,
            command_buffer,
            fence,
        })
    }

    /// Record commands with `f`, submit them, and block until the dedicated
    /// fence signals.
    ///
    /// # Safety
    /// The device and queue must be valid, and `queue` must belong to the
    /// queue family this context was created for.
    pub unsafe fn execute<F>(&self, device: &ash::Device, queue: vk::Queue, f: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        // SAFETY: The fence guards reuse of the command buffer; no submission
        // of it can be pending here.
        unsafe {
            device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(
                device,
                self.command_buffer,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )?;
        }

        f(self.command_buffer);

        // SAFETY: Recording just finished; no semaphores are involved.
        unsafe {
            end_command_buffer(device, self.command_buffer)?;
            submit_commands(
                device,
                queue,
                self.command_buffer,
                vk::Semaphore::null(),
                vk::PipelineStageFlags2::NONE,
                vk::Semaphore::null(),
                vk::PipelineStageFlags2::NONE,
                self.fence,
            )?;
            sync::wait_for_fence(device, self.fence, IMMEDIATE_TIMEOUT_NS)?;
            sync::reset_fence(device, self.fence)?;
        }

        Ok(())
    }

    /// Destroy the context.
    ///
    /// # Safety
    /// The device must be valid and no execute call may be in progress.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: Caller guarantees nothing is pending.
        unsafe {
            device.destroy_fence(self.fence, None);
            self.pool.destroy(device);
        }
    }
}
