//! Fence-gated frame scheduling.
//!
//! A [`FrameScheduler`] owns one [`FrameSlot`] per frame in flight. Slots are
//! selected round-robin by `frame_number % overlap`; before a slot is reused
//! its fence is awaited, which is the proof that everything recorded into it
//! `overlap` frames ago has retired on the GPU. Only then are the slot's
//! deferred releases flushed and its descriptor pools cleared.

use crate::command::{self, CommandPool};
use crate::deletion::{DeletionQueue, ReleaseDispatcher, ReleaseIntent};
use crate::descriptors::{DescriptorDevice, GrowableDescriptorAllocator, PoolSizeRatio};
use crate::error::Result;
use crate::sync;
use ash::vk;
use tracing::trace;

/// Frames in flight. Two overlaps CPU recording of frame N with GPU
/// execution of frame N-1 without the latency cost of a deeper pipeline.
pub const FRAME_OVERLAP: usize = 2;

/// Budget for a per-frame fence wait. A healthy device signals in
/// milliseconds; exceeding a full second means it is hung or lost.
pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// The slice of the device the frame scheduler drives.
///
/// Implemented for [`ash::Device`]. Tests substitute a scripted fake so slot
/// cycling and the begin-frame ordering can be verified without a GPU.
pub trait FrameDevice: DescriptorDevice {
    /// Block until `fence` signals, within `timeout_ns`.
    ///
    /// # Safety
    /// The fence must be valid.
    unsafe fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()>;

    /// Reset `fence` to unsignaled.
    ///
    /// # Safety
    /// The fence must be valid and not pending.
    unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    /// Reset `cmd` and begin recording it for one-time submission.
    ///
    /// # Safety
    /// The command buffer must be valid and no longer pending.
    unsafe fn restart_commands(&self, cmd: vk::CommandBuffer) -> Result<()>;

    /// End recording of `cmd` and submit it, waiting on `wait_semaphore`,
    /// signaling `signal_semaphore`, and signaling `fence` on completion.
    ///
    /// # Safety
    /// All handles must be valid and `cmd` must be recording.
    unsafe fn submit_frame(
        &self,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()>;
}

impl FrameDevice for ash::Device {
    unsafe fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        // SAFETY: Caller guarantees the fence is valid.
        unsafe { sync::wait_for_fence(self, fence, timeout_ns) }
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        // SAFETY: Caller guarantees the fence is valid.
        unsafe { sync::reset_fence(self, fence) }
    }

    unsafe fn restart_commands(&self, cmd: vk::CommandBuffer) -> Result<()> {
        // SAFETY: Caller guarantees the buffer is no longer pending.
        unsafe {
            self.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            command::begin_command_buffer(self, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
        }
    }

    unsafe fn submit_frame(
        &self,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        // SAFETY: Caller guarantees the handles are valid.
        unsafe {
            command::end_command_buffer(self, cmd)?;
            command::submit_commands(
                self,
                queue,
                cmd,
                wait_semaphore,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore,
                vk::PipelineStageFlags2::ALL_GRAPHICS,
                fence,
            )
        }
    }
}

/// Per-frame resources, reused round-robin.
pub struct FrameSlot {
    /// Pool the slot's command buffer was allocated from.
    pub command_pool: vk::CommandPool,
    /// The slot's primary command buffer, restarted each reuse.
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when this frame's swapchain image is ready to be written.
    pub acquire_semaphore: vk::Semaphore,
    /// Signaled when this frame's GPU work retires; gates slot reuse.
    pub render_fence: vk::Fence,
    /// Deferred releases for resources last used by this slot's frame.
    pub deletion: DeletionQueue,
    /// Transient descriptor sets with this frame's lifetime.
    pub descriptors: GrowableDescriptorAllocator,
}

/// Round-robin scheduler over `overlap` frame slots.
pub struct FrameScheduler {
    slots: Vec<FrameSlot>,
    frame_number: u64,
}

impl FrameScheduler {
    /// Create a scheduler with `overlap` slots.
    ///
    /// Fences start signaled so the first pass over each slot does not wait.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        overlap: usize,
        initial_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<Self> {
        let mut slots = Vec::with_capacity(overlap);
        for _ in 0..overlap {
            // SAFETY: Caller guarantees device and queue family.
            let slot = unsafe {
                let pool = CommandPool::new(
                    device,
                    queue_family,
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                )?;
                let command_buffer = pool.allocate_command_buffer(device)?;
                FrameSlot {
                    command_pool: pool.handle(),
                    command_buffer,
                    acquire_semaphore: sync::create_semaphore(device)?,
                    render_fence: sync::create_fence(device, true)?,
                    deletion: DeletionQueue::new(),
                    descriptors: GrowableDescriptorAllocator::new(device, initial_sets, ratios)?,
                }
            };
            slots.push(slot);
        }

        Ok(Self {
            slots,
            frame_number: 0,
        })
    }

    /// Index of the slot the current frame uses.
    pub fn slot_index(&self) -> usize {
        (self.frame_number % self.slots.len() as u64) as usize
    }

    /// The current frame's slot.
    pub fn current(&mut self) -> &mut FrameSlot {
        let index = self.slot_index();
        &mut self.slots[index]
    }

    /// Frames submitted so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of frames in flight.
    pub fn overlap(&self) -> usize {
        self.slots.len()
    }

    /// Gate the current slot on its fence, then recycle it for recording.
    ///
    /// In order: wait for the slot's fence, flush its deferred releases,
    /// clear its descriptor pools, reset the fence, and restart its command
    /// buffer. Returns the command buffer, open and recording. The fence
    /// wait must come first; it is what makes the flush and clear safe.
    ///
    /// A [`crate::GpuError::DeviceTimeout`] from the fence wait is fatal:
    /// the slot is left untouched and the caller must not keep rendering.
    ///
    /// # Safety
    /// The device must be valid and `releaser` must target the same device
    /// the slot's resources were created on.
    pub unsafe fn begin_frame<D: FrameDevice>(
        &mut self,
        device: &D,
        releaser: &mut impl ReleaseDispatcher,
    ) -> Result<vk::CommandBuffer> {
        let frame_number = self.frame_number;
        let slot = self.current();

        // SAFETY: Caller guarantees the device is valid.
        unsafe { device.wait_fence(slot.render_fence, FENCE_TIMEOUT_NS)? };

        if !slot.deletion.is_empty() {
            trace!(
                frame_number,
                pending = slot.deletion.len(),
                "flushing per-frame releases"
            );
        }
        // The fence wait above proves the GPU retired this slot's previous
        // frame, so its garbage is now safe to release and its transient
        // descriptor sets safe to invalidate.
        slot.deletion.flush(releaser)?;
        // SAFETY: As above.
        unsafe {
            slot.descriptors.clear_pools(device)?;
            device.reset_fence(slot.render_fence)?;
            device.restart_commands(slot.command_buffer)?;
        }

        Ok(slot.command_buffer)
    }

    /// Submit the current slot's command buffer and advance to the next
    /// frame.
    ///
    /// The submission waits on the slot's acquire semaphore, signals
    /// `render_finished_semaphore` for presentation, and signals the slot's
    /// fence to gate its next reuse.
    ///
    /// # Safety
    /// `begin_frame` must have succeeded for this frame, all recording into
    /// the returned command buffer must be finished, and the handles must be
    /// valid.
    pub unsafe fn end_frame<D: FrameDevice>(
        &mut self,
        device: &D,
        queue: vk::Queue,
        render_finished_semaphore: vk::Semaphore,
    ) -> Result<()> {
        let slot = self.current();

        // SAFETY: Caller guarantees the handles are valid and recording is
        // done.
        unsafe {
            device.submit_frame(
                queue,
                slot.command_buffer,
                slot.acquire_semaphore,
                render_finished_semaphore,
                slot.render_fence,
            )?;
        }

        self.frame_number += 1;
        Ok(())
    }

    /// Tear down every slot.
    ///
    /// Remaining deferred releases are flushed first, then each slot's sync
    /// objects, command pool, and descriptor pools are destroyed.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy<D: DescriptorDevice>(
        &mut self,
        device: &D,
        releaser: &mut impl ReleaseDispatcher,
    ) -> Result<()> {
        for slot in &mut self.slots {
            slot.deletion.push(ReleaseIntent::Fence(slot.render_fence));
            slot.deletion
                .push(ReleaseIntent::Semaphore(slot.acquire_semaphore));
            slot.deletion
                .push(ReleaseIntent::CommandPool(slot.command_pool));
            slot.deletion.flush(releaser)?;
            // SAFETY: Caller guarantees the device is idle.
            unsafe { slot.descriptors.destroy_pools(device) };
        }
        self.slots.clear();
        Ok(())
    }

    #[cfg(test)]
    fn from_slots(slots: Vec<FrameSlot>) -> Self {
        Self {
            slots,
            frame_number: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;
    use ash::vk::Handle;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        WaitFence(u64),
        ResetFence(u64),
        Restart(u64),
        Submit { cmd: u64, fence: u64 },
        ResetPool(u64),
        DestroyPool(u64),
        Allocate(u64),
        Release(u64),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    /// Scripted device sharing one event log with the release recorder.
    struct FakeDevice {
        log: Log,
        /// Fences that report a timeout when waited on.
        hung_fences: Vec<u64>,
        next_handle: RefCell<u64>,
    }

    impl FakeDevice {
        fn new(log: Log) -> Self {
            Self {
                log,
                hung_fences: Vec::new(),
                next_handle: RefCell::new(0),
            }
        }

        fn bump(&self) -> u64 {
            let mut next = self.next_handle.borrow_mut();
            *next += 1;
            *next
        }
    }

    impl DescriptorDevice for FakeDevice {
        unsafe fn create_pool(
            &self,
            _max_sets: u32,
            _ratios: &[PoolSizeRatio],
        ) -> Result<vk::DescriptorPool> {
            Ok(vk::DescriptorPool::from_raw(self.bump()))
        }

        unsafe fn reset_pool(&self, pool: vk::DescriptorPool) -> Result<()> {
            self.log.borrow_mut().push(Event::ResetPool(pool.as_raw()));
            Ok(())
        }

        unsafe fn destroy_pool(&self, pool: vk::DescriptorPool) {
            self.log
                .borrow_mut()
                .push(Event::DestroyPool(pool.as_raw()));
        }

        unsafe fn allocate_set(
            &self,
            pool: vk::DescriptorPool,
            _layout: vk::DescriptorSetLayout,
        ) -> std::result::Result<vk::DescriptorSet, vk::Result> {
            self.log.borrow_mut().push(Event::Allocate(pool.as_raw()));
            Ok(vk::DescriptorSet::from_raw(self.bump()))
        }

        unsafe fn update_sets(&self, _writes: &[vk::WriteDescriptorSet<'_>]) {}
    }

    impl FrameDevice for FakeDevice {
        unsafe fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
            self.log.borrow_mut().push(Event::WaitFence(fence.as_raw()));
            if self.hung_fences.contains(&fence.as_raw()) {
                return Err(GpuError::DeviceTimeout {
                    budget_ns: timeout_ns,
                });
            }
            Ok(())
        }

        unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
            self.log
                .borrow_mut()
                .push(Event::ResetFence(fence.as_raw()));
            Ok(())
        }

        unsafe fn restart_commands(&self, cmd: vk::CommandBuffer) -> Result<()> {
            self.log.borrow_mut().push(Event::Restart(cmd.as_raw()));
            Ok(())
        }

        unsafe fn submit_frame(
            &self,
            _queue: vk::Queue,
            cmd: vk::CommandBuffer,
            _wait_semaphore: vk::Semaphore,
            _signal_semaphore: vk::Semaphore,
            fence: vk::Fence,
        ) -> Result<()> {
            self.log.borrow_mut().push(Event::Submit {
                cmd: cmd.as_raw(),
                fence: fence.as_raw(),
            });
            Ok(())
        }
    }

    /// Release recorder writing into the same log as the device.
    struct LogReleaser {
        log: Log,
    }

    impl ReleaseDispatcher for LogReleaser {
        fn release(&mut self, intent: ReleaseIntent) -> Result<()> {
            let handle = match intent {
                ReleaseIntent::ImageView(v) => v.as_raw(),
                ReleaseIntent::Fence(f) => f.as_raw(),
                ReleaseIntent::Semaphore(s) => s.as_raw(),
                ReleaseIntent::CommandPool(p) => p.as_raw(),
                _ => unreachable!("tests push only handle intents"),
            };
            self.log.borrow_mut().push(Event::Release(handle));
            Ok(())
        }
    }

    fn slot(device: &FakeDevice, id: u64) -> FrameSlot {
        FrameSlot {
            command_pool: vk::CommandPool::from_raw(id * 10),
            command_buffer: vk::CommandBuffer::from_raw(id * 10 + 1),
            acquire_semaphore: vk::Semaphore::from_raw(id * 10 + 2),
            render_fence: vk::Fence::from_raw(id * 100),
            deletion: DeletionQueue::new(),
            descriptors: unsafe {
                GrowableDescriptorAllocator::new(
                    device,
                    4,
                    &[PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0)],
                )
            }
            .unwrap(),
        }
    }

    fn scheduler(device: &FakeDevice) -> FrameScheduler {
        FrameScheduler::from_slots(vec![slot(device, 1), slot(device, 2)])
    }

    #[test]
    fn begin_frame_orders_wait_flush_clear_reset_restart() {
        let log: Log = Rc::default();
        let device = FakeDevice::new(Rc::clone(&log));
        let mut sched = scheduler(&device);
        let mut releaser = LogReleaser {
            log: Rc::clone(&log),
        };

        sched
            .current()
            .deletion
            .push(ReleaseIntent::ImageView(vk::ImageView::from_raw(777)));
        log.borrow_mut().clear();

        let cmd = unsafe { sched.begin_frame(&device, &mut releaser) }.unwrap();
        assert_eq!(cmd.as_raw(), 11);

        let events = log.borrow().clone();
        assert_eq!(
            events,
            vec![
                Event::WaitFence(100),
                Event::Release(777),
                Event::ResetPool(1),
                Event::ResetFence(100),
                Event::Restart(11),
            ]
        );
    }

    #[test]
    fn slots_cycle_round_robin_and_frame_number_advances() {
        let log: Log = Rc::default();
        let device = FakeDevice::new(Rc::clone(&log));
        let mut sched = scheduler(&device);
        let mut releaser = LogReleaser {
            log: Rc::clone(&log),
        };
        let render_finished = vk::Semaphore::from_raw(9000);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(sched.slot_index());
            unsafe { sched.begin_frame(&device, &mut releaser) }.unwrap();
            unsafe { sched.end_frame(&device, vk::Queue::null(), render_finished) }.unwrap();
        }

        assert_eq!(seen, vec![0, 1, 0, 1]);
        assert_eq!(sched.frame_number(), 4);
    }

    #[test]
    fn release_intent_flushes_on_slot_reuse_behind_the_fence() {
        let log: Log = Rc::default();
        let device = FakeDevice::new(Rc::clone(&log));
        let mut sched = scheduler(&device);
        let mut releaser = LogReleaser {
            log: Rc::clone(&log),
        };
        let render_finished = vk::Semaphore::from_raw(9000);

        // Frame 0 on slot 0: retire a resource mid-frame.
        unsafe { sched.begin_frame(&device, &mut releaser) }.unwrap();
        sched
            .current()
            .deletion
            .push(ReleaseIntent::ImageView(vk::ImageView::from_raw(777)));
        unsafe { sched.end_frame(&device, vk::Queue::null(), render_finished) }.unwrap();

        // Frame 1 on slot 1: the intent must not run here.
        unsafe { sched.begin_frame(&device, &mut releaser) }.unwrap();
        unsafe { sched.end_frame(&device, vk::Queue::null(), render_finished) }.unwrap();
        assert!(!log.borrow().contains(&Event::Release(777)));

        // Frame 2 reuses slot 0: the release runs, strictly after slot 0's
        // fence wait.
        unsafe { sched.begin_frame(&device, &mut releaser) }.unwrap();
        let events = log.borrow().clone();
        let wait_pos = events
            .iter()
            .rposition(|e| *e == Event::WaitFence(100))
            .unwrap();
        let release_pos = events
            .iter()
            .position(|e| *e == Event::Release(777))
            .unwrap();
        assert!(wait_pos < release_pos);
    }

    #[test]
    fn fence_timeout_aborts_begin_frame_before_any_recycling() {
        let log: Log = Rc::default();
        let mut device = FakeDevice::new(Rc::clone(&log));
        device.hung_fences.push(100);
        let mut sched = scheduler(&device);
        let mut releaser = LogReleaser {
            log: Rc::clone(&log),
        };

        sched
            .current()
            .deletion
            .push(ReleaseIntent::ImageView(vk::ImageView::from_raw(777)));

        let err = unsafe { sched.begin_frame(&device, &mut releaser) }.unwrap_err();
        assert!(matches!(
            err,
            GpuError::DeviceTimeout {
                budget_ns: FENCE_TIMEOUT_NS
            }
        ));

        // Nothing was flushed or reset once the wait failed.
        let events = log.borrow().clone();
        assert_eq!(events.last(), Some(&Event::WaitFence(100)));
        assert_eq!(sched.current().deletion.len(), 1);
    }

    #[test]
    fn destroy_flushes_leftovers_and_tears_down_slots() {
        let log: Log = Rc::default();
        let device = FakeDevice::new(Rc::clone(&log));
        let mut sched = scheduler(&device);
        let mut releaser = LogReleaser {
            log: Rc::clone(&log),
        };

        sched
            .current()
            .deletion
            .push(ReleaseIntent::ImageView(vk::ImageView::from_raw(777)));

        unsafe { sched.destroy(&device, &mut releaser) }.unwrap();

        let events = log.borrow().clone();
        assert!(events.contains(&Event::Release(777)));
        // Slot 0: fence, semaphore, command pool.
        assert!(events.contains(&Event::Release(100)));
        assert!(events.contains(&Event::Release(12)));
        assert!(events.contains(&Event::Release(10)));
        // Slot 1 likewise.
        assert!(events.contains(&Event::Release(200)));
        // Both slots' descriptor pools went with them.
        assert_eq!(
            events.iter().filter(|e| matches!(e, Event::DestroyPool(_))).count(),
            2
        );
        assert_eq!(sched.overlap(), 0);
    }
}
