//! Deferred release of GPU resources.
//!
//! With multiple frames in flight a resource cannot be destroyed the moment
//! the CPU stops referencing it; the GPU may still be reading it. Release
//! obligations are therefore queued as plain data and flushed only once a
//! fence proves the corresponding GPU work has retired: per-frame queues
//! flush at slot reuse, the global queue flushes once at shutdown after a
//! device idle wait.

use crate::error::Result;
use crate::memory::{GpuAllocator, GpuBuffer, GpuImage};
use ash::vk;

/// A single deferred release obligation.
///
/// Intents are tagged values rather than closures so a queue's contents can
/// be inspected and dispatched by tests without touching a device.
pub enum ReleaseIntent {
    /// Free a buffer and its memory.
    Buffer(GpuBuffer),
    /// Free an image and its memory. Views onto the image must be queued
    /// after it so they are released first.
    Image(GpuImage),
    /// Destroy an image view.
    ImageView(vk::ImageView),
    /// Destroy a sampler.
    Sampler(vk::Sampler),
    /// Destroy a descriptor pool.
    DescriptorPool(vk::DescriptorPool),
    /// Destroy a descriptor set layout.
    DescriptorSetLayout(vk::DescriptorSetLayout),
    /// Destroy a pipeline.
    Pipeline(vk::Pipeline),
    /// Destroy a pipeline layout.
    PipelineLayout(vk::PipelineLayout),
    /// Destroy a command pool (frees its command buffers with it).
    CommandPool(vk::CommandPool),
    /// Destroy a fence.
    Fence(vk::Fence),
    /// Destroy a semaphore.
    Semaphore(vk::Semaphore),
}

/// Executes release intents.
///
/// The production dispatcher is [`DeviceReleaser`]; tests substitute a
/// recorder to observe dispatch order.
pub trait ReleaseDispatcher {
    /// Release one resource. Failures abort the flush in progress; there is
    /// no partial-flush recovery.
    fn release(&mut self, intent: ReleaseIntent) -> Result<()>;
}

/// Ordered queue of deferred release intents.
///
/// [`Self::flush`] dispatches in strict reverse registration order (LIFO),
/// mirroring acquisition order so a resource is never released before
/// something that depends on it. After a flush the queue is empty and ready
/// to accumulate again; flushing an empty queue is a no-op.
#[derive(Default)]
pub struct DeletionQueue {
    intents: Vec<ReleaseIntent>,
}

impl DeletionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deferred release. Never fails, never executes immediately.
    pub fn push(&mut self, intent: ReleaseIntent) {
        self.intents.push(intent);
    }

    /// Number of pending intents.
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Whether the queue has no pending intents.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Dispatch every pending intent in reverse registration order, then
    /// leave the queue empty and reusable.
    pub fn flush(&mut self, dispatcher: &mut impl ReleaseDispatcher) -> Result<()> {
        while let Some(intent) = self.intents.pop() {
            dispatcher.release(intent)?;
        }
        Ok(())
    }
}

/// Dispatcher that destroys resources on the device.
pub struct DeviceReleaser<'a> {
    device: &'a ash::Device,
    allocator: &'a mut GpuAllocator,
}

impl<'a> DeviceReleaser<'a> {
    /// Create a releaser.
    ///
    /// # Safety
    /// The caller must guarantee that no GPU work still references any
    /// resource this releaser will be handed: either the owning frame slot's
    /// fence has signaled or the device is idle.
    pub unsafe fn new(device: &'a ash::Device, allocator: &'a mut GpuAllocator) -> Self {
        Self { device, allocator }
    }
}

impl ReleaseDispatcher for DeviceReleaser<'_> {
    fn release(&mut self, intent: ReleaseIntent) -> Result<()> {
        // SAFETY: The constructor contract guarantees the GPU is done with
        // every resource released here.
        unsafe {
            match intent {
                ReleaseIntent::Buffer(mut buffer) => self.allocator.free_buffer(&mut buffer)?,
                ReleaseIntent::Image(mut image) => self.allocator.free_image(&mut image)?,
                ReleaseIntent::ImageView(view) => self.device.destroy_image_view(view, None),
                ReleaseIntent::Sampler(sampler) => self.device.destroy_sampler(sampler, None),
                ReleaseIntent::DescriptorPool(pool) => {
                    self.device.destroy_descriptor_pool(pool, None);
                }
                ReleaseIntent::DescriptorSetLayout(layout) => {
                    self.device.destroy_descriptor_set_layout(layout, None);
                }
                ReleaseIntent::Pipeline(pipeline) => self.device.destroy_pipeline(pipeline, None),
                ReleaseIntent::PipelineLayout(layout) => {
                    self.device.destroy_pipeline_layout(layout, None);
                }
                ReleaseIntent::CommandPool(pool) => self.device.destroy_command_pool(pool, None),
                ReleaseIntent::Fence(fence) => self.device.destroy_fence(fence, None),
                ReleaseIntent::Semaphore(semaphore) => {
                    self.device.destroy_semaphore(semaphore, None);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    /// Records the raw handle of every dispatched intent.
    #[derive(Default)]
    struct Recorder {
        released: Vec<u64>,
    }

    impl ReleaseDispatcher for Recorder {
        fn release(&mut self, intent: ReleaseIntent) -> Result<()> {
            let handle = match intent {
                ReleaseIntent::Fence(f) => f.as_raw(),
                ReleaseIntent::Semaphore(s) => s.as_raw(),
                ReleaseIntent::ImageView(v) => v.as_raw(),
                _ => unreachable!("test pushes only handle intents"),
            };
            self.released.push(handle);
            Ok(())
        }
    }

    #[test]
    fn flush_runs_in_reverse_registration_order() {
        let mut queue = DeletionQueue::new();
        queue.push(ReleaseIntent::Fence(vk::Fence::from_raw(1)));
        queue.push(ReleaseIntent::Semaphore(vk::Semaphore::from_raw(2)));
        queue.push(ReleaseIntent::ImageView(vk::ImageView::from_raw(3)));
        assert_eq!(queue.len(), 3);

        let mut recorder = Recorder::default();
        queue.flush(&mut recorder).unwrap();

        assert_eq!(recorder.released, vec![3, 2, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_flush_is_a_noop_and_queue_stays_usable() {
        let mut queue = DeletionQueue::new();
        let mut recorder = Recorder::default();

        queue.flush(&mut recorder).unwrap();
        assert!(recorder.released.is_empty());

        // The queue restarts cleanly after each flush.
        queue.push(ReleaseIntent::Fence(vk::Fence::from_raw(7)));
        queue.flush(&mut recorder).unwrap();
        assert_eq!(recorder.released, vec![7]);

        queue.push(ReleaseIntent::Fence(vk::Fence::from_raw(8)));
        queue.flush(&mut recorder).unwrap();
        assert_eq!(recorder.released, vec![7, 8]);
    }
}
