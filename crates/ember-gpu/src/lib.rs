//! Vulkan abstraction layer and resource lifecycle for the Ember renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Memory allocation via gpu-allocator
//! - Growable descriptor-set allocation and batched descriptor writes
//! - Fence-gated deferred resource release
//! - Frame scheduling with multiple frames in flight
//! - Swapchain handling

pub mod command;
pub mod context;
pub mod deletion;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use command::{CommandPool, ImmediateSubmit};
pub use context::{GpuContext, GpuContextBuilder};
pub use deletion::{DeletionQueue, DeviceReleaser, ReleaseDispatcher, ReleaseIntent};
pub use descriptors::{
    DescriptorLayoutBuilder, DescriptorWriter, GrowableDescriptorAllocator, PoolSizeRatio,
};
pub use error::{GpuError, Result};
pub use frame::{FrameScheduler, FrameSlot, FENCE_TIMEOUT_NS, FRAME_OVERLAP};
pub use gpu_allocator::MemoryLocation;
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::ComputePipeline;
pub use shader::load_spirv;
pub use surface::{SurfaceContext, SurfaceSupport};
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore};
