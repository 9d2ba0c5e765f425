//! Descriptor set allocation and updates.
//!
//! The centerpiece is [`GrowableDescriptorAllocator`]: descriptor pools are
//! created lazily, grow geometrically, and are recycled in bulk once the GPU
//! is provably done with the sets carved from them. Per-frame allocators are
//! cleared at slot reuse; a global allocator lives for the whole process.

use crate::error::{GpuError, Result};
use ash::vk;

/// Weight of one descriptor kind relative to a pool's set capacity.
///
/// A pool created for `max_sets` sets budgets `ratio * max_sets` descriptors
/// of `ty`. The ratio template is copied into the allocator once and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct PoolSizeRatio {
    /// Descriptor kind this ratio applies to.
    pub ty: vk::DescriptorType,
    /// Descriptors of this kind per set of pool capacity.
    pub ratio: f32,
}

impl PoolSizeRatio {
    /// Convenience constructor.
    pub fn new(ty: vk::DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

/// Ceiling for per-pool set capacity. Growth stops here no matter how many
/// growth cycles occur.
pub const MAX_SETS_PER_POOL: u32 = 4096;

/// The slice of the device the descriptor allocator drives.
///
/// Implemented for [`ash::Device`]. Tests substitute an in-memory fake so the
/// pool bookkeeping can be exercised without a GPU.
pub trait DescriptorDevice {
    /// Create a pool holding up to `max_sets` sets, budgeting each descriptor
    /// kind at `ratio * max_sets` descriptors.
    ///
    /// # Safety
    /// The device must be valid.
    unsafe fn create_pool(
        &self,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<vk::DescriptorPool>;

    /// Reclaim all of `pool`'s capacity, invalidating every set allocated
    /// from it.
    ///
    /// # Safety
    /// No set from `pool` may still be referenced by in-flight GPU work.
    unsafe fn reset_pool(&self, pool: vk::DescriptorPool) -> Result<()>;

    /// Destroy `pool`.
    ///
    /// # Safety
    /// No set from `pool` may still be referenced by in-flight GPU work.
    unsafe fn destroy_pool(&self, pool: vk::DescriptorPool);

    /// Allocate one set of `layout` from `pool`.
    ///
    /// Returns the raw `vk::Result` on failure so the caller can tell pool
    /// exhaustion apart from fatal errors.
    ///
    /// # Safety
    /// The pool and layout must be valid.
    unsafe fn allocate_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> std::result::Result<vk::DescriptorSet, vk::Result>;

    /// Apply a batch of descriptor writes in one call.
    ///
    /// # Safety
    /// Every resource referenced by `writes` must be valid.
    unsafe fn update_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]);
}

impl DescriptorDevice for ash::Device {
    unsafe fn create_pool(
        &self,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<vk::DescriptorPool> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = ratios
            .iter()
            .map(|r| {
                vk::DescriptorPoolSize::default()
                    .ty(r.ty)
                    .descriptor_count((r.ratio * max_sets as f32) as u32)
            })
            .collect();

        // No FREE_DESCRIPTOR_SET: sets are reclaimed in bulk via reset_pool.
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        // SAFETY: Caller guarantees the device is valid.
        let pool = unsafe { self.create_descriptor_pool(&create_info, None)? };
        Ok(pool)
    }

    unsafe fn reset_pool(&self, pool: vk::DescriptorPool) -> Result<()> {
        // SAFETY: Caller guarantees the pool is no longer in use.
        unsafe { self.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())? };
        Ok(())
    }

    unsafe fn destroy_pool(&self, pool: vk::DescriptorPool) {
        // SAFETY: Caller guarantees the pool is no longer in use.
        unsafe { self.destroy_descriptor_pool(pool, None) };
    }

    unsafe fn allocate_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> std::result::Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        // SAFETY: Caller guarantees pool and layout are valid.
        let sets = unsafe { self.allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }

    unsafe fn update_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        // SAFETY: Caller guarantees the referenced resources are valid.
        unsafe { self.update_descriptor_sets(writes, &[]) };
    }
}

/// Growable descriptor-set allocator.
///
/// Every tracked pool is in exactly one of two lists: `ready` (assumed to
/// have spare capacity) or `full` (observed to fail an allocation). Ready
/// pools are reused LIFO so the most recently touched pool stays warm. The
/// success path is optimistic: a pool that served an allocation goes straight
/// back to the ready list without querying how much capacity remains, and the
/// allocator corrects course only when the device reports exhaustion. That
/// trades an occasional extra pool for not paying a capacity check on every
/// call.
pub struct GrowableDescriptorAllocator {
    ratios: Vec<PoolSizeRatio>,
    ready: Vec<vk::DescriptorPool>,
    full: Vec<vk::DescriptorPool>,
    /// Set capacity the next lazily created pool will get. Grows ×1.5 per
    /// pool creation, capped at [`MAX_SETS_PER_POOL`], and persists across
    /// `clear_pools`.
    sets_per_pool: u32,
    destroyed: bool,
}

impl GrowableDescriptorAllocator {
    /// Create the allocator with one pool of `initial_sets` capacity.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new<D: DescriptorDevice>(
        device: &D,
        initial_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<Self> {
        // SAFETY: Caller guarantees the device is valid.
        let pool = unsafe { device.create_pool(initial_sets, ratios)? };

        Ok(Self {
            ratios: ratios.to_vec(),
            ready: vec![pool],
            full: Vec::new(),
            sets_per_pool: grow_capacity(initial_sets),
            destroyed: false,
        })
    }

    /// Allocate a descriptor set of `layout`.
    ///
    /// Pool exhaustion (`ERROR_OUT_OF_POOL_MEMORY` / `ERROR_FRAGMENTED_POOL`)
    /// is handled internally: the exhausted pool is parked in the full list
    /// and the allocation retried exactly once against a fresh pool. A second
    /// failure propagates so tail latency stays bounded. All other device
    /// errors propagate immediately.
    ///
    /// # Safety
    /// The device and layout must be valid, and `destroy_pools` must not have
    /// been called.
    pub unsafe fn allocate<D: DescriptorDevice>(
        &mut self,
        device: &D,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        assert!(
            !self.destroyed,
            "GrowableDescriptorAllocator used after destroy_pools"
        );

        // SAFETY: Caller guarantees the device is valid.
        let pool = unsafe { self.take_ready_pool(device)? };

        // SAFETY: Caller guarantees pool and layout are valid.
        match unsafe { device.allocate_set(pool, layout) } {
            Ok(set) => {
                self.ready.push(pool);
                Ok(set)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.full.push(pool);

                // SAFETY: As above.
                let retry = unsafe { self.take_ready_pool(device)? };
                // SAFETY: As above.
                match unsafe { device.allocate_set(retry, layout) } {
                    Ok(set) => {
                        self.ready.push(retry);
                        Ok(set)
                    }
                    // The pool stays tracked even when the retry fails, so
                    // clear_pools/destroy_pools still reach it.
                    Err(e) => {
                        self.full.push(retry);
                        Err(GpuError::from(e))
                    }
                }
            }
            Err(e) => {
                self.ready.push(pool);
                Err(GpuError::from(e))
            }
        }
    }

    /// Reset every pool and return them all to the ready list, invalidating
    /// every set handed out since the last clear.
    ///
    /// The growth capacity is deliberately left unchanged: a workload with a
    /// temporary spike in descriptor demand keeps paying for larger pools
    /// until the allocator is rebuilt.
    ///
    /// # Safety
    /// No set from this allocator may still be referenced by in-flight GPU
    /// work, and `destroy_pools` must not have been called.
    pub unsafe fn clear_pools<D: DescriptorDevice>(&mut self, device: &D) -> Result<()> {
        assert!(
            !self.destroyed,
            "GrowableDescriptorAllocator used after destroy_pools"
        );

        self.ready.append(&mut self.full);
        for &pool in &self.ready {
            // SAFETY: Caller guarantees no set is still in use.
            unsafe { device.reset_pool(pool)? };
        }
        Ok(())
    }

    /// Destroy all pools. Terminal: any further use of this allocator is a
    /// contract violation and panics.
    ///
    /// # Safety
    /// No set from this allocator may still be referenced by in-flight GPU
    /// work.
    pub unsafe fn destroy_pools<D: DescriptorDevice>(&mut self, device: &D) {
        for pool in self.ready.drain(..).chain(self.full.drain(..)) {
            // SAFETY: Caller guarantees no set is still in use.
            unsafe { device.destroy_pool(pool) };
        }
        self.destroyed = true;
    }

    /// Number of pools currently tracked (ready + full).
    pub fn pool_count(&self) -> usize {
        self.ready.len() + self.full.len()
    }

    /// Set capacity the next lazily created pool will get.
    pub fn next_pool_capacity(&self) -> u32 {
        self.sets_per_pool
    }

    /// Pop the most recently returned ready pool, or create a fresh pool at
    /// the current growth capacity and advance the capacity for next time.
    unsafe fn take_ready_pool<D: DescriptorDevice>(
        &mut self,
        device: &D,
    ) -> Result<vk::DescriptorPool> {
        if let Some(pool) = self.ready.pop() {
            return Ok(pool);
        }

        // SAFETY: Caller guarantees the device is valid.
        let pool = unsafe { device.create_pool(self.sets_per_pool, &self.ratios)? };
        self.sets_per_pool = grow_capacity(self.sets_per_pool);
        Ok(pool)
    }
}

/// Next pool capacity: ×1.5 rounded up, capped at [`MAX_SETS_PER_POOL`].
fn grow_capacity(sets: u32) -> u32 {
    (sets.saturating_mul(3).div_ceil(2)).min(MAX_SETS_PER_POOL)
}

/// Descriptor set layout builder.
pub struct DescriptorLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorLayoutBuilder<'a> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a storage buffer binding.
    pub fn storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    /// Add a storage image binding.
    pub fn storage_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_IMAGE, stage_flags)
    }

    /// Add a combined image sampler binding.
    pub fn sampled_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags,
        )
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        // SAFETY: Caller guarantees the device is valid.
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };
        Ok(layout)
    }
}

impl Default for DescriptorLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// A staged binding update, not yet tied to a destination set.
enum StagedWrite {
    Buffer {
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    },
    Image {
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    },
}

/// Batches descriptor writes and commits them to a set in one device call.
///
/// Writes are staged without a destination set; [`Self::update_set`] stamps
/// the target onto every staged write and submits the whole batch. The
/// backing buffers and image views must stay alive until then; that validity
/// window belongs to the caller. After a commit the writer can be reused via
/// [`Self::clear`].
#[derive(Default)]
pub struct DescriptorWriter {
    writes: Vec<StagedWrite>,
}

impl DescriptorWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a buffer binding update.
    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.writes.push(StagedWrite::Buffer {
            binding,
            ty,
            info: vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(offset)
                .range(range),
        });
        self
    }

    /// Stage an image binding update.
    pub fn write_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.writes.push(StagedWrite::Image {
            binding,
            ty,
            info: vk::DescriptorImageInfo::default()
                .image_view(view)
                .sampler(sampler)
                .image_layout(layout),
        });
        self
    }

    /// Number of staged writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether no writes are staged.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Drop all staged writes so the writer can be reused.
    pub fn clear(&mut self) {
        self.writes.clear();
    }

    /// Stamp `set` onto every staged write and submit them as one batched
    /// update call.
    ///
    /// # Safety
    /// The device and `set` must be valid, and every buffer and image view
    /// staged into this writer must still be alive.
    pub unsafe fn update_set<D: DescriptorDevice>(&self, device: &D, set: vk::DescriptorSet) {
        let writes: Vec<vk::WriteDescriptorSet<'_>> = self
            .writes
            .iter()
            .map(|w| match w {
                StagedWrite::Buffer { binding, ty, info } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .buffer_info(std::slice::from_ref(info)),
                StagedWrite::Image { binding, ty, info } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .image_info(std::slice::from_ref(info)),
            })
            .collect();

        // SAFETY: Caller guarantees the staged resources are still alive.
        unsafe { device.update_sets(&writes) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::RefCell;

    /// In-memory pool backend that models exact set capacities.
    struct FakeDevice {
        state: RefCell<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        /// capacity and used count per live pool, keyed by raw handle.
        pools: Vec<FakePool>,
        next_pool: u64,
        next_set: u64,
        created_capacities: Vec<u32>,
        committed_writes: Vec<(u64, u32, vk::DescriptorType)>,
    }

    struct FakePool {
        handle: u64,
        capacity: u32,
        used: u32,
        live: bool,
    }

    impl FakeDevice {
        fn new() -> Self {
            Self {
                state: RefCell::new(FakeState::default()),
            }
        }

        fn live_pool_count(&self) -> usize {
            self.state.borrow().pools.iter().filter(|p| p.live).count()
        }

        fn created_capacities(&self) -> Vec<u32> {
            self.state.borrow().created_capacities.clone()
        }
    }

    impl DescriptorDevice for FakeDevice {
        unsafe fn create_pool(
            &self,
            max_sets: u32,
            _ratios: &[PoolSizeRatio],
        ) -> Result<vk::DescriptorPool> {
            let mut state = self.state.borrow_mut();
            state.next_pool += 1;
            let handle = state.next_pool;
            state.pools.push(FakePool {
                handle,
                capacity: max_sets,
                used: 0,
                live: true,
            });
            state.created_capacities.push(max_sets);
            Ok(vk::DescriptorPool::from_raw(handle))
        }

        unsafe fn reset_pool(&self, pool: vk::DescriptorPool) -> Result<()> {
            let mut state = self.state.borrow_mut();
            let p = state
                .pools
                .iter_mut()
                .find(|p| p.handle == pool.as_raw() && p.live)
                .expect("reset of unknown pool");
            p.used = 0;
            Ok(())
        }

        unsafe fn destroy_pool(&self, pool: vk::DescriptorPool) {
            let mut state = self.state.borrow_mut();
            let p = state
                .pools
                .iter_mut()
                .find(|p| p.handle == pool.as_raw() && p.live)
                .expect("destroy of unknown pool");
            p.live = false;
        }

        unsafe fn allocate_set(
            &self,
            pool: vk::DescriptorPool,
            _layout: vk::DescriptorSetLayout,
        ) -> std::result::Result<vk::DescriptorSet, vk::Result> {
            let mut state = self.state.borrow_mut();
            let p = state
                .pools
                .iter_mut()
                .find(|p| p.handle == pool.as_raw() && p.live)
                .expect("allocation from unknown pool");
            if p.used >= p.capacity {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            p.used += 1;
            state.next_set += 1;
            Ok(vk::DescriptorSet::from_raw(state.next_set))
        }

        unsafe fn update_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
            let mut state = self.state.borrow_mut();
            for w in writes {
                state
                    .committed_writes
                    .push((w.dst_set.as_raw(), w.dst_binding, w.descriptor_type));
            }
        }
    }

    fn layout() -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::from_raw(0xDEAD)
    }

    fn ratios() -> Vec<PoolSizeRatio> {
        vec![PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0)]
    }

    #[test]
    fn first_allocation_uses_initial_pool() {
        let device = FakeDevice::new();
        let mut alloc = unsafe { GrowableDescriptorAllocator::new(&device, 4, &ratios()) }.unwrap();

        unsafe { alloc.allocate(&device, layout()) }.unwrap();

        assert_eq!(alloc.pool_count(), 1);
        assert_eq!(device.live_pool_count(), 1);
    }

    #[test]
    fn exhaustion_grows_a_second_pool_at_one_and_a_half_capacity() {
        let device = FakeDevice::new();
        let mut alloc = unsafe { GrowableDescriptorAllocator::new(&device, 4, &ratios()) }.unwrap();

        // Fill the initial pool exactly.
        for _ in 0..4 {
            unsafe { alloc.allocate(&device, layout()) }.unwrap();
        }
        assert_eq!(alloc.pool_count(), 1);

        // The next allocation observes exhaustion and retries on a new pool.
        unsafe { alloc.allocate(&device, layout()) }.unwrap();
        assert_eq!(alloc.pool_count(), 2);
        assert_eq!(device.created_capacities(), vec![4, 6]);
        // Capacity for the pool after that has grown again: ceil(6 * 1.5) = 9.
        assert_eq!(alloc.next_pool_capacity(), 9);
    }

    #[test]
    fn growth_is_capped() {
        let device = FakeDevice::new();
        let mut alloc =
            unsafe { GrowableDescriptorAllocator::new(&device, 4000, &ratios()) }.unwrap();
        assert_eq!(alloc.next_pool_capacity(), MAX_SETS_PER_POOL);

        // Exhaust the first pool so a capped pool gets created; the growth
        // value must stay pinned at the ceiling afterwards.
        for _ in 0..4001 {
            unsafe { alloc.allocate(&device, layout()) }.unwrap();
        }
        assert_eq!(alloc.next_pool_capacity(), MAX_SETS_PER_POOL);
        assert_eq!(device.created_capacities(), vec![4000, MAX_SETS_PER_POOL]);
    }

    #[test]
    fn clear_pools_reclaims_full_pools_without_new_pool() {
        let device = FakeDevice::new();
        let mut alloc = unsafe { GrowableDescriptorAllocator::new(&device, 2, &ratios()) }.unwrap();

        for _ in 0..3 {
            unsafe { alloc.allocate(&device, layout()) }.unwrap();
        }
        assert_eq!(alloc.pool_count(), 2);
        let capacity_before = alloc.next_pool_capacity();

        unsafe { alloc.clear_pools(&device) }.unwrap();

        // Everything is allocatable again and no third pool appears for the
        // same demand.
        for _ in 0..3 {
            unsafe { alloc.allocate(&device, layout()) }.unwrap();
        }
        assert_eq!(alloc.pool_count(), 2);
        assert_eq!(alloc.next_pool_capacity(), capacity_before);
    }

    #[test]
    fn ready_pool_selection_is_lifo() {
        let device = FakeDevice::new();
        let mut alloc = unsafe { GrowableDescriptorAllocator::new(&device, 1, &ratios()) }.unwrap();

        // Force a second pool into existence, then clear so both are ready.
        unsafe { alloc.allocate(&device, layout()) }.unwrap();
        unsafe { alloc.allocate(&device, layout()) }.unwrap();
        unsafe { alloc.clear_pools(&device) }.unwrap();

        // Only the most recently returned pool should serve the next
        // allocations; the fake would report exhaustion if a new pool were
        // created with zero spare capacity.
        unsafe { alloc.allocate(&device, layout()) }.unwrap();
        assert_eq!(alloc.pool_count(), 2);
        assert_eq!(device.live_pool_count(), 2);
    }

    #[test]
    fn failed_retry_pool_stays_tracked() {
        let device = FakeDevice::new();
        // Zero capacity: every allocation reports exhaustion, including the
        // retry against the freshly created pool.
        let mut alloc = unsafe { GrowableDescriptorAllocator::new(&device, 0, &ratios()) }.unwrap();

        let err = unsafe { alloc.allocate(&device, layout()) };
        assert!(err.is_err());

        // Both the exhausted pool and the failed retry pool must remain in
        // the allocator's lists so teardown reaches them.
        assert_eq!(alloc.pool_count(), 2);
        assert_eq!(device.live_pool_count(), 2);

        unsafe { alloc.destroy_pools(&device) };
        assert_eq!(device.live_pool_count(), 0);
    }

    #[test]
    #[should_panic(expected = "after destroy_pools")]
    fn allocate_after_destroy_is_a_contract_violation() {
        let device = FakeDevice::new();
        let mut alloc = unsafe { GrowableDescriptorAllocator::new(&device, 2, &ratios()) }.unwrap();

        unsafe { alloc.destroy_pools(&device) };
        let _ = unsafe { alloc.allocate(&device, layout()) };
    }

    #[test]
    fn destroy_pools_destroys_everything() {
        let device = FakeDevice::new();
        let mut alloc = unsafe { GrowableDescriptorAllocator::new(&device, 1, &ratios()) }.unwrap();
        unsafe { alloc.allocate(&device, layout()) }.unwrap();
        unsafe { alloc.allocate(&device, layout()) }.unwrap();
        assert_eq!(device.live_pool_count(), 2);

        unsafe { alloc.destroy_pools(&device) };
        assert_eq!(device.live_pool_count(), 0);
        assert_eq!(alloc.pool_count(), 0);
    }

    #[test]
    fn writer_stamps_target_set_on_every_staged_write() {
        let device = FakeDevice::new();
        let mut writer = DescriptorWriter::new();
        writer
            .write_buffer(
                0,
                vk::Buffer::from_raw(1),
                0,
                64,
                vk::DescriptorType::UNIFORM_BUFFER,
            )
            .write_image(
                1,
                vk::ImageView::from_raw(2),
                vk::Sampler::null(),
                vk::ImageLayout::GENERAL,
                vk::DescriptorType::STORAGE_IMAGE,
            );
        assert_eq!(writer.len(), 2);

        let set = vk::DescriptorSet::from_raw(42);
        unsafe { writer.update_set(&device, set) };

        let committed = device.state.borrow().committed_writes.clone();
        assert_eq!(
            committed,
            vec![
                (42, 0, vk::DescriptorType::UNIFORM_BUFFER),
                (42, 1, vk::DescriptorType::STORAGE_IMAGE),
            ]
        );

        writer.clear();
        assert!(writer.is_empty());
    }
}
