//! Animated gradient demo application.

use std::path::Path;

use anyhow::Context as _;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_app::{AppContext, EmberApp, FrameContext};
use ember_gpu::descriptors::{DescriptorLayoutBuilder, DescriptorWriter};
use ember_gpu::image::{copy_image_to_image, create_image_view, transition_image};
use ember_gpu::{load_spirv, ComputePipeline, GpuImage, MemoryLocation, ReleaseIntent};
use glam::Vec4;

const WORKGROUP_SIZE: u32 = 16;

/// Push constants for the gradient shader.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GradientPush {
    top_color: Vec4,
    bottom_color: Vec4,
}

/// Per-frame uniform data, rebuilt each frame in a transient buffer.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SceneData {
    tint: Vec4,
    time: f32,
    _pad: [f32; 3],
}

/// Compute-gradient demo.
///
/// Long-lived resources (pipeline, draw image, the draw-image descriptor set
/// carved from the global allocator) retire at shutdown; the per-frame
/// uniform buffer and scene descriptor set go through the current frame slot,
/// demonstrating the fence-gated path.
pub struct GradientApp {
    pipeline: ComputePipeline,
    draw_layout: vk::DescriptorSetLayout,
    scene_layout: vk::DescriptorSetLayout,
    draw_set: vk::DescriptorSet,
    draw_image: Option<GpuImage>,
    draw_image_view: vk::ImageView,
    time: f32,
}

impl EmberApp for GradientApp {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let (draw_image, draw_image_view) = create_draw_image(ctx, ctx.width(), ctx.height())?;

        // SAFETY: Device is valid; both layouts outlive every set built from
        // them via the global deletion queue.
        let (draw_layout, scene_layout) = unsafe {
            let draw_layout = DescriptorLayoutBuilder::new()
                .storage_image(0, vk::ShaderStageFlags::COMPUTE)
                .build(ctx.gpu.device())?;
            let scene_layout = DescriptorLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::COMPUTE)
                .build(ctx.gpu.device())?;
            (draw_layout, scene_layout)
        };

        // The draw-image set is process-lifetime: allocated once from the
        // global allocator and reclaimed in bulk when its pools are
        // destroyed at shutdown.
        let draw_set = allocate_draw_set(ctx, draw_layout, draw_image_view)?;

        let shader_path = Path::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/shaders/gradient.comp.spv"
        ));
        let spirv = load_spirv(shader_path)?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .size(std::mem::size_of::<GradientPush>() as u32);

        // SAFETY: The SPIR-V was validated on load.
        let pipeline = unsafe {
            ComputePipeline::new(
                ctx.gpu.device(),
                &spirv,
                &[draw_layout, scene_layout],
                std::slice::from_ref(&push_range),
            )?
        };

        // The pipeline itself is torn down in cleanup, before these flush.
        ctx.global_deletion
            .push(ReleaseIntent::DescriptorSetLayout(draw_layout));
        ctx.global_deletion
            .push(ReleaseIntent::DescriptorSetLayout(scene_layout));

        tracing::info!("Gradient pipeline ready");

        Ok(Self {
            pipeline,
            draw_layout,
            scene_layout,
            draw_set,
            draw_image: Some(draw_image),
            draw_image_view,
            time: 0.0,
        })
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        self.time += dt;
    }

    fn render(&mut self, ctx: &mut AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let draw = self
            .draw_image
            .as_ref()
            .context("draw image not initialized")?;
        let cmd = frame.command_buffer;
        let draw_extent = vk::Extent2D {
            width: draw.extent.width,
            height: draw.extent.height,
        };

        // Transient per-frame uniform buffer; released once this slot's
        // fence proves the frame retired.
        let scene = SceneData {
            tint: Vec4::new(1.0, 0.9, 0.8, 1.0),
            time: self.time,
            _pad: [0.0; 3],
        };
        let buffer = {
            let mut allocator = ctx.gpu.allocator().lock();
            let buffer = allocator.create_buffer(
                std::mem::size_of::<SceneData>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                "gradient scene data",
            )?;
            buffer.write(&[scene])?;
            buffer
        };

        let device = ctx.gpu.device();
        let scene_set = {
            let slot = ctx.scheduler.current();
            // SAFETY: Layout and device are valid; the set lives until the
            // slot's pools are cleared.
            let set = unsafe { slot.descriptors.allocate(device, self.scene_layout)? };

            let mut writer = DescriptorWriter::new();
            writer.write_buffer(
                0,
                buffer.buffer,
                0,
                std::mem::size_of::<SceneData>() as u64,
                vk::DescriptorType::UNIFORM_BUFFER,
            );
            // SAFETY: The staged buffer is alive.
            unsafe { writer.update_set(device, set) };

            slot.deletion.push(ReleaseIntent::Buffer(buffer));
            set
        };

        let push = GradientPush {
            top_color: Vec4::new(0.1, 0.2, 0.8, 1.0),
            bottom_color: Vec4::new(0.9, 0.3, 0.1, 1.0),
        };

        // SAFETY: The command buffer is recording and every handle is valid.
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline.layout,
                0,
                &[self.draw_set, scene_set],
                &[],
            );
            device.cmd_push_constants(
                cmd,
                self.pipeline.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&push),
            );
            device.cmd_dispatch(
                cmd,
                draw_extent.width.div_ceil(WORKGROUP_SIZE),
                draw_extent.height.div_ceil(WORKGROUP_SIZE),
                1,
            );

            // Blit the offscreen result to the swapchain image, then put the
            // draw image back in GENERAL for the next dispatch.
            transition_image(
                device,
                cmd,
                draw.image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            );
            transition_image(
                device,
                cmd,
                frame.swapchain_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            copy_image_to_image(
                device,
                cmd,
                draw.image,
                frame.swapchain_image,
                draw_extent,
                ctx.swapchain.extent,
            );
            transition_image(
                device,
                cmd,
                draw.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::GENERAL,
            );
            transition_image(
                device,
                cmd,
                frame.swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
        }

        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        // Retire the old draw image through the current slot; view queued
        // after the image so it is released first.
        if let Some(image) = self.draw_image.take() {
            let slot = ctx.scheduler.current();
            slot.deletion.push(ReleaseIntent::Image(image));
            slot.deletion
                .push(ReleaseIntent::ImageView(self.draw_image_view));
        }

        let (image, view) = create_draw_image(ctx, width, height)?;
        // The old draw set stays in its pool until the global pools are
        // destroyed; individual sets are never freed.
        self.draw_set = allocate_draw_set(ctx, self.draw_layout, view)?;
        self.draw_image = Some(image);
        self.draw_image_view = view;
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        // The runner has already waited the device idle.
        // SAFETY: No submitted work references the pipeline anymore.
        unsafe { self.pipeline.destroy(ctx.gpu.device()) };

        if let Some(image) = self.draw_image.take() {
            ctx.global_deletion.push(ReleaseIntent::Image(image));
            ctx.global_deletion
                .push(ReleaseIntent::ImageView(self.draw_image_view));
        }
    }
}

/// Allocate a draw-image descriptor set from the global allocator and point
/// it at `view`.
fn allocate_draw_set(
    ctx: &mut AppContext,
    layout: vk::DescriptorSetLayout,
    view: vk::ImageView,
) -> anyhow::Result<vk::DescriptorSet> {
    let device = ctx.gpu.device();
    // SAFETY: Device, layout, and view are valid; the global pools outlive
    // the set.
    let set = unsafe { ctx.global_descriptors.allocate(device, layout)? };

    let mut writer = DescriptorWriter::new();
    writer.write_image(
        0,
        view,
        vk::Sampler::null(),
        vk::ImageLayout::GENERAL,
        vk::DescriptorType::STORAGE_IMAGE,
    );
    // SAFETY: The view is alive.
    unsafe { writer.update_set(device, set) };

    Ok(set)
}

/// Create the offscreen render target and move it to `GENERAL` layout so the
/// first dispatch can write it.
fn create_draw_image(
    ctx: &AppContext,
    width: u32,
    height: u32,
) -> anyhow::Result<(GpuImage, vk::ImageView)> {
    let create_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk::Format::R16G16B16A16_SFLOAT)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC);

    let image = ctx.gpu.allocator().lock().create_image(
        &create_info,
        MemoryLocation::GpuOnly,
        "gradient draw image",
    )?;

    let device = ctx.gpu.device();
    // SAFETY: Device and image are valid.
    let view = unsafe {
        create_image_view(
            device,
            image.image,
            create_info.format,
            vk::ImageAspectFlags::COLOR,
        )?
    };

    // SAFETY: The image was just created and nothing references it yet.
    unsafe {
        ctx.immediate
            .execute(device, ctx.gpu.graphics_queue(), |cmd| {
                transition_image(
                    device,
                    cmd,
                    image.image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::GENERAL,
                );
            })?;
    }

    Ok((image, view))
}
