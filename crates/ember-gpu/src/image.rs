//! Image layout transitions and transfers.

use crate::error::Result;
use ash::vk;

/// Record a layout transition for `image`.
///
/// Uses a coarse `ALL_COMMANDS` / memory-write-to-read barrier rather than
/// per-use stage masks; correct for every transition at the cost of more
/// stalling than a tailored barrier.
///
/// # Safety
/// The command buffer must be recording and the image must be valid.
pub unsafe fn transition_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let aspect_mask = if new_layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(subresource_range(aspect_mask))
        .image(image);

    let dependency_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));

    // SAFETY: Caller guarantees cmd is recording and image is valid.
    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
}

/// Record a full-image blit from `src` to `dst` with linear filtering.
///
/// Both images must already be in the matching transfer layouts. A blit
/// rather than a copy so mismatched extents rescale instead of failing.
///
/// # Safety
/// The command buffer must be recording and both images must be valid.
pub unsafe fn copy_image_to_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    dst: vk::Image,
    src_extent: vk::Extent2D,
    dst_extent: vk::Extent2D,
) {
    let src_offsets = [
        vk::Offset3D::default(),
        vk::Offset3D {
            x: src_extent.width as i32,
            y: src_extent.height as i32,
            z: 1,
        },
    ];
    let dst_offsets = [
        vk::Offset3D::default(),
        vk::Offset3D {
            x: dst_extent.width as i32,
            y: dst_extent.height as i32,
            z: 1,
        },
    ];

    let subresource = vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .layer_count(1);

    let region = vk::ImageBlit2::default()
        .src_offsets(src_offsets)
        .dst_offsets(dst_offsets)
        .src_subresource(subresource)
        .dst_subresource(subresource);

    let blit_info = vk::BlitImageInfo2::default()
        .src_image(src)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(std::slice::from_ref(&region));

    // SAFETY: Caller guarantees cmd is recording and both images are valid.
    unsafe { device.cmd_blit_image2(cmd, &blit_info) };
}

/// Subresource range covering every mip and layer of `aspect_mask`.
pub fn subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect_mask)
        .level_count(vk::REMAINING_MIP_LEVELS)
        .layer_count(vk::REMAINING_ARRAY_LAYERS)
}

/// Create a 2D image view.
///
/// # Safety
/// The device and image must be valid.
pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(subresource_range(aspect_mask));

    // SAFETY: Caller guarantees device and image are valid.
    let view = unsafe { device.create_image_view(&create_info, None)? };
    Ok(view)
}
