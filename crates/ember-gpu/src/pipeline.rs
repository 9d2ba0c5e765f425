//! Pipeline creation and management.

use crate::error::{GpuError, Result};
use ash::vk;

/// Compute pipeline wrapper.
pub struct ComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl ComputePipeline {
    /// Create a compute pipeline from SPIR-V words with entry point `main`.
    ///
    /// The shader module is transient; it is destroyed before returning.
    ///
    /// # Safety
    /// The device must be valid and `shader_code` must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        shader_code: &[u32],
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let shader_info = vk::ShaderModuleCreateInfo::default().code(shader_code);
        // SAFETY: Caller guarantees the device is valid.
        let shader_module = unsafe {
            device
                .create_shader_module(&shader_info, None)
                .map_err(|e| GpuError::ShaderLoad(e.to_string()))?
        };

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        // SAFETY: As above.
        let layout = match unsafe { device.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                // SAFETY: The module was created above and is unreferenced.
                unsafe { device.destroy_shader_module(shader_module, None) };
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(c"main");

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);

        // SAFETY: As above.
        let pipelines = match unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        } {
            Ok(pipelines) => pipelines,
            Err((_pipelines, e)) => {
                // SAFETY: Neither object is referenced once creation fails.
                unsafe {
                    device.destroy_shader_module(shader_module, None);
                    device.destroy_pipeline_layout(layout, None);
                }
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        // SAFETY: The module is no longer referenced once the pipeline
        // exists.
        unsafe { device.destroy_shader_module(shader_module, None) };

        Ok(Self {
            pipeline: pipelines[0],
            layout,
        })
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: Caller guarantees the pipeline is unused.
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
