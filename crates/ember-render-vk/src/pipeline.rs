// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ember_math::Vertex;
use ember_render::RenderResult;

use crate::context::RenderContext;
use crate::gpu::{DescriptorBinding, Gpu, PipelineDesc};
use crate::shader::{ShaderSet, ShaderStage};

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

/// set 0: transforms for the vertex stage, texture for the fragment stage.
pub fn descriptor_bindings() -> [DescriptorBinding; 2] {
    [
        DescriptorBinding {
            binding: UNIFORM_BINDING,
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            stages: ShaderStage::Vertex.vk_stage(),
        },
        DescriptorBinding {
            binding: SAMPLER_BINDING,
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stages: ShaderStage::Fragment.vk_stage(),
        },
    ]
}

pub fn vertex_attributes() -> Vec<vk::VertexInputAttributeDescription> {
    vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: Vertex::COLOR_OFFSET,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: Vertex::UV_OFFSET,
        },
    ]
}

/// Builds layout + pipeline for the given render pass and extent. Shader modules only
/// live for the duration of the call.
pub fn create_pipeline(
    ctx: &mut RenderContext,
    render_pass: vk::RenderPass,
    set_layout: vk::DescriptorSetLayout,
    extent: vk::Extent2D,
    shaders: &ShaderSet,
) -> RenderResult<(vk::PipelineLayout, vk::Pipeline)> {
    let gpu = ctx.gpu.as_mut();
    let layout = gpu.create_pipeline_layout(set_layout)?;

    match build_with_modules(gpu, render_pass, layout, extent, shaders) {
        Ok(pipeline) => Ok((layout, pipeline)),
        Err(e) => {
            gpu.destroy_pipeline_layout(layout);
            Err(e)
        }
    }
}

fn build_with_modules(
    gpu: &mut dyn Gpu,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    shaders: &ShaderSet,
) -> RenderResult<vk::Pipeline> {
    let vertex_module = gpu.create_shader_module(&shaders.vertex)?;
    let fragment_module = match gpu.create_shader_module(&shaders.fragment) {
        Ok(m) => m,
        Err(e) => {
            gpu.destroy_shader_module(vertex_module);
            return Err(e);
        }
    };

    let desc = PipelineDesc {
        render_pass,
        layout,
        vertex_module,
        fragment_module,
        extent,
        vertex_stride: Vertex::STRIDE,
        vertex_attributes: vertex_attributes(),
        ..Default::default()
    };
    let pipeline = gpu.create_graphics_pipeline(&desc);

    gpu.destroy_shader_module(vertex_module);
    gpu.destroy_shader_module(fragment_module);
    pipeline
}
