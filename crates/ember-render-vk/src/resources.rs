// SPDX-License-Identifier: CEPL-1.0
//! Resources created once at startup and kept across swapchain rebuilds.

use ash::vk;
use ember_render::{RenderError, RenderResult, Scene};
use tracing::{debug, info};

use crate::context::RenderContext;
use crate::gpu::{ImageDesc, ImageViewDesc, SamplerDesc};
use crate::memory::{self, AllocatedBuffer, AllocatedImage, UploadTarget};
use crate::pipeline::descriptor_bindings;
use crate::shader::ShaderSet;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

#[derive(Default)]
pub struct StaticResources {
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub vertex_buffer: AllocatedBuffer,
    pub index_buffer: AllocatedBuffer,
    pub index_count: u32,
    pub texture: AllocatedImage,
    pub texture_view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub shaders: ShaderSet,
}

fn validate(scene: &Scene) -> RenderResult<()> {
    if scene.vertices.is_empty() || scene.indices.is_empty() {
        return Err(RenderError::AssetLoad("scene has no geometry".into()));
    }
    let vertex_count = scene.vertices.len() as u32;
    if let Some(bad) = scene.indices.iter().find(|&&i| i >= vertex_count) {
        return Err(RenderError::AssetLoad(format!(
            "index {bad} out of range for {vertex_count} vertices"
        )));
    }
    let t = &scene.texture;
    if t.width == 0 || t.height == 0 || t.rgba.len() != t.byte_len() {
        return Err(RenderError::AssetLoad(format!(
            "texture {}x{} has {} bytes, expected {}",
            t.width,
            t.height,
            t.rgba.len(),
            t.byte_len()
        )));
    }
    Ok(())
}

impl StaticResources {
    pub fn create(ctx: &mut RenderContext, scene: &Scene, shaders: ShaderSet) -> RenderResult<Self> {
        validate(scene)?;
        let mut res = Self {
            shaders,
            ..Default::default()
        };
        match res.build(ctx, scene) {
            Ok(()) => {
                info!(
                    vertices = scene.vertices.len(),
                    indices = res.index_count,
                    texture_width = res.texture.width,
                    texture_height = res.texture.height,
                    "static resources uploaded"
                );
                Ok(res)
            }
            Err(e) => {
                res.destroy(ctx);
                Err(e)
            }
        }
    }

    fn build(&mut self, ctx: &mut RenderContext, scene: &Scene) -> RenderResult<()> {
        self.descriptor_set_layout = ctx
            .gpu
            .create_descriptor_set_layout(&descriptor_bindings())?;

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&scene.vertices);
        self.vertex_buffer = memory::create_buffer(
            ctx,
            vertex_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        memory::upload_via_staging(
            ctx,
            vertex_bytes,
            UploadTarget::Buffer(self.vertex_buffer.buffer),
        )?;

        let index_bytes: &[u8] = bytemuck::cast_slice(&scene.indices);
        self.index_buffer = memory::create_buffer(
            ctx,
            index_bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        memory::upload_via_staging(
            ctx,
            index_bytes,
            UploadTarget::Buffer(self.index_buffer.buffer),
        )?;
        self.index_count = scene.index_count();

        let tex = &scene.texture;
        self.texture = memory::create_image(
            ctx,
            &ImageDesc {
                width: tex.width,
                height: tex.height,
                format: TEXTURE_FORMAT,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            },
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        memory::upload_via_staging(ctx, &tex.rgba, UploadTarget::Image(self.texture))?;

        self.texture_view = ctx.gpu.create_image_view(&ImageViewDesc {
            image: self.texture.image,
            format: TEXTURE_FORMAT,
            aspect: vk::ImageAspectFlags::COLOR,
        })?;
        self.sampler = ctx.gpu.create_sampler(&SamplerDesc {
            anisotropy: Some(ctx.max_sampler_anisotropy),
            ..Default::default()
        })?;
        debug!(anisotropy = ctx.max_sampler_anisotropy, "texture sampler created");
        Ok(())
    }

    /// Safe on a partially built value; handles are nulled as they go.
    pub fn destroy(&mut self, ctx: &mut RenderContext) {
        let gpu = ctx.gpu.as_mut();
        gpu.destroy_sampler(std::mem::take(&mut self.sampler));
        gpu.destroy_image_view(std::mem::take(&mut self.texture_view));
        std::mem::take(&mut self.texture).destroy(gpu);
        std::mem::take(&mut self.index_buffer).destroy(gpu);
        std::mem::take(&mut self.vertex_buffer).destroy(gpu);
        gpu.destroy_descriptor_set_layout(std::mem::take(&mut self.descriptor_set_layout));
        self.index_count = 0;
    }
}
