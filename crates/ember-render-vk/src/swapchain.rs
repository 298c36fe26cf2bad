// SPDX-License-Identifier: CEPL-1.0
//! Swapchain policy and every resource whose shape depends on the swapchain.

use ash::vk;
use ember_math::Transforms;
use ember_render::{PresentModePreference, RenderSize, RenderResult};
use tracing::{debug, info};

use crate::commands::{record_command_buffers, DrawSetup};
use crate::context::RenderContext;
use crate::gpu::{
    DescriptorPoolDesc, DescriptorWrite, FramebufferDesc, ImageViewDesc, QueueFamilies,
    RenderPassDesc, SurfaceSupport, SwapchainDesc,
};
use crate::memory::{self, AllocatedBuffer};
use crate::pipeline::{create_pipeline, SAMPLER_BINDING, UNIFORM_BINDING};
use crate::resources::StaticResources;

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

const UNIFORM_SIZE: vk::DeviceSize = std::mem::size_of::<Transforms>() as vk::DeviceSize;

/// BGRA8 sRGB with the sRGB non-linear color space, else whatever comes first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| *f == PREFERRED_FORMAT)
        .or_else(|| formats.first().copied())
        .unwrap_or(PREFERRED_FORMAT)
}

/// FIFO is always available, so it is the fallback for every preference.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// The surface's current extent, or the framebuffer size when the surface leaves it
/// to us (`u32::MAX`). Either way the result is kept inside min/max.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> vk::Extent2D {
    let want = if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: framebuffer.width,
            height: framebuffer.height,
        }
    } else {
        caps.current_extent
    };
    // max-then-min instead of clamp: a driver reporting min > max must not panic us
    vk::Extent2D {
        width: want
            .width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: want
            .height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    }
}

/// min + 1, capped by max when the surface reports one (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count != 0 && wanted > caps.max_image_count {
        caps.max_image_count
    } else {
        wanted
    }
}

pub fn sharing_mode(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

pub fn swapchain_desc(
    support: &SurfaceSupport,
    families: QueueFamilies,
    framebuffer: RenderSize,
    preference: PresentModePreference,
) -> SwapchainDesc {
    let caps = &support.capabilities;
    let (sharing_mode, queue_family_indices) = sharing_mode(families);
    SwapchainDesc {
        min_image_count: choose_image_count(caps),
        surface_format: choose_surface_format(&support.formats),
        extent: choose_extent(caps, framebuffer),
        present_mode: choose_present_mode(&support.present_modes, preference),
        pre_transform: caps.current_transform,
        sharing_mode,
        queue_family_indices,
    }
}

/// Inputs that shape the swapchain, refreshed by the renderer before every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChainSettings {
    pub framebuffer_size: RenderSize,
    pub present_mode: PresentModePreference,
    pub clear_color: [f32; 4],
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            framebuffer_size: RenderSize::default(),
            present_mode: PresentModePreference::Mailbox,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Default)]
pub struct SwapchainResources {
    pub swapchain: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub uniform_buffers: Vec<AllocatedBuffer>,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub command_buffers: Vec<vk::CommandBuffer>,
}

impl SwapchainResources {
    pub fn create(
        ctx: &mut RenderContext,
        statics: &StaticResources,
        settings: &ChainSettings,
    ) -> RenderResult<Self> {
        let mut chain = Self::default();
        match chain.build(ctx, statics, settings) {
            Ok(()) => Ok(chain),
            Err(e) => {
                chain.destroy(ctx);
                Err(e)
            }
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn is_live(&self) -> bool {
        self.swapchain != vk::SwapchainKHR::null()
    }

    // swapchain -> views -> render pass -> pipeline -> framebuffers -> uniforms
    // -> descriptor pool -> descriptor sets -> command buffers
    fn build(
        &mut self,
        ctx: &mut RenderContext,
        statics: &StaticResources,
        settings: &ChainSettings,
    ) -> RenderResult<()> {
        let support = ctx.gpu.surface_support()?;
        let desc = swapchain_desc(
            &support,
            ctx.families,
            settings.framebuffer_size,
            settings.present_mode,
        );

        self.swapchain = ctx.gpu.create_swapchain(&desc)?;
        self.surface_format = desc.surface_format;
        self.present_mode = desc.present_mode;
        self.extent = desc.extent;
        self.images = ctx.gpu.swapchain_images(self.swapchain)?;

        info!(
            format = ?desc.surface_format.format,
            color_space = ?desc.surface_format.color_space,
            present_mode = ?desc.present_mode,
            width = desc.extent.width,
            height = desc.extent.height,
            images = self.images.len(),
            min_images = support.capabilities.min_image_count,
            max_images = support.capabilities.max_image_count,
            "swapchain created"
        );

        for &image in &self.images {
            let view = ctx.gpu.create_image_view(&ImageViewDesc {
                image,
                format: self.surface_format.format,
                aspect: vk::ImageAspectFlags::COLOR,
            })?;
            self.image_views.push(view);
        }

        self.render_pass = ctx.gpu.create_render_pass(&RenderPassDesc {
            color_format: self.surface_format.format,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        })?;

        let (layout, pipeline) = create_pipeline(
            ctx,
            self.render_pass,
            statics.descriptor_set_layout,
            self.extent,
            &statics.shaders,
        )?;
        self.pipeline_layout = layout;
        self.pipeline = pipeline;

        for &attachment in &self.image_views {
            let fb = ctx.gpu.create_framebuffer(&FramebufferDesc {
                render_pass: self.render_pass,
                attachment,
                extent: self.extent,
            })?;
            self.framebuffers.push(fb);
        }

        let count = self.images.len() as u32;
        for _ in 0..count {
            let ubo = memory::create_buffer(
                ctx,
                UNIFORM_SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            self.uniform_buffers.push(ubo);
        }

        self.descriptor_pool = ctx.gpu.create_descriptor_pool(&DescriptorPoolDesc {
            max_sets: count,
            uniform_buffers: count,
            combined_image_samplers: count,
        })?;
        self.descriptor_sets = ctx.gpu.allocate_descriptor_sets(
            self.descriptor_pool,
            statics.descriptor_set_layout,
            count,
        )?;
        for (set, ubo) in self.descriptor_sets.iter().zip(&self.uniform_buffers) {
            ctx.gpu.update_descriptor_set(&DescriptorWrite::UniformBuffer {
                set: *set,
                binding: UNIFORM_BINDING,
                buffer: ubo.buffer,
                range: UNIFORM_SIZE,
            });
            ctx.gpu
                .update_descriptor_set(&DescriptorWrite::CombinedImageSampler {
                    set: *set,
                    binding: SAMPLER_BINDING,
                    view: statics.texture_view,
                    sampler: statics.sampler,
                });
        }

        self.record(ctx, statics, settings.clear_color)
    }

    fn record(
        &mut self,
        ctx: &mut RenderContext,
        statics: &StaticResources,
        clear_color: [f32; 4],
    ) -> RenderResult<()> {
        self.command_buffers = record_command_buffers(
            ctx,
            &DrawSetup {
                render_pass: self.render_pass,
                pipeline: self.pipeline,
                pipeline_layout: self.pipeline_layout,
                extent: self.extent,
                clear_color,
                framebuffers: &self.framebuffers,
                descriptor_sets: &self.descriptor_sets,
                vertex_buffer: statics.vertex_buffer.buffer,
                index_buffer: statics.index_buffer.buffer,
                index_count: statics.index_count,
            },
        )?;
        Ok(())
    }

    /// Frees and re-records the draw buffers, e.g. after the clear color changed.
    /// The caller makes sure none of them is still executing.
    pub fn rerecord(
        &mut self,
        ctx: &mut RenderContext,
        statics: &StaticResources,
        clear_color: [f32; 4],
    ) -> RenderResult<()> {
        let pool = ctx.command_pool;
        ctx.gpu.free_command_buffers(pool, &self.command_buffers);
        self.command_buffers.clear();
        self.record(ctx, statics, clear_color)
    }

    /// Tear down in dependency order. Safe on partially built or already destroyed values.
    pub fn destroy(&mut self, ctx: &mut RenderContext) {
        let pool = ctx.command_pool;
        let gpu = ctx.gpu.as_mut();

        for fb in self.framebuffers.drain(..) {
            gpu.destroy_framebuffer(fb);
        }
        if !self.command_buffers.is_empty() {
            gpu.free_command_buffers(pool, &self.command_buffers);
            self.command_buffers.clear();
        }
        gpu.destroy_pipeline(std::mem::take(&mut self.pipeline));
        gpu.destroy_pipeline_layout(std::mem::take(&mut self.pipeline_layout));
        gpu.destroy_render_pass(std::mem::take(&mut self.render_pass));
        for view in self.image_views.drain(..) {
            gpu.destroy_image_view(view);
        }
        gpu.destroy_swapchain(std::mem::take(&mut self.swapchain));
        self.images.clear();
        for ubo in self.uniform_buffers.drain(..) {
            ubo.destroy(gpu);
        }
        // sets go with their pool
        gpu.destroy_descriptor_pool(std::mem::take(&mut self.descriptor_pool));
        self.descriptor_sets.clear();
    }

    /// Full rebuild. Returns `Ok(false)` without touching anything while the surface
    /// has no area (minimized).
    pub fn recreate(
        &mut self,
        ctx: &mut RenderContext,
        statics: &StaticResources,
        settings: &ChainSettings,
    ) -> RenderResult<bool> {
        if settings.framebuffer_size.is_zero() {
            debug!("swapchain rebuild deferred: zero-sized framebuffer");
            return Ok(false);
        }
        let caps = ctx.gpu.surface_support()?.capabilities;
        if caps.current_extent.width == 0 || caps.current_extent.height == 0 {
            debug!("swapchain rebuild deferred: zero-sized surface");
            return Ok(false);
        }

        ctx.gpu.device_wait_idle()?;
        self.destroy(ctx);
        if let Err(e) = self.build(ctx, statics, settings) {
            self.destroy(ctx);
            return Err(e);
        }
        Ok(true)
    }

    /// Host-coherent write, no flush needed.
    pub fn write_uniforms(
        &self,
        ctx: &mut RenderContext,
        image: usize,
        transforms: &Transforms,
    ) -> RenderResult<()> {
        ctx.gpu
            .write_memory(self.uniform_buffers[image].memory, 0, transforms.as_bytes())
    }
}
