// SPDX-License-Identifier: CEPL-1.0
//! Device seam. Everything above this trait works in terms of raw `vk` handles and
//! plain description structs; `VulkanGpu` forwards to ash, tests use a fake.

use ash::vk;
use ember_render::RenderResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DeviceInfo {
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub max_sampler_anisotropy: f32,
}

#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            format: vk::Format::R8G8B8A8_SRGB,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::empty(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageViewDesc {
    pub image: vk::Image,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
}

impl Default for ImageViewDesc {
    fn default() -> Self {
        Self {
            image: vk::Image::null(),
            format: vk::Format::UNDEFINED,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    /// `Some(max)` enables anisotropic filtering.
    pub anisotropy: Option<f32>,
    pub border_color: vk::BorderColor,
    pub compare_op: vk::CompareOp,
    pub mipmap_mode: vk::SamplerMipmapMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            anisotropy: None,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            compare_op: vk::CompareOp::ALWAYS,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing_mode: vk::SharingMode,
    /// Only read for `CONCURRENT` sharing.
    pub queue_family_indices: Vec<u32>,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RenderPassDesc {
    pub color_format: vk::Format,
    pub final_layout: vk::ImageLayout,
}

impl Default for RenderPassDesc {
    fn default() -> Self {
        Self {
            color_format: vk::Format::B8G8R8A8_SRGB,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
}

#[derive(Clone, Debug)]
pub struct PipelineDesc {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub vertex_module: vk::ShaderModule,
    pub fragment_module: vk::ShaderModule,
    pub extent: vk::Extent2D,
    pub vertex_stride: u32,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

impl Default for PipelineDesc {
    fn default() -> Self {
        Self {
            render_pass: vk::RenderPass::null(),
            layout: vk::PipelineLayout::null(),
            vertex_module: vk::ShaderModule::null(),
            fragment_module: vk::ShaderModule::null(),
            extent: vk::Extent2D::default(),
            vertex_stride: 0,
            vertex_attributes: Vec::new(),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FramebufferDesc {
    pub render_pass: vk::RenderPass,
    pub attachment: vk::ImageView,
    pub extent: vk::Extent2D,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DescriptorPoolDesc {
    pub max_sets: u32,
    pub uniform_buffers: u32,
    pub combined_image_samplers: u32,
}

#[derive(Clone, Copy, Debug)]
pub enum DescriptorWrite {
    UniformBuffer {
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SubmitDesc {
    pub queue: vk::Queue,
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore to wait on and the stage that waits.
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal: Option<vk::Semaphore>,
    pub fence: Option<vk::Fence>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PresentDesc {
    pub queue: vk::Queue,
    pub wait: vk::Semaphore,
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
}

/// One recorded command. Only what the engine records exists here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        width: u32,
        height: u32,
    },
    ImageBarrier {
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    },
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    },
    BindPipeline(vk::Pipeline),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    BindDescriptorSet {
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    },
    DrawIndexed {
        index_count: u32,
    },
    EndRenderPass,
}

/// The device operations the engine needs. Handles passed in must come from the
/// same implementation; destroying a null handle is a no-op.
pub trait Gpu {
    fn device_info(&self) -> DeviceInfo;
    fn surface_support(&self) -> RenderResult<SurfaceSupport>;
    fn device_wait_idle(&mut self) -> RenderResult<()>;
    fn queue_wait_idle(&mut self, queue: vk::Queue) -> RenderResult<()>;

    // buffers, images, memory
    fn create_buffer(&mut self, desc: &BufferDesc) -> RenderResult<vk::Buffer>;
    fn destroy_buffer(&mut self, buffer: vk::Buffer);
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    fn create_image(&mut self, desc: &ImageDesc) -> RenderResult<vk::Image>;
    fn destroy_image(&mut self, image: vk::Image);
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> RenderResult<vk::DeviceMemory>;
    fn free_memory(&mut self, memory: vk::DeviceMemory);
    fn bind_buffer_memory(&mut self, buffer: vk::Buffer, memory: vk::DeviceMemory)
        -> RenderResult<()>;
    fn bind_image_memory(&mut self, image: vk::Image, memory: vk::DeviceMemory) -> RenderResult<()>;
    /// Map, copy, unmap. The memory must be host visible.
    fn write_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RenderResult<()>;
    fn read_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        len: usize,
    ) -> RenderResult<Vec<u8>>;

    fn create_image_view(&mut self, desc: &ImageViewDesc) -> RenderResult<vk::ImageView>;
    fn destroy_image_view(&mut self, view: vk::ImageView);
    fn create_sampler(&mut self, desc: &SamplerDesc) -> RenderResult<vk::Sampler>;
    fn destroy_sampler(&mut self, sampler: vk::Sampler);

    // presentation
    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>>;
    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);
    /// `Ok((index, suboptimal))`, or the raw result so callers can recover from out-of-date.
    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result>;
    /// `Ok(suboptimal)`, or the raw result.
    fn queue_present(&mut self, desc: &PresentDesc) -> Result<bool, vk::Result>;

    // pipeline objects
    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RenderResult<vk::RenderPass>;
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);
    fn create_descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBinding],
    ) -> RenderResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout);
    fn create_pipeline_layout(
        &mut self,
        set_layout: vk::DescriptorSetLayout,
    ) -> RenderResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout);
    fn create_shader_module(&mut self, code: &[u32]) -> RenderResult<vk::ShaderModule>;
    fn destroy_shader_module(&mut self, module: vk::ShaderModule);
    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> RenderResult<vk::Pipeline>;
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<vk::Framebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);

    // descriptors
    fn create_descriptor_pool(
        &mut self,
        desc: &DescriptorPoolDesc,
    ) -> RenderResult<vk::DescriptorPool>;
    /// Also frees every set allocated from the pool.
    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool);
    fn allocate_descriptor_sets(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> RenderResult<Vec<vk::DescriptorSet>>;
    fn update_descriptor_set(&mut self, write: &DescriptorWrite);

    // commands
    fn create_command_pool(&mut self, queue_family: u32) -> RenderResult<vk::CommandPool>;
    fn destroy_command_pool(&mut self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> RenderResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&mut self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    fn begin_command_buffer(
        &mut self,
        buffer: vk::CommandBuffer,
        one_time_submit: bool,
    ) -> RenderResult<()>;
    fn record(&mut self, buffer: vk::CommandBuffer, command: &Command);
    fn end_command_buffer(&mut self, buffer: vk::CommandBuffer) -> RenderResult<()>;
    fn queue_submit(&mut self, desc: &SubmitDesc) -> RenderResult<()>;

    // sync
    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);
    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence>;
    fn destroy_fence(&mut self, fence: vk::Fence);
    /// Unbounded wait.
    fn wait_for_fence(&mut self, fence: vk::Fence) -> RenderResult<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()>;
}
