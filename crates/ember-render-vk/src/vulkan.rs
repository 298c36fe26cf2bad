// SPDX-License-Identifier: CEPL-1.0
//! `Gpu` over ash. Owns the instance, surface and logical device; everything else is
//! created and destroyed by the callers through the trait.

use std::ffi::{c_char, CStr};

use ash::khr::{surface, swapchain};
use ash::{vk, Device, Entry, Instance};
use ember_render::{RenderError, RenderResult, RendererOptions};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use crate::device::{
    select_device, DeviceCandidate, QueueFamilyCaps, REQUIRED_DEVICE_EXTENSIONS,
};
use crate::gpu::{
    BufferDesc, Command, DescriptorBinding, DescriptorPoolDesc, DescriptorWrite, DeviceInfo,
    FramebufferDesc, Gpu, ImageDesc, ImageViewDesc, PipelineDesc, PresentDesc,
    RenderPassDesc, SamplerDesc, SubmitDesc, SurfaceSupport, SwapchainDesc,
};
use crate::instance::{create_instance, DebugMessenger};
use crate::{unexpected, VkResultExt};

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

pub struct VulkanGpu {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    physical: vk::PhysicalDevice,
    device: Device,
    swapchain_loader: swapchain::Device,
    info: DeviceInfo,
}

unsafe fn query_surface(
    loader: &surface::Instance,
    physical: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> RenderResult<SurfaceSupport> {
    Ok(SurfaceSupport {
        capabilities: loader
            .get_physical_device_surface_capabilities(physical, surface)
            .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
        formats: loader
            .get_physical_device_surface_formats(physical, surface)
            .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
        present_modes: loader
            .get_physical_device_surface_present_modes(physical, surface)
            .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
    })
}

unsafe fn describe_device(
    instance: &Instance,
    loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    physical: vk::PhysicalDevice,
) -> RenderResult<DeviceCandidate> {
    let props = instance.get_physical_device_properties(physical);
    let name = CStr::from_ptr(props.device_name.as_ptr())
        .to_string_lossy()
        .into_owned();

    let queue_families = instance
        .get_physical_device_queue_family_properties(physical)
        .iter()
        .enumerate()
        .map(|(i, q)| QueueFamilyCaps {
            graphics: q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
            present: loader
                .get_physical_device_surface_support(physical, i as u32, surface)
                .unwrap_or(false),
        })
        .collect();

    let extensions = instance
        .enumerate_device_extension_properties(physical)
        .check("vkEnumerateDeviceExtensionProperties")?
        .iter()
        .map(|e| CStr::from_ptr(e.extension_name.as_ptr()).to_owned())
        .collect();

    // a device that cannot be queried is simply not adequate
    let surface = query_surface(loader, physical, surface).unwrap_or_default();
    let features = instance.get_physical_device_features(physical);

    Ok(DeviceCandidate {
        name,
        device_type: props.device_type,
        queue_families,
        extensions,
        surface,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
    })
}

/// Picks a physical device and creates the logical device with one queue per
/// distinct family.
unsafe fn open_device(
    instance: &Instance,
    loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> RenderResult<(vk::PhysicalDevice, Device, DeviceInfo)> {
    let physicals = instance
        .enumerate_physical_devices()
        .check("vkEnumeratePhysicalDevices")?;
    let candidates = physicals
        .iter()
        .map(|&p| describe_device(instance, loader, surface, p))
        .collect::<RenderResult<Vec<_>>>()?;
    let (index, families) = select_device(&candidates, REQUIRED_DEVICE_EXTENSIONS)?;
    let physical = physicals[index];

    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        ..Default::default()
    };
    let extensions: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|e| e.as_ptr())
        .collect();

    let create_info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    let device = instance
        .create_device(physical, &create_info, None)
        .map_err(|e| {
            RenderError::Initialization(format!(
                "vkCreateDevice failed with result code {}",
                e.as_raw()
            ))
        })?;

    let props = instance.get_physical_device_properties(physical);
    let info = DeviceInfo {
        families,
        graphics_queue: device.get_device_queue(families.graphics, 0),
        present_queue: device.get_device_queue(families.present, 0),
        memory_properties: instance.get_physical_device_memory_properties(physical),
        max_sampler_anisotropy: props.limits.max_sampler_anisotropy,
    };
    debug!(
        queues = queue_infos.len(),
        max_anisotropy = info.max_sampler_anisotropy,
        memory_types = info.memory_properties.memory_type_count,
        "logical device created"
    );
    Ok((physical, device, info))
}

impl VulkanGpu {
    /// Instance -> debug messenger -> surface -> device, in that order; a failure at
    /// any step releases what came before it.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        options: &RendererOptions,
    ) -> RenderResult<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| RenderError::Initialization(format!("display handle: {e}")))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| RenderError::Initialization(format!("window handle: {e}")))?
            .as_raw();

        let entry = Entry::linked();
        unsafe {
            let instance = create_instance(&entry, dh, &options.app_name, options.validation)?;

            let mut debug = if options.validation {
                match DebugMessenger::new(&entry, &instance) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface = match ash_window::create_surface(&entry, &instance, dh, wh, None) {
                Ok(s) => s,
                Err(e) => {
                    if let Some(d) = debug.as_mut() {
                        d.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(RenderError::Initialization(format!(
                        "surface creation failed with result code {}",
                        e.as_raw()
                    )));
                }
            };

            let (physical, device, info) =
                match open_device(&instance, &surface_loader, surface) {
                    Ok(v) => v,
                    Err(e) => {
                        surface_loader.destroy_surface(surface, None);
                        if let Some(d) = debug.as_mut() {
                            d.destroy();
                        }
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                };
            let swapchain_loader = swapchain::Device::new(&instance, &device);

            let validation = debug.is_some();
            info!(
                graphics_family = info.families.graphics,
                present_family = info.families.present,
                validation,
                "Vulkan device ready"
            );
            Ok(Self {
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                physical,
                device,
                swapchain_loader,
                info,
            })
        }
    }
}

impl Gpu for VulkanGpu {
    fn device_info(&self) -> DeviceInfo {
        self.info
    }

    fn surface_support(&self) -> RenderResult<SurfaceSupport> {
        unsafe { query_surface(&self.surface_loader, self.physical, self.surface) }
    }

    fn device_wait_idle(&mut self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }.check("vkDeviceWaitIdle")
    }

    fn queue_wait_idle(&mut self, queue: vk::Queue) -> RenderResult<()> {
        unsafe { self.device.queue_wait_idle(queue) }.check("vkQueueWaitIdle")
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> RenderResult<vk::Buffer> {
        let ci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size: desc.size,
            usage: desc.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        unsafe { self.device.create_buffer(&ci, None) }.check("vkCreateBuffer")
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    fn create_image(&mut self, desc: &ImageDesc) -> RenderResult<vk::Image> {
        let ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: desc.format,
            extent: vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: desc.tiling,
            usage: desc.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        unsafe { self.device.create_image(&ci, None) }.check("vkCreateImage")
    }

    fn destroy_image(&mut self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> RenderResult<vk::DeviceMemory> {
        let ai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: size,
            memory_type_index,
            ..Default::default()
        };
        unsafe { self.device.allocate_memory(&ai, None) }.check("vkAllocateMemory")
    }

    fn free_memory(&mut self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn bind_buffer_memory(
        &mut self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> RenderResult<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }.check("vkBindBufferMemory")
    }

    fn bind_image_memory(&mut self, image: vk::Image, memory: vk::DeviceMemory) -> RenderResult<()> {
        unsafe { self.device.bind_image_memory(image, memory, 0) }.check("vkBindImageMemory")
    }

    fn write_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RenderResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        unsafe {
            let ptr = self
                .device
                .map_memory(
                    memory,
                    offset,
                    data.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .check("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn read_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        len: usize,
    ) -> RenderResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        if len == 0 {
            return Ok(out);
        }
        unsafe {
            let ptr = self
                .device
                .map_memory(memory, offset, len as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .check("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), out.as_mut_ptr(), len);
            self.device.unmap_memory(memory);
        }
        Ok(out)
    }

    fn create_image_view(&mut self, desc: &ImageViewDesc) -> RenderResult<vk::ImageView> {
        let ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: desc.image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: desc.format,
            components: vk::ComponentMapping::default(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                ..COLOR_RANGE
            },
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&ci, None) }.check("vkCreateImageView")
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> RenderResult<vk::Sampler> {
        let ci = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: desc.mag_filter,
            min_filter: desc.min_filter,
            mipmap_mode: desc.mipmap_mode,
            address_mode_u: desc.address_mode,
            address_mode_v: desc.address_mode,
            address_mode_w: desc.address_mode,
            mip_lod_bias: 0.0,
            anisotropy_enable: if desc.anisotropy.is_some() {
                vk::TRUE
            } else {
                vk::FALSE
            },
            max_anisotropy: desc.anisotropy.unwrap_or(1.0),
            compare_enable: vk::FALSE,
            compare_op: desc.compare_op,
            min_lod: 0.0,
            max_lod: 0.0,
            border_color: desc.border_color,
            unnormalized_coordinates: vk::FALSE,
            ..Default::default()
        };
        unsafe { self.device.create_sampler(&ci, None) }.check("vkCreateSampler")
    }

    fn destroy_sampler(&mut self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR> {
        let concurrent = desc.sharing_mode == vk::SharingMode::CONCURRENT;
        let ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface,
            min_image_count: desc.min_image_count,
            image_format: desc.surface_format.format,
            image_color_space: desc.surface_format.color_space,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: desc.sharing_mode,
            queue_family_index_count: if concurrent {
                desc.queue_family_indices.len() as u32
            } else {
                0
            },
            p_queue_family_indices: if concurrent {
                desc.queue_family_indices.as_ptr()
            } else {
                std::ptr::null()
            },
            pre_transform: desc.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: desc.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        unsafe { self.swapchain_loader.create_swapchain(&ci, None) }.check("vkCreateSwapchainKHR")
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
            .check("vkGetSwapchainImagesKHR")
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        }
    }

    fn queue_present(&mut self, desc: &PresentDesc) -> Result<bool, vk::Result> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &desc.wait,
            swapchain_count: 1,
            p_swapchains: &desc.swapchain,
            p_image_indices: &desc.image_index,
            ..Default::default()
        };
        unsafe { self.swapchain_loader.queue_present(desc.queue, &present) }
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RenderResult<vk::RenderPass> {
        let attachment = vk::AttachmentDescription {
            format: desc.color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: desc.final_layout,
            ..Default::default()
        };
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            ..Default::default()
        };
        // first use of the image waits for the acquire semaphore's stage
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let ci = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &attachment,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        unsafe { self.device.create_render_pass(&ci, None) }.check("vkCreateRenderPass")
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBinding],
    ) -> RenderResult<vk::DescriptorSetLayout> {
        let raw: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| vk::DescriptorSetLayoutBinding {
                binding: b.binding,
                descriptor_type: b.ty,
                descriptor_count: 1,
                stage_flags: b.stages,
                ..Default::default()
            })
            .collect();
        let ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: raw.len() as u32,
            p_bindings: raw.as_ptr(),
            ..Default::default()
        };
        unsafe { self.device.create_descriptor_set_layout(&ci, None) }
            .check("vkCreateDescriptorSetLayout")
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(
        &mut self,
        set_layout: vk::DescriptorSetLayout,
    ) -> RenderResult<vk::PipelineLayout> {
        let ci = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            ..Default::default()
        };
        unsafe { self.device.create_pipeline_layout(&ci, None) }.check("vkCreatePipelineLayout")
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_shader_module(&mut self, code: &[u32]) -> RenderResult<vk::ShaderModule> {
        let ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: std::mem::size_of_val(code),
            p_code: code.as_ptr(),
            ..Default::default()
        };
        unsafe { self.device.create_shader_module(&ci, None) }.check("vkCreateShaderModule")
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> RenderResult<vk::Pipeline> {
        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: desc.vertex_module,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: desc.fragment_module,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
        ];

        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_stride,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &binding,
            vertex_attribute_description_count: desc.vertex_attributes.len() as u32,
            p_vertex_attribute_descriptions: desc.vertex_attributes.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: vk::FALSE,
            ..Default::default()
        };

        // static viewport: the pipeline is rebuilt with the swapchain
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: desc.extent.width as f32,
            height: desc.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: desc.extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            p_viewports: &viewport,
            scissor_count: 1,
            p_scissors: &scissor,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            depth_clamp_enable: vk::FALSE,
            rasterizer_discard_enable: vk::FALSE,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: desc.cull_mode,
            front_face: desc.front_face,
            depth_bias_enable: vk::FALSE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: vk::FALSE,
            ..Default::default()
        };
        let blend_attachment = vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            logic_op_enable: vk::FALSE,
            logic_op: vk::LogicOp::COPY,
            attachment_count: 1,
            p_attachments: &blend_attachment,
            ..Default::default()
        };

        let ci = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            layout: desc.layout,
            render_pass: desc.render_pass,
            subpass: 0,
            ..Default::default()
        };

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&ci), None)
        }
        .map_err(|(_, e)| unexpected("vkCreateGraphicsPipelines", e))?;
        pipelines
            .into_iter()
            .next()
            .ok_or(RenderError::UnexpectedResult {
                call: "vkCreateGraphicsPipelines",
                code: vk::Result::ERROR_UNKNOWN.as_raw(),
            })
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<vk::Framebuffer> {
        let ci = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass: desc.render_pass,
            attachment_count: 1,
            p_attachments: &desc.attachment,
            width: desc.extent.width,
            height: desc.extent.height,
            layers: 1,
            ..Default::default()
        };
        unsafe { self.device.create_framebuffer(&ci, None) }.check("vkCreateFramebuffer")
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_descriptor_pool(
        &mut self,
        desc: &DescriptorPoolDesc,
    ) -> RenderResult<vk::DescriptorPool> {
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: desc.uniform_buffers,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: desc.combined_image_samplers,
            },
        ];
        let ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: desc.max_sets,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        unsafe { self.device.create_descriptor_pool(&ci, None) }.check("vkCreateDescriptorPool")
    }

    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> RenderResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count as usize];
        let ai = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: pool,
            descriptor_set_count: count,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        unsafe { self.device.allocate_descriptor_sets(&ai) }.check("vkAllocateDescriptorSets")
    }

    fn update_descriptor_set(&mut self, write: &DescriptorWrite) {
        match *write {
            DescriptorWrite::UniformBuffer {
                set,
                binding,
                buffer,
                range,
            } => {
                let info = vk::DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range,
                };
                let w = vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: set,
                    dst_binding: binding,
                    dst_array_element: 0,
                    descriptor_count: 1,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    p_buffer_info: &info,
                    ..Default::default()
                };
                unsafe { self.device.update_descriptor_sets(&[w], &[]) }
            }
            DescriptorWrite::CombinedImageSampler {
                set,
                binding,
                view,
                sampler,
            } => {
                let info = vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                };
                let w = vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: set,
                    dst_binding: binding,
                    dst_array_element: 0,
                    descriptor_count: 1,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    p_image_info: &info,
                    ..Default::default()
                };
                unsafe { self.device.update_descriptor_sets(&[w], &[]) }
            }
        }
    }

    fn create_command_pool(&mut self, queue_family: u32) -> RenderResult<vk::CommandPool> {
        let ci = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            ..Default::default()
        };
        unsafe { self.device.create_command_pool(&ci, None) }.check("vkCreateCommandPool")
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> RenderResult<Vec<vk::CommandBuffer>> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&ai) }.check("vkAllocateCommandBuffers")
    }

    fn free_command_buffers(&mut self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { self.device.free_command_buffers(pool, buffers) }
        }
    }

    fn begin_command_buffer(
        &mut self,
        buffer: vk::CommandBuffer,
        one_time_submit: bool,
    ) -> RenderResult<()> {
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: if one_time_submit {
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
            } else {
                vk::CommandBufferUsageFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.begin_command_buffer(buffer, &bi) }.check("vkBeginCommandBuffer")
    }

    fn record(&mut self, cb: vk::CommandBuffer, command: &Command) {
        let d = &self.device;
        unsafe {
            match *command {
                Command::CopyBuffer { src, dst, size } => {
                    let region = vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size,
                    };
                    d.cmd_copy_buffer(cb, src, dst, &[region]);
                }
                Command::CopyBufferToImage {
                    src,
                    dst,
                    width,
                    height,
                } => {
                    let region = vk::BufferImageCopy {
                        buffer_offset: 0,
                        buffer_row_length: 0,
                        buffer_image_height: 0,
                        image_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                        image_extent: vk::Extent3D {
                            width,
                            height,
                            depth: 1,
                        },
                    };
                    d.cmd_copy_buffer_to_image(
                        cb,
                        src,
                        dst,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
                Command::ImageBarrier {
                    image,
                    old_layout,
                    new_layout,
                    src_access,
                    dst_access,
                    src_stage,
                    dst_stage,
                } => {
                    let barrier = vk::ImageMemoryBarrier {
                        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                        src_access_mask: src_access,
                        dst_access_mask: dst_access,
                        old_layout,
                        new_layout,
                        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                        image,
                        subresource_range: COLOR_RANGE,
                        ..Default::default()
                    };
                    d.cmd_pipeline_barrier(
                        cb,
                        src_stage,
                        dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }
                Command::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    extent,
                    clear_color,
                } => {
                    let clear = vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: clear_color,
                        },
                    };
                    let bi = vk::RenderPassBeginInfo {
                        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                        render_pass,
                        framebuffer,
                        render_area: vk::Rect2D {
                            offset: vk::Offset2D { x: 0, y: 0 },
                            extent,
                        },
                        clear_value_count: 1,
                        p_clear_values: &clear,
                        ..Default::default()
                    };
                    d.cmd_begin_render_pass(cb, &bi, vk::SubpassContents::INLINE);
                }
                Command::BindPipeline(pipeline) => {
                    d.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline);
                }
                Command::BindVertexBuffer(buffer) => {
                    d.cmd_bind_vertex_buffers(cb, 0, &[buffer], &[0]);
                }
                Command::BindIndexBuffer(buffer) => {
                    d.cmd_bind_index_buffer(cb, buffer, 0, vk::IndexType::UINT32);
                }
                Command::BindDescriptorSet { layout, set } => {
                    d.cmd_bind_descriptor_sets(
                        cb,
                        vk::PipelineBindPoint::GRAPHICS,
                        layout,
                        0,
                        &[set],
                        &[],
                    );
                }
                Command::DrawIndexed { index_count } => {
                    d.cmd_draw_indexed(cb, index_count, 1, 0, 0, 0);
                }
                Command::EndRenderPass => d.cmd_end_render_pass(cb),
            }
        }
    }

    fn end_command_buffer(&mut self, buffer: vk::CommandBuffer) -> RenderResult<()> {
        unsafe { self.device.end_command_buffer(buffer) }.check("vkEndCommandBuffer")
    }

    fn queue_submit(&mut self, desc: &SubmitDesc) -> RenderResult<()> {
        let (wait_semaphores, wait_stages): (Vec<_>, Vec<_>) = desc.wait.into_iter().unzip();
        let signal: Vec<vk::Semaphore> = desc.signal.into_iter().collect();
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: wait_semaphores.len() as u32,
            p_wait_semaphores: wait_semaphores.as_ptr(),
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &desc.command_buffer,
            signal_semaphore_count: signal.len() as u32,
            p_signal_semaphores: signal.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device.queue_submit(
                desc.queue,
                std::slice::from_ref(&submit),
                desc.fence.unwrap_or(vk::Fence::null()),
            )
        }
        .check("vkQueueSubmit")
    }

    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        unsafe { self.device.create_semaphore(&ci, None) }.check("vkCreateSemaphore")
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence> {
        let ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&ci, None) }.check("vkCreateFence")
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }.check("vkWaitForFences")
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.check("vkResetFences")
    }
}

// device -> messenger -> surface -> instance. Every device child is gone by now:
// the renderer destroys them before dropping its context.
impl Drop for VulkanGpu {
    fn drop(&mut self) {
        unsafe {
            if let Err(code) = self.device.device_wait_idle() {
                warn!(?code, "device did not go idle before teardown");
            }
            self.device.destroy_device(None);
            if let Some(d) = self.debug.as_mut() {
                d.destroy();
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        debug!("Vulkan instance destroyed");
    }
}
