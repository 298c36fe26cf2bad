// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ember_render::RenderResult;
use tracing::debug;

use crate::gpu::{Gpu, QueueFamilies};

/// Device-level state shared by every component: the device itself, its queues,
/// the memory table and the command pool used for both per-frame and one-time
/// command buffers.
pub struct RenderContext {
    pub gpu: Box<dyn Gpu>,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub max_sampler_anisotropy: f32,
    pub command_pool: vk::CommandPool,
}

impl RenderContext {
    pub fn new(mut gpu: Box<dyn Gpu>) -> RenderResult<Self> {
        let info = gpu.device_info();
        let command_pool = gpu.create_command_pool(info.families.graphics)?;
        debug!(family = info.families.graphics, "command pool created");
        Ok(Self {
            gpu,
            families: info.families,
            graphics_queue: info.graphics_queue,
            present_queue: info.present_queue,
            memory_properties: info.memory_properties,
            max_sampler_anisotropy: info.max_sampler_anisotropy,
            command_pool,
        })
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        // pool goes before the device, which `gpu` owns
        self.gpu.destroy_command_pool(self.command_pool);
        self.command_pool = vk::CommandPool::null();
    }
}
