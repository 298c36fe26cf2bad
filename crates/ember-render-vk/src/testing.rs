// SPDX-License-Identifier: CEPL-1.0
//! In-memory `Gpu` for unit tests. Hands out fake handles, tracks which are alive,
//! emulates memory and transfer commands, and simulates fence signaling so frame
//! pacing can be checked without a driver.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use ash::vk::{self, Handle};
use ember_math::Vertex;
use ember_render::{RenderError, RenderResult, Scene, TextureData};

use crate::context::RenderContext;
use crate::gpu::{
    BufferDesc, Command, DescriptorBinding, DescriptorPoolDesc, DescriptorWrite, DeviceInfo, Gpu,
    FramebufferDesc, ImageDesc, ImageViewDesc, PipelineDesc, PresentDesc, QueueFamilies,
    RenderPassDesc, SamplerDesc, SubmitDesc, SurfaceSupport, SwapchainDesc,
};
use crate::swapchain::PREFERRED_FORMAT;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Buffer,
    Image,
    Memory,
    ImageView,
    Sampler,
    Swapchain,
    RenderPass,
    DescriptorSetLayout,
    PipelineLayout,
    ShaderModule,
    Pipeline,
    Framebuffer,
    DescriptorPool,
    CommandPool,
    CommandBuffer,
    Semaphore,
    Fence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Reset,
    Pending,
}

struct FakeMemory {
    type_index: u32,
    bytes: Vec<u8>,
}

struct FakeState {
    next_handle: u64,
    live: HashMap<u64, Kind>,
    destroy_log: Vec<Kind>,
    fail_next: HashSet<Kind>,

    memory_types: Vec<vk::MemoryPropertyFlags>,
    memories: HashMap<u64, FakeMemory>,
    buffer_sizes: HashMap<u64, vk::DeviceSize>,
    image_sizes: HashMap<u64, (u32, u32)>,
    bindings: HashMap<u64, u64>,

    recordings: HashMap<u64, Vec<Command>>,
    one_time: HashSet<u64>,
    submitted: Vec<Command>,
    submits: usize,
    queue_idle_waits: usize,
    device_idle_waits: usize,

    fences: HashMap<u64, FenceState>,
    max_pending: usize,
    fence_waits: Vec<vk::Fence>,
    stalled_waits: usize,

    surface: SurfaceSupport,
    swapchain_images: HashMap<u64, Vec<vk::Image>>,
    next_image: u32,
    acquire_script: VecDeque<Result<bool, vk::Result>>,
    forced_index: VecDeque<u32>,
    present_script: VecDeque<Result<bool, vk::Result>>,
    acquired: Vec<u32>,
    presents: Vec<PresentDesc>,

    last_pipeline: Option<PipelineDesc>,
    last_sampler: Option<SamplerDesc>,
    last_swapchain: Option<SwapchainDesc>,
    descriptor_writes: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            next_handle: 0x1000,
            live: HashMap::new(),
            destroy_log: Vec::new(),
            fail_next: HashSet::new(),
            memory_types: vec![
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                vk::MemoryPropertyFlags::DEVICE_LOCAL
                    | vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
            ],
            memories: HashMap::new(),
            buffer_sizes: HashMap::new(),
            image_sizes: HashMap::new(),
            bindings: HashMap::new(),
            recordings: HashMap::new(),
            one_time: HashSet::new(),
            submitted: Vec::new(),
            submits: 0,
            queue_idle_waits: 0,
            device_idle_waits: 0,
            fences: HashMap::new(),
            max_pending: 0,
            fence_waits: Vec::new(),
            stalled_waits: 0,
            surface: SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 3,
                    current_extent: vk::Extent2D {
                        width: 800,
                        height: 600,
                    },
                    min_image_extent: vk::Extent2D {
                        width: 1,
                        height: 1,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    max_image_array_layers: 1,
                    current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    ..Default::default()
                },
                formats: vec![PREFERRED_FORMAT],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            },
            swapchain_images: HashMap::new(),
            next_image: 0,
            acquire_script: VecDeque::new(),
            forced_index: VecDeque::new(),
            present_script: VecDeque::new(),
            acquired: Vec::new(),
            presents: Vec::new(),
            last_pipeline: None,
            last_sampler: None,
            last_swapchain: None,
            descriptor_writes: 0,
        }
    }
}

impl FakeState {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn create(&mut self, kind: Kind) -> RenderResult<u64> {
        if self.fail_next.remove(&kind) {
            return Err(RenderError::UnexpectedResult {
                call: "fake create",
                code: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY.as_raw(),
            });
        }
        let raw = self.mint();
        self.live.insert(raw, kind);
        Ok(raw)
    }

    fn destroy(&mut self, raw: u64) {
        if raw == 0 {
            return;
        }
        match self.live.remove(&raw) {
            Some(kind) => self.destroy_log.push(kind),
            None => panic!("destroying unknown or already destroyed handle {raw:#x}"),
        }
    }

    fn pending_fences(&self) -> usize {
        self.fences
            .values()
            .filter(|s| **s == FenceState::Pending)
            .count()
    }

    fn signal_all(&mut self) {
        for s in self.fences.values_mut() {
            if *s == FenceState::Pending {
                *s = FenceState::Signaled;
            }
        }
    }

    fn memory_of(&self, resource: u64) -> Option<u64> {
        self.bindings.get(&resource).copied()
    }

    fn execute(&mut self, cmd: &Command) {
        match *cmd {
            Command::CopyBuffer { src, dst, size } => {
                let (Some(from), Some(to)) = (
                    self.memory_of(src.as_raw()),
                    self.memory_of(dst.as_raw()),
                ) else {
                    panic!("copy between unbound buffers");
                };
                let bytes = self.memories[&from].bytes[..size as usize].to_vec();
                self.memories
                    .get_mut(&to)
                    .expect("destination memory")
                    .bytes[..size as usize]
                    .copy_from_slice(&bytes);
            }
            Command::CopyBufferToImage {
                src,
                dst,
                width,
                height,
            } => {
                let len = width as usize * height as usize * 4;
                let from = self.memory_of(src.as_raw()).expect("staging bound");
                let to = self.memory_of(dst.as_raw()).expect("image bound");
                let bytes = self.memories[&from].bytes[..len].to_vec();
                self.memories.get_mut(&to).expect("image memory").bytes[..len]
                    .copy_from_slice(&bytes);
            }
            _ => {}
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeGpu {
    state: Rc<RefCell<FakeState>>,
}

pub fn fake_context(fake: FakeGpu) -> (FakeGpu, RenderContext) {
    let ctx = RenderContext::new(Box::new(fake.clone())).unwrap();
    (fake, ctx)
}

/// The built-in quad with a 2x2 texture.
pub fn quad_scene() -> Scene {
    Scene {
        vertices: vec![
            Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [1.0, 1.0]),
        ],
        indices: vec![0, 1, 2, 2, 3, 0],
        texture: TextureData {
            width: 2,
            height: 2,
            rgba: (0..16).collect(),
        },
    }
}

impl FakeGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self, kind: Kind) -> usize {
        self.state
            .borrow()
            .live
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    pub fn fail_next(&self, kind: Kind) {
        self.state.borrow_mut().fail_next.insert(kind);
    }

    pub fn set_memory_types(&self, flags: &[vk::MemoryPropertyFlags]) {
        self.state.borrow_mut().memory_types = flags.to_vec();
    }

    pub fn memory_flags(&self, memory: vk::DeviceMemory) -> vk::MemoryPropertyFlags {
        let s = self.state.borrow();
        let index = s.memories[&memory.as_raw()].type_index;
        s.memory_types[index as usize]
    }

    /// Reads emulated memory regardless of its host visibility.
    pub fn read_back(&self, memory: vk::DeviceMemory, len: usize) -> Vec<u8> {
        self.state.borrow().memories[&memory.as_raw()].bytes[..len].to_vec()
    }

    pub fn submitted_commands(&self) -> Vec<Command> {
        self.state.borrow().submitted.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.state.borrow().submits
    }

    pub fn queue_idle_waits(&self) -> usize {
        self.state.borrow().queue_idle_waits
    }

    pub fn device_idle_waits(&self) -> usize {
        self.state.borrow().device_idle_waits
    }

    pub fn recorded(&self, buffer: vk::CommandBuffer) -> Vec<Command> {
        self.state
            .borrow()
            .recordings
            .get(&buffer.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_one_time(&self, buffer: vk::CommandBuffer) -> bool {
        self.state.borrow().one_time.contains(&buffer.as_raw())
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.borrow().fences.get(&fence.as_raw()) == Some(&FenceState::Signaled)
    }

    /// Highest number of fences submitted and not yet observed complete at once.
    pub fn max_pending_fences(&self) -> usize {
        self.state.borrow().max_pending
    }

    pub fn fence_waits(&self) -> Vec<vk::Fence> {
        self.state.borrow().fence_waits.clone()
    }

    /// Waits on a fence that was reset but never submitted. On a real device these hang.
    pub fn stalled_waits(&self) -> usize {
        self.state.borrow().stalled_waits
    }

    pub fn last_pipeline_desc(&self) -> Option<PipelineDesc> {
        self.state.borrow().last_pipeline.clone()
    }

    pub fn last_sampler_desc(&self) -> Option<SamplerDesc> {
        self.state.borrow().last_sampler
    }

    pub fn last_swapchain_desc(&self) -> Option<SwapchainDesc> {
        self.state.borrow().last_swapchain.clone()
    }

    pub fn descriptor_writes(&self) -> usize {
        self.state.borrow().descriptor_writes
    }

    pub fn set_surface(&self, surface: SurfaceSupport) {
        self.state.borrow_mut().surface = surface;
    }

    pub fn set_image_count_bounds(&self, min: u32, max: u32) {
        let mut s = self.state.borrow_mut();
        s.surface.capabilities.min_image_count = min;
        s.surface.capabilities.max_image_count = max;
    }

    pub fn set_current_extent(&self, width: u32, height: u32) {
        self.state.borrow_mut().surface.capabilities.current_extent =
            vk::Extent2D { width, height };
    }

    /// Queues the outcome of a future acquire. `Ok(suboptimal)` still hands out the
    /// next image in turn.
    pub fn script_acquire(&self, result: Result<bool, vk::Result>) {
        self.state.borrow_mut().acquire_script.push_back(result);
    }

    /// Makes a future acquire report `index` whether or not the swapchain has it.
    pub fn script_acquire_index(&self, index: u32) {
        self.state.borrow_mut().forced_index.push_back(index);
    }

    pub fn script_present(&self, result: Result<bool, vk::Result>) {
        self.state.borrow_mut().present_script.push_back(result);
    }

    pub fn acquired_images(&self) -> Vec<u32> {
        self.state.borrow().acquired.clone()
    }

    pub fn presents(&self) -> Vec<PresentDesc> {
        self.state.borrow().presents.clone()
    }

    pub fn clear_destroy_log(&self) {
        self.state.borrow_mut().destroy_log.clear();
    }

    /// Kinds in the order they were first destroyed since the last clear.
    pub fn destroy_order(&self) -> Vec<Kind> {
        let s = self.state.borrow();
        let mut seen = Vec::new();
        for k in &s.destroy_log {
            if !seen.contains(k) {
                seen.push(*k);
            }
        }
        seen
    }
}

impl Gpu for FakeGpu {
    fn device_info(&self) -> DeviceInfo {
        let s = self.state.borrow();
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: s.memory_types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in s.memory_types.iter().enumerate() {
            memory_properties.memory_types[i].property_flags = *flags;
        }
        DeviceInfo {
            families: QueueFamilies {
                graphics: 0,
                present: 0,
            },
            graphics_queue: vk::Queue::from_raw(0xA),
            present_queue: vk::Queue::from_raw(0xA),
            memory_properties,
            max_sampler_anisotropy: 16.0,
        }
    }

    fn surface_support(&self) -> RenderResult<SurfaceSupport> {
        Ok(self.state.borrow().surface.clone())
    }

    fn device_wait_idle(&mut self) -> RenderResult<()> {
        let mut s = self.state.borrow_mut();
        s.device_idle_waits += 1;
        s.signal_all();
        Ok(())
    }

    fn queue_wait_idle(&mut self, _queue: vk::Queue) -> RenderResult<()> {
        let mut s = self.state.borrow_mut();
        s.queue_idle_waits += 1;
        s.signal_all();
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> RenderResult<vk::Buffer> {
        let mut s = self.state.borrow_mut();
        let raw = s.create(Kind::Buffer)?;
        s.buffer_sizes.insert(raw, desc.size);
        Ok(vk::Buffer::from_raw(raw))
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        let mut s = self.state.borrow_mut();
        s.bindings.remove(&buffer.as_raw());
        s.buffer_sizes.remove(&buffer.as_raw());
        s.destroy(buffer.as_raw());
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let s = self.state.borrow();
        vk::MemoryRequirements {
            size: s.buffer_sizes[&buffer.as_raw()],
            alignment: 4,
            memory_type_bits: (1u32 << s.memory_types.len()) - 1,
        }
    }

    fn create_image(&mut self, desc: &ImageDesc) -> RenderResult<vk::Image> {
        let mut s = self.state.borrow_mut();
        let raw = s.create(Kind::Image)?;
        s.image_sizes.insert(raw, (desc.width, desc.height));
        Ok(vk::Image::from_raw(raw))
    }

    fn destroy_image(&mut self, image: vk::Image) {
        let mut s = self.state.borrow_mut();
        s.bindings.remove(&image.as_raw());
        s.image_sizes.remove(&image.as_raw());
        s.destroy(image.as_raw());
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let s = self.state.borrow();
        let (w, h) = s.image_sizes[&image.as_raw()];
        vk::MemoryRequirements {
            size: w as u64 * h as u64 * 4,
            alignment: 16,
            memory_type_bits: (1u32 << s.memory_types.len()) - 1,
        }
    }

    fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> RenderResult<vk::DeviceMemory> {
        let mut s = self.state.borrow_mut();
        let raw = s.create(Kind::Memory)?;
        s.memories.insert(
            raw,
            FakeMemory {
                type_index: memory_type_index,
                bytes: vec![0; size as usize],
            },
        );
        Ok(vk::DeviceMemory::from_raw(raw))
    }

    fn free_memory(&mut self, memory: vk::DeviceMemory) {
        let mut s = self.state.borrow_mut();
        s.memories.remove(&memory.as_raw());
        s.destroy(memory.as_raw());
    }

    fn bind_buffer_memory(
        &mut self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> RenderResult<()> {
        self.state
            .borrow_mut()
            .bindings
            .insert(buffer.as_raw(), memory.as_raw());
        Ok(())
    }

    fn bind_image_memory(&mut self, image: vk::Image, memory: vk::DeviceMemory) -> RenderResult<()> {
        self.state
            .borrow_mut()
            .bindings
            .insert(image.as_raw(), memory.as_raw());
        Ok(())
    }

    fn write_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RenderResult<()> {
        let mut s = self.state.borrow_mut();
        let types = s.memory_types.clone();
        let mem = s.memories.get_mut(&memory.as_raw()).expect("live memory");
        if !types[mem.type_index as usize].contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(RenderError::UnexpectedResult {
                call: "vkMapMemory",
                code: vk::Result::ERROR_MEMORY_MAP_FAILED.as_raw(),
            });
        }
        let start = offset as usize;
        mem.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_memory(
        &mut self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        len: usize,
    ) -> RenderResult<Vec<u8>> {
        let s = self.state.borrow();
        let mem = &s.memories[&memory.as_raw()];
        if !s.memory_types[mem.type_index as usize].contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        {
            return Err(RenderError::UnexpectedResult {
                call: "vkMapMemory",
                code: vk::Result::ERROR_MEMORY_MAP_FAILED.as_raw(),
            });
        }
        let start = offset as usize;
        Ok(mem.bytes[start..start + len].to_vec())
    }

    fn create_image_view(&mut self, _desc: &ImageViewDesc) -> RenderResult<vk::ImageView> {
        let raw = self.state.borrow_mut().create(Kind::ImageView)?;
        Ok(vk::ImageView::from_raw(raw))
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.state.borrow_mut().destroy(view.as_raw());
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> RenderResult<vk::Sampler> {
        let mut s = self.state.borrow_mut();
        let raw = s.create(Kind::Sampler)?;
        s.last_sampler = Some(*desc);
        Ok(vk::Sampler::from_raw(raw))
    }

    fn destroy_sampler(&mut self, sampler: vk::Sampler) {
        self.state.borrow_mut().destroy(sampler.as_raw());
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR> {
        let mut s = self.state.borrow_mut();
        let raw = s.create(Kind::Swapchain)?;
        let images = (0..desc.min_image_count)
            .map(|_| {
                let raw = s.mint();
                vk::Image::from_raw(raw)
            })
            .collect();
        s.swapchain_images.insert(raw, images);
        s.next_image = 0;
        s.last_swapchain = Some(desc.clone());
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>> {
        Ok(self.state.borrow().swapchain_images[&swapchain.as_raw()].clone())
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state.borrow_mut();
        s.swapchain_images.remove(&swapchain.as_raw());
        s.destroy(swapchain.as_raw());
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        _signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        let mut s = self.state.borrow_mut();
        let suboptimal = match s.acquire_script.pop_front() {
            Some(Err(e)) => return Err(e),
            Some(Ok(flag)) => flag,
            None => false,
        };
        if let Some(index) = s.forced_index.pop_front() {
            s.acquired.push(index);
            return Ok((index, suboptimal));
        }
        let count = s.swapchain_images[&swapchain.as_raw()].len() as u32;
        let index = s.next_image % count;
        s.next_image = (index + 1) % count;
        s.acquired.push(index);
        Ok((index, suboptimal))
    }

    fn queue_present(&mut self, desc: &PresentDesc) -> Result<bool, vk::Result> {
        let mut s = self.state.borrow_mut();
        s.presents.push(*desc);
        s.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn create_render_pass(&mut self, _desc: &RenderPassDesc) -> RenderResult<vk::RenderPass> {
        let raw = self.state.borrow_mut().create(Kind::RenderPass)?;
        Ok(vk::RenderPass::from_raw(raw))
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.state.borrow_mut().destroy(render_pass.as_raw());
    }

    fn create_descriptor_set_layout(
        &mut self,
        _bindings: &[DescriptorBinding],
    ) -> RenderResult<vk::DescriptorSetLayout> {
        let raw = self.state.borrow_mut().create(Kind::DescriptorSetLayout)?;
        Ok(vk::DescriptorSetLayout::from_raw(raw))
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        self.state.borrow_mut().destroy(layout.as_raw());
    }

    fn create_pipeline_layout(
        &mut self,
        _set_layout: vk::DescriptorSetLayout,
    ) -> RenderResult<vk::PipelineLayout> {
        let raw = self.state.borrow_mut().create(Kind::PipelineLayout)?;
        Ok(vk::PipelineLayout::from_raw(raw))
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        self.state.borrow_mut().destroy(layout.as_raw());
    }

    fn create_shader_module(&mut self, _code: &[u32]) -> RenderResult<vk::ShaderModule> {
        let raw = self.state.borrow_mut().create(Kind::ShaderModule)?;
        Ok(vk::ShaderModule::from_raw(raw))
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        self.state.borrow_mut().destroy(module.as_raw());
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> RenderResult<vk::Pipeline> {
        let mut s = self.state.borrow_mut();
        let raw = s.create(Kind::Pipeline)?;
        s.last_pipeline = Some(desc.clone());
        Ok(vk::Pipeline::from_raw(raw))
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.state.borrow_mut().destroy(pipeline.as_raw());
    }

    fn create_framebuffer(&mut self, _desc: &FramebufferDesc) -> RenderResult<vk::Framebuffer> {
        let raw = self.state.borrow_mut().create(Kind::Framebuffer)?;
        Ok(vk::Framebuffer::from_raw(raw))
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.state.borrow_mut().destroy(framebuffer.as_raw());
    }

    fn create_descriptor_pool(
        &mut self,
        _desc: &DescriptorPoolDesc,
    ) -> RenderResult<vk::DescriptorPool> {
        let raw = self.state.borrow_mut().create(Kind::DescriptorPool)?;
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        self.state.borrow_mut().destroy(pool.as_raw());
    }

    fn allocate_descriptor_sets(
        &mut self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> RenderResult<Vec<vk::DescriptorSet>> {
        let mut s = self.state.borrow_mut();
        Ok((0..count)
            .map(|_| vk::DescriptorSet::from_raw(s.mint()))
            .collect())
    }

    fn update_descriptor_set(&mut self, _write: &DescriptorWrite) {
        self.state.borrow_mut().descriptor_writes += 1;
    }

    fn create_command_pool(&mut self, _queue_family: u32) -> RenderResult<vk::CommandPool> {
        let raw = self.state.borrow_mut().create(Kind::CommandPool)?;
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        self.state.borrow_mut().destroy(pool.as_raw());
    }

    fn allocate_command_buffers(
        &mut self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> RenderResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state.borrow_mut();
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(vk::CommandBuffer::from_raw(s.create(Kind::CommandBuffer)?));
        }
        Ok(out)
    }

    fn free_command_buffers(&mut self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state.borrow_mut();
        for cb in buffers {
            s.recordings.remove(&cb.as_raw());
            s.one_time.remove(&cb.as_raw());
            s.destroy(cb.as_raw());
        }
    }

    fn begin_command_buffer(
        &mut self,
        buffer: vk::CommandBuffer,
        one_time_submit: bool,
    ) -> RenderResult<()> {
        let mut s = self.state.borrow_mut();
        s.recordings.insert(buffer.as_raw(), Vec::new());
        if one_time_submit {
            s.one_time.insert(buffer.as_raw());
        }
        Ok(())
    }

    fn record(&mut self, buffer: vk::CommandBuffer, command: &Command) {
        self.state
            .borrow_mut()
            .recordings
            .entry(buffer.as_raw())
            .or_default()
            .push(*command);
    }

    fn end_command_buffer(&mut self, _buffer: vk::CommandBuffer) -> RenderResult<()> {
        Ok(())
    }

    fn queue_submit(&mut self, desc: &SubmitDesc) -> RenderResult<()> {
        let mut s = self.state.borrow_mut();
        let cmds = s
            .recordings
            .get(&desc.command_buffer.as_raw())
            .cloned()
            .unwrap_or_default();
        for cmd in &cmds {
            s.execute(cmd);
        }
        s.submitted.extend(cmds);
        s.submits += 1;
        if let Some(fence) = desc.fence {
            let state = s.fences.get_mut(&fence.as_raw()).expect("live fence");
            assert_eq!(*state, FenceState::Reset, "submitted with a fence that was not reset");
            *state = FenceState::Pending;
            let pending = s.pending_fences();
            s.max_pending = s.max_pending.max(pending);
        }
        Ok(())
    }

    fn create_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        let raw = self.state.borrow_mut().create(Kind::Semaphore)?;
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.state.borrow_mut().destroy(semaphore.as_raw());
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<vk::Fence> {
        let mut s = self.state.borrow_mut();
        let raw = s.create(Kind::Fence)?;
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Reset
        };
        s.fences.insert(raw, state);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        let mut s = self.state.borrow_mut();
        s.fences.remove(&fence.as_raw());
        s.destroy(fence.as_raw());
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        let mut s = self.state.borrow_mut();
        s.fence_waits.push(fence);
        match s.fences.get(&fence.as_raw()).copied().expect("live fence") {
            FenceState::Reset => s.stalled_waits += 1,
            // the GPU finishes the work the moment someone waits for it
            _ => {
                s.fences.insert(fence.as_raw(), FenceState::Signaled);
            }
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> RenderResult<()> {
        let mut s = self.state.borrow_mut();
        let state = s.fences.get_mut(&fence.as_raw()).expect("live fence");
        assert_ne!(*state, FenceState::Pending, "reset of a fence still in use");
        *state = FenceState::Reset;
        Ok(())
    }
}
