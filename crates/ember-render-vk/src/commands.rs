// SPDX-License-Identifier: CEPL-1.0
//! Command buffer recording: the one-time submit primitive and the per-image draw buffers.

use ash::vk;
use ember_render::{RenderError, RenderResult};

use crate::context::RenderContext;
use crate::gpu::{Command, Gpu, SubmitDesc};

/// allocate -> begin(ONE_TIME_SUBMIT) -> record -> end -> submit -> wait idle -> free.
/// The command buffer is freed on every path.
pub fn one_time_submit<F>(ctx: &mut RenderContext, record: F) -> RenderResult<()>
where
    F: FnOnce(&mut dyn Gpu, vk::CommandBuffer) -> RenderResult<()>,
{
    let pool = ctx.command_pool;
    let queue = ctx.graphics_queue;
    let gpu = ctx.gpu.as_mut();

    let cb = gpu
        .allocate_command_buffers(pool, 1)?
        .into_iter()
        .next()
        .ok_or(RenderError::UnexpectedResult {
            call: "vkAllocateCommandBuffers",
            code: vk::Result::ERROR_UNKNOWN.as_raw(),
        })?;

    let result = record_and_wait(gpu, cb, queue, record);
    gpu.free_command_buffers(pool, std::slice::from_ref(&cb));
    result
}

fn record_and_wait<F>(
    gpu: &mut dyn Gpu,
    cb: vk::CommandBuffer,
    queue: vk::Queue,
    record: F,
) -> RenderResult<()>
where
    F: FnOnce(&mut dyn Gpu, vk::CommandBuffer) -> RenderResult<()>,
{
    gpu.begin_command_buffer(cb, true)?;
    record(&mut *gpu, cb)?;
    gpu.end_command_buffer(cb)?;
    gpu.queue_submit(&SubmitDesc {
        queue,
        command_buffer: cb,
        ..Default::default()
    })?;
    gpu.queue_wait_idle(queue)
}

/// Everything a per-image draw buffer references.
#[derive(Clone, Copy, Debug)]
pub struct DrawSetup<'a> {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub framebuffers: &'a [vk::Framebuffer],
    pub descriptor_sets: &'a [vk::DescriptorSet],
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

/// Command sequence for swapchain image `image`.
pub fn draw_commands(setup: &DrawSetup<'_>, image: usize) -> [Command; 7] {
    [
        Command::BeginRenderPass {
            render_pass: setup.render_pass,
            framebuffer: setup.framebuffers[image],
            extent: setup.extent,
            clear_color: setup.clear_color,
        },
        Command::BindPipeline(setup.pipeline),
        Command::BindVertexBuffer(setup.vertex_buffer),
        Command::BindIndexBuffer(setup.index_buffer),
        Command::BindDescriptorSet {
            layout: setup.pipeline_layout,
            set: setup.descriptor_sets[image],
        },
        Command::DrawIndexed {
            index_count: setup.index_count,
        },
        Command::EndRenderPass,
    ]
}

/// One primary command buffer per framebuffer, recorded once and resubmitted every
/// frame that draws its image.
pub fn record_command_buffers(
    ctx: &mut RenderContext,
    setup: &DrawSetup<'_>,
) -> RenderResult<Vec<vk::CommandBuffer>> {
    if setup.framebuffers.len() != setup.descriptor_sets.len() {
        return Err(RenderError::Initialization(format!(
            "{} framebuffers but {} descriptor sets",
            setup.framebuffers.len(),
            setup.descriptor_sets.len()
        )));
    }
    let pool = ctx.command_pool;
    let gpu = ctx.gpu.as_mut();
    let buffers = gpu.allocate_command_buffers(pool, setup.framebuffers.len() as u32)?;

    for (i, &cb) in buffers.iter().enumerate() {
        if let Err(e) = record_one(gpu, cb, setup, i) {
            gpu.free_command_buffers(pool, &buffers);
            return Err(e);
        }
    }
    Ok(buffers)
}

fn record_one(
    gpu: &mut dyn Gpu,
    cb: vk::CommandBuffer,
    setup: &DrawSetup<'_>,
    image: usize,
) -> RenderResult<()> {
    gpu.begin_command_buffer(cb, false)?;
    for cmd in draw_commands(setup, image).iter() {
        gpu.record(cb, cmd);
    }
    gpu.end_command_buffer(cb)
}
