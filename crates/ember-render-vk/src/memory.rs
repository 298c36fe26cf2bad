// SPDX-License-Identifier: CEPL-1.0
//! Buffer and image allocation plus the staging upload path.

use ash::vk;
use ember_render::{RenderError, RenderResult};
use tracing::debug;

use crate::commands::one_time_submit;
use crate::context::RenderContext;
use crate::gpu::{BufferDesc, Command, Gpu, ImageDesc};

/// Lowest memory type index allowed by `type_bits` whose flags contain `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    (0..props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32))
        .find(|&i| {
            (type_bits & (1 << i)) != 0
                && props.memory_types[i as usize].property_flags.contains(required)
        })
        .ok_or(RenderError::MemoryTypeNotFound {
            type_bits,
            properties: required.as_raw(),
        })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl AllocatedBuffer {
    pub fn destroy(self, gpu: &mut dyn Gpu) {
        gpu.destroy_buffer(self.buffer);
        gpu.free_memory(self.memory);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatedImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub width: u32,
    pub height: u32,
}

impl AllocatedImage {
    pub fn destroy(self, gpu: &mut dyn Gpu) {
        gpu.destroy_image(self.image);
        gpu.free_memory(self.memory);
    }
}

/// Create, query requirements, allocate, bind. Nothing leaks on failure.
pub fn create_buffer(
    ctx: &mut RenderContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> RenderResult<AllocatedBuffer> {
    let memory_properties = ctx.memory_properties;
    let gpu = ctx.gpu.as_mut();
    let buffer = gpu.create_buffer(&BufferDesc { size, usage })?;
    let req = gpu.buffer_memory_requirements(buffer);

    let memory = match find_memory_type(&memory_properties, req.memory_type_bits, properties)
        .and_then(|index| gpu.allocate_memory(req.size, index))
    {
        Ok(m) => m,
        Err(e) => {
            gpu.destroy_buffer(buffer);
            return Err(e);
        }
    };
    if let Err(e) = gpu.bind_buffer_memory(buffer, memory) {
        gpu.destroy_buffer(buffer);
        gpu.free_memory(memory);
        return Err(e);
    }

    debug!(size, ?usage, ?properties, "buffer created");
    Ok(AllocatedBuffer {
        buffer,
        memory,
        size,
    })
}

pub fn create_image(
    ctx: &mut RenderContext,
    desc: &ImageDesc,
    properties: vk::MemoryPropertyFlags,
) -> RenderResult<AllocatedImage> {
    let memory_properties = ctx.memory_properties;
    let gpu = ctx.gpu.as_mut();
    let image = gpu.create_image(desc)?;
    let req = gpu.image_memory_requirements(image);

    let memory = match find_memory_type(&memory_properties, req.memory_type_bits, properties)
        .and_then(|index| gpu.allocate_memory(req.size, index))
    {
        Ok(m) => m,
        Err(e) => {
            gpu.destroy_image(image);
            return Err(e);
        }
    };
    if let Err(e) = gpu.bind_image_memory(image, memory) {
        gpu.destroy_image(image);
        gpu.free_memory(memory);
        return Err(e);
    }

    debug!(
        width = desc.width,
        height = desc.height,
        format = ?desc.format,
        "image created"
    );
    Ok(AllocatedImage {
        image,
        memory,
        width: desc.width,
        height: desc.height,
    })
}

#[derive(Clone, Copy, Debug)]
pub enum UploadTarget {
    Buffer(vk::Buffer),
    /// Left in SHADER_READ_ONLY_OPTIMAL once the copy lands.
    Image(AllocatedImage),
}

/// Copies `data` into `target` through a host-visible staging buffer, blocking until
/// the graphics queue is idle. The staging buffer is released on every path.
pub fn upload_via_staging(
    ctx: &mut RenderContext,
    data: &[u8],
    target: UploadTarget,
) -> RenderResult<()> {
    let size = data.len() as vk::DeviceSize;
    let staging = create_buffer(
        ctx,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let result = fill_and_copy(ctx, &staging, data, target);
    staging.destroy(ctx.gpu.as_mut());
    result
}

fn fill_and_copy(
    ctx: &mut RenderContext,
    staging: &AllocatedBuffer,
    data: &[u8],
    target: UploadTarget,
) -> RenderResult<()> {
    ctx.gpu.write_memory(staging.memory, 0, data)?;

    match target {
        UploadTarget::Buffer(dst) => one_time_submit(ctx, |gpu, cb| {
            gpu.record(
                cb,
                &Command::CopyBuffer {
                    src: staging.buffer,
                    dst,
                    size: staging.size,
                },
            );
            Ok(())
        }),
        UploadTarget::Image(img) => {
            transition_image_layout(
                ctx,
                img.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            one_time_submit(ctx, |gpu, cb| {
                gpu.record(
                    cb,
                    &Command::CopyBufferToImage {
                        src: staging.buffer,
                        dst: img.image,
                        width: img.width,
                        height: img.height,
                    },
                );
                Ok(())
            })?;
            transition_image_layout(
                ctx,
                img.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        }
    }
}

/// Access masks and stages for the two transitions a texture upload needs.
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Option<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Some((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Some((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        _ => None,
    }
}

pub fn transition_image_layout(
    ctx: &mut RenderContext,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RenderResult<()> {
    let (src_access, dst_access, src_stage, dst_stage) = transition_masks(old_layout, new_layout)
        .ok_or_else(|| {
            RenderError::Initialization(format!(
                "unsupported layout transition {old_layout:?} -> {new_layout:?}"
            ))
        })?;

    one_time_submit(ctx, |gpu, cb| {
        gpu.record(
            cb,
            &Command::ImageBarrier {
                image,
                old_layout,
                new_layout,
                src_access,
                dst_access,
                src_stage,
                dst_stage,
            },
        );
        Ok(())
    })
}
