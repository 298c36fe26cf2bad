// SPDX-License-Identifier: CEPL-1.0
//! Per-frame protocol: wait slot fence -> acquire -> wait image owner -> write uniforms
//! -> reset fence + submit -> present -> advance.

use ash::vk;
use ember_math::{aspect_ratio, Transforms};
use ember_render::{FrameOutcome, RenderError, RenderResult};
use tracing::{debug, info, trace, warn};

use crate::context::RenderContext;
use crate::gpu::{PresentDesc, SubmitDesc};
use crate::resources::StaticResources;
use crate::swapchain::{ChainSettings, SwapchainResources};
use crate::sync::{FrameSlot, FrameSlots, ImagesInFlight, SlotState, MAX_FRAMES_IN_FLIGHT};
use crate::unexpected;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInput {
    /// Seconds since the renderer started; drives the spin.
    pub elapsed_secs: f32,
    /// The window reported a new size since the last frame.
    pub resized: bool,
}

pub struct FrameController {
    slots: FrameSlots,
    images_in_flight: ImagesInFlight,
    current_frame: usize,
    /// A rebuild was requested while the surface had no area.
    pending_recreate: bool,
}

impl FrameController {
    pub fn new(ctx: &mut RenderContext, image_count: usize) -> RenderResult<Self> {
        Ok(Self {
            slots: FrameSlots::create(ctx.gpu.as_mut())?,
            images_in_flight: ImagesInFlight::new(image_count),
            current_frame: 0,
            pending_recreate: false,
        })
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        self.slots.get(index)
    }

    pub fn images_in_flight(&self) -> &ImagesInFlight {
        &self.images_in_flight
    }

    pub fn recreate_pending(&self) -> bool {
        self.pending_recreate
    }

    /// The device must be idle.
    pub fn destroy(&mut self, ctx: &mut RenderContext) {
        self.slots.destroy(ctx.gpu.as_mut());
    }

    fn recreate(
        &mut self,
        ctx: &mut RenderContext,
        chain: &mut SwapchainResources,
        statics: &StaticResources,
        settings: &ChainSettings,
    ) -> RenderResult<bool> {
        let rebuilt = chain.recreate(ctx, statics, settings)?;
        if rebuilt {
            self.images_in_flight.reset(chain.image_count());
            self.pending_recreate = false;
            info!(
                width = chain.extent.width,
                height = chain.extent.height,
                images = chain.image_count(),
                "swapchain recreated"
            );
        } else {
            self.pending_recreate = true;
        }
        Ok(rebuilt)
    }

    pub fn draw_frame(
        &mut self,
        ctx: &mut RenderContext,
        chain: &mut SwapchainResources,
        statics: &StaticResources,
        settings: &ChainSettings,
        input: FrameInput,
    ) -> RenderResult<FrameOutcome> {
        let mut recreated = false;
        if self.pending_recreate {
            if !self.recreate(ctx, chain, statics, settings)? {
                return Ok(FrameOutcome::Skipped { recreated: false });
            }
            recreated = true;
        }

        let slot_index = self.current_frame;
        let slot = *self.slots.get(slot_index);
        if slot.state != SlotState::Idle {
            // the last frame on this slot failed part way through
            warn!(slot = slot_index, state = ?slot.state, "slot left mid-frame, resetting");
            self.slots.get_mut(slot_index).state = SlotState::Idle;
        }

        // 1. previous use of this slot must be finished
        ctx.gpu.wait_for_fence(slot.in_flight)?;
        self.slots.get_mut(slot_index).enter(SlotState::Acquiring);

        // 2. acquire
        let image_index = match ctx
            .gpu
            .acquire_next_image(chain.swapchain, slot.image_available)
        {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!(slot = slot_index, "acquire: surface out of date");
                self.slots.get_mut(slot_index).enter(SlotState::Idle);
                let rebuilt = self.recreate(ctx, chain, statics, settings)?;
                return Ok(FrameOutcome::Skipped {
                    recreated: recreated || rebuilt,
                });
            }
            Err(code) => return Err(unexpected("vkAcquireNextImageKHR", code)),
        };
        let image = image_index as usize;
        if image >= chain.image_count() {
            warn!(
                image,
                images = chain.image_count(),
                "acquire returned an index outside the swapchain"
            );
            self.slots.get_mut(slot_index).enter(SlotState::Idle);
            return Err(RenderError::UnexpectedResult {
                call: "vkAcquireNextImageKHR",
                code: vk::Result::ERROR_UNKNOWN.as_raw(),
            });
        }

        // 3. an older frame from another slot may still be reading this image
        if let Some(owner) = self.images_in_flight.conflicting_owner(image, slot_index) {
            trace!(image, owner, slot = slot_index, "waiting on image owner");
            ctx.gpu.wait_for_fence(self.slots.get(owner).in_flight)?;
        }
        self.images_in_flight.claim(image, slot_index);

        // 4. uniforms for this image
        let transforms = Transforms::spinning(
            input.elapsed_secs,
            aspect_ratio(chain.extent.width, chain.extent.height),
        );
        chain.write_uniforms(ctx, image, &transforms)?;

        // 5. submit
        ctx.gpu.reset_fence(slot.in_flight)?;
        ctx.gpu.queue_submit(&SubmitDesc {
            queue: ctx.graphics_queue,
            command_buffer: chain.command_buffers[image],
            wait: Some((
                slot.image_available,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )),
            signal: Some(slot.render_finished),
            fence: Some(slot.in_flight),
        })?;
        self.slots.get_mut(slot_index).enter(SlotState::Submitted);

        // 6. present
        self.slots.get_mut(slot_index).enter(SlotState::Presenting);
        let present = ctx.gpu.queue_present(&PresentDesc {
            queue: ctx.present_queue,
            wait: slot.render_finished,
            swapchain: chain.swapchain,
            image_index,
        });
        self.slots.get_mut(slot_index).enter(SlotState::Idle);
        let stale = match present {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(code) => return Err(unexpected("vkQueuePresentKHR", code)),
        };
        if stale || input.resized {
            debug!(stale, resized = input.resized, "present: rebuilding swapchain");
            recreated |= self.recreate(ctx, chain, statics, settings)?;
        }

        // 7. advance
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(FrameOutcome::Presented { recreated })
    }
}
