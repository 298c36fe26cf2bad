// SPDX-License-Identifier: CEPL-1.0
//! Frame slots and the image ownership table.

use ash::vk;
use ember_render::RenderResult;
use tracing::debug;

use crate::gpu::Gpu;

/// Frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Idle,
    Acquiring,
    Submitted,
    Presenting,
}

impl SlotState {
    /// Idle -> Acquiring -> Submitted -> Presenting -> Idle. An acquire that finds the
    /// surface out of date (or hands back an unusable image) drops straight to Idle.
    pub fn can_enter(self, next: SlotState) -> bool {
        use SlotState::*;
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Submitted)
                | (Acquiring, Idle)
                | (Submitted, Presenting)
                | (Presenting, Idle)
        )
    }
}

/// Synchronization bundle reused every `MAX_FRAMES_IN_FLIGHT` frames. Lives as long
/// as the renderer; swapchain recreation does not touch it.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    /// Created signaled so the first wait on a fresh slot returns immediately.
    pub in_flight: vk::Fence,
    pub state: SlotState,
}

impl FrameSlot {
    fn create(gpu: &mut dyn Gpu) -> RenderResult<Self> {
        let image_available = gpu.create_semaphore()?;
        let render_finished = match gpu.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                gpu.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match gpu.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                gpu.destroy_semaphore(image_available);
                gpu.destroy_semaphore(render_finished);
                return Err(e);
            }
        };
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            state: SlotState::Idle,
        })
    }

    pub fn enter(&mut self, next: SlotState) {
        debug_assert!(
            self.state.can_enter(next),
            "slot cannot move from {:?} to {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    fn destroy(self, gpu: &mut dyn Gpu) {
        gpu.destroy_semaphore(self.image_available);
        gpu.destroy_semaphore(self.render_finished);
        gpu.destroy_fence(self.in_flight);
    }
}

pub struct FrameSlots {
    slots: Vec<FrameSlot>,
}

impl FrameSlots {
    pub fn create(gpu: &mut dyn Gpu) -> RenderResult<Self> {
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            match FrameSlot::create(gpu) {
                Ok(s) => slots.push(s),
                Err(e) => {
                    for s in slots {
                        s.destroy(gpu);
                    }
                    return Err(e);
                }
            }
        }
        debug!(count = MAX_FRAMES_IN_FLIGHT, "frame slots created");
        Ok(Self { slots })
    }

    pub fn destroy(&mut self, gpu: &mut dyn Gpu) {
        for s in self.slots.drain(..) {
            s.destroy(gpu);
        }
    }

    pub fn get(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut FrameSlot {
        &mut self.slots[index]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn fences(&self) -> impl Iterator<Item = vk::Fence> + '_ {
        self.slots.iter().map(|s| s.in_flight)
    }
}

/// For each swapchain image, the slot whose fence guards the last submission that
/// used it. Sized to the image count and reset whenever the swapchain is rebuilt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImagesInFlight {
    owners: Vec<Option<usize>>,
}

impl ImagesInFlight {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn owner(&self, image: usize) -> Option<usize> {
        self.owners.get(image).copied().flatten()
    }

    /// Slot that must be waited before `slot` may use `image`, if any.
    pub fn conflicting_owner(&self, image: usize, slot: usize) -> Option<usize> {
        self.owner(image).filter(|&owner| owner != slot)
    }

    /// Records `slot` as the owner of `image`. The frame controller rejects indices
    /// beyond the swapchain's image count before claiming.
    pub fn claim(&mut self, image: usize, slot: usize) {
        debug_assert!(
            image < self.owners.len(),
            "image {image} outside table of {}",
            self.owners.len()
        );
        if let Some(owner) = self.owners.get_mut(image) {
            *owner = Some(slot);
        }
    }
}
