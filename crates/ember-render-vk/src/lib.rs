// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device setup, swapchain lifecycle and the frames-in-flight loop.

use ash::vk;
use ember_render::{RenderError, RenderResult};

pub mod commands;
pub mod context;
pub mod device;
pub mod frame;
pub mod gpu;
pub mod instance;
pub mod memory;
pub mod pipeline;
mod renderer;
pub mod resources;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

#[cfg(test)]
pub(crate) mod testing;

pub use renderer::VkRenderer;
pub use sync::MAX_FRAMES_IN_FLIGHT;

/// Maps a raw result to the error taxonomy. Out-of-date surfaces are the only
/// recoverable code.
pub(crate) fn unexpected(call: &'static str, code: vk::Result) -> RenderError {
    match code {
        vk::Result::ERROR_OUT_OF_DATE_KHR => RenderError::SurfaceOutOfDate,
        other => RenderError::UnexpectedResult {
            call,
            code: other.as_raw(),
        },
    }
}

pub(crate) trait VkResultExt<T> {
    fn check(self, call: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn check(self, call: &'static str) -> RenderResult<T> {
        self.map_err(|code| unexpected(call, code))
    }
}
