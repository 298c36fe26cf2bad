// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection. Works on plain snapshots so the policy can be tested
//! without a driver; `vulkan.rs` builds the snapshots from ash queries.

use std::ffi::{CStr, CString};

use ash::vk;
use bitflags::bitflags;
use ember_render::{RenderError, RenderResult};
use tracing::{debug, info};

use crate::gpu::{QueueFamilies, SurfaceSupport};

pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    pub graphics: bool,
    /// Can present to the target surface.
    pub present: bool,
}

/// Everything selection needs to know about one physical device.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<QueueFamilyCaps>,
    pub extensions: Vec<CString>,
    pub surface: SurfaceSupport,
    pub sampler_anisotropy: bool,
}

bitflags! {
    /// Requirements a candidate fails to meet.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Missing: u8 {
        const GRAPHICS_QUEUE = 1 << 0;
        const PRESENT_QUEUE = 1 << 1;
        const EXTENSIONS = 1 << 2;
        const SURFACE_SUPPORT = 1 << 3;
        const ANISOTROPY = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn complete(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// First graphics family and first present family, found independently.
pub fn find_queue_families(families: &[QueueFamilyCaps]) -> QueueFamilyIndices {
    let mut found = QueueFamilyIndices::default();
    for (i, f) in families.iter().enumerate() {
        if f.graphics && found.graphics.is_none() {
            found.graphics = Some(i as u32);
        }
        if f.present && found.present.is_none() {
            found.present = Some(i as u32);
        }
        if found.complete().is_some() {
            break;
        }
    }
    found
}

pub fn missing_requirements(candidate: &DeviceCandidate, required: &[&CStr]) -> Missing {
    let mut missing = Missing::empty();
    let families = find_queue_families(&candidate.queue_families);
    if families.graphics.is_none() {
        missing |= Missing::GRAPHICS_QUEUE;
    }
    if families.present.is_none() {
        missing |= Missing::PRESENT_QUEUE;
    }
    let has_all = required
        .iter()
        .all(|want| candidate.extensions.iter().any(|have| have.as_c_str() == *want));
    if !has_all {
        missing |= Missing::EXTENSIONS;
    } else if !candidate.surface.is_adequate() {
        // only meaningful once the swapchain extension is known to exist
        missing |= Missing::SURFACE_SUPPORT;
    }
    if !candidate.sampler_anisotropy {
        missing |= Missing::ANISOTROPY;
    }
    missing
}

/// Index of the first suitable candidate and its queue families.
pub fn select_device(
    candidates: &[DeviceCandidate],
    required: &[&CStr],
) -> RenderResult<(usize, QueueFamilies)> {
    for (i, c) in candidates.iter().enumerate() {
        let missing = missing_requirements(c, required);
        if !missing.is_empty() {
            debug!(device = %c.name, ?missing, "device rejected");
            continue;
        }
        if let Some(families) = find_queue_families(&c.queue_families).complete() {
            info!(
                device = %c.name,
                kind = ?c.device_type,
                graphics = families.graphics,
                present = families.present,
                "selected GPU"
            );
            return Ok((i, families));
        }
    }
    Err(RenderError::NoSuitableDevice)
}
