// SPDX-License-Identifier: CEPL-1.0
//! Instance creation, validation layers and the debug messenger.

use std::ffi::{c_void, CStr, CString};

use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use ember_core::{log_message, LogLevel};
use ember_render::{RenderError, RenderResult};
use raw_window_handle::RawDisplayHandle;
use tracing::{info, warn};

use crate::VkResultExt;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub fn severity_to_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogLevel {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogLevel::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogLevel::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        LogLevel::Debug
    } else {
        LogLevel::Trace
    }
}

pub fn message_kind(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if !data.is_null() && !(*data).p_message.is_null() {
        let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
        log_message(severity_to_level(severity), "vulkan", message_kind(types), &msg);
    }
    vk::FALSE
}

pub(crate) fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

/// Loader plus messenger handle; only present when validation is on.
pub struct DebugMessenger {
    pub loader: debug_utils::Instance,
    pub messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// # Safety
    /// `instance` must have been created with the debug utils extension.
    pub unsafe fn new(entry: &Entry, instance: &Instance) -> RenderResult<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let messenger = loader
            .create_debug_utils_messenger(&messenger_create_info(), None)
            .check("vkCreateDebugUtilsMessengerEXT")?;
        Ok(Self { loader, messenger })
    }

    /// # Safety
    /// Must run before the instance is destroyed.
    pub unsafe fn destroy(&mut self) {
        if self.messenger != vk::DebugUtilsMessengerEXT::null() {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
            self.messenger = vk::DebugUtilsMessengerEXT::null();
        }
    }
}

fn layer_available(entry: &Entry, name: &CStr) -> RenderResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .check("vkEnumerateInstanceLayerProperties")?;
    Ok(layers
        .iter()
        .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == name))
}

/// # Safety
/// `display` must be a valid handle for the lifetime of the instance's surfaces.
pub unsafe fn create_instance(
    entry: &Entry,
    display: RawDisplayHandle,
    app_name: &str,
    validation: bool,
) -> RenderResult<Instance> {
    let app = CString::new(app_name)
        .map_err(|e| RenderError::Initialization(format!("application name: {e}")))?;
    let engine = c"Ember";

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: engine.as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display)
        .check("enumerate_required_extensions")?
        .to_vec();

    let mut layers: Vec<*const std::ffi::c_char> = Vec::new();
    if validation {
        if !layer_available(entry, VALIDATION_LAYER)? {
            return Err(RenderError::Initialization(format!(
                "validation requested but {} is not installed",
                VALIDATION_LAYER.to_string_lossy()
            )));
        }
        layers.push(VALIDATION_LAYER.as_ptr());
        extensions.push(debug_utils::NAME.as_ptr());
    }

    // chained so instance creation and destruction are covered too
    let mut debug_info = messenger_create_info();
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_next: if validation {
            (&mut debug_info) as *mut _ as *const c_void
        } else {
            std::ptr::null()
        },
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    let instance = entry.create_instance(&create_info, None).map_err(|e| {
        warn!(?e, "vkCreateInstance failed");
        RenderError::Initialization(format!("vkCreateInstance failed with result code {}", e.as_raw()))
    })?;
    info!(
        app = app_name,
        validation,
        extensions = extensions.len(),
        "Vulkan instance created"
    );
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_map_to_log_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_to_level(S::VERBOSE), LogLevel::Trace);
        assert_eq!(severity_to_level(S::INFO), LogLevel::Debug);
        assert_eq!(severity_to_level(S::WARNING), LogLevel::Warn);
        assert_eq!(severity_to_level(S::ERROR), LogLevel::Error);
        assert_eq!(severity_to_level(S::WARNING | S::ERROR), LogLevel::Error);
    }

    #[test]
    fn message_types_name_their_source() {
        use vk::DebugUtilsMessageTypeFlagsEXT as T;
        assert_eq!(message_kind(T::GENERAL), "general");
        assert_eq!(message_kind(T::VALIDATION), "validation");
        assert_eq!(message_kind(T::PERFORMANCE), "performance");
        assert_eq!(message_kind(T::GENERAL | T::VALIDATION), "validation");
    }

    #[test]
    fn callback_never_aborts_the_call() {
        let text = c"hello from the loader";
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: text.as_ptr(),
            ..Default::default()
        };
        let ret = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(ret, vk::FALSE);
        let ret = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(ret, vk::FALSE);
    }
}
