// SPDX-License-Identifier: CEPL-1.0
//! Validation-layer plumbing. The messenger is owned by
//! [`crate::bootstrap::VulkanContext`]; there is no process-wide handle.

use std::ffi::{c_void, CStr};

use ash::ext::debug_utils;
use ash::vk;

use crate::error::{EngineResult, VkResultExt};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { (*data).p_message };
    if msg.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(msg) }.to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "[{:?}] {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "[{:?}] {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::debug!(target: "vulkan", "[{:?}] {}", types, msg);
    } else {
        tracing::trace!(target: "vulkan", "[{:?}] {}", types, msg);
    }
    vk::FALSE
}

/// Used both for the messenger and chained into instance creation so that
/// instance creation/destruction is reported too.
pub fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

pub struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl DebugMessenger {
    /// # Safety
    /// `instance` must have been created with `VK_EXT_debug_utils` enabled and
    /// must outlive the returned value's [`DebugMessenger::destroy`] call.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> EngineResult<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_create_info(), None) }
            .vk_op("create_debug_utils_messenger")?;
        Ok(Self {
            loader,
            messenger: Some(messenger),
        })
    }

    /// # Safety
    /// Must run before the owning instance is destroyed.
    pub unsafe fn destroy(&mut self) {
        if let Some(messenger) = self.messenger.take() {
            unsafe { self.loader.destroy_debug_utils_messenger(messenger, None) };
        }
    }
}
