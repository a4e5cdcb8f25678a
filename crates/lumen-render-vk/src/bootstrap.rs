// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface and logical device creation.

use std::ffi::{c_char, c_void, CStr};

use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, info};

use crate::debug::{messenger_create_info, DebugMessenger, VALIDATION_LAYER};
use crate::device::QueueFamilies;
use crate::error::{EngineError, EngineResult, VkResultExt};

const APP_NAME: &CStr = c"Hello Triangle";
const ENGINE_NAME: &CStr = c"No Engine";

/// Instance-level objects. Dropped after the logical device.
pub struct VulkanContext {
    _entry: Entry,
    pub instance: Instance,
    debug: Option<DebugMessenger>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    validation: bool,
}

impl VulkanContext {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        validation: bool,
    ) -> EngineResult<Self> {
        // STRICT ORDER:
        // 1) instance (WSI + optional debug ext)
        // 2) messenger
        // 3) surface from THIS instance; devices are later checked against it
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let entry = Entry::linked();
        let instance = unsafe { create_instance(&entry, dh, validation) }?;

        let mut debug = if validation {
            match unsafe { DebugMessenger::new(&entry, &instance) } {
                Ok(m) => Some(m),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = match unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) } {
            Ok(s) => s,
            Err(result) => {
                unsafe {
                    if let Some(m) = debug.as_mut() {
                        m.destroy();
                    }
                    instance.destroy_instance(None);
                }
                return Err(EngineError::Vulkan {
                    op: "create_surface",
                    result,
                });
            }
        };

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surface_loader,
            surface,
            validation,
        })
    }

    pub fn validation(&self) -> bool {
        self.validation
    }

    /// One queue per distinct family, swapchain extension enabled.
    pub fn create_logical_device(
        &self,
        phys: vk::PhysicalDevice,
        families: QueueFamilies,
    ) -> EngineResult<LogicalDevice> {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();
        let device_exts = [swapchain::NAME.as_ptr()];
        let layers = [VALIDATION_LAYER.as_ptr()];
        let (layer_count, layer_names): (u32, *const *const c_char) = if self.validation {
            (layers.len() as u32, layers.as_ptr())
        } else {
            (0, std::ptr::null())
        };

        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            p_enabled_features: &features,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            enabled_layer_count: layer_count,
            pp_enabled_layer_names: layer_names,
            ..Default::default()
        };

        let device = unsafe { self.instance.create_device(phys, &dinfo, None) }.vk_op("create_device")?;
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        debug!(
            "logical device created with {} queue famil{}",
            queue_infos.len(),
            if queue_infos.len() == 1 { "y" } else { "ies" }
        );

        Ok(LogicalDevice {
            device,
            graphics_queue,
            present_queue,
        })
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            if let Some(m) = self.debug.as_mut() {
                m.destroy();
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        debug!("instance destroyed");
    }
}

pub struct LogicalDevice {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

unsafe fn validation_layer_available(entry: &Entry) -> EngineResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .vk_op("enumerate_instance_layer_properties")?;
    Ok(layers
        .iter()
        .any(|l| l.layer_name_as_c_str() == Ok(VALIDATION_LAYER)))
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> EngineResult<Instance> {
    if validation && !unsafe { validation_layer_available(entry) }? {
        return Err(EngineError::MissingValidationLayer("VK_LAYER_KHRONOS_validation"));
    }

    let mut extensions = ash_window::enumerate_required_extensions(display_raw)
        .vk_op("enumerate_required_extensions")?
        .to_vec();
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    let available = unsafe { entry.enumerate_instance_extension_properties(None) }
        .vk_op("enumerate_instance_extension_properties")?;
    debug!("available instance extensions:");
    for ext in &available {
        if let Ok(name) = ext.extension_name_as_c_str() {
            debug!("\t{}", name.to_string_lossy());
        }
    }
    debug!("required instance extensions:");
    for &ext in &extensions {
        debug!("\t{}", unsafe { CStr::from_ptr(ext) }.to_string_lossy());
    }

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: ENGINE_NAME.as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let layers = [VALIDATION_LAYER.as_ptr()];
    // Must live as long as create_info.
    let debug_info = messenger_create_info();
    let (layer_count, layer_names, p_next): (u32, *const *const c_char, *const c_void) =
        if validation {
            (
                layers.len() as u32,
                layers.as_ptr(),
                (&debug_info as *const vk::DebugUtilsMessengerCreateInfoEXT).cast(),
            )
        } else {
            (0, std::ptr::null(), std::ptr::null())
        };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_next,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layer_count,
        pp_enabled_layer_names: layer_names,
        ..Default::default()
    };

    let instance = unsafe { entry.create_instance(&create_info, None) }.vk_op("create_instance")?;
    info!("Vulkan instance created (validation={})", validation);
    Ok(instance)
}
