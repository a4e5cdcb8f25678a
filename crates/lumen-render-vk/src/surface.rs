// SPDX-License-Identifier: CEPL-1.0
use ash::khr::surface;
use ash::vk;

use crate::error::{EngineResult, VkResultExt};

/// Snapshot of what a surface accepts from a device. Re-queried on every
/// chain build; never reused across builds.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// # Safety
/// `phys` and `surface` must belong to the instance `surface_loader` was
/// created from.
pub unsafe fn query_swapchain_support(
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> EngineResult<SwapchainSupportDetails> {
    unsafe {
        Ok(SwapchainSupportDetails {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(phys, surface)
                .vk_op("get_physical_device_surface_capabilities")?,
            formats: surface_loader
                .get_physical_device_surface_formats(phys, surface)
                .vk_op("get_physical_device_surface_formats")?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(phys, surface)
                .vk_op("get_physical_device_surface_present_modes")?,
        })
    }
}

// Info only
pub(crate) fn format_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        vk::Format::R16G16B16A16_SFLOAT => "R16G16B16A16_SFLOAT",
        _ => "OTHER",
    }
}

pub(crate) fn present_mode_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}
