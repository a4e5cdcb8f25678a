// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection.
//!
//! Every candidate is reduced to a [`DeviceCandidate`] first so the scoring
//! rules can be checked without a GPU; [`enumerate_candidates`] is the only
//! part that talks to Vulkan.

use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult, VkResultExt};

const DISCRETE_BONUS: u64 = 1000;
const SHARED_FAMILY_BONUS: u64 = 100;

/// Queue families serving graphics and presentation for one (device, surface)
/// pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Resolved indices; only exists when both families were found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Picks queue families from `families`. A family that does both jobs wins
/// over a split pair; otherwise the first of each kind is used. A failed
/// presentation query aborts the search.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut presents: impl FnMut(u32) -> EngineResult<bool>,
) -> EngineResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }
        let i = i as u32;
        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = presents(i)?;
        if graphics && present {
            return Ok(QueueFamilyIndices {
                graphics: Some(i),
                present: Some(i),
            });
        }
        if graphics && indices.graphics.is_none() {
            indices.graphics = Some(i);
        }
        if present && indices.present.is_none() {
            indices.present = Some(i);
        }
    }
    Ok(indices)
}

/// What selection needs to know about one physical device.
#[derive(Clone, Debug)]
pub struct DeviceCandidate<H = vk::PhysicalDevice> {
    pub handle: H,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub queue_families: QueueFamilyIndices,
    pub supports_swapchain: bool,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
}

impl<H> DeviceCandidate<H> {
    /// Zero means the device misses a hard requirement.
    pub fn score(&self) -> u64 {
        let Some(families) = self.queue_families.resolve() else {
            return 0;
        };
        if !self.supports_swapchain
            || self.surface_format_count == 0
            || self.present_mode_count == 0
        {
            return 0;
        }

        let mut score = u64::from(self.max_image_dimension_2d);
        if self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += DISCRETE_BONUS;
        }
        if families.is_shared() {
            score += SHARED_FAMILY_BONUS;
        }
        // A passing device must never collapse to the "unsuitable" score.
        score.max(1)
    }
}

/// The winner of selection, with its queue families resolved.
#[derive(Clone, Debug)]
pub struct SelectedDevice<H = vk::PhysicalDevice> {
    pub handle: H,
    pub name: String,
    pub score: u64,
    pub queue_families: QueueFamilies,
}

/// Highest score wins; on a tie the earlier candidate is kept.
pub fn select_device<H>(candidates: Vec<DeviceCandidate<H>>) -> EngineResult<SelectedDevice<H>> {
    if candidates.is_empty() {
        return Err(EngineError::NoDevices);
    }

    let mut best: Option<(u64, DeviceCandidate<H>)> = None;
    for candidate in candidates {
        let score = candidate.score();
        debug!("device '{}' scored {}", candidate.name, score);
        if score == 0 {
            continue;
        }
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, candidate));
        }
    }

    let (score, winner) = best.ok_or(EngineError::NoSuitableDevice)?;
    let queue_families = winner
        .queue_families
        .resolve()
        .ok_or(EngineError::NoSuitableDevice)?;
    Ok(SelectedDevice {
        handle: winner.handle,
        name: winner.name,
        score,
        queue_families,
    })
}

/// # Safety
/// `surface` must be a live surface created from `instance`.
pub unsafe fn enumerate_candidates(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> EngineResult<Vec<DeviceCandidate>> {
    let devices =
        unsafe { instance.enumerate_physical_devices() }.vk_op("enumerate_physical_devices")?;

    let mut out = Vec::with_capacity(devices.len());
    for phys in devices {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        let queue_families = find_queue_families(&families, |i| {
            unsafe { surface_loader.get_physical_device_surface_support(phys, i, surface) }
                .vk_op("get_physical_device_surface_support")
        })?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(phys) }
            .vk_op("enumerate_device_extension_properties")?;
        let supports_swapchain = extensions
            .iter()
            .any(|e| e.extension_name_as_c_str() == Ok(swapchain::NAME));

        // Surface lists are only meaningful once the swapchain extension exists.
        let (surface_format_count, present_mode_count) = if supports_swapchain {
            let formats =
                unsafe { surface_loader.get_physical_device_surface_formats(phys, surface) }
                    .vk_op("get_physical_device_surface_formats")?;
            let modes =
                unsafe { surface_loader.get_physical_device_surface_present_modes(phys, surface) }
                    .vk_op("get_physical_device_surface_present_modes")?;
            (formats.len(), modes.len())
        } else {
            (0, 0)
        };

        out.push(DeviceCandidate {
            handle: phys,
            name: props
                .device_name_as_c_str()
                .unwrap_or(c"unknown")
                .to_string_lossy()
                .into_owned(),
            device_type: props.device_type,
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
            queue_families,
            supports_swapchain,
            surface_format_count,
            present_mode_count,
        });
    }
    Ok(out)
}

/// # Safety
/// As for [`enumerate_candidates`].
pub unsafe fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> EngineResult<SelectedDevice> {
    let candidates = unsafe { enumerate_candidates(instance, surface_loader, surface) }?;
    let selected = select_device(candidates)?;
    info!(
        "selected GPU '{}' (score {}, graphics family {}, present family {})",
        selected.name,
        selected.score,
        selected.queue_families.graphics,
        selected.queue_families.present
    );
    Ok(selected)
}
