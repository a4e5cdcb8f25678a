// SPDX-License-Identifier: CEPL-1.0
//! The presentable image chain: selection policy and build/teardown/rebuild.

use ash::vk;
use lumen_render::{RenderSize, WindowEvents};
use tracing::{debug, info};

use crate::backend::{PresentDevice, RenderTargets};
use crate::device::QueueFamilies;
use crate::error::{EngineError, EngineResult};
use crate::surface::{format_name, present_mode_name, SwapchainSupportDetails};

/// Surfaces that let the application pick the size report this width.
pub const AUTOMATIC_EXTENT: u32 = u32::MAX;

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> EngineResult<vk::SurfaceFormatKHR> {
    let first = formats.first().copied().ok_or(EngineError::NoSurfaceFormats)?;
    Ok(formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(first))
}

/// MAILBOX when available. Without it, IMMEDIATE is taken only if tearing is
/// allowed; FIFO is the guaranteed fallback.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], allow_tearing: bool) -> vk::PresentModeKHR {
    let mut best = vk::PresentModeKHR::FIFO;
    for &mode in modes {
        if mode == vk::PresentModeKHR::MAILBOX {
            return mode;
        }
        if allow_tearing && mode == vk::PresentModeKHR::IMMEDIATE {
            best = mode;
        }
    }
    best
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != AUTOMATIC_EXTENT {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: framebuffer
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: framebuffer
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 == "no max").
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

/// How chain images are shared between the graphics and present families.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSharing {
    Exclusive,
    Concurrent(Vec<u32>),
}

impl ImageSharing {
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.is_shared() {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent(families.unique())
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            ImageSharing::Exclusive => vk::SharingMode::EXCLUSIVE,
            ImageSharing::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn family_indices(&self) -> &[u32] {
        match self {
            ImageSharing::Exclusive => &[],
            ImageSharing::Concurrent(indices) => indices,
        }
    }
}

/// Everything derived from one probe result. Same surface state in, same
/// parameters out.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainParams {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing: ImageSharing,
}

impl ChainParams {
    pub fn derive(
        support: &SwapchainSupportDetails,
        framebuffer: RenderSize,
        families: QueueFamilies,
        allow_tearing: bool,
    ) -> EngineResult<Self> {
        if support.present_modes.is_empty() {
            return Err(EngineError::NoPresentModes);
        }
        let caps = &support.capabilities;
        Ok(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes, allow_tearing),
            extent: choose_extent(caps, framebuffer),
            image_count: choose_image_count(caps),
            pre_transform: caps.current_transform,
            sharing: ImageSharing::for_families(families),
        })
    }
}

/// The live chain and its per-image views.
#[derive(Debug, Default)]
pub struct SwapchainState {
    handle: Option<vk::SwapchainKHR>,
    format: vk::Format,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl SwapchainState {
    pub fn handle(&self) -> Option<vk::SwapchainKHR> {
        self.handle
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

pub struct SwapchainManager {
    families: QueueFamilies,
    allow_tearing: bool,
    state: SwapchainState,
    params: Option<ChainParams>,
}

impl SwapchainManager {
    pub fn new(families: QueueFamilies, allow_tearing: bool) -> Self {
        Self {
            families,
            allow_tearing,
            state: SwapchainState::default(),
            params: None,
        }
    }

    pub fn state(&self) -> &SwapchainState {
        &self.state
    }

    /// Parameters of the last successful build.
    pub fn params(&self) -> Option<&ChainParams> {
        self.params.as_ref()
    }

    pub fn image_count(&self) -> usize {
        self.state.images.len()
    }

    /// Probe the surface and create chain, views and framebuffers. Any
    /// failure leaves nothing behind. A zero extent is refused with
    /// [`EngineError::ZeroExtent`] before anything is created.
    pub fn build<D, T>(&mut self, device: &D, targets: &mut T, framebuffer: RenderSize) -> EngineResult<()>
    where
        D: PresentDevice,
        T: RenderTargets,
    {
        if let Err(e) = self.try_build(device, targets, framebuffer) {
            self.teardown(device, targets);
            return Err(e);
        }
        Ok(())
    }

    fn try_build<D, T>(&mut self, device: &D, targets: &mut T, framebuffer: RenderSize) -> EngineResult<()>
    where
        D: PresentDevice,
        T: RenderTargets,
    {
        let support = device.surface_support()?;
        let params = ChainParams::derive(&support, framebuffer, self.families, self.allow_tearing)?;
        // Minimised windows can report 0x0 either as a fixed extent or as a
        // zero minimum for the automatic one.
        if params.extent.width == 0 || params.extent.height == 0 {
            return Err(EngineError::ZeroExtent);
        }

        info!(
            "building swapchain: format {} / {:?}, present_mode {}, extent {}x{}, images(min={} → picked={}), sharing {:?}",
            format_name(params.surface_format.format),
            params.surface_format.color_space,
            present_mode_name(params.present_mode),
            params.extent.width,
            params.extent.height,
            support.capabilities.min_image_count,
            params.image_count,
            params.sharing.mode(),
        );

        let handle = device.create_swapchain(&params)?;
        self.state.handle = Some(handle);
        self.state.format = params.surface_format.format;
        self.state.extent = params.extent;
        self.state.images = device.swapchain_images(handle)?;

        for &image in &self.state.images {
            let view = device.create_image_view(image, self.state.format)?;
            self.state.views.push(view);
        }

        targets.rebuild(self.state.format, self.state.extent, &self.state.views)?;
        debug_assert_eq!(targets.framebuffer_count(), self.state.views.len());

        debug!("swapchain holds {} images", self.state.images.len());
        self.params = Some(params);
        Ok(())
    }

    /// Destroy framebuffers, views and the chain. The device, surface and
    /// frame ring are untouched. Safe on a partial or already torn-down chain.
    pub fn teardown<D, T>(&mut self, device: &D, targets: &mut T)
    where
        D: PresentDevice,
        T: RenderTargets,
    {
        targets.release();
        for view in self.state.views.drain(..) {
            device.destroy_image_view(view);
        }
        self.state.images.clear();
        if let Some(handle) = self.state.handle.take() {
            device.destroy_swapchain(handle);
            debug!("swapchain destroyed");
        }
    }

    /// Teardown + build once the window has a drawable area and the device is
    /// idle. Returns `false` without building if the window closed while
    /// minimised.
    pub fn rebuild<D, T, W>(&mut self, device: &D, targets: &mut T, window: &mut W) -> EngineResult<bool>
    where
        D: PresentDevice,
        T: RenderTargets,
        W: WindowEvents + ?Sized,
    {
        loop {
            let mut size = window.framebuffer_size();
            if size.is_zero_area() {
                info!("framebuffer is 0x0, waiting for the window to be restored");
            }
            while size.is_zero_area() {
                if !window.is_running() {
                    return Ok(false);
                }
                window.wait_events();
                size = window.framebuffer_size();
            }

            device.wait_idle()?;
            self.teardown(device, targets);
            match self.build(device, targets, size) {
                Ok(()) => return Ok(true),
                // The window has area but the surface does not yet.
                Err(EngineError::ZeroExtent) => {
                    debug!("surface extent still 0x0 at {}x{}", size.width, size.height);
                    if !window.is_running() {
                        return Ok(false);
                    }
                    window.wait_events();
                }
                Err(e) => return Err(e),
            }
        }
    }
}
