// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan presentation engine: device selection, swapchain lifecycle,
//! frame pacing and the acquire/submit/present loop.

use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use lumen_render::{RenderSize, RenderSettings, Renderer, WindowEvents};

pub mod backend;
pub mod bootstrap;
pub mod commands;
pub mod debug;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod presenter;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

pub use backend::{PresentDevice, RenderTargets};
pub use bootstrap::VulkanContext;
pub use error::{ChainStatus, EngineError, EngineResult};
pub use pipeline::FixedPipeline;
pub use presenter::{FrameOutcome, FrameStats, LoopState, Presenter, RebuildCause};
pub use vulkan::AshDevice;

pub struct VkRenderer {
    // Declared first so the device and chain go before the instance.
    presenter: Presenter<AshDevice, FixedPipeline>,
    context: VulkanContext,
}

impl VkRenderer {
    pub fn stats(&self) -> FrameStats {
        self.presenter.stats()
    }

    pub fn validation(&self) -> bool {
        self.context.validation()
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: RenderSettings,
    ) -> Result<Self> {
        let context = VulkanContext::new(window, display, settings.validation)
            .context("creating Vulkan instance and surface")?;

        let selected = unsafe {
            device::pick_physical_device(&context.instance, &context.surface_loader, context.surface)
        }?;
        let logical = context.create_logical_device(selected.handle, selected.queue_families)?;
        let device = AshDevice::new(
            &context,
            selected.handle,
            logical,
            selected.queue_families.graphics,
        )?;
        let targets = device.fixed_pipeline(settings.clear_color);

        let presenter = Presenter::new(
            device,
            targets,
            selected.queue_families,
            settings.allow_tearing,
            size,
        )
        .context("building the initial swapchain")?;

        info!("vk renderer ready on '{}'", selected.name);
        Ok(Self { presenter, context })
    }

    fn run(&mut self, window: &mut dyn WindowEvents) -> Result<()> {
        self.presenter.run(window)?;
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.presenter.targets_mut().set_clear_color(rgba);
    }
}
