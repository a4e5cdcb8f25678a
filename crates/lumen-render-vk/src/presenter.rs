// SPDX-License-Identifier: CEPL-1.0
//! The per-frame loop: wait → acquire → submit → present → advance.

use ash::vk;
use lumen_render::{RenderSize, WindowEvents};
use tracing::{debug, info, warn};

use crate::backend::{PresentDevice, RenderTargets};
use crate::commands::CommandSubmitter;
use crate::device::QueueFamilies;
use crate::error::{ChainStatus, EngineError, EngineResult};
use crate::swapchain::SwapchainManager;
use crate::sync::{FrameSlot, FrameSynchronizer, MAX_FRAMES_IN_FLIGHT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Ready,
    Recreating,
}

/// Why the chain was rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildCause {
    AcquireOutOfDate,
    AcquireSuboptimal,
    PresentOutOfDate,
    PresentSuboptimal,
    Resized,
    /// No chain yet; the window started minimised.
    Missing,
}

/// Result of one loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Presented, then rebuilt the chain.
    PresentedAndRebuilt(RebuildCause),
    /// Nothing reached the screen; the chain was rebuilt instead.
    Rebuilt(RebuildCause),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub submitted: u64,
    pub presented: u64,
    pub rebuilds: u64,
}

pub struct Presenter<D: PresentDevice, T: RenderTargets> {
    // Field order is drop order: chain-scoped state first, device last.
    swapchain: SwapchainManager,
    sync: FrameSynchronizer,
    commands: CommandSubmitter,
    targets: T,
    device: D,
    state: LoopState,
    frame_index: usize,
    stats: FrameStats,
}

impl<D: PresentDevice, T: RenderTargets> Presenter<D, T> {
    /// Build the initial chain and the frame ring.
    pub fn new(
        device: D,
        targets: T,
        families: QueueFamilies,
        allow_tearing: bool,
        framebuffer: RenderSize,
    ) -> EngineResult<Self> {
        let mut presenter = Self {
            swapchain: SwapchainManager::new(families, allow_tearing),
            sync: FrameSynchronizer::default(),
            commands: CommandSubmitter::default(),
            targets,
            device,
            state: LoopState::Ready,
            frame_index: 0,
            stats: FrameStats::default(),
        };
        presenter.sync = FrameSynchronizer::new(&presenter.device, MAX_FRAMES_IN_FLIGHT)?;
        match presenter
            .swapchain
            .build(&presenter.device, &mut presenter.targets, framebuffer)
        {
            Ok(()) => {}
            // Started minimised: the first frame builds through the rebuild wait.
            Err(EngineError::ZeroExtent) => info!("initial chain deferred until the window has area"),
            Err(e) => return Err(e),
        }
        presenter
            .commands
            .resize(&presenter.device, presenter.swapchain.image_count())?;
        Ok(presenter)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// The slot the next frame will use.
    pub fn frame_slot(&self) -> FrameSlot {
        self.sync.acquire_slot(self.frame_index)
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn targets(&self) -> &T {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut T {
        &mut self.targets
    }

    /// Run until the window stops running, then wait for the GPU to finish.
    pub fn run<W: WindowEvents + ?Sized>(&mut self, window: &mut W) -> EngineResult<()> {
        info!("presentation loop started");
        while window.is_running() {
            window.pump_events();
            if !window.is_running() {
                break;
            }
            self.draw_frame(window)?;
        }
        self.device.wait_idle()?;
        info!(
            "presentation loop finished: {} frames presented, {} rebuilds",
            self.stats.presented, self.stats.rebuilds
        );
        Ok(())
    }

    /// One iteration of the loop.
    pub fn draw_frame<W: WindowEvents + ?Sized>(&mut self, window: &mut W) -> EngineResult<FrameOutcome> {
        let slot = self.sync.acquire_slot(self.frame_index);

        // Backpressure: at most MAX_FRAMES_IN_FLIGHT frames are queued.
        self.device.wait_for_fence(slot.in_flight)?;

        let Some(swapchain) = self.swapchain.state().handle() else {
            self.recreate(window, RebuildCause::Missing)?;
            return Ok(FrameOutcome::Rebuilt(RebuildCause::Missing));
        };

        let (image_index, acquired) =
            match self.device.acquire_next_image(swapchain, slot.image_available) {
                Ok(pair) => pair,
                Err(EngineError::OutOfDate) => {
                    self.recreate(window, RebuildCause::AcquireOutOfDate)?;
                    return Ok(FrameOutcome::Rebuilt(RebuildCause::AcquireOutOfDate));
                }
                Err(e) => return Err(e),
            };

        let extent = self.swapchain.state().extent();
        self.commands
            .submit(&self.device, &self.targets, image_index, extent, &slot)?;
        self.stats.submitted += 1;

        let presented = match self.device.present(swapchain, image_index, slot.render_finished) {
            Ok(status) => {
                self.stats.presented += 1;
                status
            }
            Err(EngineError::OutOfDate) => {
                // Nothing reached the screen, but the slot's fence was submitted.
                self.frame_index = self.sync.advance(self.frame_index);
                self.recreate(window, RebuildCause::PresentOutOfDate)?;
                return Ok(FrameOutcome::Rebuilt(RebuildCause::PresentOutOfDate));
            }
            Err(e) => return Err(e),
        };

        let cause = if presented == ChainStatus::Suboptimal {
            Some(RebuildCause::PresentSuboptimal)
        } else if acquired == ChainStatus::Suboptimal {
            Some(RebuildCause::AcquireSuboptimal)
        } else if window.resized() {
            Some(RebuildCause::Resized)
        } else {
            None
        };

        self.frame_index = self.sync.advance(self.frame_index);

        match cause {
            Some(cause) => {
                self.recreate(window, cause)?;
                Ok(FrameOutcome::PresentedAndRebuilt(cause))
            }
            None => Ok(FrameOutcome::Presented),
        }
    }

    fn recreate<W: WindowEvents + ?Sized>(&mut self, window: &mut W, cause: RebuildCause) -> EngineResult<()> {
        self.state = LoopState::Recreating;
        info!("recreating swapchain ({:?})", cause);

        let rebuilt = self
            .swapchain
            .rebuild(&self.device, &mut self.targets, window)?;
        if rebuilt {
            self.commands
                .resize(&self.device, self.swapchain.image_count())?;
            self.stats.rebuilds += 1;
        } else {
            debug!("window closed while minimised; rebuild skipped");
        }
        window.clear_resized();

        self.state = LoopState::Ready;
        Ok(())
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.state().extent()
    }
}

impl<D: PresentDevice, T: RenderTargets> Drop for Presenter<D, T> {
    fn drop(&mut self) {
        // Nothing below may be destroyed while the GPU can still reference it.
        if let Err(e) = self.device.wait_idle() {
            warn!("wait_idle during teardown: {e}");
        }
        self.sync.destroy(&self.device);
        self.commands.release(&self.device);
        self.swapchain.teardown(&self.device, &mut self.targets);
        debug!("presenter torn down");
    }
}
