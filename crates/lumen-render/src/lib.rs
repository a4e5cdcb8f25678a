// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Framebuffer size in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True while the window is minimised (or otherwise has no drawable area).
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Knobs fixed at renderer construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    /// Enable the Khronos validation layer and route its messages into tracing.
    pub validation: bool,
    /// Let the present-mode choice fall back to IMMEDIATE when MAILBOX is missing.
    pub allow_tearing: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: cfg!(debug_assertions),
            allow_tearing: false,
        }
    }
}

/// What the presentation loop needs from the window system.
///
/// The loop calls `pump_events` once per iteration and stops once
/// `is_running` turns false. The resize flag stays raised until the loop
/// has rebuilt its chain and calls `clear_resized`.
pub trait WindowEvents {
    /// Drain pending events without blocking.
    fn pump_events(&mut self);
    /// Block until at least one event arrives.
    fn wait_events(&mut self);
    fn is_running(&self) -> bool;
    fn resized(&self) -> bool;
    fn clear_resized(&mut self);
    fn framebuffer_size(&self) -> RenderSize;
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Drive frames until the window stops running, then wait for the GPU to
    /// go idle.
    fn run(&mut self, window: &mut dyn WindowEvents) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}
