// SPDX-License-Identifier: CEPL-1.0
//! winit window driven by pumping, so the presentation loop owns the frame
//! cadence instead of the event loop.

use std::time::Duration;

use anyhow::{Context, Result};
use lumen_render::{RenderSize, WindowEvents};
use tracing::{debug, info};

pub use winit;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use winit::window::{Window, WindowId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan hello triangle".into(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Flags the event handler raises for the loop to consume.
struct WindowState {
    window: Window,
    running: bool,
    resized: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if window_id != self.window.id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.running = false;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{}", size.width, size.height);
                self.resized = true;
            }
            _ => {}
        }
    }
}

pub struct PlatformWindow {
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl PlatformWindow {
    #[allow(deprecated)]
    pub fn new(cfg: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("creating event loop")?;
        let attrs = Window::default_attributes()
            .with_title(cfg.title.clone())
            .with_inner_size(PhysicalSize::new(cfg.width, cfg.height))
            .with_resizable(cfg.resizable);
        let window = event_loop.create_window(attrs).context("creating window")?;
        info!("window '{}' {}x{}", cfg.title, cfg.width, cfg.height);

        Ok(Self {
            state: WindowState {
                window,
                running: true,
                resized: false,
            },
            event_loop,
        })
    }

    pub fn window(&self) -> &Window {
        &self.state.window
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("event loop exited with {code}");
            self.state.running = false;
        }
    }
}

impl WindowEvents for PlatformWindow {
    fn pump_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn is_running(&self) -> bool {
        self.state.running
    }

    fn resized(&self) -> bool {
        self.state.resized
    }

    fn clear_resized(&mut self) {
        self.state.resized = false;
    }

    fn framebuffer_size(&self) -> RenderSize {
        let size = self.state.window.inner_size();
        RenderSize::new(size.width, size.height)
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.state.window.window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.state.window.display_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_matches_classic_triangle_setup() {
        let cfg = WindowConfig::default();
        assert_eq!((cfg.width, cfg.height), (800, 600));
        assert_eq!(cfg.title, "Vulkan hello triangle");
        assert!(cfg.resizable);
    }
}
