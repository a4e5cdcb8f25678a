// SPDX-License-Identifier: CEPL-1.0
//! End-to-end runs against a real GPU and display.
//!
//! All tests require a GPU and are marked with #[ignore].
//! Run with: cargo test -p lumen-render-vk --test gpu_smoke -- --ignored --test-threads=1

use lumen_platform::{PlatformWindow, WindowConfig};
use lumen_render::{RenderSize, RenderSettings, Renderer, WindowEvents};
use lumen_render_vk::VkRenderer;

/// Closes itself after a fixed number of frames.
struct Bounded {
    inner: PlatformWindow,
    frames: usize,
}

impl WindowEvents for Bounded {
    fn pump_events(&mut self) {
        self.inner.pump_events();
        self.frames = self.frames.saturating_sub(1);
    }

    fn wait_events(&mut self) {
        self.inner.wait_events();
    }

    fn is_running(&self) -> bool {
        self.frames > 0 && self.inner.is_running()
    }

    fn resized(&self) -> bool {
        self.inner.resized()
    }

    fn clear_resized(&mut self) {
        self.inner.clear_resized();
    }

    fn framebuffer_size(&self) -> RenderSize {
        self.inner.framebuffer_size()
    }
}

fn open(frames: usize) -> Bounded {
    let cfg = WindowConfig {
        title: "lumen smoke test".into(),
        ..Default::default()
    };
    Bounded {
        inner: PlatformWindow::new(&cfg).unwrap(),
        frames,
    }
}

#[test]
#[ignore] // Requires GPU
fn presents_a_few_hundred_frames() {
    let mut window = open(300);
    let size = window.framebuffer_size();
    let mut renderer =
        VkRenderer::new(&window.inner, &window.inner, size, RenderSettings::default()).unwrap();
    renderer.run(&mut window).unwrap();

    let stats = renderer.stats();
    assert!(stats.presented > 0);
    assert!(stats.submitted >= stats.presented);
}

#[test]
#[ignore] // Requires GPU
fn clear_color_can_change_between_runs() {
    let mut window = open(30);
    let size = window.framebuffer_size();
    let settings = RenderSettings {
        validation: false,
        ..Default::default()
    };
    let mut renderer = VkRenderer::new(&window.inner, &window.inner, size, settings).unwrap();
    renderer.set_clear_color([0.2, 0.3, 0.4, 1.0]);
    renderer.run(&mut window).unwrap();
    assert!(!renderer.validation());
}
