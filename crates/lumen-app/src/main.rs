// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use lumen_core::init_tracing;
use lumen_platform::{PlatformWindow, WindowConfig};
use lumen_render::{RenderSettings, Renderer, WindowEvents};
use lumen_render_vk::VkRenderer;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = "lumen.toml")]
    config: PathBuf,
    /// Initial window width, overrides [window].width
    #[arg(long)]
    width: Option<u32>,
    /// Initial window height, overrides [window].height
    #[arg(long)]
    height: Option<u32>,
    /// Enable the Khronos validation layer (true | false)
    #[arg(long)]
    validation: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
struct WindowCfg {
    title: String,
    width: u32,
    height: u32,
    resizable: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let w = WindowConfig::default();
        WindowCfg {
            title: w.title,
            width: w.width,
            height: w.height,
            resizable: w.resizable,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
struct RenderCfg {
    clear_color: [f32; 4],
    validation: bool,
    allow_tearing: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let s = RenderSettings::default();
        RenderCfg {
            clear_color: s.clear_color,
            validation: s.validation,
            allow_tearing: s.allow_tearing,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
struct AppCfg {
    #[serde(default)]
    window: WindowCfg,
    #[serde(default)]
    render: RenderCfg,
}

impl AppCfg {
    fn apply_args(&mut self, args: &Args) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(v) = args.validation {
            self.render.validation = v;
        }
    }

    fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
            resizable: self.window.resizable,
        }
    }

    fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            clear_color: self.render.clear_color,
            validation: self.render.validation,
            allow_tearing: self.render.allow_tearing,
        }
    }
}

fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppCfg>(&s) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("{}: {e}; using defaults", path.display());
                AppCfg::default()
            }
        },
        Err(_) => {
            debug!("no config at {}, using defaults", path.display());
            AppCfg::default()
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = load_cfg(&args.config);
    cfg.apply_args(&args);
    info!("config = {:?}", cfg);

    let mut window = PlatformWindow::new(&cfg.window_config())?;
    let size = window.framebuffer_size();
    let mut renderer = VkRenderer::new(&window, &window, size, cfg.render_settings())?;
    renderer.run(&mut window)?;

    let stats = renderer.stats();
    info!(
        "exiting after {} frames ({} submitted, {} rebuilds)",
        stats.presented, stats.submitted, stats.rebuilds
    );
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
