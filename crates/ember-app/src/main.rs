// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use ember_core::{init_tracing, LogLevel};
use ember_platform::Window;
use ember_render::{FrameOutcome, RenderSize, Renderer};
use ember_render_vk::VkRenderer;
use tracing::{debug, info};

mod config;

use config::AppCfg;

/// How long to sleep in the event queue while the window is minimized.
const ICONIFIED_WAIT: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; `ember.toml` in the working directory when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable the Khronos validation layer and debug messenger
    #[arg(long)]
    validation: bool,

    /// PNG or JPEG texture for the mesh
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Wavefront OBJ to draw instead of the built-in quad
    #[arg(long)]
    model: Option<PathBuf>,

    /// trace | debug | info | warn | error
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Args {
    fn apply(&self, cfg: &mut AppCfg) {
        if self.validation {
            cfg.render.validation = true;
        }
        if let Some(t) = &self.texture {
            cfg.assets.texture = Some(t.clone());
        }
        if let Some(m) = &self.model {
            cfg.assets.model = Some(m.clone());
        }
        if let Some(level) = self.log_level {
            cfg.log.level = level;
        }
    }
}

fn run(cfg: &AppCfg) -> Result<()> {
    let scene = ember_assets::load_scene(cfg.assets.model.as_deref(), cfg.assets.texture.as_deref())
        .context("loading assets")?;

    let pending_resize = Rc::new(Cell::new(None::<RenderSize>));
    let sink = pending_resize.clone();
    let mut window = Window::create(
        cfg.window_config(),
        Some(Box::new(move |size| sink.set(Some(size)))),
    )
    .context("creating window")?;

    let mut renderer = VkRenderer::new(
        &window,
        &window,
        window.framebuffer_size(),
        &cfg.renderer_options(),
        &scene,
    )
    .context("initializing Vulkan renderer")?;

    let mut frames = 0u32;
    let mut last_fps = Instant::now();
    while !window.should_close() {
        window.poll_events();
        if let Some(size) = pending_resize.take() {
            renderer.resize(size);
        }
        if window.iconified() {
            window.wait_events(ICONIFIED_WAIT);
            continue;
        }

        match renderer.render().context("rendering frame")? {
            FrameOutcome::Presented { recreated } => {
                frames = frames.saturating_add(1);
                if recreated {
                    debug!("swapchain rebuilt after present");
                }
            }
            FrameOutcome::Skipped { recreated } => {
                debug!(recreated, "frame skipped");
            }
        }

        let now = Instant::now();
        if now.duration_since(last_fps).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", frames);
            frames = 0;
            last_fps = now;
        }
    }

    // GPU must be done with everything before the renderer tears it down
    renderer.wait_idle().context("waiting for device idle")?;
    drop(renderer);
    window.destroy();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = AppCfg::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    init_tracing(cfg.log.level);
    info!(
        width = cfg.window.width,
        height = cfg.window.height,
        present_mode = ?cfg.render.present_mode,
        validation = cfg.render.validation,
        "starting"
    );
    run(&cfg)
}
