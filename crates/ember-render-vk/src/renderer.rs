// SPDX-License-Identifier: CEPL-1.0
use std::time::Instant;

use ember_render::{
    FrameOutcome, RenderResult, RenderSize, Renderer, RendererOptions, Scene,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use crate::context::RenderContext;
use crate::frame::{FrameController, FrameInput};
use crate::gpu::Gpu;
use crate::resources::StaticResources;
use crate::shader::ShaderSet;
use crate::swapchain::{ChainSettings, SwapchainResources};
use crate::vulkan::VulkanGpu;

pub struct VkRenderer {
    frames: FrameController,
    chain: SwapchainResources,
    statics: StaticResources,
    settings: ChainSettings,
    resized: bool,
    started: Instant,
    // last: owns the device every other field was created from
    ctx: RenderContext,
}

impl VkRenderer {
    /// Builds everything above the device seam on an already opened `Gpu`.
    pub fn with_gpu(
        gpu: Box<dyn Gpu>,
        size: RenderSize,
        options: &RendererOptions,
        scene: &Scene,
    ) -> RenderResult<Self> {
        let shaders = ShaderSet::load(options.shader_dir.as_deref())?;
        let mut ctx = RenderContext::new(gpu)?;
        let settings = ChainSettings {
            framebuffer_size: size,
            present_mode: options.present_mode,
            clear_color: options.clear_color,
        };

        let mut statics = StaticResources::create(&mut ctx, scene, shaders)?;
        let mut chain = match SwapchainResources::create(&mut ctx, &statics, &settings) {
            Ok(chain) => chain,
            Err(e) => {
                statics.destroy(&mut ctx);
                return Err(e);
            }
        };
        let frames = match FrameController::new(&mut ctx, chain.image_count()) {
            Ok(frames) => frames,
            Err(e) => {
                chain.destroy(&mut ctx);
                statics.destroy(&mut ctx);
                return Err(e);
            }
        };

        info!(
            width = size.width,
            height = size.height,
            images = chain.image_count(),
            "renderer ready"
        );
        Ok(Self {
            frames,
            chain,
            statics,
            settings,
            resized: false,
            started: Instant::now(),
            ctx,
        })
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: &RendererOptions,
        scene: &Scene,
    ) -> RenderResult<Self> {
        let gpu = VulkanGpu::new(window, display, options)?;
        Self::with_gpu(Box::new(gpu), size, options, scene)
    }

    fn resize(&mut self, size: RenderSize) {
        if size != self.settings.framebuffer_size {
            debug!(width = size.width, height = size.height, "framebuffer resized");
        }
        self.settings.framebuffer_size = size;
        self.resized = true;
    }

    fn render(&mut self) -> RenderResult<FrameOutcome> {
        // minimized: nothing to draw into
        if self.settings.framebuffer_size.is_zero() {
            return Ok(FrameOutcome::Skipped { recreated: false });
        }
        let input = FrameInput {
            elapsed_secs: self.started.elapsed().as_secs_f32(),
            resized: self.resized,
        };
        let outcome = self.frames.draw_frame(
            &mut self.ctx,
            &mut self.chain,
            &self.statics,
            &self.settings,
            input,
        )?;
        // a deferred rebuild is remembered by the frame controller
        self.resized = false;
        Ok(outcome)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) -> RenderResult<()> {
        self.settings.clear_color = rgba;
        self.ctx.gpu.device_wait_idle()?;
        self.chain.rerecord(&mut self.ctx, &self.statics, rgba)?;
        debug!(?rgba, "clear color changed");
        Ok(())
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        self.ctx.gpu.device_wait_idle()
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.gpu.device_wait_idle() {
            warn!(error = %e, "device did not go idle before teardown");
        }
        self.chain.destroy(&mut self.ctx);
        self.statics.destroy(&mut self.ctx);
        self.frames.destroy(&mut self.ctx);
        debug!("renderer destroyed");
    }
}
