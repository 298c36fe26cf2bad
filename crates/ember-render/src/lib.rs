// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ember_math::Vertex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Failure taxonomy shared by every backend.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Missing layer or extension, window handle trouble, failed instance/device creation.
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("no suitable GPU: every device lacks a required queue, extension or feature")]
    NoSuitableDevice,

    #[error("no memory type matches type bits {type_bits:#b} with properties {properties:#x}")]
    MemoryTypeNotFound { type_bits: u32, properties: u32 },

    /// Recoverable: the frame loop rebuilds the swapchain and never surfaces this.
    #[error("presentation surface is out of date")]
    SurfaceOutOfDate,

    #[error("{call} failed with result code {code}")]
    UnexpectedResult { call: &'static str, code: i32 },

    #[error("shader compilation failed:\n{0}")]
    ShaderCompile(String),

    #[error("asset load failed: {0}")]
    AssetLoad(String),
}

impl RenderError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RenderError::SurfaceOutOfDate)
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    #[default]
    Mailbox,
    Fifo,
}

/// Creation-time settings for a renderer. Plain data, every field defaulted.
#[derive(Clone, Debug)]
pub struct RendererOptions {
    pub app_name: String,
    pub clear_color: [f32; 4],
    pub present_mode: PresentModePreference,
    pub validation: bool,
    /// Directory holding `shader.vert` / `shader.frag` to compile at startup.
    /// `None` uses the SPIR-V baked into the binary.
    pub shader_dir: Option<PathBuf>,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            app_name: "Ember".to_owned(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present_mode: PresentModePreference::Mailbox,
            validation: cfg!(debug_assertions),
            shader_dir: None,
        }
    }
}

/// Decoded RGBA8 pixels, row-major, tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Everything the renderer uploads once at startup.
#[derive(Clone, Debug)]
pub struct Scene {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub texture: TextureData,
}

impl Scene {
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// What one call to `render` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// An image reached the present queue. `recreated` reports a swapchain rebuild afterwards.
    Presented { recreated: bool },
    /// Nothing was submitted. `recreated` is false while the surface is zero-sized.
    Skipped { recreated: bool },
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: &RendererOptions,
        scene: &Scene,
    ) -> RenderResult<Self>
    where
        Self: Sized;

    /// Records the new framebuffer size; the swapchain is rebuilt after the next present.
    fn resize(&mut self, size: RenderSize);
    fn render(&mut self) -> RenderResult<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]) -> RenderResult<()>;
    /// Blocks until the GPU has drained all submitted work.
    fn wait_idle(&mut self) -> RenderResult<()>;
}
