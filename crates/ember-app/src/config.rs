// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ember_core::LogLevel;
use ember_platform::WindowConfig;
use ember_render::{PresentModePreference, RendererOptions};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "ember.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let w = WindowConfig::default();
        Self {
            width: w.width,
            height: w.height,
            title: w.title,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModePreference,
    pub validation: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let o = RendererOptions::default();
        Self {
            clear_color: o.clear_color,
            present_mode: o.present_mode,
            validation: o.validation,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AssetsCfg {
    pub texture: Option<PathBuf>,
    pub model: Option<PathBuf>,
    /// GLSL sources compiled at startup instead of the baked-in SPIR-V.
    pub shader_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(default)]
pub struct LogCfg {
    pub level: LogLevel,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub assets: AssetsCfg,
    pub log: LogCfg,
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// An explicitly named file must exist; the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG), false),
        };
        match fs::read_to_string(path) {
            Ok(text) => {
                Self::parse(&text).with_context(|| format!("malformed config {}", path.display()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("cannot read config {}", path.display())),
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            width: self.window.width,
            height: self.window.height,
            title: self.window.title.clone(),
        }
    }

    pub fn renderer_options(&self) -> RendererOptions {
        RendererOptions {
            app_name: self.window.title.clone(),
            clear_color: self.render.clear_color,
            present_mode: self.render.present_mode,
            validation: self.render.validation,
            shader_dir: self.assets.shader_dir.clone(),
        }
    }
}
