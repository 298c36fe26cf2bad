// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;
use std::path::Path;

use ash::util::read_spv;
use ash::vk;
use ember_render::{RenderError, RenderResult};
use tracing::info;

const SPIRV_MAGIC: u32 = 0x0723_0203;

static VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/shader.vert.spv"));
static FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/shader.frag.spv"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn file_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "shader.vert",
            ShaderStage::Fragment => "shader.frag",
        }
    }

    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    fn shaderc_kind(self) -> shaderc::ShaderKind {
        match self {
            ShaderStage::Vertex => shaderc::ShaderKind::Vertex,
            ShaderStage::Fragment => shaderc::ShaderKind::Fragment,
        }
    }

    fn embedded_bytes(self) -> &'static [u8] {
        match self {
            ShaderStage::Vertex => VERT_SPV,
            ShaderStage::Fragment => FRAG_SPV,
        }
    }
}

/// GLSL file -> SPIR-V words.
pub fn compile(source_path: &Path, stage: ShaderStage) -> RenderResult<Vec<u32>> {
    let source = std::fs::read_to_string(source_path).map_err(|e| {
        RenderError::ShaderCompile(format!("{}: {e}", source_path.display()))
    })?;
    compile_source(&source, &source_path.display().to_string(), stage)
}

pub fn compile_source(source: &str, name: &str, stage: ShaderStage) -> RenderResult<Vec<u32>> {
    let compiler =
        shaderc::Compiler::new().map_err(|e| RenderError::ShaderCompile(e.to_string()))?;
    let mut opts =
        shaderc::CompileOptions::new().map_err(|e| RenderError::ShaderCompile(e.to_string()))?;
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );

    let artifact = compiler
        .compile_into_spirv(source, stage.shaderc_kind(), name, "main", Some(&opts))
        .map_err(|e| RenderError::ShaderCompile(format!("{name}: {e}")))?;
    Ok(artifact.as_binary().to_vec())
}

/// SPIR-V compiled into the binary by the build script.
pub fn embedded(stage: ShaderStage) -> RenderResult<Vec<u32>> {
    read_spv(&mut Cursor::new(stage.embedded_bytes())).map_err(|e| {
        RenderError::ShaderCompile(format!("embedded {}: {e}", stage.file_name()))
    })
}

/// The two stages the pipeline needs. Loaded once; pipeline rebuilds reuse the words.
#[derive(Clone, Debug, Default)]
pub struct ShaderSet {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderSet {
    pub fn load(dir: Option<&Path>) -> RenderResult<Self> {
        match dir {
            Some(dir) => {
                info!(dir = %dir.display(), "compiling shaders");
                Ok(Self {
                    vertex: compile(&dir.join(ShaderStage::Vertex.file_name()), ShaderStage::Vertex)?,
                    fragment: compile(
                        &dir.join(ShaderStage::Fragment.file_name()),
                        ShaderStage::Fragment,
                    )?,
                })
            }
            None => Ok(Self {
                vertex: embedded(ShaderStage::Vertex)?,
                fragment: embedded(ShaderStage::Fragment)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_shaders_are_spirv() {
        let set = ShaderSet::load(None).unwrap();
        assert_eq!(set.vertex.first(), Some(&SPIRV_MAGIC));
        assert_eq!(set.fragment.first(), Some(&SPIRV_MAGIC));
    }

    #[test]
    fn compiles_shipped_sources_from_disk() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
        let set = ShaderSet::load(Some(&dir)).unwrap();
        assert_eq!(set.vertex.first(), Some(&SPIRV_MAGIC));
        assert_eq!(set.fragment.first(), Some(&SPIRV_MAGIC));
    }

    #[test]
    fn syntax_error_carries_diagnostic() {
        let err = compile_source(
            "#version 450\nvoid main() { oops }",
            "broken.frag",
            ShaderStage::Fragment,
        )
        .unwrap_err();
        match err {
            RenderError::ShaderCompile(msg) => assert!(msg.contains("broken.frag"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_shader_error() {
        let err = compile(Path::new("/nonexistent/shader.vert"), ShaderStage::Vertex).unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile(_)));
    }
}
