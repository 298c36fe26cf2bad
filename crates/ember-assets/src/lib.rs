// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Startup asset loading: RGBA8 textures through `image`, OBJ meshes through `tobj`,
//! and the built-in quad/checkerboard used when nothing is configured.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use ember_math::Vertex;
use ember_render::{RenderError, Scene, TextureData};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("cannot decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot load model {path}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("model {0} contains no triangles")]
    EmptyModel(PathBuf),
}

impl From<AssetError> for RenderError {
    fn from(e: AssetError) -> Self {
        RenderError::AssetLoad(e.to_string())
    }
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Vertex and index arrays ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// The coloured, textured quad drawn when no model is configured.
pub fn builtin_quad() -> Mesh {
    Mesh {
        vertices: vec![
            Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], WHITE, [1.0, 1.0]),
        ],
        indices: vec![0, 1, 2, 2, 3, 0],
    }
}

/// `size` x `size` pixels of alternating light and dark `cell`-wide squares.
pub fn checkerboard(size: u32, cell: u32) -> TextureData {
    let cell = cell.max(1);
    let mut rgba = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let v = if light { 0xE0 } else { 0x30 };
            rgba.extend_from_slice(&[v, v, v, 0xFF]);
        }
    }
    TextureData {
        width: size,
        height: size,
        rgba,
    }
}

fn to_texture(img: image::DynamicImage) -> TextureData {
    let rgba = img.into_rgba8();
    TextureData {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    }
}

/// Decodes any PNG or JPEG file into tightly packed RGBA8.
pub fn load_texture(path: &Path) -> AssetResult<TextureData> {
    let img = image::open(path).map_err(|source| AssetError::Image {
        path: path.to_owned(),
        source,
    })?;
    let tex = to_texture(img);
    info!(path = %path.display(), width = tex.width, height = tex.height, "texture loaded");
    Ok(tex)
}

pub fn decode_texture(bytes: &[u8]) -> AssetResult<TextureData> {
    image::load_from_memory(bytes)
        .map(to_texture)
        .map_err(|source| AssetError::Image {
            path: PathBuf::from("<memory>"),
            source,
        })
}

fn obj_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

/// Flattens every model in the file into one mesh. Missing texcoords become (0,0),
/// missing vertex colors white; V is flipped for Vulkan's top-left texture origin.
fn flatten(models: &[tobj::Model]) -> Mesh {
    let mut mesh = Mesh::default();
    for model in models {
        let m = &model.mesh;
        let base = mesh.vertices.len() as u32;
        for (i, p) in m.positions.chunks_exact(3).enumerate() {
            let uv = m
                .texcoords
                .get(i * 2..i * 2 + 2)
                .map_or([0.0, 0.0], |t| [t[0], 1.0 - t[1]]);
            let color = m
                .vertex_color
                .get(i * 3..i * 3 + 3)
                .map_or(WHITE, |c| [c[0], c[1], c[2]]);
            mesh.vertices.push(Vertex::new([p[0], p[1], p[2]], color, uv));
        }
        mesh.indices.extend(m.indices.iter().map(|i| base + i));
    }
    mesh
}

pub fn load_obj(path: &Path) -> AssetResult<Mesh> {
    let (models, _materials) =
        tobj::load_obj(path, &obj_options()).map_err(|source| AssetError::Model {
            path: path.to_owned(),
            source,
        })?;
    let mesh = flatten(&models);
    if mesh.indices.is_empty() {
        return Err(AssetError::EmptyModel(path.to_owned()));
    }
    info!(
        path = %path.display(),
        models = models.len(),
        vertices = mesh.vertices.len(),
        indices = mesh.indices.len(),
        "model loaded"
    );
    Ok(mesh)
}

/// Same as `load_obj` for an in-memory OBJ. Material libraries are ignored.
pub fn parse_obj(reader: &mut impl BufRead) -> AssetResult<Mesh> {
    let origin = PathBuf::from("<memory>");
    let (models, _materials) =
        tobj::load_obj_buf(reader, &obj_options(), |_| Err(tobj::LoadError::OpenFileFailed))
            .map_err(|source| AssetError::Model {
                path: origin.clone(),
                source,
            })?;
    let mesh = flatten(&models);
    if mesh.indices.is_empty() {
        return Err(AssetError::EmptyModel(origin));
    }
    Ok(mesh)
}

/// Geometry and texture for the renderer, falling back to the built-ins for
/// whatever is not given.
pub fn load_scene(model: Option<&Path>, texture: Option<&Path>) -> AssetResult<Scene> {
    let mesh = match model {
        Some(path) => load_obj(path)?,
        None => builtin_quad(),
    };
    let texture = match texture {
        Some(path) => load_texture(path)?,
        None => checkerboard(256, 32),
    };
    Ok(Scene {
        vertices: mesh.vertices,
        indices: mesh.indices,
        texture,
    })
}
