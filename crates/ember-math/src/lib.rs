// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use bytemuck::{Pod, Zeroable};
pub use glam::{Mat4, Vec2, Vec3};

/// Interleaved vertex as the graphics pipeline consumes it (binding 0).
///   - location 0: pos   (3 x f32)
///   - location 1: color (3 x f32)
///   - location 2: uv    (2 x f32)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
    pub const COLOR_OFFSET: u32 = std::mem::size_of::<[f32; 3]>() as u32;
    pub const UV_OFFSET: u32 = 2 * std::mem::size_of::<[f32; 3]>() as u32;

    pub const fn new(pos: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self { pos, color, uv }
    }
}

/// Uniform block at set 0, binding 0. std140 compatible: three column-major mat4.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Transforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl Default for Transforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

pub const SPIN_DEGREES_PER_SEC: f32 = 90.0;
pub const CAMERA_EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 10.0;

impl Transforms {
    /// Model spinning around +Z, camera at (2,2,2) looking at the origin with +Z up.
    /// Projection is flipped in Y for Vulkan clip space.
    pub fn spinning(elapsed_secs: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z((elapsed_secs * SPIN_DEGREES_PER_SEC).to_radians());
        let view = Mat4::look_at_rh(CAMERA_EYE, Vec3::ZERO, Vec3::Z);
        let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
        proj.y_axis.y *= -1.0;
        Self { model, view, proj }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Width over height, or 1.0 for a degenerate extent.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn approx(a: Vec4, b: Vec4) -> bool {
        (a - b).abs().max_element() < 1e-4
    }

    #[test]
    fn layouts_match_shader_interface() {
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(Vertex::COLOR_OFFSET, 12);
        assert_eq!(Vertex::UV_OFFSET, 24);
        assert_eq!(std::mem::size_of::<Transforms>(), 192);
    }

    #[test]
    fn model_is_identity_at_start() {
        let t = Transforms::spinning(0.0, 1.0);
        assert_eq!(t.model, Mat4::IDENTITY);
    }

    #[test]
    fn model_turns_quarter_per_second() {
        let t = Transforms::spinning(1.0, 1.0);
        let x = t.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!(approx(x, Vec4::new(0.0, 1.0, 0.0, 1.0)));
    }

    #[test]
    fn view_moves_eye_to_origin() {
        let t = Transforms::spinning(0.0, 1.0);
        let eye = t.view * CAMERA_EYE.extend(1.0);
        assert!(approx(eye, Vec4::new(0.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn projection_is_flipped_for_vulkan() {
        let t = Transforms::spinning(0.0, 16.0 / 9.0);
        assert!(t.proj.y_axis.y < 0.0);
        assert!(t.proj.x_axis.x > 0.0);
    }

    #[test]
    fn aspect_guards_zero_extent() {
        assert_eq!(aspect_ratio(800, 600), 800.0 / 600.0);
        assert_eq!(aspect_ratio(800, 0), 1.0);
    }

    #[test]
    fn transforms_serialize_to_192_bytes() {
        assert_eq!(Transforms::default().as_bytes().len(), 192);
    }
}
