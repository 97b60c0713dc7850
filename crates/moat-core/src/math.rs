use crate::types::MatrixLayout;
use glam::{Mat4, Vec2, Vec3};

/// Spherical to Cartesian with Y up: `radius * (sinφ cosθ, cosφ, sinφ sinθ)`.
///
/// `theta` is the azimuth around Y, `phi` the polar angle measured from +Y.
pub fn spherical_to_cartesian(radius: f32, theta: f32, phi: f32) -> Vec3 {
    Vec3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.cos(),
        radius * phi.sin() * theta.sin(),
    )
}

/// Wrap a texture-space offset into [0, 1).
pub fn wrap_unit(value: f32) -> f32 {
    let wrapped = value - value.floor();
    // floor() of a tiny negative value can round the result up to exactly 1.0
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Lay a matrix out the way the backend's shaders read it.
pub fn matrix_to_gpu(matrix: Mat4, layout: MatrixLayout) -> [[f32; 4]; 4] {
    match layout {
        MatrixLayout::ColumnMajor => matrix.to_cols_array_2d(),
        MatrixLayout::RowMajor => matrix.transpose().to_cols_array_2d(),
    }
}

/// Texture coordinate of a surface vertex spanning `[-w/2, w/2] x [-d/2, d/2]`,
/// mapped onto `[0, 1]^2` with v increasing toward -z.
pub fn surface_texcoord(position: Vec3, width: f32, depth: f32) -> Vec2 {
    Vec2::new(0.5 + position.x / width, 0.5 - position.z / depth)
}
