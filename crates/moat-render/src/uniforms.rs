use bytemuck::Zeroable;
use glam::{Mat4, Vec3, Vec4};
use moat_core::constants::MAX_LIGHTS;
use moat_core::math::matrix_to_gpu;
use moat_core::MatrixLayout;
use moat_scene::{Material, RenderItem};

/// Per-item constants. Must match ObjectConstants in scene.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectConstants {
    pub world: [[f32; 4]; 4],
    pub tex_transform: [[f32; 4]; 4],
}

impl ObjectConstants {
    pub fn from_item(item: &RenderItem, layout: MatrixLayout) -> Self {
        Self {
            world: matrix_to_gpu(item.world(), layout),
            tex_transform: matrix_to_gpu(item.tex_transform(), layout),
        }
    }
}

/// Per-material constants. Must match MaterialConstants in scene.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: [f32; 4],
    pub fresnel_r0: [f32; 3],
    pub roughness: f32,
    pub transform: [[f32; 4]; 4],
}

impl MaterialConstants {
    pub fn from_material(material: &Material, layout: MatrixLayout) -> Self {
        Self {
            diffuse_albedo: material.diffuse_albedo().to_array(),
            fresnel_r0: material.fresnel_r0().to_array(),
            roughness: material.roughness(),
            transform: matrix_to_gpu(material.transform(), layout),
        }
    }
}

/// Light slot (48 bytes). Must match Light in scene.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    pub strength: [f32; 3],
    pub falloff_start: f32,
    pub direction: [f32; 3],
    pub falloff_end: f32,
    pub position: [f32; 3],
    pub spot_power: f32,
}

impl Default for GpuLight {
    /// An unlit slot with sensible falloff so enabling it only needs a strength.
    fn default() -> Self {
        Self {
            strength: [0.0; 3],
            falloff_start: 1.0,
            direction: [0.0, -1.0, 0.0],
            falloff_end: 10.0,
            position: [0.0; 3],
            spot_power: 64.0,
        }
    }
}

impl GpuLight {
    pub fn point(position: Vec3, strength: Vec3, falloff_start: f32, falloff_end: f32) -> Self {
        Self {
            strength: strength.to_array(),
            falloff_start,
            position: position.to_array(),
            falloff_end,
            ..Self::default()
        }
    }
}

/// Per-frame constants. Must match PassConstants in scene.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassConstants {
    pub view: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub eye_position: [f32; 3],
    pub _pad0: f32,
    pub render_target_size: [f32; 2],
    pub inv_render_target_size: [f32; 2],
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: [f32; 4],
    pub fog_color: [f32; 4],
    pub fog_start: f32,
    pub fog_range: f32,
    pub light_count: u32,
    pub _pad1: f32,
    pub lights: [GpuLight; MAX_LIGHTS],
}

/// Fog parameters. The colour is also the frame clear colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub color: Vec4,
    pub start: f32,
    pub range: f32,
}

/// CPU-side inputs to [`PassConstants`].
#[derive(Debug, Clone)]
pub struct PassFrame<'a> {
    pub view: Mat4,
    pub proj: Mat4,
    pub eye: Vec3,
    pub render_target: (u32, u32),
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    pub fog: Fog,
    pub lights: &'a [GpuLight],
}

impl PassConstants {
    /// Derive inverse and combined matrices and pack everything for upload.
    /// Lights past [`MAX_LIGHTS`] are dropped.
    pub fn from_frame(frame: &PassFrame<'_>, layout: MatrixLayout) -> Self {
        let view_proj = frame.proj * frame.view;
        let (w, h) = (frame.render_target.0.max(1) as f32, frame.render_target.1.max(1) as f32);

        let mut lights = [GpuLight::zeroed(); MAX_LIGHTS];
        let count = frame.lights.len().min(MAX_LIGHTS);
        if frame.lights.len() > MAX_LIGHTS {
            log::warn!(
                "PassConstants: {} lights supplied, only {} fit",
                frame.lights.len(),
                MAX_LIGHTS
            );
        }
        lights[..count].copy_from_slice(&frame.lights[..count]);

        Self {
            view: matrix_to_gpu(frame.view, layout),
            inv_view: matrix_to_gpu(frame.view.inverse(), layout),
            proj: matrix_to_gpu(frame.proj, layout),
            inv_proj: matrix_to_gpu(frame.proj.inverse(), layout),
            view_proj: matrix_to_gpu(view_proj, layout),
            inv_view_proj: matrix_to_gpu(view_proj.inverse(), layout),
            eye_position: frame.eye.to_array(),
            _pad0: 0.0,
            render_target_size: [w, h],
            inv_render_target_size: [1.0 / w, 1.0 / h],
            near_z: frame.near_z,
            far_z: frame.far_z,
            total_time: frame.total_time,
            delta_time: frame.delta_time,
            ambient_light: frame.ambient_light.to_array(),
            fog_color: frame.fog.color.to_array(),
            fog_start: frame.fog.start,
            fog_range: frame.fog.range,
            light_count: count as u32,
            _pad1: 0.0,
            lights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 128);
        assert_eq!(std::mem::size_of::<MaterialConstants>(), 96);
        assert_eq!(std::mem::size_of::<GpuLight>(), 48);
        assert_eq!(
            std::mem::size_of::<PassConstants>(),
            6 * 64 + 6 * 16 + MAX_LIGHTS * 48
        );
    }

    #[test]
    fn test_pass_inverses() {
        let view = Mat4::look_at_lh(Vec3::new(0.0, 5.0, -10.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_lh(std::f32::consts::FRAC_PI_4, 4.0 / 3.0, 1.0, 1000.0);
        let lights = [GpuLight::point(Vec3::Y, Vec3::X, 1.0, 10.0)];
        let frame = PassFrame {
            view,
            proj,
            eye: Vec3::new(0.0, 5.0, -10.0),
            render_target: (800, 600),
            near_z: 1.0,
            far_z: 1000.0,
            total_time: 2.0,
            delta_time: 0.016,
            ambient_light: Vec4::new(0.25, 0.25, 0.35, 1.0),
            fog: Fog {
                color: Vec4::new(0.7, 0.7, 0.7, 1.0),
                start: 5.0,
                range: 150.0,
            },
            lights: &lights,
        };
        let pass = PassConstants::from_frame(&frame, MatrixLayout::ColumnMajor);
        let vp = Mat4::from_cols_array_2d(&pass.view_proj);
        let inv = Mat4::from_cols_array_2d(&pass.inv_view_proj);
        assert!((vp * inv).abs_diff_eq(Mat4::IDENTITY, 1e-3));
        assert_eq!(pass.render_target_size, [800.0, 600.0]);
        assert_eq!(pass.light_count, 1);
        assert_eq!(pass.lights[0].strength, [1.0, 0.0, 0.0]);
        assert_eq!(pass.lights[1].strength, [0.0; 3]);
    }

    #[test]
    fn test_row_major_transposes_world() {
        use moat_scene::{Handle, MeshRegion, Registry};
        let mut mats: Registry<Material> = Registry::new("material");
        let def = moat_scene::MaterialDef {
            name: "m".into(),
            texture: "t".into(),
            diffuse_albedo: (1.0, 0.5, 0.25, 1.0),
            fresnel_r0: (0.02, 0.02, 0.02),
            roughness: 0.3,
        };
        let m: Handle<Material> = mats
            .insert("m", Material::new(&def, moat_core::TextureHandle(0)))
            .expect("insert");
        let mut meshes: Registry<moat_scene::MeshGeometry> = Registry::new("mesh");
        let mesh = meshes
            .insert(
                "g",
                moat_scene::MeshGeometry::new(
                    moat_scene::VertexSource::FrameWaves,
                    moat_core::BufferHandle(0),
                    Vec::new(),
                ),
            )
            .expect("insert");
        let item = RenderItem::new(mesh, MeshRegion::default(), m, moat_core::RenderLayer::Opaque)
            .with_world(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));

        let cols = ObjectConstants::from_item(&item, MatrixLayout::ColumnMajor);
        let rows = ObjectConstants::from_item(&item, MatrixLayout::RowMajor);
        assert_eq!(cols.world[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(rows.world[0][3], 1.0);

        let mc = MaterialConstants::from_material(mats.get(m).expect("live"), MatrixLayout::ColumnMajor);
        assert_eq!(mc.diffuse_albedo, [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(mc.roughness, 0.3);
    }
}
