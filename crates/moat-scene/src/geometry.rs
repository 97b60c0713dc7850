//! Procedural meshes for the castle scene and the wave-grid index pattern.
//!
//! Shapes are generated around the origin; placement happens through each
//! render item's world matrix. Faces are flat-shaded except the cylinder side
//! and the grids.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use moat_core::constants::MAX_INDEXED_VERTICES;
use moat_core::ConfigError;

use crate::item::MeshRegion;

/// Lit, textured vertex. Must match `VertexInput` in scene.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tex_coord: tex_coord.to_array(),
        }
    }
}

/// Billboard point: centre and world-space size. Must match `SpriteInput` in scene.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 3],
    pub size: [f32; 2],
}

/// CPU-side mesh with 32-bit local indices; narrowed to u16 by [`MeshBuilder`].
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Append a convex planar polygon as a triangle fan with a flat normal.
    /// Corners are given counter-clockwise as seen from the front.
    fn push_polygon(&mut self, corners: &[Vec3], uvs: &[Vec2]) {
        debug_assert_eq!(corners.len(), uvs.len());
        let normal = (corners[1] - corners[0])
            .cross(corners[2] - corners[0])
            .normalize_or_zero();
        let base = self.vertices.len() as u32;
        for (p, uv) in corners.iter().zip(uvs) {
            self.vertices.push(Vertex::new(*p, normal, *uv));
        }
        for i in 1..corners.len() as u32 - 1 {
            self.indices.extend_from_slice(&[base, base + i, base + i + 1]);
        }
    }

    fn push_quad(&mut self, a: Vec3, b: Vec3, c: Vec3, d: Vec3) {
        self.push_polygon(
            &[a, b, c, d],
            &[
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 0.0),
            ],
        );
    }

    fn push_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3) {
        self.push_polygon(
            &[a, b, c],
            &[Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0), Vec2::new(0.5, 0.0)],
        );
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Indices for an `rows x cols` vertex grid: two triangles per quad.
fn grid_indices(rows: usize, cols: usize) -> impl Iterator<Item = usize> {
    (0..rows.saturating_sub(1)).flat_map(move |i| {
        (0..cols.saturating_sub(1)).flat_map(move |j| {
            [
                i * cols + j,
                i * cols + j + 1,
                (i + 1) * cols + j,
                (i + 1) * cols + j,
                i * cols + j + 1,
                (i + 1) * cols + j + 1,
            ]
        })
    })
}

/// 16-bit index buffer for the water surface (`rows x cols` vertices).
pub fn wave_grid_indices(rows: usize, cols: usize) -> Result<Vec<u16>, ConfigError> {
    let count = rows * cols;
    if count >= MAX_INDEXED_VERTICES {
        return Err(ConfigError::TooManyVertices(count));
    }
    Ok(grid_indices(rows, cols).map(|i| i as u16).collect())
}

/// Flat grid in the xz-plane, centred on the origin, facing +y.
pub fn create_grid(width: f32, depth: f32, rows: usize, cols: usize) -> MeshData {
    let rows = rows.max(2);
    let cols = cols.max(2);
    let dx = width / (cols - 1) as f32;
    let dz = depth / (rows - 1) as f32;
    let du = 1.0 / (cols - 1) as f32;
    let dv = 1.0 / (rows - 1) as f32;

    let mut mesh = MeshData::default();
    for i in 0..rows {
        let z = 0.5 * depth - i as f32 * dz;
        for j in 0..cols {
            let x = -0.5 * width + j as f32 * dx;
            mesh.vertices.push(Vertex::new(
                Vec3::new(x, 0.0, z),
                Vec3::Y,
                Vec2::new(j as f32 * du, i as f32 * dv),
            ));
        }
    }
    mesh.indices = grid_indices(rows, cols).map(|i| i as u32).collect();
    mesh
}

pub fn create_box(width: f32, height: f32, depth: f32) -> MeshData {
    let (w, h, d) = (0.5 * width, 0.5 * height, 0.5 * depth);
    let p = |x: f32, y: f32, z: f32| Vec3::new(x * w, y * h, z * d);

    let mut mesh = MeshData::default();
    mesh.push_quad(p(-1., -1., 1.), p(1., -1., 1.), p(1., 1., 1.), p(-1., 1., 1.)); // +z
    mesh.push_quad(p(1., -1., -1.), p(-1., -1., -1.), p(-1., 1., -1.), p(1., 1., -1.)); // -z
    mesh.push_quad(p(1., -1., 1.), p(1., -1., -1.), p(1., 1., -1.), p(1., 1., 1.)); // +x
    mesh.push_quad(p(-1., -1., -1.), p(-1., -1., 1.), p(-1., 1., 1.), p(-1., 1., -1.)); // -x
    mesh.push_quad(p(-1., 1., 1.), p(1., 1., 1.), p(1., 1., -1.), p(-1., 1., -1.)); // +y
    mesh.push_quad(p(-1., -1., -1.), p(1., -1., -1.), p(1., -1., 1.), p(-1., -1., 1.)); // -y
    mesh
}

/// Truncated cone along +y, centred on the origin, with capped ends.
pub fn create_cylinder(
    bottom_radius: f32,
    top_radius: f32,
    height: f32,
    slices: usize,
    stacks: usize,
) -> MeshData {
    let slices = slices.max(3);
    let stacks = stacks.max(1);
    let stack_height = height / stacks as f32;
    let radius_step = (top_radius - bottom_radius) / stacks as f32;
    let d_theta = std::f32::consts::TAU / slices as f32;
    let ring = slices + 1;

    let mut mesh = MeshData::default();
    for i in 0..=stacks {
        let y = -0.5 * height + i as f32 * stack_height;
        let r = bottom_radius + i as f32 * radius_step;
        for j in 0..=slices {
            let (s, c) = (j as f32 * d_theta).sin_cos();
            let tangent = Vec3::new(-s, 0.0, c);
            let bitangent = Vec3::new((bottom_radius - top_radius) * c, -height, (bottom_radius - top_radius) * s);
            let normal = tangent.cross(bitangent).normalize_or_zero();
            mesh.vertices.push(Vertex::new(
                Vec3::new(r * c, y, r * s),
                normal,
                Vec2::new(j as f32 / slices as f32, 1.0 - i as f32 / stacks as f32),
            ));
        }
    }
    for i in 0..stacks {
        for j in 0..slices {
            let (a, b) = ((i * ring + j) as u32, ((i + 1) * ring + j) as u32);
            mesh.indices.extend_from_slice(&[a, b, b + 1, a, b + 1, a + 1]);
        }
    }

    for (y, r, normal) in [
        (0.5 * height, top_radius, Vec3::Y),
        (-0.5 * height, bottom_radius, Vec3::NEG_Y),
    ] {
        let center = mesh.vertices.len() as u32;
        mesh.vertices
            .push(Vertex::new(Vec3::new(0.0, y, 0.0), normal, Vec2::splat(0.5)));
        for j in 0..=slices {
            let (s, c) = (j as f32 * d_theta).sin_cos();
            mesh.vertices.push(Vertex::new(
                Vec3::new(r * c, y, r * s),
                normal,
                Vec2::new(0.5 + 0.5 * c, 0.5 + 0.5 * s),
            ));
        }
        for j in 0..slices as u32 {
            let (a, b) = (center + 1 + j, center + 2 + j);
            if normal.y > 0.0 {
                mesh.indices.extend_from_slice(&[center, b, a]);
            } else {
                mesh.indices.extend_from_slice(&[center, a, b]);
            }
        }
    }
    mesh
}

/// Square-based pyramid with its base centred on the origin.
pub fn create_pyramid(base: f32, height: f32) -> MeshData {
    let h = 0.5 * base;
    let apex = Vec3::new(0.0, height, 0.0);
    let corners = [
        Vec3::new(-h, 0.0, h),
        Vec3::new(h, 0.0, h),
        Vec3::new(h, 0.0, -h),
        Vec3::new(-h, 0.0, -h),
    ];
    let mut mesh = MeshData::default();
    for k in 0..4 {
        mesh.push_triangle(corners[k], corners[(k + 1) % 4], apex);
    }
    mesh.push_quad(corners[3], corners[2], corners[1], corners[0]);
    mesh
}

/// Ramp: full `height` at the back (+z edge), sloping to zero at the front.
pub fn create_wedge(width: f32, height: f32, depth: f32) -> MeshData {
    let (w, d) = (0.5 * width, 0.5 * depth);
    let front_l = Vec3::new(-w, 0.0, -d);
    let front_r = Vec3::new(w, 0.0, -d);
    let back_l = Vec3::new(-w, 0.0, d);
    let back_r = Vec3::new(w, 0.0, d);
    let top_l = Vec3::new(-w, height, d);
    let top_r = Vec3::new(w, height, d);

    let mut mesh = MeshData::default();
    mesh.push_quad(front_l, front_r, top_r, top_l); // slope
    mesh.push_quad(back_r, back_l, top_l, top_r); // back
    mesh.push_quad(back_l, back_r, front_r, front_l); // bottom
    mesh.push_triangle(front_r, back_r, top_r);
    mesh.push_triangle(back_l, front_l, top_l);
    mesh
}

/// Two `sides`-gon pyramids joined at their bases: the crystal on the pedestal.
pub fn create_bipyramid(radius: f32, height: f32, sides: usize) -> MeshData {
    let sides = sides.max(3);
    let top = Vec3::new(0.0, 0.5 * height, 0.0);
    let bottom = Vec3::new(0.0, -0.5 * height, 0.0);
    let ring: Vec<Vec3> = (0..sides)
        .map(|k| {
            let (s, c) = (k as f32 * std::f32::consts::TAU / sides as f32).sin_cos();
            Vec3::new(radius * c, 0.0, radius * s)
        })
        .collect();

    let mut mesh = MeshData::default();
    for k in 0..sides {
        let (a, b) = (ring[k], ring[(k + 1) % sides]);
        mesh.push_triangle(b, a, top);
        mesh.push_triangle(a, b, bottom);
    }
    mesh
}

/// Regular `sides`-gon prism standing on the xz-plane. Four sides rotated by
/// 45 degrees give the kite, five the gate.
pub fn create_prism(radius: f32, height: f32, sides: usize, rotation: f32) -> MeshData {
    let sides = sides.max(3);
    let ring: Vec<Vec3> = (0..sides)
        .map(|k| {
            let angle = rotation + k as f32 * std::f32::consts::TAU / sides as f32;
            let (s, c) = angle.sin_cos();
            Vec3::new(radius * c, 0.0, radius * s)
        })
        .collect();
    let up = Vec3::new(0.0, height, 0.0);

    let mut mesh = MeshData::default();
    for k in 0..sides {
        let (a, b) = (ring[k], ring[(k + 1) % sides]);
        mesh.push_quad(b, a, a + up, b + up);
    }
    let uv_of = |p: &Vec3| Vec2::new(0.5 + 0.5 * p.x / radius, 0.5 - 0.5 * p.z / radius);
    let top: Vec<Vec3> = ring.iter().rev().map(|p| *p + up).collect();
    let top_uv: Vec<Vec2> = top.iter().map(uv_of).collect();
    mesh.push_polygon(&top, &top_uv);
    let bottom_uv: Vec<Vec2> = ring.iter().map(uv_of).collect();
    mesh.push_polygon(&ring, &bottom_uv);
    mesh
}

/// Concatenates meshes into one vertex/index buffer pair, recording the
/// region each mesh occupies.
#[derive(Default)]
pub struct MeshBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    regions: Vec<(String, MeshRegion)>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, mesh: &MeshData) -> Result<MeshRegion, ConfigError> {
        let name = name.into();
        if self.regions.iter().any(|(n, _)| *n == name) {
            return Err(ConfigError::DuplicateName {
                kind: "mesh region",
                name,
            });
        }
        if mesh.vertices.len() >= MAX_INDEXED_VERTICES {
            return Err(ConfigError::TooManyVertices(mesh.vertices.len()));
        }
        let region = MeshRegion {
            index_count: mesh.indices.len() as u32,
            start_index: self.indices.len() as u32,
            base_vertex: self.vertices.len() as i32,
        };
        self.vertices.extend_from_slice(&mesh.vertices);
        self.indices.extend(mesh.indices.iter().map(|&i| i as u16));
        self.regions.push((name, region));
        Ok(region)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn into_regions(self) -> Vec<(String, MeshRegion)> {
        self.regions
    }
}
