use glam::Mat4;
use moat_core::{BufferHandle, ConfigError, Generation, RenderLayer, Topology};

use crate::material::Material;
use crate::registry::Handle;

/// Slice of a shared vertex/index buffer pair occupied by one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshRegion {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
}

/// Where a mesh's vertices come from at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexSource {
    /// Uploaded once at startup.
    Static(BufferHandle),
    /// Rewritten every tick into the current frame slot's wave vertex buffer.
    FrameWaves,
}

/// Vertex/index buffers plus the named regions packed into them.
#[derive(Debug, Clone)]
pub struct MeshGeometry {
    pub vertices: VertexSource,
    pub index_buffer: BufferHandle,
    regions: Vec<(String, MeshRegion)>,
}

impl MeshGeometry {
    pub fn new(
        vertices: VertexSource,
        index_buffer: BufferHandle,
        regions: Vec<(String, MeshRegion)>,
    ) -> Self {
        Self {
            vertices,
            index_buffer,
            regions,
        }
    }

    pub fn region(&self, name: &str) -> Result<MeshRegion, ConfigError> {
        self.regions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| *r)
            .ok_or_else(|| ConfigError::UnknownName {
                kind: "mesh region",
                name: name.to_string(),
            })
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, MeshRegion)> {
        self.regions.iter().map(|(n, r)| (n.as_str(), *r))
    }
}

/// One draw: a mesh region placed in the world with a material.
///
/// The region is copied out of the mesh when the item is created, so drawing
/// never looks anything up by name.
#[derive(Debug, Clone)]
pub struct RenderItem {
    world: Mat4,
    tex_transform: Mat4,
    material: Handle<Material>,
    mesh: Handle<MeshGeometry>,
    region: MeshRegion,
    layer: RenderLayer,
    generation: Generation,
}

impl RenderItem {
    pub fn new(
        mesh: Handle<MeshGeometry>,
        region: MeshRegion,
        material: Handle<Material>,
        layer: RenderLayer,
    ) -> Self {
        Self {
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
            material,
            mesh,
            region,
            layer,
            generation: Generation::INITIAL,
        }
    }

    pub fn with_world(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn with_tex_transform(mut self, tex_transform: Mat4) -> Self {
        self.tex_transform = tex_transform;
        self
    }

    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn tex_transform(&self) -> Mat4 {
        self.tex_transform
    }

    pub fn material(&self) -> Handle<Material> {
        self.material
    }

    pub fn mesh(&self) -> Handle<MeshGeometry> {
        self.mesh
    }

    pub fn region(&self) -> MeshRegion {
        self.region
    }

    pub fn layer(&self) -> RenderLayer {
        self.layer
    }

    /// Sprites are expanded from points; everything else is a triangle list.
    pub fn topology(&self) -> Topology {
        self.layer.topology()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
        self.generation.bump();
    }

    pub fn set_tex_transform(&mut self, tex_transform: Mat4) {
        self.tex_transform = tex_transform;
        self.generation.bump();
    }
}
