//! Small scene wired to a [`HeadlessBackend`] for protocol tests.
//!
//! GPU tests live behind `#[cfg(feature = "gpu_tests")]` in `wgpu_backend`;
//! everything here runs on the CPU.

use moat_core::{RenderLayer, TextureHandle};
use moat_scene::geometry::{create_box, wave_grid_indices};
use moat_scene::{
    Handle, Material, MaterialDef, MeshBuilder, MeshGeometry, RenderItem, Scene, SpriteVertex,
    Vertex, VertexSource,
};

use crate::backend::{BufferDesc, BufferUsage, RenderBackend};
use crate::dispatch::RenderItemDispatcher;
use crate::frame_ring::{FrameResourceRing, FrameSizes};
use crate::headless::HeadlessBackend;
use crate::sync::ConstantSync;

pub const WAVE_ROWS: usize = 4;
pub const WAVE_COLS: usize = 5;

pub struct TestWorld {
    pub backend: HeadlessBackend,
    pub scene: Scene,
    pub ring: FrameResourceRing,
    pub sync: ConstantSync,
    pub dispatcher: RenderItemDispatcher,
    pub wall: Handle<RenderItem>,
    pub trees: Handle<RenderItem>,
    pub water: Handle<RenderItem>,
    pub water_material: Handle<Material>,
}

fn material(name: &str, alpha: f32) -> MaterialDef {
    MaterialDef {
        name: name.into(),
        texture: format!("{name}Tex"),
        diffuse_albedo: (1.0, 1.0, 1.0, alpha),
        fresnel_r0: (0.02, 0.02, 0.02),
        roughness: 0.5,
    }
}

fn upload<B: RenderBackend>(backend: &mut B, label: &str, usage: BufferUsage, element_size: usize, bytes: &[u8]) -> moat_core::BufferHandle {
    let desc = BufferDesc::new(label, usage, element_size, bytes.len() / element_size);
    backend.create_buffer_init(&desc, bytes).expect("upload")
}

impl TestWorld {
    /// Water (transparent), a wall (opaque), a gate (alpha-tested) and tree
    /// sprites, inserted out of draw order.
    pub fn new(frames: usize) -> Self {
        let mut backend = HeadlessBackend::new();
        let mut scene = Scene::new();

        let tex: TextureHandle = backend.create_texture("tex", 2, 2, &[200; 16]).expect("texture");
        let water_material = scene.add_material(&material("water", 0.5), tex).expect("material");
        let stone = scene.add_material(&material("stone", 1.0), tex).expect("material");

        let mut shapes = MeshBuilder::new();
        let box_region = shapes.add("box", &create_box(1.0, 1.0, 1.0)).expect("box");
        let vb = upload(
            &mut backend,
            "shapes-vb",
            BufferUsage::Vertex,
            std::mem::size_of::<Vertex>(),
            bytemuck::cast_slice(shapes.vertices()),
        );
        let ib = upload(&mut backend, "shapes-ib", BufferUsage::Index, 2, bytemuck::cast_slice(shapes.indices()));
        let shape_mesh = scene
            .meshes
            .insert("shapes", MeshGeometry::new(VertexSource::Static(vb), ib, shapes.into_regions()))
            .expect("mesh");

        let wave_indices = wave_grid_indices(WAVE_ROWS, WAVE_COLS).expect("indices");
        let wave_ib = upload(&mut backend, "waves-ib", BufferUsage::Index, 2, bytemuck::cast_slice(&wave_indices));
        let grid = moat_scene::MeshRegion {
            index_count: wave_indices.len() as u32,
            start_index: 0,
            base_vertex: 0,
        };
        let wave_mesh = scene
            .meshes
            .insert("waves", MeshGeometry::new(VertexSource::FrameWaves, wave_ib, vec![("grid".into(), grid)]))
            .expect("mesh");

        let sprites = [SpriteVertex {
            position: [0.0, 10.0, 0.0],
            size: [20.0, 20.0],
        }; 2];
        let sprite_vb = upload(
            &mut backend,
            "sprites-vb",
            BufferUsage::Vertex,
            std::mem::size_of::<SpriteVertex>(),
            bytemuck::cast_slice(&sprites),
        );
        let sprite_ib = upload(&mut backend, "sprites-ib", BufferUsage::Index, 2, bytemuck::cast_slice(&[0u16, 1]));
        let points = moat_scene::MeshRegion {
            index_count: 2,
            start_index: 0,
            base_vertex: 0,
        };
        let sprite_mesh = scene
            .meshes
            .insert(
                "trees",
                MeshGeometry::new(VertexSource::Static(sprite_vb), sprite_ib, vec![("points".into(), points)]),
            )
            .expect("mesh");

        let water = scene
            .add_item("water", RenderItem::new(wave_mesh, grid, water_material, RenderLayer::Transparent))
            .expect("item");
        let wall = scene
            .add_item("wall", RenderItem::new(shape_mesh, box_region, stone, RenderLayer::Opaque))
            .expect("item");
        scene
            .add_item("gate", RenderItem::new(shape_mesh, box_region, stone, RenderLayer::AlphaTested))
            .expect("item");
        let trees = scene
            .add_item("trees", RenderItem::new(sprite_mesh, points, stone, RenderLayer::AlphaTestedSprites))
            .expect("item");

        let ring = FrameResourceRing::new(
            &mut backend,
            frames,
            FrameSizes {
                objects: scene.items.len(),
                materials: scene.materials.len(),
                wave_vertices: WAVE_ROWS * WAVE_COLS,
            },
        )
        .expect("ring");

        Self {
            backend,
            scene,
            ring,
            sync: ConstantSync::new(frames),
            dispatcher: RenderItemDispatcher::new(),
            wall,
            trees,
            water,
            water_material,
        }
    }

    /// Same ring, no render items.
    pub fn empty(frames: usize) -> Self {
        let mut world = Self::new(frames);
        world.scene = Scene::new();
        world
    }
}
