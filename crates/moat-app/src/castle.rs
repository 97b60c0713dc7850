//! The castle-and-moat scene: textures, materials, meshes and render items.

use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use glam::{Mat4, Vec3};
use moat_core::{BufferHandle, ConfigError, MoatResult, RenderLayer, TextureHandle};
use moat_render::{BufferDesc, BufferUsage, RenderBackend};
use moat_scene::geometry::{
    create_bipyramid, create_box, create_cylinder, create_grid, create_prism, create_pyramid,
    create_wedge, wave_grid_indices,
};
use moat_scene::{
    load_materials_from_str, Handle, Material, MeshBuilder, MeshGeometry, MeshRegion, RenderItem,
    Scene, SpriteVertex, Vertex, VertexSource,
};

/// Edge length of the generated texture tiles.
pub const TEXTURE_SIZE: u32 = 16;

/// Built scene plus the handles the update loop animates.
pub struct Castle {
    pub scene: Scene,
    pub water: Handle<RenderItem>,
    pub water_material: Handle<Material>,
}

fn upload<B: RenderBackend + ?Sized>(
    backend: &mut B,
    label: &str,
    usage: BufferUsage,
    element_size: usize,
    bytes: &[u8],
) -> MoatResult<BufferHandle> {
    let desc = BufferDesc::new(label, usage, element_size, bytes.len() / element_size);
    backend.create_buffer_init(&desc, bytes)
}

fn scale_translate(scale: Vec3, translation: Vec3) -> Mat4 {
    Mat4::from_translation(translation) * Mat4::from_scale(scale)
}

/// Resolve names once and register an item.
fn place(
    scene: &mut Scene,
    name: &str,
    mesh: Handle<MeshGeometry>,
    region: &str,
    material: &str,
    layer: RenderLayer,
    world: Mat4,
) -> MoatResult<Handle<RenderItem>> {
    let region = scene.meshes.get(mesh)?.region(region)?;
    let material = scene.materials.resolve(material)?;
    scene.add_item(name, RenderItem::new(mesh, region, material, layer).with_world(world))
}

fn build_shapes<B: RenderBackend + ?Sized>(backend: &mut B, scene: &mut Scene) -> MoatResult<Handle<MeshGeometry>> {
    let mut shapes = MeshBuilder::new();
    shapes.add("pedestal", &create_box(1.5, 0.5, 1.5))?;
    shapes.add("diamond", &create_bipyramid(0.75, 1.0, 4))?;
    shapes.add("grid", &create_grid(1.0, 1.0, 60, 40))?;
    shapes.add("wall", &create_box(2.0, 5.0, 2.0))?;
    shapes.add("ramp", &create_wedge(1.5, 0.5, 1.5))?;
    shapes.add("cylinder", &create_cylinder(0.5, 0.3, 3.0, 20, 20))?;
    shapes.add("pyramid", &create_pyramid(1.5, 1.0))?;
    shapes.add("kite", &create_prism(0.75, 0.5, 4, FRAC_PI_4))?;
    shapes.add("pentagon", &create_prism(0.75, 0.5, 5, FRAC_PI_2))?;

    let vb = upload(
        backend,
        "shape-vertices",
        BufferUsage::Vertex,
        std::mem::size_of::<Vertex>(),
        bytemuck::cast_slice(shapes.vertices()),
    )?;
    let ib = upload(backend, "shape-indices", BufferUsage::Index, 2, bytemuck::cast_slice(shapes.indices()))?;
    let mesh = MeshGeometry::new(VertexSource::Static(vb), ib, shapes.into_regions());
    Ok(scene.meshes.insert("shapeGeo", mesh)?)
}

fn build_waves<B: RenderBackend + ?Sized>(
    backend: &mut B,
    scene: &mut Scene,
    rows: usize,
    cols: usize,
) -> MoatResult<Handle<MeshGeometry>> {
    let indices = wave_grid_indices(rows, cols)?;
    let ib = upload(backend, "water-indices", BufferUsage::Index, 2, bytemuck::cast_slice(&indices))?;
    let grid = MeshRegion {
        index_count: indices.len() as u32,
        start_index: 0,
        base_vertex: 0,
    };
    let mesh = MeshGeometry::new(VertexSource::FrameWaves, ib, vec![("grid".into(), grid)]);
    Ok(scene.meshes.insert("waterGeo", mesh)?)
}

fn build_tree_sprites<B: RenderBackend + ?Sized>(backend: &mut B, scene: &mut Scene) -> MoatResult<Handle<MeshGeometry>> {
    let sprites: Vec<SpriteVertex> = [(12.5, 11.0), (-12.5, 11.0), (12.5, -11.0), (-12.5, -11.0)]
        .iter()
        .map(|&(x, z)| SpriteVertex {
            position: [x, 10.0, z],
            size: [20.0, 20.0],
        })
        .collect();
    let indices: Vec<u16> = (0..sprites.len() as u16).collect();

    let vb = upload(
        backend,
        "tree-sprite-vertices",
        BufferUsage::Vertex,
        std::mem::size_of::<SpriteVertex>(),
        bytemuck::cast_slice(&sprites),
    )?;
    let ib = upload(backend, "tree-sprite-indices", BufferUsage::Index, 2, bytemuck::cast_slice(&indices))?;
    let points = MeshRegion {
        index_count: indices.len() as u32,
        start_index: 0,
        base_vertex: 0,
    };
    let mesh = MeshGeometry::new(VertexSource::Static(vb), ib, vec![("points".into(), points)]);
    Ok(scene.meshes.insert("treeSpritesGeo", mesh)?)
}

/// Build the whole scene, uploading static geometry and textures through
/// `backend`. The water surface is `rows x cols` vertices.
pub fn build_castle<B: RenderBackend + ?Sized>(backend: &mut B, rows: usize, cols: usize) -> MoatResult<Castle> {
    let table = load_materials_from_str(include_str!("../../../data/materials.ron"))?;

    let mut textures: HashMap<&str, TextureHandle> = HashMap::new();
    for tex in &table.textures {
        let handle = backend.create_texture(&tex.name, TEXTURE_SIZE, TEXTURE_SIZE, &tex.pixels(TEXTURE_SIZE))?;
        textures.insert(tex.name.as_str(), handle);
    }

    let mut scene = Scene::new();
    for def in &table.materials {
        let texture = textures
            .get(def.texture.as_str())
            .copied()
            .ok_or_else(|| ConfigError::UnknownName {
                kind: "texture",
                name: def.texture.clone(),
            })?;
        scene.add_material(def, texture)?;
    }

    let shapes = build_shapes(backend, &mut scene)?;
    let waves = build_waves(backend, &mut scene, rows, cols)?;
    let trees = build_tree_sprites(backend, &mut scene)?;

    let water_material = scene.materials.resolve("water")?;
    let water_region = scene.meshes.get(waves)?.region("grid")?;
    let water = scene.add_item(
        "water",
        RenderItem::new(waves, water_region, water_material, RenderLayer::Transparent)
            .with_tex_transform(Mat4::from_scale(Vec3::new(5.0, 5.0, 1.0))),
    )?;
    place(&mut scene, "trees", trees, "points", "treeSprites", RenderLayer::AlphaTestedSprites, Mat4::IDENTITY)?;

    use RenderLayer::{AlphaTested, Opaque};
    let s = Vec3::splat(2.0);
    place(&mut scene, "pedestal", shapes, "pedestal", "metal0", Opaque, scale_translate(s, Vec3::new(0.0, 1.5, 0.0)))?;
    place(&mut scene, "diamond", shapes, "diamond", "ice0", Opaque, scale_translate(s, Vec3::new(0.0, 2.5, 0.0)))?;
    place(
        &mut scene,
        "courtyard",
        shapes,
        "grid",
        "bricks2",
        Opaque,
        scale_translate(Vec3::new(15.0, 1.0, 19.0), Vec3::new(0.0, 1.0, 0.0)),
    )?;
    for i in 0..2 {
        let fi = i as f32;
        place(
            &mut scene,
            &format!("wall-front-{i}"),
            shapes,
            "wall",
            "bricks0",
            Opaque,
            scale_translate(Vec3::new(7.0, 1.0, 0.1), Vec3::new(0.0, 3.5, -8.75 + fi * 18.0)),
        )?;
        place(
            &mut scene,
            &format!("wall-side-{i}"),
            shapes,
            "wall",
            "bricks0",
            Opaque,
            scale_translate(Vec3::new(0.1, 1.0, 8.9), Vec3::new(-7.0 + fi * 14.0, 3.5, 0.0)),
        )?;
    }
    place(&mut scene, "ramp", shapes, "ramp", "wood0", Opaque, scale_translate(s, Vec3::new(0.0, 1.5, 0.0)))?;
    for i in 0..2 {
        let z = -10.0 + i as f32 * 20.0;
        for (side, x) in [("left", -7.5), ("right", 7.5)] {
            place(
                &mut scene,
                &format!("tower-{side}-{i}"),
                shapes,
                "cylinder",
                "bricks0",
                Opaque,
                Mat4::from_translation(Vec3::new(x, 2.5, z)),
            )?;
        }
        let x = -7.5 + i as f32 * 15.0;
        for (side, z) in [("front", -10.0), ("back", 10.0)] {
            place(
                &mut scene,
                &format!("roof-{side}-{i}"),
                shapes,
                "pyramid",
                "roof0",
                Opaque,
                scale_translate(Vec3::new(1.0, 2.0, 1.0), Vec3::new(x, 9.0, z)),
            )?;
        }
    }
    place(&mut scene, "kite", shapes, "kite", "metal0", Opaque, scale_translate(s, Vec3::new(0.0, 2.0, 9.25)))?;
    place(&mut scene, "gate", shapes, "pentagon", "gate0", AlphaTested, scale_translate(s, Vec3::new(0.0, 3.5, -8.75)))?;
    place(
        &mut scene,
        "grass",
        shapes,
        "grid",
        "grass0",
        Opaque,
        scale_translate(Vec3::new(30.0, 1.0, 30.0), Vec3::new(0.0, 0.9, 0.0)),
    )?;

    log::info!(
        "Castle: {} materials, {} meshes, {} render items",
        scene.materials.len(),
        scene.meshes.len(),
        scene.items.len()
    );
    Ok(Castle {
        scene,
        water,
        water_material,
    })
}
