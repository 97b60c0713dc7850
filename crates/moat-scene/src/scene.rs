use moat_core::{RenderLayer, TextureHandle};

use crate::item::{MeshGeometry, RenderItem};
use crate::material::{Material, MaterialDef};
use crate::registry::{Handle, Registry};

/// Everything the per-frame code reads: materials, meshes, items and the
/// layer partition that fixes draw order.
pub struct Scene {
    pub materials: Registry<Material>,
    pub meshes: Registry<MeshGeometry>,
    pub items: Registry<RenderItem>,
    layers: [Vec<Handle<RenderItem>>; RenderLayer::COUNT],
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            materials: Registry::new("material"),
            meshes: Registry::new("mesh"),
            items: Registry::new("render item"),
            layers: Default::default(),
        }
    }

    pub fn add_material(
        &mut self,
        def: &MaterialDef,
        texture: TextureHandle,
    ) -> Result<Handle<Material>, moat_core::ConfigError> {
        self.materials.insert(def.name.clone(), Material::new(def, texture))
    }

    /// Register an item and append it to its layer.
    pub fn add_item(
        &mut self,
        name: impl Into<String>,
        item: RenderItem,
    ) -> Result<Handle<RenderItem>, moat_core::MoatError> {
        self.materials.get(item.material())?;
        self.meshes.get(item.mesh())?;
        let layer = item.layer();
        let handle = self.items.insert(name, item)?;
        log::debug!("render item {} -> {:?}", handle.index(), layer);
        self.layers[layer.index()].push(handle);
        Ok(handle)
    }

    pub fn layer(&self, layer: RenderLayer) -> &[Handle<RenderItem>] {
        &self.layers[layer.index()]
    }

    /// Items in draw order: layer by layer, insertion order within a layer.
    pub fn draw_order(&self) -> impl Iterator<Item = (RenderLayer, Handle<RenderItem>)> + '_ {
        RenderLayer::DRAW_ORDER
            .into_iter()
            .flat_map(move |layer| self.layer(layer).iter().map(move |h| (layer, *h)))
    }
}
