pub mod geometry;
pub mod item;
pub mod material;
pub mod registry;
pub mod scene;

pub use geometry::{MeshBuilder, MeshData, SpriteVertex, Vertex};
pub use item::{MeshGeometry, MeshRegion, RenderItem, VertexSource};
pub use material::{load_materials_from_str, Material, MaterialDef, MaterialTable, TextureDef};
pub use registry::{Handle, Registry};
pub use scene::Scene;
