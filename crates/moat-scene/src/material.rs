use glam::{Mat4, Vec3, Vec4};
use moat_core::math::wrap_unit;
use moat_core::{ConfigError, Generation, TextureHandle};
use serde::{Deserialize, Serialize};

/// A texture entry in the material data file. Textures are generated as
/// solid/checker tiles from `color`, so the data file stays self-contained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureDef {
    pub name: String,
    /// RGBA, 0.0-1.0 per channel.
    pub color: (f32, f32, f32, f32),
    /// Second checker colour. Defaults to `color` (a solid tile).
    #[serde(default)]
    pub accent: Option<(f32, f32, f32, f32)>,
}

impl TextureDef {
    /// RGBA8 pixels for a `size x size` tile, checkered in 2x2 blocks.
    pub fn pixels(&self, size: u32) -> Vec<u8> {
        let to_rgba = |(r, g, b, a): (f32, f32, f32, f32)| {
            [r, g, b, a].map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
        };
        let base = to_rgba(self.color);
        let accent = self.accent.map(to_rgba).unwrap_or(base);
        let half = (size / 2).max(1);

        let mut out = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let odd = ((x / half) + (y / half)) % 2 == 1;
                out.extend_from_slice(if odd { &accent } else { &base });
            }
        }
        out
    }
}

/// A single material definition loaded from RON data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDef {
    pub name: String,
    /// Name of a [`TextureDef`] in the same table.
    pub texture: String,
    pub diffuse_albedo: (f32, f32, f32, f32),
    pub fresnel_r0: (f32, f32, f32),
    pub roughness: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialTable {
    pub textures: Vec<TextureDef>,
    pub materials: Vec<MaterialDef>,
}

impl MaterialTable {
    /// Check that names are unique and every material names a known texture.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for tex in &self.textures {
            if !seen.insert(tex.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "texture",
                    name: tex.name.clone(),
                });
            }
        }
        let mut materials = std::collections::HashSet::new();
        for mat in &self.materials {
            if !materials.insert(mat.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "material",
                    name: mat.name.clone(),
                });
            }
            if !seen.contains(mat.texture.as_str()) {
                return Err(ConfigError::UnknownName {
                    kind: "texture",
                    name: mat.texture.clone(),
                });
            }
            if !(0.0..=1.0).contains(&mat.roughness) {
                return Err(ConfigError::InvalidParameter {
                    name: "roughness",
                    value: mat.roughness,
                });
            }
        }
        Ok(())
    }
}

/// Parse a materials RON string into a validated MaterialTable.
pub fn load_materials_from_str(ron_str: &str) -> Result<MaterialTable, ConfigError> {
    let options = ron::Options::default();
    let table: MaterialTable = options
        .from_str(ron_str)
        .map_err(|e| ConfigError::Parse {
            what: "materials",
            message: e.to_string(),
        })?;
    table.validate()?;
    log::info!(
        "Loaded {} materials, {} textures",
        table.materials.len(),
        table.textures.len()
    );
    Ok(table)
}

/// Surface parameters shared by render items.
///
/// Every setter bumps the generation, which is what tells the constant sync
/// that the frame slots hold an outdated copy.
#[derive(Debug, Clone)]
pub struct Material {
    diffuse_albedo: Vec4,
    fresnel_r0: Vec3,
    roughness: f32,
    transform: Mat4,
    texture: TextureHandle,
    generation: Generation,
}

impl Material {
    pub fn new(def: &MaterialDef, texture: TextureHandle) -> Self {
        let (r, g, b, a) = def.diffuse_albedo;
        let (fr, fg, fb) = def.fresnel_r0;
        Self {
            diffuse_albedo: Vec4::new(r, g, b, a),
            fresnel_r0: Vec3::new(fr, fg, fb),
            roughness: def.roughness,
            transform: Mat4::IDENTITY,
            texture,
            generation: Generation::INITIAL,
        }
    }

    pub fn diffuse_albedo(&self) -> Vec4 {
        self.diffuse_albedo
    }

    pub fn fresnel_r0(&self) -> Vec3 {
        self.fresnel_r0
    }

    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn set_diffuse_albedo(&mut self, albedo: Vec4) {
        self.diffuse_albedo = albedo;
        self.generation.bump();
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
        self.generation.bump();
    }

    /// Scroll the texture translation by `(du, dv)`, wrapped into `[0, 1)`.
    pub fn scroll_texture(&mut self, du: f32, dv: f32) {
        let mut cols = self.transform.to_cols_array_2d();
        cols[3][0] = wrap_unit(cols[3][0] + du);
        cols[3][1] = wrap_unit(cols[3][1] + dv);
        self.set_transform(Mat4::from_cols_array_2d(&cols));
    }

    /// Current texture translation `(u, v)`.
    pub fn texture_offset(&self) -> (f32, f32) {
        let t = self.transform.w_axis;
        (t.x, t.y)
    }
}
