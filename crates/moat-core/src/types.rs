use serde::{Deserialize, Serialize};

/// Monotonic GPU timeline value. Zero means "never signaled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(pub u64);

impl FenceValue {
    pub const ZERO: FenceValue = FenceValue(0);

    pub fn next(self) -> FenceValue {
        FenceValue(self.0 + 1)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Per-entity change counter. Frame resources remember the last generation
/// they received for each entity; a lower watermark means the slot is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    /// Watermark of a slot that has never received the entity.
    pub const NEVER: Generation = Generation(0);

    /// Generation of a freshly created entity, so every slot starts stale.
    pub const INITIAL: Generation = Generation(1);

    pub fn bump(&mut self) {
        self.0 += 1;
    }
}

/// Opaque backend buffer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Opaque backend texture id (one shader-visible descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Draw-order partition. Each layer maps to one pipeline in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RenderLayer {
    Opaque = 0,
    AlphaTested = 1,
    AlphaTestedSprites = 2,
    Transparent = 3,
}

impl RenderLayer {
    pub const COUNT: usize = 4;

    /// Blended geometry must come last so it composites over opaque and cutout content.
    pub const DRAW_ORDER: [RenderLayer; RenderLayer::COUNT] = [
        RenderLayer::Opaque,
        RenderLayer::AlphaTested,
        RenderLayer::AlphaTestedSprites,
        RenderLayer::Transparent,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Primitive topology the layer's pipeline is built for.
    pub fn topology(self) -> Topology {
        match self {
            RenderLayer::AlphaTestedSprites => Topology::PointList,
            _ => Topology::TriangleList,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    TriangleList,
    PointList,
}

/// How the backend expects 4x4 matrices laid out in constant buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixLayout {
    /// WGSL / GLSL default, and glam's native storage.
    ColumnMajor,
    /// HLSL-style packing; matrices are transposed on upload.
    RowMajor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_order_indices() {
        let indices: Vec<usize> = RenderLayer::DRAW_ORDER.iter().map(|l| l.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(RenderLayer::DRAW_ORDER[3], RenderLayer::Transparent);
    }

    #[test]
    fn test_generation_starts_ahead_of_watermark() {
        let mut gen = Generation::INITIAL;
        assert!(Generation::NEVER < gen);
        gen.bump();
        assert_eq!(gen, Generation(2));
    }

    #[test]
    fn test_fence_ordering() {
        assert!(FenceValue::ZERO.is_zero());
        assert!(FenceValue(3) < FenceValue(3).next());
    }

    #[test]
    fn test_sprite_layer_uses_points() {
        assert_eq!(RenderLayer::AlphaTestedSprites.topology(), Topology::PointList);
        assert_eq!(RenderLayer::Transparent.topology(), Topology::TriangleList);
    }
}
