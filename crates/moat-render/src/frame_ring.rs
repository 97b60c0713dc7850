use moat_core::constants::MIN_FRAME_RESOURCES;
use moat_core::{
    BufferHandle, ConfigError, DeviceError, FenceValue, MoatResult, PreconditionError,
};
use moat_scene::Vertex;

use crate::backend::{BufferDesc, BufferUsage, ConstantKind, RenderBackend};
use crate::uniforms::{MaterialConstants, ObjectConstants, PassConstants};

/// Element counts for the buffers every slot owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSizes {
    pub objects: usize,
    pub materials: usize,
    pub wave_vertices: usize,
}

/// One ring slot: everything the CPU writes while recording a frame.
#[derive(Debug, Clone)]
pub struct FrameResource {
    pub index: usize,
    pub pass_constants: BufferHandle,
    pub object_constants: BufferHandle,
    pub material_constants: BufferHandle,
    pub wave_vertices: BufferHandle,
    /// Fence signaled after the last frame recorded from this slot. Zero until
    /// the slot is first released.
    fence: FenceValue,
}

impl FrameResource {
    pub fn fence(&self) -> FenceValue {
        self.fence
    }
}

/// K rotating frame slots guarded by fences.
///
/// `acquire_next` is the only place the CPU waits on the GPU. It bounds the
/// CPU to at most K-1 frames ahead: a slot is handed out only once the frame
/// previously recorded into it has completed.
pub struct FrameResourceRing {
    slots: Vec<FrameResource>,
    current: usize,
    sizes: FrameSizes,
    blocking_waits: u64,
}

impl FrameResourceRing {
    pub fn new<B: RenderBackend + ?Sized>(
        backend: &mut B,
        count: usize,
        sizes: FrameSizes,
    ) -> MoatResult<Self> {
        if count < MIN_FRAME_RESOURCES {
            return Err(ConfigError::TooFewFrameResources {
                min: MIN_FRAME_RESOURCES,
                got: count,
            }
            .into());
        }

        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            let pass_constants = backend.create_buffer(&BufferDesc::new(
                format!("frame{index}-pass"),
                BufferUsage::Constant(ConstantKind::Pass),
                std::mem::size_of::<PassConstants>(),
                1,
            ))?;
            let object_constants = backend.create_buffer(&BufferDesc::new(
                format!("frame{index}-objects"),
                BufferUsage::Constant(ConstantKind::Object),
                std::mem::size_of::<ObjectConstants>(),
                sizes.objects.max(1),
            ))?;
            let material_constants = backend.create_buffer(&BufferDesc::new(
                format!("frame{index}-materials"),
                BufferUsage::Constant(ConstantKind::Material),
                std::mem::size_of::<MaterialConstants>(),
                sizes.materials.max(1),
            ))?;
            let wave_vertices = backend.create_buffer(&BufferDesc::new(
                format!("frame{index}-waves"),
                BufferUsage::Vertex,
                std::mem::size_of::<Vertex>(),
                sizes.wave_vertices.max(1),
            ))?;
            slots.push(FrameResource {
                index,
                pass_constants,
                object_constants,
                material_constants,
                wave_vertices,
                fence: FenceValue::ZERO,
            });
        }

        log::info!(
            "FrameResourceRing: {} slots, {} objects, {} materials, {} wave vertices per slot",
            count,
            sizes.objects,
            sizes.materials,
            sizes.wave_vertices
        );

        Ok(Self {
            slots,
            // First acquire lands on slot 0.
            current: count - 1,
            sizes,
            blocking_waits: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn sizes(&self) -> FrameSizes {
        self.sizes
    }

    /// Index of the most recently acquired slot.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &FrameResource {
        &self.slots[self.current]
    }

    pub fn slot(&self, index: usize) -> Option<&FrameResource> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[FrameResource] {
        &self.slots
    }

    /// Waits that actually blocked.
    pub fn blocking_waits(&self) -> u64 {
        self.blocking_waits
    }

    /// Advance to the next slot, blocking until the GPU has finished the frame
    /// last recorded into it. Returns the slot index.
    ///
    /// A failed or short wait is a device failure and is returned, never
    /// retried.
    pub fn acquire_next<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<usize, DeviceError> {
        self.current = (self.current + 1) % self.slots.len();
        let fence = self.slots[self.current].fence;

        if !fence.is_zero() {
            let completed = backend.completed_fence();
            if completed < fence {
                log::debug!(
                    "frame slot {} busy: waiting for fence {} (completed {})",
                    self.current,
                    fence.0,
                    completed.0
                );
                self.blocking_waits += 1;
                if let Err(e) = backend.wait_fence(fence) {
                    log::error!("fence wait for slot {} failed: {}", self.current, e);
                    return Err(e);
                }
                let completed = backend.completed_fence();
                if completed < fence {
                    let err = DeviceError::FenceWait {
                        fence: fence.0,
                        completed: completed.0,
                        reason: "wait returned before the fence was reached".into(),
                    };
                    log::error!("{err}");
                    return Err(err);
                }
            }
        }
        Ok(self.current)
    }

    /// Record the fence that will be signaled once `slot`'s commands finish.
    pub fn release(&mut self, slot: usize, fence: FenceValue) -> Result<(), PreconditionError> {
        let count = self.slots.len();
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(PreconditionError::IndexOutOfRange {
                index: slot,
                count: 1,
                capacity: count,
            })?;
        if fence < entry.fence {
            return Err(PreconditionError::FenceRegression {
                slot,
                old: entry.fence.0,
                new: fence.0,
            });
        }
        entry.fence = fence;
        Ok(())
    }
}
