//! The contract every GPU backend implements.
//!
//! Buffers are arrays of fixed-size elements addressed by index; constant
//! buffers are written one element per entity, vertex buffers a run of
//! elements at a time. Fences are monotonically increasing values signaled
//! once all previously submitted work has finished.

use moat_core::{
    BufferHandle, DeviceError, FenceValue, MatrixLayout, MoatResult, RenderLayer, TextureHandle,
    Topology,
};

/// Which per-frame constant table a buffer holds. Decides the bind slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    Pass,
    Object,
    Material,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Constant(ConstantKind),
    Vertex,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub usage: BufferUsage,
    /// Size in bytes of one element as written by the caller.
    pub element_size: usize,
    /// Number of elements.
    pub capacity: usize,
}

impl BufferDesc {
    pub fn new(label: impl Into<String>, usage: BufferUsage, element_size: usize, capacity: usize) -> Self {
        Self {
            label: label.into(),
            usage,
            element_size,
            capacity,
        }
    }

    /// Unpadded size of the payload region.
    pub fn byte_len(&self) -> usize {
        self.element_size * self.capacity
    }
}

/// A constant-table entry: buffer plus element index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBinding {
    pub buffer: BufferHandle,
    pub index: u32,
}

/// Everything needed to issue one indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub topology: Topology,
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
    pub object: ConstantBinding,
    pub material: ConstantBinding,
    pub texture: TextureHandle,
}

/// Per-frame state bound before any draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBegin {
    /// Ring slot being recorded.
    pub slot: usize,
    pub pass_constants: BufferHandle,
    pub clear_color: [f32; 4],
}

pub trait RenderBackend {
    /// Matrix convention the shaders expect.
    fn matrix_layout(&self) -> MatrixLayout {
        MatrixLayout::ColumnMajor
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError>;

    /// Create a buffer and fill it; `contents` must be exactly `desc.byte_len()`.
    fn create_buffer_init(&mut self, desc: &BufferDesc, contents: &[u8]) -> MoatResult<BufferHandle>;

    /// Overwrite one element. `payload` must be exactly one element long.
    fn write_at(&mut self, buffer: BufferHandle, index: usize, payload: &[u8]) -> MoatResult<()>;

    /// Overwrite consecutive elements starting at `first`.
    fn write_slice(&mut self, buffer: BufferHandle, first: usize, payload: &[u8]) -> MoatResult<()>;

    fn create_texture(&mut self, label: &str, width: u32, height: u32, rgba: &[u8]) -> MoatResult<TextureHandle>;

    fn begin_frame(&mut self, frame: &FrameBegin) -> MoatResult<()>;

    /// Switch pipeline state for the following draws.
    fn set_layer(&mut self, layer: RenderLayer) -> MoatResult<()>;

    fn draw(&mut self, call: &DrawCall) -> MoatResult<()>;

    /// Close the recorded frame and hand it to the device.
    fn submit(&mut self) -> MoatResult<()>;

    /// Enqueue a fence signal after everything submitted so far.
    fn signal_fence(&mut self) -> Result<FenceValue, DeviceError>;

    /// Highest fence value the device has reached.
    fn completed_fence(&self) -> FenceValue;

    /// Block until `completed_fence() >= value`.
    fn wait_fence(&mut self, value: FenceValue) -> Result<(), DeviceError>;
}

/// Check a write of `payload_len` bytes at element `first` against a buffer
/// description. Shared by the backends.
pub fn check_write(
    desc: &BufferDesc,
    first: usize,
    payload_len: usize,
    single: bool,
) -> Result<usize, moat_core::PreconditionError> {
    use moat_core::PreconditionError;

    let element = desc.element_size.max(1);
    if single && payload_len != desc.element_size {
        return Err(PreconditionError::SizeMismatch {
            what: "constant payload",
            expected: desc.element_size,
            actual: payload_len,
        });
    }
    if payload_len % element != 0 {
        return Err(PreconditionError::SizeMismatch {
            what: "element-aligned payload",
            expected: (payload_len / element + 1) * element,
            actual: payload_len,
        });
    }
    let count = payload_len / element;
    if first + count > desc.capacity {
        return Err(PreconditionError::IndexOutOfRange {
            index: first,
            count,
            capacity: desc.capacity,
        });
    }
    Ok(count)
}
