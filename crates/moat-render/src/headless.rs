//! CPU-only backend. Buffers are plain byte vectors, frames are recorded as
//! command lists, and the GPU timeline is simulated with a configurable lag
//! so fence waits can be exercised without a device.

use std::collections::VecDeque;

use moat_core::{
    BufferHandle, DeviceError, FenceValue, MatrixLayout, MoatResult, PreconditionError,
    RenderLayer, TextureHandle,
};

use crate::backend::{check_write, BufferDesc, DrawCall, FrameBegin, RenderBackend};

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetLayer(RenderLayer),
    Draw(DrawCall),
}

/// A frame as it was handed to the (simulated) device.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub begin: FrameBegin,
    pub commands: Vec<Command>,
}

impl RecordedFrame {
    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|c| match c {
            Command::Draw(d) => Some(d),
            Command::SetLayer(_) => None,
        })
    }

    pub fn layer_switches(&self) -> Vec<RenderLayer> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetLayer(l) => Some(*l),
                Command::Draw(_) => None,
            })
            .collect()
    }
}

struct HeadlessBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

struct HeadlessTexture {
    width: u32,
    height: u32,
}

pub struct HeadlessBackend {
    layout: MatrixLayout,
    buffers: Vec<HeadlessBuffer>,
    textures: Vec<HeadlessTexture>,
    recording: Option<RecordedFrame>,
    current_layer: Option<RenderLayer>,
    last_frame: Option<RecordedFrame>,
    frames_submitted: u64,
    /// Fences signaled but not yet reached by the simulated GPU.
    in_flight: VecDeque<FenceValue>,
    latency: usize,
    last_signaled: FenceValue,
    completed: FenceValue,
    waits: u64,
    lost: Option<String>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// A device that finishes every frame as soon as it is signaled.
    pub fn new() -> Self {
        Self::with_latency(0)
    }

    /// A device that keeps up to `latency` signaled frames in flight and only
    /// retires older ones (or whatever a wait asks for).
    pub fn with_latency(latency: usize) -> Self {
        Self {
            layout: MatrixLayout::ColumnMajor,
            buffers: Vec::new(),
            textures: Vec::new(),
            recording: None,
            current_layer: None,
            last_frame: None,
            frames_submitted: 0,
            in_flight: VecDeque::new(),
            latency,
            last_signaled: FenceValue::ZERO,
            completed: FenceValue::ZERO,
            waits: 0,
            lost: None,
        }
    }

    pub fn with_matrix_layout(mut self, layout: MatrixLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Simulate a hang or removal: every later fence wait fails.
    pub fn lose_device(&mut self, reason: &str) {
        log::warn!("HeadlessBackend: device lost ({reason})");
        self.lost = Some(reason.to_string());
    }

    pub fn last_frame(&self) -> Option<&RecordedFrame> {
        self.last_frame.as_ref()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn last_signaled(&self) -> FenceValue {
        self.last_signaled
    }

    /// Number of `wait_fence` calls.
    pub fn waits(&self) -> u64 {
        self.waits
    }

    pub fn buffer_desc(&self, buffer: BufferHandle) -> Option<&BufferDesc> {
        self.buffers.get(buffer.0 as usize).map(|b| &b.desc)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .get(texture.0 as usize)
            .map(|t| (t.width, t.height))
    }

    /// Bytes of element `index`.
    pub fn element(&self, buffer: BufferHandle, index: usize) -> Option<&[u8]> {
        let b = self.buffers.get(buffer.0 as usize)?;
        let size = b.desc.element_size;
        b.data.get(index * size..(index + 1) * size)
    }

    /// Element `index` reinterpreted as `T`.
    pub fn read_pod<T: bytemuck::Pod>(&self, buffer: BufferHandle, index: usize) -> Option<T> {
        let bytes = self.element(buffer, index)?;
        if bytes.len() != std::mem::size_of::<T>() {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    fn buffer_mut(&mut self, buffer: BufferHandle) -> Result<&mut HeadlessBuffer, DeviceError> {
        self.buffers
            .get_mut(buffer.0 as usize)
            .ok_or(DeviceError::UnknownBuffer(buffer.0))
    }

    fn retire_through(&mut self, value: FenceValue) {
        while let Some(&front) = self.in_flight.front() {
            if front > value {
                break;
            }
            self.completed = front;
            self.in_flight.pop_front();
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn matrix_layout(&self) -> MatrixLayout {
        self.layout
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(HeadlessBuffer {
            desc: desc.clone(),
            data: vec![0; desc.byte_len()],
        });
        Ok(handle)
    }

    fn create_buffer_init(&mut self, desc: &BufferDesc, contents: &[u8]) -> MoatResult<BufferHandle> {
        if contents.len() != desc.byte_len() {
            return Err(PreconditionError::SizeMismatch {
                what: "initial buffer contents",
                expected: desc.byte_len(),
                actual: contents.len(),
            }
            .into());
        }
        let handle = self.create_buffer(desc)?;
        self.buffer_mut(handle)?.data.copy_from_slice(contents);
        Ok(handle)
    }

    fn write_at(&mut self, buffer: BufferHandle, index: usize, payload: &[u8]) -> MoatResult<()> {
        let b = self.buffer_mut(buffer)?;
        check_write(&b.desc, index, payload.len(), true)?;
        let start = index * b.desc.element_size;
        b.data[start..start + payload.len()].copy_from_slice(payload);
        Ok(())
    }

    fn write_slice(&mut self, buffer: BufferHandle, first: usize, payload: &[u8]) -> MoatResult<()> {
        let b = self.buffer_mut(buffer)?;
        check_write(&b.desc, first, payload.len(), false)?;
        let start = first * b.desc.element_size;
        b.data[start..start + payload.len()].copy_from_slice(payload);
        Ok(())
    }

    fn create_texture(&mut self, _label: &str, width: u32, height: u32, rgba: &[u8]) -> MoatResult<TextureHandle> {
        let expected = (width * height * 4) as usize;
        if rgba.len() != expected {
            return Err(PreconditionError::SizeMismatch {
                what: "texture pixels",
                expected,
                actual: rgba.len(),
            }
            .into());
        }
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(HeadlessTexture { width, height });
        Ok(handle)
    }

    fn begin_frame(&mut self, frame: &FrameBegin) -> MoatResult<()> {
        if self.recording.is_some() {
            return Err(DeviceError::AlreadyRecording.into());
        }
        if self.buffers.get(frame.pass_constants.0 as usize).is_none() {
            return Err(DeviceError::UnknownBuffer(frame.pass_constants.0).into());
        }
        self.recording = Some(RecordedFrame {
            begin: *frame,
            commands: Vec::new(),
        });
        self.current_layer = None;
        Ok(())
    }

    fn set_layer(&mut self, layer: RenderLayer) -> MoatResult<()> {
        let frame = self.recording.as_mut().ok_or(DeviceError::NotRecording)?;
        frame.commands.push(Command::SetLayer(layer));
        self.current_layer = Some(layer);
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> MoatResult<()> {
        let layer = self.current_layer.ok_or(PreconditionError::NoLayer)?;
        if layer.topology() != call.topology {
            return Err(PreconditionError::TopologyMismatch {
                layer,
                topology: call.topology,
            }
            .into());
        }
        for buffer in [
            call.vertex_buffer,
            call.index_buffer,
            call.object.buffer,
            call.material.buffer,
        ] {
            if self.buffers.get(buffer.0 as usize).is_none() {
                return Err(DeviceError::UnknownBuffer(buffer.0).into());
            }
        }
        if self.textures.get(call.texture.0 as usize).is_none() {
            return Err(DeviceError::UnknownTexture(call.texture.0).into());
        }
        let frame = self.recording.as_mut().ok_or(DeviceError::NotRecording)?;
        frame.commands.push(Command::Draw(*call));
        Ok(())
    }

    fn submit(&mut self) -> MoatResult<()> {
        if let Some(reason) = &self.lost {
            return Err(DeviceError::SubmitFailed(reason.clone()).into());
        }
        let frame = self.recording.take().ok_or(DeviceError::NotRecording)?;
        self.current_layer = None;
        self.last_frame = Some(frame);
        self.frames_submitted += 1;
        Ok(())
    }

    fn signal_fence(&mut self) -> Result<FenceValue, DeviceError> {
        if let Some(reason) = &self.lost {
            return Err(DeviceError::DeviceLost(reason.clone()));
        }
        self.last_signaled = self.last_signaled.next();
        self.in_flight.push_back(self.last_signaled);
        while self.in_flight.len() > self.latency {
            if let Some(done) = self.in_flight.pop_front() {
                self.completed = done;
            }
        }
        Ok(self.last_signaled)
    }

    fn completed_fence(&self) -> FenceValue {
        self.completed
    }

    fn wait_fence(&mut self, value: FenceValue) -> Result<(), DeviceError> {
        self.waits += 1;
        if self.completed >= value {
            return Ok(());
        }
        if let Some(reason) = &self.lost {
            return Err(DeviceError::DeviceLost(reason.clone()));
        }
        if value > self.last_signaled {
            // Nothing will ever signal it: the real device would hang here.
            return Err(DeviceError::FenceWait {
                fence: value.0,
                completed: self.completed.0,
                reason: format!("fence never signaled (last signaled {})", self.last_signaled.0),
            });
        }
        self.retire_through(value);
        Ok(())
    }
}
