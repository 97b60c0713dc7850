//! wgpu implementation of [`RenderBackend`].
//!
//! Renders offscreen into a color + depth target. Draws are recorded into a
//! command list between `begin_frame` and `submit`, then replayed inside one
//! render pass. Constant buffers are laid out with a 256-byte stride and
//! bound with dynamic offsets. Fences map onto queue submissions: a fence
//! value is tied to the latest submission index and completes through
//! `Queue::on_submitted_work_done`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use moat_core::constants::{CONSTANT_BUFFER_ALIGNMENT, MAX_LIGHTS};
use moat_core::{
    BufferHandle, DeviceError, FenceValue, MoatResult, PreconditionError, RenderLayer,
    TextureHandle, Topology,
};
use moat_scene::{SpriteVertex, Vertex};
use wgpu::util::DeviceExt;

use crate::backend::{check_write, BufferDesc, BufferUsage, ConstantKind, DrawCall, FrameBegin, RenderBackend};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Corners emitted per sprite instance by `vs_sprite`.
const SPRITE_CORNERS: u32 = 6;

fn align_up(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

struct GpuBuffer {
    desc: BufferDesc,
    buffer: wgpu::Buffer,
    /// Byte distance between elements.
    stride: u64,
    /// Constant buffers only.
    bind_group: Option<wgpu::BindGroup>,
}

struct GpuTexture {
    #[allow(dead_code)] // Owns the allocation the bind group views.
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

enum GpuCommand {
    SetLayer(RenderLayer),
    Draw(DrawCall),
}

struct Recording {
    begin: FrameBegin,
    commands: Vec<GpuCommand>,
}

struct PendingFence {
    value: FenceValue,
    submission: Option<wgpu::SubmissionIndex>,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    size: (u32, u32),
    #[allow(dead_code)] // Owns the allocation behind `color_view`.
    color_target: wgpu::Texture,
    color_view: wgpu::TextureView,
    #[allow(dead_code)] // Owns the allocation behind `depth_view`.
    depth_target: wgpu::Texture,
    depth_view: wgpu::TextureView,
    pass_bgl: wgpu::BindGroupLayout,
    object_bgl: wgpu::BindGroupLayout,
    material_bgl: wgpu::BindGroupLayout,
    texture_bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    /// Indexed by [`RenderLayer::index`].
    pipelines: [wgpu::RenderPipeline; RenderLayer::COUNT],
    buffers: Vec<GpuBuffer>,
    textures: Vec<GpuTexture>,
    recording: Option<Recording>,
    current_layer: Option<RenderLayer>,
    last_submission: Option<wgpu::SubmissionIndex>,
    pending: VecDeque<PendingFence>,
    last_signaled: FenceValue,
    completed: Arc<AtomicU64>,
    lost: Arc<Mutex<Option<String>>>,
}

impl WgpuBackend {
    /// Bring up a headless device with an offscreen target of `width` x `height`.
    pub fn new_headless(width: u32, height: u32) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DeviceError::Init("no suitable GPU adapter found".into()))?;

        let adapter_name = adapter.get_info().name;
        log::info!("Using adapter: {adapter_name}");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("moat-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| DeviceError::Init(format!("failed to create device: {e}")))?;

        Ok(Self::from_device(device, queue, adapter_name, width, height))
    }

    /// Build all pipelines and targets on an existing device.
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_name: String,
        width: u32,
        height: u32,
    ) -> Self {
        let lost = Arc::new(Mutex::new(None));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("device lost ({reason:?}): {message}");
            if let Ok(mut slot) = lost_flag.lock() {
                *slot = Some(message);
            }
        });

        // Inject constants so the shader arrays match the Rust structs.
        let constants_preamble = format!("const MAX_LIGHTS: u32 = {}u;\n", MAX_LIGHTS);
        let scene_wgsl = include_str!("../../../shaders/scene.wgsl");
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene-shader"),
            source: wgpu::ShaderSource::Wgsl(format!("{constants_preamble}\n{scene_wgsl}").into()),
        });

        let uniform_entry = |dynamic: bool| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: dynamic,
                min_binding_size: None,
            },
            count: None,
        };
        let pass_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pass-bgl"),
            entries: &[uniform_entry(false)],
        });
        let object_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bgl"),
            entries: &[uniform_entry(true)],
        });
        let material_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-bgl"),
            entries: &[uniform_entry(true)],
        });
        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("diffuse-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene-pipeline-layout"),
            bind_group_layouts: &[&pass_bgl, &object_bgl, &material_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });

        // DRAW_ORDER is also index order.
        let pipelines = RenderLayer::DRAW_ORDER.map(|layer| Self::create_layer_pipeline(&device, &layout, &module, layer));

        let (color_target, color_view) = Self::create_target(&device, "color-target", COLOR_FORMAT, width, height);
        let (depth_target, depth_view) = Self::create_target(&device, "depth-target", DEPTH_FORMAT, width, height);

        log::info!("WgpuBackend: {width}x{height} target, {} layer pipelines", pipelines.len());

        Self {
            device,
            queue,
            adapter_name,
            size: (width, height),
            color_target,
            color_view,
            depth_target,
            depth_view,
            pass_bgl,
            object_bgl,
            material_bgl,
            texture_bgl,
            sampler,
            pipelines,
            buffers: Vec::new(),
            textures: Vec::new(),
            recording: None,
            current_layer: None,
            last_submission: None,
            pending: VecDeque::new(),
            last_signaled: FenceValue::ZERO,
            completed: Arc::new(AtomicU64::new(0)),
            lost,
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    fn create_target(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    fn create_layer_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        module: &wgpu::ShaderModule,
        layer: RenderLayer,
    ) -> wgpu::RenderPipeline {
        const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
        const SPRITE_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

        // Points are expanded per instance, so the sprite pipeline rasterizes triangles.
        let (vs_entry, vertex_layout) = match layer.topology() {
            Topology::TriangleList => (
                "vs_main",
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                },
            ),
            Topology::PointList => (
                "vs_sprite",
                wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<SpriteVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &SPRITE_ATTRIBUTES,
                },
            ),
        };
        let fs_entry = match layer {
            RenderLayer::Opaque | RenderLayer::Transparent => "fs_main",
            RenderLayer::AlphaTested | RenderLayer::AlphaTestedSprites => "fs_alpha_tested",
        };
        let transparent = layer == RenderLayer::Transparent;

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{layer:?}-pipeline")),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some(vs_entry),
                buffers: &[vertex_layout],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: !transparent,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some(fs_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: transparent.then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        })
    }

    fn buffer(&self, buffer: BufferHandle) -> Result<&GpuBuffer, DeviceError> {
        self.buffers
            .get(buffer.0 as usize)
            .ok_or(DeviceError::UnknownBuffer(buffer.0))
    }

    fn lost_reason(&self) -> Option<String> {
        self.lost.lock().ok().and_then(|slot| slot.clone())
    }

    fn completed_value(&self) -> FenceValue {
        FenceValue(self.completed.load(Ordering::Acquire))
    }

    fn dynamic_offset(&self, binding: crate::backend::ConstantBinding) -> Result<(&wgpu::BindGroup, u32), DeviceError> {
        let b = self.buffer(binding.buffer)?;
        let group = b.bind_group.as_ref().ok_or(DeviceError::UnknownBuffer(binding.buffer.0))?;
        Ok((group, (u64::from(binding.index) * b.stride) as u32))
    }

    /// Forget fences the GPU has already passed.
    fn prune_completed(&mut self) {
        let completed = self.completed_value();
        self.pending.retain(|p| p.value > completed);
    }

    /// Replay the recorded commands into one render pass.
    fn encode(&self, recording: &Recording) -> MoatResult<wgpu::CommandBuffer> {
        let pass_group = self
            .buffer(recording.begin.pass_constants)?
            .bind_group
            .as_ref()
            .ok_or(DeviceError::UnknownBuffer(recording.begin.pass_constants.0))?;
        let [r, g, b, a] = recording.begin.clear_color.map(f64::from);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, pass_group, &[]);

            for command in &recording.commands {
                match command {
                    GpuCommand::SetLayer(layer) => pass.set_pipeline(&self.pipelines[layer.index()]),
                    GpuCommand::Draw(call) => {
                        let (object_group, object_offset) = self.dynamic_offset(call.object)?;
                        let (material_group, material_offset) = self.dynamic_offset(call.material)?;
                        let texture = self
                            .textures
                            .get(call.texture.0 as usize)
                            .ok_or(DeviceError::UnknownTexture(call.texture.0))?;
                        pass.set_bind_group(1, object_group, &[object_offset]);
                        pass.set_bind_group(2, material_group, &[material_offset]);
                        pass.set_bind_group(3, &texture.bind_group, &[]);
                        pass.set_vertex_buffer(0, self.buffer(call.vertex_buffer)?.buffer.slice(..));

                        match call.topology {
                            Topology::TriangleList => {
                                pass.set_index_buffer(
                                    self.buffer(call.index_buffer)?.buffer.slice(..),
                                    wgpu::IndexFormat::Uint16,
                                );
                                let first = call.start_index;
                                pass.draw_indexed(first..first + call.index_count, call.base_vertex, 0..1);
                            }
                            // Sprite index buffers enumerate their points in order, so the
                            // index range addresses instances directly.
                            Topology::PointList => {
                                let first = (i64::from(call.start_index) + i64::from(call.base_vertex)).max(0) as u32;
                                pass.draw(0..SPRITE_CORNERS, first..first + call.index_count);
                            }
                        }
                    }
                }
            }
        }
        Ok(encoder.finish())
    }
}

impl RenderBackend for WgpuBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
        let (usage, stride) = match desc.usage {
            BufferUsage::Constant(_) => (
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                align_up(desc.element_size as u64, CONSTANT_BUFFER_ALIGNMENT),
            ),
            BufferUsage::Vertex => (
                wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                desc.element_size as u64,
            ),
            BufferUsage::Index => (
                wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                desc.element_size as u64,
            ),
        };
        let size = align_up((stride * desc.capacity as u64).max(1), wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        let bind_group = match desc.usage {
            BufferUsage::Constant(kind) => {
                let (layout, binding_size) = match kind {
                    ConstantKind::Pass => (&self.pass_bgl, None),
                    ConstantKind::Object => (&self.object_bgl, wgpu::BufferSize::new(desc.element_size as u64)),
                    ConstantKind::Material => (&self.material_bgl, wgpu::BufferSize::new(desc.element_size as u64)),
                };
                Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&desc.label),
                    layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &buffer,
                            offset: 0,
                            size: binding_size,
                        }),
                    }],
                }))
            }
            BufferUsage::Vertex | BufferUsage::Index => None,
        };

        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(GpuBuffer {
            desc: desc.clone(),
            buffer,
            stride,
            bind_group,
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
        if let BufferUsage::Constant(_) = desc.usage {
            let handle = self.create_buffer(desc)?;
            for (i, element) in contents.chunks_exact(desc.element_size.max(1)).enumerate() {
                self.write_at(handle, i, element)?;
            }
            return Ok(handle);
        }

        let usage = match desc.usage {
            BufferUsage::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            _ => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&desc.label),
            contents,
            usage,
        });
        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(GpuBuffer {
            desc: desc.clone(),
            buffer,
            stride: desc.element_size as u64,
            bind_group: None,
        });
        Ok(handle)
    }

    fn write_at(&mut self, buffer: BufferHandle, index: usize, payload: &[u8]) -> MoatResult<()> {
        let b = self.buffer(buffer)?;
        check_write(&b.desc, index, payload.len(), true)?;
        self.queue.write_buffer(&b.buffer, index as u64 * b.stride, payload);
        Ok(())
    }

    fn write_slice(&mut self, buffer: BufferHandle, first: usize, payload: &[u8]) -> MoatResult<()> {
        let b = self.buffer(buffer)?;
        let count = check_write(&b.desc, first, payload.len(), false)?;
        if b.stride == b.desc.element_size as u64 {
            self.queue.write_buffer(&b.buffer, first as u64 * b.stride, payload);
        } else {
            for (i, element) in payload.chunks_exact(b.desc.element_size).take(count).enumerate() {
                self.queue.write_buffer(&b.buffer, (first + i) as u64 * b.stride, element);
            }
        }
        Ok(())
    }

    fn create_texture(&mut self, label: &str, width: u32, height: u32, rgba: &[u8]) -> MoatResult<TextureHandle> {
        let expected = (width * height * 4) as usize;
        if rgba.len() != expected {
            return Err(PreconditionError::SizeMismatch {
                what: "texture pixels",
                expected,
                actual: rgba.len(),
            }
            .into());
        }
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(GpuTexture { texture, bind_group });
        Ok(handle)
    }

    fn begin_frame(&mut self, frame: &FrameBegin) -> MoatResult<()> {
        if self.recording.is_some() {
            return Err(DeviceError::AlreadyRecording.into());
        }
        self.buffer(frame.pass_constants)?;
        self.recording = Some(Recording {
            begin: *frame,
            commands: Vec::new(),
        });
        self.current_layer = None;
        Ok(())
    }

    fn set_layer(&mut self, layer: RenderLayer) -> MoatResult<()> {
        let recording = self.recording.as_mut().ok_or(DeviceError::NotRecording)?;
        recording.commands.push(GpuCommand::SetLayer(layer));
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
        for buffer in [call.vertex_buffer, call.index_buffer] {
            self.buffer(buffer)?;
        }
        for binding in [call.object, call.material] {
            self.dynamic_offset(binding)?;
        }
        if self.textures.get(call.texture.0 as usize).is_none() {
            return Err(DeviceError::UnknownTexture(call.texture.0).into());
        }
        let recording = self.recording.as_mut().ok_or(DeviceError::NotRecording)?;
        recording.commands.push(GpuCommand::Draw(*call));
        Ok(())
    }

    fn submit(&mut self) -> MoatResult<()> {
        if let Some(reason) = self.lost_reason() {
            return Err(DeviceError::SubmitFailed(reason).into());
        }
        let recording = self.recording.take().ok_or(DeviceError::NotRecording)?;
        self.current_layer = None;
        let commands = self.encode(&recording)?;
        self.last_submission = Some(self.queue.submit(std::iter::once(commands)));
        Ok(())
    }

    fn signal_fence(&mut self) -> Result<FenceValue, DeviceError> {
        if let Some(reason) = self.lost_reason() {
            return Err(DeviceError::DeviceLost(reason));
        }
        self.prune_completed();
        let value = self.last_signaled.next();
        self.last_signaled = value;

        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value.0, Ordering::AcqRel);
        });
        self.pending.push_back(PendingFence {
            value,
            submission: self.last_submission.clone(),
        });
        Ok(value)
    }

    fn completed_fence(&self) -> FenceValue {
        // Polling runs any submitted-work callbacks that are ready.
        let _ = self.device.poll(wgpu::Maintain::Poll);
        self.completed_value()
    }

    fn wait_fence(&mut self, value: FenceValue) -> Result<(), DeviceError> {
        if self.completed_fence() >= value {
            self.pending.retain(|p| p.value > value);
            return Ok(());
        }
        if let Some(reason) = self.lost_reason() {
            return Err(DeviceError::DeviceLost(reason));
        }
        let Some(pending) = self.pending.iter().find(|p| p.value >= value) else {
            return Err(DeviceError::FenceWait {
                fence: value.0,
                completed: self.completed_value().0,
                reason: "fence was never signaled".into(),
            });
        };

        let maintain = match &pending.submission {
            Some(index) => wgpu::Maintain::WaitForSubmissionIndex(index.clone()),
            None => wgpu::Maintain::Wait,
        };
        let _ = self.device.poll(maintain);
        // The wait can return before the done-callback has been invoked.
        let _ = self.device.poll(wgpu::Maintain::Poll);

        let completed = self.completed_value();
        if completed < value {
            return Err(DeviceError::FenceWait {
                fence: value.0,
                completed: completed.0,
                reason: self
                    .lost_reason()
                    .unwrap_or_else(|| "device returned before the fence completed".into()),
            });
        }
        self.pending.retain(|p| p.value > value);
        Ok(())
    }
}

#[cfg(all(test, feature = "gpu_tests"))]
mod tests {
    use super::*;
    use crate::uniforms::{MaterialConstants, ObjectConstants, PassConstants};
    use moat_core::constants::DEFAULT_FRAME_RESOURCES;

    fn backend() -> WgpuBackend {
        WgpuBackend::new_headless(64, 64).expect("GPU adapter required for gpu_tests")
    }

    #[test]
    fn test_fence_completes_after_wait() {
        let mut gpu = backend();
        let pass = gpu
            .create_buffer(&BufferDesc::new(
                "pass",
                BufferUsage::Constant(ConstantKind::Pass),
                std::mem::size_of::<PassConstants>(),
                1,
            ))
            .expect("pass buffer");
        gpu.write_at(pass, 0, bytemuck::bytes_of(&<PassConstants as bytemuck::Zeroable>::zeroed()))
            .expect("write pass");
        gpu.begin_frame(&FrameBegin {
            slot: 0,
            pass_constants: pass,
            clear_color: [0.7, 0.7, 0.7, 1.0],
        })
        .expect("begin");
        gpu.submit().expect("submit");
        let fence = gpu.signal_fence().expect("signal");
        gpu.wait_fence(fence).expect("wait");
        assert!(gpu.completed_fence() >= fence);
    }

    #[test]
    fn test_completed_fences_are_forgotten_without_waiting() {
        let mut gpu = backend();
        let pass = gpu
            .create_buffer(&BufferDesc::new(
                "pass",
                BufferUsage::Constant(ConstantKind::Pass),
                std::mem::size_of::<PassConstants>(),
                1,
            ))
            .expect("pass buffer");
        gpu.write_at(pass, 0, bytemuck::bytes_of(&<PassConstants as bytemuck::Zeroable>::zeroed()))
            .expect("write pass");
        for _ in 0..64 {
            gpu.begin_frame(&FrameBegin {
                slot: 0,
                pass_constants: pass,
                clear_color: [0.0; 4],
            })
            .expect("begin");
            gpu.submit().expect("submit");
            gpu.signal_fence().expect("signal");
            // Let the GPU catch up without going through wait_fence.
            let _ = gpu.device.poll(wgpu::Maintain::Wait);
            assert!(gpu.pending.len() <= DEFAULT_FRAME_RESOURCES, "{} fences pending", gpu.pending.len());
        }
        assert_eq!(gpu.completed_fence(), FenceValue(64));
    }

    #[test]
    fn test_wait_on_unsignaled_fence_fails() {
        let mut gpu = backend();
        let err = gpu.wait_fence(FenceValue(5)).expect_err("never signaled");
        assert!(matches!(err, DeviceError::FenceWait { fence: 5, .. }));
    }

    #[test]
    fn test_constant_stride_is_aligned() {
        let mut gpu = backend();
        let objects = gpu
            .create_buffer(&BufferDesc::new(
                "objects",
                BufferUsage::Constant(ConstantKind::Object),
                std::mem::size_of::<ObjectConstants>(),
                4,
            ))
            .expect("objects");
        let materials = gpu
            .create_buffer(&BufferDesc::new(
                "materials",
                BufferUsage::Constant(ConstantKind::Material),
                std::mem::size_of::<MaterialConstants>(),
                2,
            ))
            .expect("materials");
        assert_eq!(gpu.buffer(objects).expect("objects").stride, CONSTANT_BUFFER_ALIGNMENT);
        assert_eq!(gpu.buffer(materials).expect("materials").stride, CONSTANT_BUFFER_ALIGNMENT);
        let (_, offset) = gpu
            .dynamic_offset(crate::backend::ConstantBinding {
                buffer: objects,
                index: 3,
            })
            .expect("offset");
        assert_eq!(offset as u64, 3 * CONSTANT_BUFFER_ALIGNMENT);
    }

    #[test]
    fn test_draw_rejects_wrong_topology() {
        let mut gpu = backend();
        let pass = gpu
            .create_buffer(&BufferDesc::new(
                "pass",
                BufferUsage::Constant(ConstantKind::Pass),
                std::mem::size_of::<PassConstants>(),
                1,
            ))
            .expect("pass");
        gpu.begin_frame(&FrameBegin {
            slot: 0,
            pass_constants: pass,
            clear_color: [0.0; 4],
        })
        .expect("begin");
        gpu.set_layer(RenderLayer::AlphaTestedSprites).expect("layer");
        let call = DrawCall {
            vertex_buffer: pass,
            index_buffer: pass,
            topology: Topology::TriangleList,
            index_count: 3,
            start_index: 0,
            base_vertex: 0,
            object: crate::backend::ConstantBinding { buffer: pass, index: 0 },
            material: crate::backend::ConstantBinding { buffer: pass, index: 0 },
            texture: TextureHandle(0),
        };
        let err = gpu.draw(&call).expect_err("topology mismatch");
        assert!(matches!(
            err,
            moat_core::MoatError::Precondition(PreconditionError::TopologyMismatch { .. })
        ));
    }
}
