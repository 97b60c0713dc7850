//! Single source of truth for shared constants.
//! Values that also appear in `shaders/scene.wgsl` are marked; keep both in sync.

/// Number of frame resources the CPU may have in flight ahead of the GPU.
pub const DEFAULT_FRAME_RESOURCES: usize = 3;

/// A ring of one slot would serialize CPU and GPU, so two is the floor.
pub const MIN_FRAME_RESOURCES: usize = 2;

/// Maximum lights in the pass constants. Must match MAX_LIGHTS in scene.wgsl.
pub const MAX_LIGHTS: usize = 16;

/// Dynamic-offset alignment for constant buffers (wgpu default
/// `min_uniform_buffer_offset_alignment`).
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Wave and static meshes use 16-bit indices, so vertex counts must stay below this.
pub const MAX_INDEXED_VERTICES: usize = 0xFFFF;

/// Simulated seconds between random wave disturbances.
pub const DISTURB_INTERVAL_S: f32 = 0.25;

/// Inclusive disturbance magnitude range.
pub const DISTURB_MIN_MAGNITUDE: f32 = 0.2;
pub const DISTURB_MAX_MAGNITUDE: f32 = 0.5;

/// Rows/columns kept clear of random disturbances at each grid edge.
pub const DISTURB_EDGE_MARGIN: usize = 4;

/// Orbit camera radius limits in world units.
pub const MIN_CAMERA_RADIUS: f32 = 5.0;
pub const MAX_CAMERA_RADIUS: f32 = 150.0;

/// The polar angle is kept this far away from both poles (radians).
pub const CAMERA_POLE_MARGIN: f32 = 0.1;

/// Primary drag: a quarter degree of orbit per pixel.
pub const ORBIT_RADIANS_PER_PIXEL: f32 = 0.25 * std::f32::consts::PI / 180.0;

/// Secondary drag: world units of zoom per pixel.
pub const ZOOM_UNITS_PER_PIXEL: f32 = 0.2;

/// Slack applied when comparing accumulated simulation time against the
/// fixed step, so that chunked ticks summing to one step trigger it.
pub const TIME_ACCUMULATOR_EPSILON: f32 = 1.0e-6;
