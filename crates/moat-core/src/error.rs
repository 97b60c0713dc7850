use thiserror::Error;

/// Bad construction-time parameters. Never recoverable at runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("grid must have at least one row and one column (got {rows}x{cols})")]
    EmptyGrid { rows: usize, cols: usize },

    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("unstable wave constants: speed {speed} exceeds limit {limit} for dx={spatial_step}, dt={time_step}, damping={damping}")]
    UnstableWave {
        speed: f32,
        limit: f32,
        spatial_step: f32,
        time_step: f32,
        damping: f32,
    },

    #[error("frame resource ring needs at least {min} slots (got {got})")]
    TooFewFrameResources { min: usize, got: usize },

    #[error("mesh has {0} vertices, 16-bit indices address at most 65535")]
    TooManyVertices(usize),

    #[error("disturbance margin {margin} leaves no interior in a {rows}x{cols} grid")]
    DisturbMargin {
        margin: usize,
        rows: usize,
        cols: usize,
    },

    #[error("failed to parse {what}: {message}")]
    Parse { what: &'static str, message: String },

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },
}

/// Backend or device failure. Fatal to the current run; never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("fence wait for value {fence} failed (completed {completed}): {reason}")]
    FenceWait {
        fence: u64,
        completed: u64,
        reason: String,
    },

    #[error("device lost: {0}")]
    DeviceLost(String),

    #[error("command submission failed: {0}")]
    SubmitFailed(String),

    #[error("device initialization failed: {0}")]
    Init(String),

    #[error("unknown buffer handle {0}")]
    UnknownBuffer(u32),

    #[error("unknown texture handle {0}")]
    UnknownTexture(u32),

    #[error("no frame is being recorded")]
    NotRecording,

    #[error("a frame is already being recorded")]
    AlreadyRecording,
}

/// A caller broke a documented precondition. Rejected at the call boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreconditionError {
    #[error("disturb at ({row}, {col}) is outside the interior of a {rows}x{cols} grid")]
    DisturbOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("time step must be finite and non-negative (got {0})")]
    InvalidTimeStep(f32),

    #[error("{what}: expected {expected}, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("write of {count} element(s) at index {index} exceeds capacity {capacity}")]
    IndexOutOfRange {
        index: usize,
        count: usize,
        capacity: usize,
    },

    #[error("stale {kind} handle {index}")]
    StaleHandle { kind: &'static str, index: usize },

    #[error("draw with {topology:?} topology issued in layer {layer:?}")]
    TopologyMismatch {
        layer: crate::types::RenderLayer,
        topology: crate::types::Topology,
    },

    #[error("draw issued before a render layer was selected")]
    NoLayer,

    #[error("fence {new} recorded for slot {slot} is older than its previous fence {old}")]
    FenceRegression { slot: usize, old: u64, new: u64 },
}

/// Top-level error surfaced to the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoatError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

impl MoatError {
    /// Device failures end the run; the host should tear down rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MoatError::Device(_))
    }
}

pub type MoatResult<T> = Result<T, MoatError>;
