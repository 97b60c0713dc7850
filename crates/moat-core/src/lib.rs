pub mod constants;
pub mod error;
pub mod math;
pub mod types;

pub use error::{ConfigError, DeviceError, MoatError, MoatResult, PreconditionError};
pub use types::{
    BufferHandle, FenceValue, Generation, MatrixLayout, RenderLayer, TextureHandle, Topology,
};
