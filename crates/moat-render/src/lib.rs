//! Frame-resource ring, constant synchronization and draw dispatch on top of
//! a backend abstraction. [`headless::HeadlessBackend`] runs everywhere;
//! [`wgpu_backend::WgpuBackend`] needs an adapter.

pub mod backend;
pub mod dispatch;
pub mod frame_ring;
pub mod headless;
pub mod sync;
pub mod uniforms;
#[cfg(feature = "backend_wgpu")]
pub mod wgpu_backend;

#[cfg(test)]
mod test_harness;

pub use backend::{BufferDesc, BufferUsage, ConstantBinding, ConstantKind, DrawCall, FrameBegin, RenderBackend};
pub use dispatch::{DispatchStats, RenderItemDispatcher};
pub use frame_ring::{FrameResource, FrameResourceRing, FrameSizes};
pub use headless::HeadlessBackend;
pub use sync::{ConstantSync, SyncStats};
pub use uniforms::{Fog, GpuLight, MaterialConstants, ObjectConstants, PassConstants, PassFrame};
#[cfg(feature = "backend_wgpu")]
pub use wgpu_backend::WgpuBackend;
