//! GPU device boundary.
//!
//! This module is responsible for:
//! - the [`GpuBackend`] trait the renderer is written against
//! - epoch-tagged handles for every backend object
//! - a wgpu implementation and an in-memory recording implementation
//! - render-surface liveness tracking

mod backend;
mod gpu;
mod handles;
mod init;
mod recording;
mod surface;
mod table;

pub use backend::{
    Capabilities, ClearColor, DeviceProvider, DrawCommand, DrawCount, FramePass, GeometryUpload,
    GpuBackend, PipelineDescriptor, UniformBufferDesc,
};
pub use gpu::{WgpuBackend, WgpuProvider};
pub use handles::{BindGroupHandle, BufferHandle, DeviceEpoch, GeometryHandle, PipelineHandle};
pub use init::WgpuInit;
pub use recording::{RecordedWrite, RecordingBackend, RecordingCounters, RecordingProvider};
pub use surface::{RenderSurface, SurfaceInfo, SurfaceWatch};
pub use table::ResourceTable;
