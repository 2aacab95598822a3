//! Kiln engine crate.
//!
//! Frame-scoped GPU resource management for a WebGPU-style renderer: per-draw
//! uniform staging with one batched write per frame, one dynamic-offset bind
//! group per pipeline layout, pipeline caching, and device-loss recovery.
//!
//! The renderer is written against the [`device::GpuBackend`] trait. A wgpu
//! implementation and an in-memory recording implementation are provided.

pub mod config;
pub mod device;
pub mod error;
pub mod layout;
pub mod logging;
pub mod render;
pub mod scene;
pub mod shader;
pub mod time;

pub use config::RendererConfig;
pub use error::{
    BackendError, CapacityExceeded, DeviceLostError, DisposedError, InitializationError,
    RenderError, ShaderCompilationError,
};
pub use render::{FrameStatus, RenderOutcome, RenderStats, Renderer};
