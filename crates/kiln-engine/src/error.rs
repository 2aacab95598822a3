//! Error taxonomy.
//!
//! Fatal conditions ([`InitializationError`], [`DisposedError`]) are returned to
//! the caller. Everything else is recovered locally by the renderer: the
//! affected renderables are skipped, the condition is logged and counted in
//! stats, and the rest of the frame proceeds.

use thiserror::Error;

use crate::device::DeviceEpoch;
use crate::layout::LayoutError;

/// Failure to bring up (or re-acquire) the GPU device. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitializationError {
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(String),

    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),

    #[error("render surface was destroyed before initialization completed")]
    SurfaceDestroyed,

    #[error("invalid renderer configuration: {0}")]
    InvalidConfig(#[from] LayoutError),

    #[error("uniform buffer of {requested} bytes exceeds the device limit of {max} bytes")]
    BufferTooLarge { requested: u64, max: u64 },

    #[error("failed to allocate frame resources: {0}")]
    Backend(#[from] BackendError),
}

/// A frame tried to stage more draws than the buffer has slots.
///
/// Non-fatal: the draw is skipped for the frame and counted in stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("uniform capacity exceeded: slot {requested} requested, {max_slots} available")]
pub struct CapacityExceeded {
    pub requested: u32,
    pub max_slots: u32,
}

/// Pipeline stage a shader diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    /// Both modules compiled but linking them into a pipeline failed.
    Pipeline,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Pipeline => "pipeline",
        })
    }
}

/// Structured shader/pipeline compilation failure.
///
/// Attached to the material that triggered it; draws using the pipeline are
/// skipped for the frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} shader `{label}` failed to compile: {message}")]
pub struct ShaderCompilationError {
    pub stage: ShaderStage,
    pub label: String,
    /// Offending source line(s), if a location is known.
    pub source_excerpt: String,
    pub message: String,
}

/// Platform signal that the device and every handle created on it are gone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("GPU device lost ({reason}): {message}")]
pub struct DeviceLostError {
    pub reason: DeviceLostReason,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLostReason {
    /// Reported by the platform (driver reset, GPU removed, ...).
    Platform,
    /// The device was explicitly destroyed.
    Destroyed,
    /// A GPU call failed because the device had already been lost.
    DuringFrame,
    /// Forced through `Renderer::simulate_context_loss`.
    Simulated,
}

impl std::fmt::Display for DeviceLostReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DeviceLostReason::Platform => "platform",
            DeviceLostReason::Destroyed => "destroyed",
            DeviceLostReason::DuringFrame => "during frame",
            DeviceLostReason::Simulated => "simulated",
        })
    }
}

impl DeviceLostError {
    pub fn new(reason: DeviceLostReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Errors raised at the GPU backend boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("device lost")]
    DeviceLost,

    #[error("stale {kind} handle from epoch {handle_epoch} (device is at epoch {device_epoch})")]
    StaleHandle {
        kind: &'static str,
        handle_epoch: DeviceEpoch,
        device_epoch: DeviceEpoch,
    },

    #[error("unknown {kind} handle #{index}")]
    UnknownHandle { kind: &'static str, index: u32 },

    #[error("write of {len} bytes at offset {offset} exceeds buffer size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error(transparent)]
    Compilation(#[from] ShaderCompilationError),

    #[error("backend has been released")]
    Released,
}

/// Why a pipeline could not be resolved for a renderable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compilation(ShaderCompilationError),

    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for PipelineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Compilation(e) => PipelineError::Compilation(e),
            other => PipelineError::Backend(other),
        }
    }
}

/// Operation attempted on a disposed renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("renderer has been disposed")]
pub struct DisposedError;

/// Errors returned from `Renderer::render`.
///
/// Device loss is not an error here; it surfaces as a not-ready outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Disposed(#[from] DisposedError),

    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),
}
