//! Frame-scoped GPU resource management.
//!
//! A frame flows through the [`DrawScheduler`]: transforms are staged into the
//! [`FrameUniformAllocator`] and committed with one buffer write, pipelines
//! come from the [`RenderPipelineCache`], and every draw of a pipeline layout
//! shares the single bind group held by the [`BindGroupCache`], addressed by
//! a per-draw dynamic offset. The [`DeviceLifecycleManager`] rebuilds all of
//! it when the device is lost.

mod allocator;
mod bind_group;
mod geometry_cache;
mod lifecycle;
mod pipeline;
pub mod pipeline_key;
mod renderer;
mod resources;
mod scheduler;
mod stats;

pub use allocator::FrameUniformAllocator;
pub use bind_group::{BindGroupCache, BindGroupEntry};
pub use geometry_cache::{GeometryCache, GpuGeometry, DEFAULT_GEOMETRY_RETENTION};
pub use lifecycle::{DeviceLifecycleManager, DeviceState};
pub use pipeline::{PipelineEntry, RenderPipelineCache};
pub use renderer::{FrameStatus, RenderOutcome, Renderer};
pub use resources::FrameResources;
pub use scheduler::{DrawScheduler, FrameInput, FramePhase};
pub use stats::{FrameStats, RenderStats};
