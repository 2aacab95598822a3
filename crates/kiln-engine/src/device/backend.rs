//! The GPU backend boundary.
//!
//! Everything above this trait (allocator, caches, scheduler, lifecycle) is
//! backend-agnostic and talks to the GPU only through typed, epoch-tagged
//! handles. A backend is acquired asynchronously through a [`DeviceProvider`]
//! and injected into the renderer at construction.

use std::future::Future;

use crate::error::{BackendError, DeviceLostError, InitializationError};
use crate::layout::SlotOffset;
use crate::render::pipeline_key::{BindGroupLayoutKey, PipelineSignature};
use crate::shader::ShaderProgram;

use super::{BindGroupHandle, BufferHandle, DeviceEpoch, GeometryHandle, PipelineHandle};

/// Device limits relevant to this layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub min_uniform_buffer_offset_alignment: u32,
    pub max_uniform_buffer_binding_size: u64,
    pub max_buffer_size: u64,
    pub max_vertex_attributes: u32,
    pub max_texture_dimension_2d: u32,
}

impl Capabilities {
    pub fn from_limits(limits: &wgpu::Limits) -> Self {
        Self {
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_uniform_buffer_binding_size: u64::from(limits.max_uniform_buffer_binding_size),
            max_buffer_size: limits.max_buffer_size,
            max_vertex_attributes: limits.max_vertex_attributes,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
        }
    }
}

impl Default for Capabilities {
    /// WebGPU default limits.
    fn default() -> Self {
        Self::from_limits(&wgpu::Limits::default())
    }
}

/// RGBA clear color in linear space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClearColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl ClearColor {
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);

    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r,
            g: self.g,
            b: self.b,
            a: self.a,
        }
    }
}

// ── descriptors ───────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone)]
pub struct UniformBufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
}

#[derive(Debug, Copy, Clone)]
pub struct PipelineDescriptor<'a> {
    pub label: &'a str,
    pub signature: &'a PipelineSignature,
    pub program: &'a ShaderProgram,
}

#[derive(Debug, Copy, Clone)]
pub struct GeometryUpload<'a> {
    pub label: &'a str,
    pub vertices: &'a [u8],
    pub indices: Option<&'a [u32]>,
}

/// Element count of one draw.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawCount {
    Indexed { index_count: u32 },
    NonIndexed { vertex_count: u32 },
}

impl DrawCount {
    pub fn triangles(self) -> u64 {
        match self {
            DrawCount::Indexed { index_count } => u64::from(index_count / 3),
            DrawCount::NonIndexed { vertex_count } => u64::from(vertex_count / 3),
        }
    }

    /// Nothing to draw. Such draws must never reach the backend.
    pub fn is_empty(self) -> bool {
        matches!(
            self,
            DrawCount::Indexed { index_count: 0 } | DrawCount::NonIndexed { vertex_count: 0 }
        )
    }
}

/// One fully resolved draw: pipeline, the shared bind group at this draw's
/// dynamic offset, and geometry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DrawCommand {
    pub pipeline: PipelineHandle,
    pub bind_group: BindGroupHandle,
    pub dynamic_offset: SlotOffset,
    pub geometry: GeometryHandle,
    pub count: DrawCount,
}

/// Recorded work for one frame, encoded into a single render pass.
#[derive(Debug, Copy, Clone)]
pub struct FramePass<'a> {
    pub label: &'a str,
    pub clear_color: ClearColor,
    pub draws: &'a [DrawCommand],
}

// ── traits ────────────────────────────────────────────────────────────────

/// GPU operations consumed by the renderer.
///
/// Implementations must reject handles whose epoch differs from the current
/// device epoch with [`BackendError::StaleHandle`], and report calls made on
/// a lost device with [`BackendError::DeviceLost`].
pub trait GpuBackend {
    fn capabilities(&self) -> Capabilities;

    /// Epoch of the live device.
    fn epoch(&self) -> DeviceEpoch;

    fn create_uniform_buffer(
        &mut self,
        desc: &UniformBufferDesc<'_>,
    ) -> Result<BufferHandle, BackendError>;

    /// Queues a write of `data` at `offset`. Ordered before the next `submit`.
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Creates a bind group exposing `buffer` with dynamic-offset support.
    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutKey,
        buffer: BufferHandle,
    ) -> Result<BindGroupHandle, BackendError>;

    fn create_render_pipeline(
        &mut self,
        desc: &PipelineDescriptor<'_>,
    ) -> Result<PipelineHandle, BackendError>;

    fn upload_geometry(&mut self, upload: &GeometryUpload<'_>)
    -> Result<GeometryHandle, BackendError>;

    /// Frees the buffers behind `geometry`. Draws already submitted are not
    /// affected.
    fn release_geometry(&mut self, geometry: GeometryHandle) -> Result<(), BackendError>;

    /// Encodes `pass` into one render pass and submits it.
    fn submit(&mut self, pass: &FramePass<'_>) -> Result<(), BackendError>;

    /// Resizes the render target. Zero sizes are ignored.
    fn resize(&mut self, width: u32, height: u32);

    /// Returns the pending device-loss signal, if the platform raised one.
    fn poll_device_lost(&mut self) -> Option<DeviceLostError>;

    /// Re-acquires a device after loss. Every object of the previous epoch is
    /// dropped; new handles are tagged with `epoch`.
    fn recreate_device(&mut self, epoch: DeviceEpoch) -> Result<(), InitializationError>;

    /// Releases every GPU object. Later calls fail with [`BackendError::Released`].
    fn release(&mut self);
}

/// Asynchronous device acquisition.
///
/// The returned future is the only suspension point of the renderer's
/// lifecycle. Dropping it abandons the acquisition; implementations must not
/// leave partially constructed state behind.
pub trait DeviceProvider {
    type Backend: GpuBackend;

    fn acquire(self) -> impl Future<Output = Result<Self::Backend, InitializationError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities_match_webgpu_limits() {
        let caps = Capabilities::default();
        assert_eq!(caps.min_uniform_buffer_offset_alignment, 256);
        assert!(caps.max_uniform_buffer_binding_size >= 16 * 1024);
    }

    #[test]
    fn triangle_count_from_draw_count() {
        assert_eq!(DrawCount::Indexed { index_count: 36 }.triangles(), 12);
        assert_eq!(DrawCount::NonIndexed { vertex_count: 3 }.triangles(), 1);
        assert_eq!(DrawCount::NonIndexed { vertex_count: 2 }.triangles(), 0);
    }
}
