use crate::device::{GpuBackend, UniformBufferDesc};
use crate::error::BackendError;
use crate::layout::SlotLayout;

use super::allocator::FrameUniformAllocator;
use super::bind_group::BindGroupCache;
use super::geometry_cache::GeometryCache;
use super::pipeline::RenderPipelineCache;

const UNIFORM_BUFFER_LABEL: &str = "kiln frame uniforms";

/// Everything a frame needs that lives on the device.
///
/// Owned by one renderer and mutated only from its render thread. All members
/// are tied to the current device epoch and are rebuilt together.
#[derive(Debug)]
pub struct FrameResources {
    pub allocator: FrameUniformAllocator,
    pub bind_groups: BindGroupCache,
    pub pipelines: RenderPipelineCache,
    pub geometry: GeometryCache,
}

impl FrameResources {
    /// Allocates the frame uniform buffer; caches start empty.
    pub fn create<B: GpuBackend + ?Sized>(
        backend: &mut B,
        layout: SlotLayout,
    ) -> Result<Self, BackendError> {
        let buffer = backend.create_uniform_buffer(&UniformBufferDesc {
            label: UNIFORM_BUFFER_LABEL,
            size: layout.buffer_size(),
        })?;
        log::debug!(
            "frame uniform buffer: {} slots x {} bytes",
            layout.max_slots(),
            layout.slot_size()
        );
        Ok(Self {
            allocator: FrameUniformAllocator::new(layout, buffer),
            bind_groups: BindGroupCache::new(),
            pipelines: RenderPipelineCache::new(),
            geometry: GeometryCache::new(),
        })
    }

    /// Allocates a fresh uniform buffer on the backend's current epoch and
    /// drops every cached object.
    pub fn rebuild<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), BackendError> {
        let buffer = backend.create_uniform_buffer(&UniformBufferDesc {
            label: UNIFORM_BUFFER_LABEL,
            size: self.allocator.layout().buffer_size(),
        })?;
        self.allocator.replace_buffer(buffer);
        self.invalidate();
        Ok(())
    }

    /// Drops cached bind groups, pipelines and geometry.
    pub fn invalidate(&mut self) {
        self.bind_groups.invalidate_all();
        self.pipelines.clear();
        self.geometry.invalidate_all();
    }
}
