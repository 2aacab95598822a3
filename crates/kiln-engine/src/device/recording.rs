//! Headless backend that records every GPU call.
//!
//! Buffer contents are kept in memory so staged uniforms can be read back, and
//! each call category is counted. Device loss, failed re-acquisition and
//! pipeline rejection can be injected to drive the recovery paths.

use crate::error::{
    BackendError, DeviceLostError, DeviceLostReason, InitializationError, ShaderCompilationError,
    ShaderStage,
};
use crate::layout::TransformUniforms;
use crate::render::pipeline_key::BindGroupLayoutKey;

use super::backend::{
    Capabilities, ClearColor, DeviceProvider, DrawCommand, DrawCount, FramePass, GeometryUpload, GpuBackend,
    PipelineDescriptor, UniformBufferDesc,
};
use super::surface::SurfaceWatch;
use super::table::ResourceTable;
use super::{BindGroupHandle, BufferHandle, DeviceEpoch, GeometryHandle, PipelineHandle};

/// Call counts since construction. Not reset by device recreation.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RecordingCounters {
    pub buffers_created: u64,
    pub buffer_writes: u64,
    pub bind_groups_created: u64,
    pub pipelines_created: u64,
    pub geometries_uploaded: u64,
    pub geometries_released: u64,
    pub submits: u64,
    pub draws: u64,
    pub recreations: u64,
}

/// One `write_buffer` call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub len: u64,
    /// Number of submits that preceded the write.
    pub submit_index: u64,
}

#[derive(Debug)]
struct RecordedBindGroup {
    layout: BindGroupLayoutKey,
    buffer: BufferHandle,
}

#[derive(Debug)]
struct RecordedGeometry {
    index_count: Option<u32>,
}

#[derive(Debug)]
pub struct RecordingBackend {
    caps: Capabilities,
    epoch: DeviceEpoch,
    size: (u32, u32),

    buffers: ResourceTable<Vec<u8>>,
    bind_groups: ResourceTable<RecordedBindGroup>,
    pipelines: ResourceTable<String>,
    geometry: ResourceTable<RecordedGeometry>,

    counters: RecordingCounters,
    writes: Vec<RecordedWrite>,
    last_draws: Vec<DrawCommand>,
    last_clear: Option<ClearColor>,

    lost: bool,
    pending_loss: Option<DeviceLostError>,
    failing_recreations: u32,
    rejected_programs: Vec<String>,
    released: bool,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::with_capabilities(Capabilities::default())
    }
}

impl RecordingBackend {
    pub fn with_capabilities(caps: Capabilities) -> Self {
        let epoch = DeviceEpoch::INITIAL;
        Self {
            caps,
            epoch,
            size: (800, 600),
            buffers: ResourceTable::new(BufferHandle::KIND, epoch),
            bind_groups: ResourceTable::new(BindGroupHandle::KIND, epoch),
            pipelines: ResourceTable::new(PipelineHandle::KIND, epoch),
            geometry: ResourceTable::new(GeometryHandle::KIND, epoch),
            counters: RecordingCounters::default(),
            writes: Vec::new(),
            last_draws: Vec::new(),
            last_clear: None,
            lost: false,
            pending_loss: None,
            failing_recreations: 0,
            rejected_programs: Vec::new(),
            released: false,
        }
    }

    // ── injection ─────────────────────────────────────────────────────────

    /// Loses the device as the platform would: every call fails with
    /// `DeviceLost` and the signal is reported by the next
    /// `poll_device_lost`.
    pub fn lose_device(&mut self, message: impl Into<String>) {
        self.lost = true;
        self.pending_loss = Some(DeviceLostError::new(DeviceLostReason::Platform, message));
    }

    /// Makes the next `n` calls to `recreate_device` fail.
    pub fn fail_next_recreations(&mut self, n: u32) {
        self.failing_recreations = n;
    }

    /// Fails pipeline creation for programs labelled `label`.
    pub fn reject_pipelines_for(&mut self, label: impl Into<String>) {
        self.rejected_programs.push(label.into());
    }

    // ── inspection ────────────────────────────────────────────────────────

    pub fn counters(&self) -> RecordingCounters {
        self.counters
    }

    pub fn writes(&self) -> &[RecordedWrite] {
        &self.writes
    }

    /// Draws of the most recent submit.
    pub fn last_draws(&self) -> &[DrawCommand] {
        &self.last_draws
    }

    pub fn last_clear_color(&self) -> Option<ClearColor> {
        self.last_clear
    }

    /// Geometry currently resident on the device.
    pub fn live_geometries(&self) -> usize {
        self.geometry.len()
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Current contents of `buffer`, if it belongs to the live epoch.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers
            .get(buffer.index(), buffer.epoch())
            .ok()
            .map(Vec::as_slice)
    }

    /// Decodes the transform stored at `offset` in `buffer`.
    pub fn read_transform(&self, buffer: BufferHandle, offset: u64) -> Option<TransformUniforms> {
        let bytes = self.buffer_contents(buffer)?;
        TransformUniforms::read_from(bytes.get(offset as usize..)?)
    }

    fn check_live(&self) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        if self.lost {
            return Err(BackendError::DeviceLost);
        }
        Ok(())
    }

    fn validate_draw(&self, draw: &DrawCommand) -> Result<(), BackendError> {
        if draw.count.is_empty() {
            return Err(BackendError::OutOfBounds {
                offset: 0,
                len: 0,
                size: 0,
            });
        }
        self.pipelines
            .get(draw.pipeline.index(), draw.pipeline.epoch())?;
        let geometry = self
            .geometry
            .get(draw.geometry.index(), draw.geometry.epoch())?;
        if let DrawCount::Indexed { index_count } = draw.count {
            let available = geometry.index_count.unwrap_or(0);
            if index_count > available {
                return Err(BackendError::OutOfBounds {
                    offset: 0,
                    len: u64::from(index_count),
                    size: u64::from(available),
                });
            }
        }
        let group = self
            .bind_groups
            .get(draw.bind_group.index(), draw.bind_group.epoch())?;
        let buffer = self
            .buffers
            .get(group.buffer.index(), group.buffer.epoch())?;

        let end = draw.dynamic_offset.as_u64() + u64::from(group.layout.binding_size);
        if end > buffer.len() as u64 {
            return Err(BackendError::OutOfBounds {
                offset: draw.dynamic_offset.as_u64(),
                len: u64::from(group.layout.binding_size),
                size: buffer.len() as u64,
            });
        }
        Ok(())
    }
}

impl GpuBackend for RecordingBackend {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn epoch(&self) -> DeviceEpoch {
        self.epoch
    }

    fn create_uniform_buffer(
        &mut self,
        desc: &UniformBufferDesc<'_>,
    ) -> Result<BufferHandle, BackendError> {
        self.check_live()?;
        if desc.size > self.caps.max_buffer_size {
            return Err(BackendError::OutOfBounds {
                offset: 0,
                len: desc.size,
                size: self.caps.max_buffer_size,
            });
        }
        let index = self.buffers.insert(vec![0; desc.size as usize]);
        self.counters.buffers_created += 1;
        Ok(BufferHandle::new(index, self.epoch))
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.check_live()?;
        let bytes = self.buffers.get_mut(buffer.index(), buffer.epoch())?;
        let end = offset + data.len() as u64;
        if end > bytes.len() as u64 {
            return Err(BackendError::OutOfBounds {
                offset,
                len: data.len() as u64,
                size: bytes.len() as u64,
            });
        }
        bytes[offset as usize..end as usize].copy_from_slice(data);
        self.counters.buffer_writes += 1;
        self.writes.push(RecordedWrite {
            buffer,
            offset,
            len: data.len() as u64,
            submit_index: self.counters.submits,
        });
        Ok(())
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutKey,
        buffer: BufferHandle,
    ) -> Result<BindGroupHandle, BackendError> {
        self.check_live()?;
        self.buffers.get(buffer.index(), buffer.epoch())?;
        let index = self.bind_groups.insert(RecordedBindGroup { layout, buffer });
        self.counters.bind_groups_created += 1;
        Ok(BindGroupHandle::new(index, self.epoch))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &PipelineDescriptor<'_>,
    ) -> Result<PipelineHandle, BackendError> {
        self.check_live()?;
        let label = desc.program.label();
        if self.rejected_programs.iter().any(|l| l == label) {
            return Err(ShaderCompilationError {
                stage: ShaderStage::Pipeline,
                label: label.to_owned(),
                source_excerpt: String::new(),
                message: "pipeline creation rejected by device".to_owned(),
            }
            .into());
        }
        let attributes = desc.signature.vertex_layout.attributes.len() as u32;
        if attributes > self.caps.max_vertex_attributes {
            return Err(ShaderCompilationError {
                stage: ShaderStage::Pipeline,
                label: label.to_owned(),
                source_excerpt: String::new(),
                message: format!(
                    "{attributes} vertex attributes exceed the device limit of {}",
                    self.caps.max_vertex_attributes
                ),
            }
            .into());
        }
        let index = self.pipelines.insert(desc.label.to_owned());
        self.counters.pipelines_created += 1;
        Ok(PipelineHandle::new(index, self.epoch))
    }

    fn upload_geometry(
        &mut self,
        upload: &GeometryUpload<'_>,
    ) -> Result<GeometryHandle, BackendError> {
        self.check_live()?;
        let index = self.geometry.insert(RecordedGeometry {
            index_count: upload.indices.map(|indices| indices.len() as u32),
        });
        self.counters.geometries_uploaded += 1;
        Ok(GeometryHandle::new(index, self.epoch))
    }

    fn release_geometry(&mut self, geometry: GeometryHandle) -> Result<(), BackendError> {
        self.check_live()?;
        self.geometry.remove(geometry.index(), geometry.epoch())?;
        self.counters.geometries_released += 1;
        Ok(())
    }

    fn submit(&mut self, pass: &FramePass<'_>) -> Result<(), BackendError> {
        self.check_live()?;
        for draw in pass.draws {
            self.validate_draw(draw)?;
        }
        self.last_draws.clear();
        self.last_draws.extend_from_slice(pass.draws);
        self.last_clear = Some(pass.clear_color);
        self.counters.submits += 1;
        self.counters.draws += pass.draws.len() as u64;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
    }

    fn poll_device_lost(&mut self) -> Option<DeviceLostError> {
        self.pending_loss.take()
    }

    fn recreate_device(&mut self, epoch: DeviceEpoch) -> Result<(), InitializationError> {
        if self.released {
            return Err(BackendError::Released.into());
        }
        if self.failing_recreations > 0 {
            self.failing_recreations -= 1;
            return Err(InitializationError::DeviceRequest(
                "device re-acquisition failed".to_owned(),
            ));
        }

        self.epoch = epoch;
        self.buffers.reset(epoch);
        self.bind_groups.reset(epoch);
        self.pipelines.reset(epoch);
        self.geometry.reset(epoch);
        self.last_draws.clear();
        self.lost = false;
        self.pending_loss = None;
        self.counters.recreations += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.buffers.reset(self.epoch);
        self.bind_groups.reset(self.epoch);
        self.pipelines.reset(self.epoch);
        self.geometry.reset(self.epoch);
        self.released = true;
    }
}

/// Provider handing out [`RecordingBackend`]s.
#[derive(Debug, Clone, Default)]
pub struct RecordingProvider {
    caps: Capabilities,
    surface: Option<SurfaceWatch>,
    no_adapter: bool,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Binds acquisition to a render surface.
    pub fn with_surface(mut self, surface: SurfaceWatch) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Simulates a machine without a usable adapter.
    pub fn without_adapter(mut self) -> Self {
        self.no_adapter = true;
        self
    }
}

impl DeviceProvider for RecordingProvider {
    type Backend = RecordingBackend;

    async fn acquire(self) -> Result<RecordingBackend, InitializationError> {
        let size = match &self.surface {
            Some(watch) => Some(watch.ensure_alive()?),
            None => None,
        };
        if self.no_adapter {
            return Err(InitializationError::NoAdapter(
                "recording provider configured without adapter".to_owned(),
            ));
        }

        let mut backend = RecordingBackend::with_capabilities(self.caps);
        if let Some(size) = size {
            backend.resize(size.width, size.height);
        }
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_device_rejects_calls_until_recreated() {
        let mut backend = RecordingBackend::default();
        let buffer = backend
            .create_uniform_buffer(&UniformBufferDesc {
                label: "u",
                size: 256,
            })
            .unwrap();

        backend.lose_device("gpu reset");
        assert_eq!(
            backend.write_buffer(buffer, 0, &[1, 2, 3]),
            Err(BackendError::DeviceLost)
        );
        assert!(backend.poll_device_lost().is_some());
        assert!(backend.poll_device_lost().is_none());

        let next = backend.epoch().next();
        backend.recreate_device(next).unwrap();
        assert!(matches!(
            backend.write_buffer(buffer, 0, &[1]),
            Err(BackendError::StaleHandle { .. })
        ));
    }

    #[test]
    fn injected_recreation_failures_are_consumed() {
        let mut backend = RecordingBackend::default();
        backend.fail_next_recreations(1);
        let next = backend.epoch().next();
        assert!(backend.recreate_device(next).is_err());
        assert!(backend.recreate_device(next).is_ok());
        assert_eq!(backend.epoch(), next);
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut backend = RecordingBackend::default();
        let buffer = backend
            .create_uniform_buffer(&UniformBufferDesc {
                label: "u",
                size: 256,
            })
            .unwrap();
        assert!(matches!(
            backend.write_buffer(buffer, 200, &[0; 64]),
            Err(BackendError::OutOfBounds { .. })
        ));
        assert_eq!(backend.counters().buffer_writes, 0);
    }

    #[test]
    fn released_backend_refuses_work() {
        let mut backend = RecordingBackend::default();
        backend.release();
        assert!(backend.is_released());
        assert_eq!(
            backend
                .create_uniform_buffer(&UniformBufferDesc { label: "u", size: 16 })
                .unwrap_err(),
            BackendError::Released
        );
    }

    #[test]
    fn provider_fails_without_adapter() {
        let result = pollster::block_on(RecordingProvider::new().without_adapter().acquire());
        assert!(matches!(result, Err(InitializationError::NoAdapter(_))));
    }
}
