use std::num::NonZeroU64;
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::error::{
    BackendError, DeviceLostError, DeviceLostReason, InitializationError, ShaderCompilationError,
    ShaderStage,
};
use crate::render::pipeline_key::BindGroupLayoutKey;

use super::backend::{
    Capabilities, DeviceProvider, DrawCount, FramePass, GeometryUpload, GpuBackend,
    PipelineDescriptor, UniformBufferDesc,
};
use super::surface::SurfaceWatch;
use super::table::ResourceTable;
use super::{BindGroupHandle, BufferHandle, DeviceEpoch, GeometryHandle, PipelineHandle, WgpuInit};

/// Acquires a [`WgpuBackend`].
///
/// Adapter and device acquisition are the only suspension points. When bound
/// to a [`SurfaceWatch`], the surface is checked after each of them and a
/// destroyed surface fails acquisition; the half-built device is dropped.
#[derive(Debug, Clone)]
pub struct WgpuProvider {
    init: WgpuInit,
    surface: Option<SurfaceWatch>,
    size: (u32, u32),
}

impl WgpuProvider {
    pub fn new(init: WgpuInit) -> Self {
        Self {
            init,
            surface: None,
            size: (800, 600),
        }
    }

    /// Render target size when no surface is bound.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width.max(1), height.max(1));
        self
    }

    pub fn with_surface(mut self, surface: SurfaceWatch) -> Self {
        self.surface = Some(surface);
        self
    }

    fn target_size(&self) -> Result<(u32, u32), InitializationError> {
        match &self.surface {
            Some(watch) => {
                let info = watch.ensure_alive()?;
                Ok((info.width.max(1), info.height.max(1)))
            }
            None => Ok(self.size),
        }
    }
}

impl DeviceProvider for WgpuProvider {
    type Backend = WgpuBackend;

    async fn acquire(self) -> Result<WgpuBackend, InitializationError> {
        self.target_size()?;

        // Use the configured backends to allow wgpu to select the platform backend.
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: self.init.backends,
            ..Default::default()
        });

        let adapter = request_adapter(&instance, &self.init).await?;
        self.target_size()?;

        let (device, queue) = request_device(&adapter, &self.init).await?;
        let size = self.target_size()?;

        log::info!(
            "acquired {} ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );
        Ok(WgpuBackend::new(
            instance,
            adapter,
            device,
            queue,
            self.init,
            size,
            DeviceEpoch::INITIAL,
        ))
    }
}

async fn request_adapter(
    instance: &wgpu::Instance,
    init: &WgpuInit,
) -> Result<wgpu::Adapter, InitializationError> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: init.power_preference,
            compatible_surface: None,
            force_fallback_adapter: init.force_fallback_adapter,
        })
        .await
        .map_err(|e| InitializationError::NoAdapter(e.to_string()))
}

async fn request_device(
    adapter: &wgpu::Adapter,
    init: &WgpuInit,
) -> Result<(wgpu::Device, wgpu::Queue), InitializationError> {
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(init.label),
            required_features: init.required_features,
            required_limits: init.required_limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(|e| InitializationError::DeviceRequest(e.to_string()))
}

/// Routes errors raised outside an error scope to the log. wgpu's default
/// handler panics.
fn log_uncaptured_errors(device: &wgpu::Device) {
    device.on_uncaptured_error(Arc::new(|err: wgpu::Error| {
        log::error!("uncaptured wgpu error: {err}");
    }));
}

/// Stores the first device-lost signal raised by wgpu.
fn watch_device_loss(device: &wgpu::Device) -> Arc<OnceLock<DeviceLostError>> {
    let cell = Arc::new(OnceLock::new());
    let sink = Arc::clone(&cell);
    device.set_device_lost_callback(move |reason, message| {
        let reason = match reason {
            wgpu::DeviceLostReason::Destroyed => DeviceLostReason::Destroyed,
            _ => DeviceLostReason::Platform,
        };
        let _ = sink.set(DeviceLostError::new(reason, message));
    });
    cell
}

// ── objects ───────────────────────────────────────────────────────────────

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
}

struct LayoutPair {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

struct RenderTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: Option<wgpu::TextureView>,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, init: &WgpuInit, (width, height): (u32, u32)) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("kiln color target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: init.color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_view = init.depth_format.map(|format| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("kiln depth target"),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        Self {
            color,
            color_view,
            depth_view,
        }
    }
}

// ── backend ───────────────────────────────────────────────────────────────

/// [`GpuBackend`] over a wgpu device, rendering into an offscreen target.
///
/// All objects live in epoch-scoped tables; recreating the device drops them
/// wholesale and later lookups with old handles fail with `StaleHandle`.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    init: WgpuInit,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: Capabilities,

    epoch: DeviceEpoch,
    lost: Arc<OnceLock<DeviceLostError>>,
    loss_reported: bool,
    released: bool,

    size: (u32, u32),
    target: RenderTarget,
    layouts: FxHashMap<BindGroupLayoutKey, LayoutPair>,

    buffers: ResourceTable<GpuBuffer>,
    bind_groups: ResourceTable<wgpu::BindGroup>,
    pipelines: ResourceTable<wgpu::RenderPipeline>,
    meshes: ResourceTable<GpuMesh>,
}

impl WgpuBackend {
    fn new(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        init: WgpuInit,
        size: (u32, u32),
        epoch: DeviceEpoch,
    ) -> Self {
        let caps = Capabilities::from_limits(&device.limits());
        let lost = watch_device_loss(&device);
        log_uncaptured_errors(&device);
        let target = RenderTarget::new(&device, &init, size);
        Self {
            instance,
            init,
            adapter,
            device,
            queue,
            caps,
            epoch,
            lost,
            loss_reported: false,
            released: false,
            size,
            target,
            layouts: FxHashMap::default(),
            buffers: ResourceTable::new(BufferHandle::KIND, epoch),
            bind_groups: ResourceTable::new(BindGroupHandle::KIND, epoch),
            pipelines: ResourceTable::new(PipelineHandle::KIND, epoch),
            meshes: ResourceTable::new(GeometryHandle::KIND, epoch),
        }
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Offscreen color target the frame pass renders into.
    pub fn color_target(&self) -> &wgpu::Texture {
        &self.target.color
    }

    /// Destroys the device as a driver reset would. The loss is reported by
    /// the next `poll_device_lost`.
    pub fn destroy_device(&self) {
        // wgpu may only run the lost callback on a later poll.
        let _ = self.lost.set(DeviceLostError::new(
            DeviceLostReason::Destroyed,
            "device destroyed by caller",
        ));
        self.device.destroy();
    }

    fn check_live(&self) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        if self.lost.get().is_some() {
            return Err(BackendError::DeviceLost);
        }
        Ok(())
    }

    fn layout_for<'a>(
        device: &wgpu::Device,
        layouts: &'a mut FxHashMap<BindGroupLayoutKey, LayoutPair>,
        key: BindGroupLayoutKey,
    ) -> &'a LayoutPair {
        layouts.entry(key).or_insert_with(|| {
            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("kiln transforms bgl"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: key.visibility.to_wgpu(),
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: NonZeroU64::new(u64::from(key.binding_size)),
                        },
                        count: None,
                    }],
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("kiln transforms pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

            LayoutPair {
                bind_group_layout,
                pipeline_layout,
            }
        })
    }
}

impl GpuBackend for WgpuBackend {
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
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index = self.buffers.insert(GpuBuffer {
            buffer,
            size: desc.size,
        });
        Ok(BufferHandle::new(index, self.epoch))
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.check_live()?;
        let target = self.buffers.get(buffer.index(), buffer.epoch())?;
        if offset + data.len() as u64 > target.size {
            return Err(BackendError::OutOfBounds {
                offset,
                len: data.len() as u64,
                size: target.size,
            });
        }
        self.queue.write_buffer(&target.buffer, offset, data);
        Ok(())
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutKey,
        buffer: BufferHandle,
    ) -> Result<BindGroupHandle, BackendError> {
        self.check_live()?;
        let source = self.buffers.get(buffer.index(), buffer.epoch())?;
        let pair = Self::layout_for(&self.device, &mut self.layouts, layout);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln transforms bind group"),
            layout: &pair.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &source.buffer,
                    offset: 0,
                    size: NonZeroU64::new(u64::from(layout.binding_size)),
                }),
            }],
        });
        let index = self.bind_groups.insert(bind_group);
        Ok(BindGroupHandle::new(index, self.epoch))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &PipelineDescriptor<'_>,
    ) -> Result<PipelineHandle, BackendError> {
        self.check_live()?;
        let signature = desc.signature;
        let program = desc.program;

        // Catches what the naga checks cannot see, such as device limits.
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pair = Self::layout_for(&self.device, &mut self.layouts, signature.layout);

        let vertex_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.label()),
            source: wgpu::ShaderSource::Wgsl(program.vertex_source().into()),
        });
        let fragment_module = if program.is_single_module() {
            None
        } else {
            Some(self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.label()),
                source: wgpu::ShaderSource::Wgsl(program.fragment_source().into()),
            }))
        };

        let attributes = signature.vertex_layout.to_wgpu_attributes();
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: signature.vertex_layout.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        let depth_stencil = self.init.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: signature.depth.write_enabled(),
            depth_compare: signature.depth.compare(),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pair.pipeline_layout),

            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(program.vertex_entry()),
                compilation_options: Default::default(),
                buffers: &vertex_buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: fragment_module.as_ref().unwrap_or(&vertex_module),
                entry_point: Some(program.fragment_entry()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.init.color_format,
                    blend: signature.blend.to_wgpu(),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: signature.topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: signature.cull.to_wgpu(),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(scope.pop()) {
            log::debug!("{} rejected by the device", desc.label);
            return Err(ShaderCompilationError {
                stage: ShaderStage::Pipeline,
                label: program.label().to_owned(),
                source_excerpt: String::new(),
                message: err.to_string(),
            }
            .into());
        }

        let index = self.pipelines.insert(pipeline);
        Ok(PipelineHandle::new(index, self.epoch))
    }

    fn upload_geometry(
        &mut self,
        upload: &GeometryUpload<'_>,
    ) -> Result<GeometryHandle, BackendError> {
        self.check_live()?;
        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(upload.label),
                contents: upload.vertices,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices = upload.indices.map(|indices| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(upload.label),
                    contents: bytemuck::cast_slice(indices),
                    usage: wgpu::BufferUsages::INDEX,
                })
        });
        let index = self.meshes.insert(GpuMesh { vertices, indices });
        Ok(GeometryHandle::new(index, self.epoch))
    }

    fn release_geometry(&mut self, geometry: GeometryHandle) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Released);
        }
        // wgpu keeps the buffers alive until submitted work using them is done.
        self.meshes.remove(geometry.index(), geometry.epoch())?;
        Ok(())
    }

    fn submit(&mut self, pass: &FramePass<'_>) -> Result<(), BackendError> {
        self.check_live()?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(pass.clear_color.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: self.target.depth_view.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Discard,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let mut bound_pipeline = None;
            for draw in pass.draws {
                let pipeline = self
                    .pipelines
                    .get(draw.pipeline.index(), draw.pipeline.epoch())?;
                let bind_group = self
                    .bind_groups
                    .get(draw.bind_group.index(), draw.bind_group.epoch())?;
                let mesh = self
                    .meshes
                    .get(draw.geometry.index(), draw.geometry.epoch())?;
                // wgpu panics on empty buffer slices.
                let empty_indices = mesh.indices.as_ref().is_some_and(|b| b.size() == 0);
                if draw.count.is_empty() || mesh.vertices.size() == 0 || empty_indices {
                    log::debug!("skipping empty draw of geometry #{}", draw.geometry.index());
                    continue;
                }

                if bound_pipeline != Some(draw.pipeline) {
                    rpass.set_pipeline(pipeline);
                    bound_pipeline = Some(draw.pipeline);
                }
                rpass.set_bind_group(0, bind_group, &[draw.dynamic_offset.bytes()]);
                rpass.set_vertex_buffer(0, mesh.vertices.slice(..));

                match (draw.count, &mesh.indices) {
                    (DrawCount::Indexed { index_count }, Some(indices)) => {
                        rpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        rpass.draw_indexed(0..index_count, 0, 0..1);
                    }
                    (DrawCount::NonIndexed { vertex_count }, _) => {
                        rpass.draw(0..vertex_count, 0..1);
                    }
                    (DrawCount::Indexed { .. }, None) => {
                        return Err(BackendError::UnknownHandle {
                            kind: "index buffer",
                            index: draw.geometry.index(),
                        });
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.check_live()
    }

    /// Recreates the render target after a resize.
    ///
    /// wgpu does not support zero-sized textures; in that case the request is
    /// ignored and the previous target kept.
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.size || self.released {
            return;
        }
        self.size = (width, height);
        self.target = RenderTarget::new(&self.device, &self.init, self.size);
    }

    fn poll_device_lost(&mut self) -> Option<DeviceLostError> {
        if self.released || self.loss_reported {
            return None;
        }
        let err = self.lost.get()?.clone();
        self.loss_reported = true;
        Some(err)
    }

    fn recreate_device(&mut self, epoch: DeviceEpoch) -> Result<(), InitializationError> {
        if self.released {
            return Err(BackendError::Released.into());
        }

        let adapter = pollster::block_on(request_adapter(&self.instance, &self.init))?;
        let (device, queue) = pollster::block_on(request_device(&adapter, &self.init))?;

        self.buffers.reset(epoch);
        self.bind_groups.reset(epoch);
        self.pipelines.reset(epoch);
        self.meshes.reset(epoch);
        self.layouts.clear();

        self.device.destroy();
        self.caps = Capabilities::from_limits(&device.limits());
        self.lost = watch_device_loss(&device);
        log_uncaptured_errors(&device);
        self.loss_reported = false;
        self.target = RenderTarget::new(&device, &self.init, self.size);
        self.adapter = adapter;
        self.device = device;
        self.queue = queue;
        self.epoch = epoch;

        log::info!("device re-acquired at epoch {epoch}");
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.buffers.reset(self.epoch);
        self.bind_groups.reset(self.epoch);
        self.pipelines.reset(self.epoch);
        self.meshes.reset(self.epoch);
        self.layouts.clear();
        self.released = true;
        self.device.destroy();
    }
}
