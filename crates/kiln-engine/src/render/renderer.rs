use crate::config::RendererConfig;
use crate::device::{BufferHandle, Capabilities, DeviceEpoch, DeviceProvider, GpuBackend};
use crate::error::{
    BackendError, DeviceLostError, DeviceLostReason, DisposedError, InitializationError,
    RenderError, ShaderCompilationError,
};
use crate::layout::SlotLayout;
use crate::scene::{Camera, GeometryId, MaterialId, RenderableSource};
use crate::time::FrameTimer;

use super::lifecycle::{DeviceLifecycleManager, DeviceState};
use super::resources::FrameResources;
use super::scheduler::{DrawScheduler, FrameInput};
use super::stats::{FrameStats, RenderStats, StatsTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Every renderable was drawn.
    Complete,
    /// The frame was submitted but some renderables were skipped.
    Degraded,
    /// Nothing was rendered: the device is lost and could not be recovered yet.
    NotReady,
}

/// Result of one `render` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    pub status: FrameStatus,
    pub frame: FrameStats,
    /// The device was re-acquired at the start of this call.
    pub recovered: bool,
}

impl RenderOutcome {
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status != FrameStatus::NotReady
    }
}

/// Frame-scoped GPU resource manager.
///
/// Owns the backend, the frame uniform buffer and every cache built on it.
/// All methods take `&mut self`; one render thread drives the renderer.
pub struct Renderer<B: GpuBackend> {
    backend: B,
    config: RendererConfig,
    resources: FrameResources,
    scheduler: DrawScheduler,
    lifecycle: DeviceLifecycleManager,
    timer: FrameTimer,
    tracker: StatsTracker,
    disposed: bool,
}

impl<B: GpuBackend> Renderer<B> {
    /// Acquires a device from `provider` and allocates frame resources.
    ///
    /// Dropping the returned future before it resolves abandons the
    /// acquisition; no renderer state exists until it completes.
    pub async fn initialize<P>(provider: P, config: RendererConfig) -> Result<Self, InitializationError>
    where
        P: DeviceProvider<Backend = B>,
    {
        let backend = provider.acquire().await?;
        Self::with_backend(backend, config)
    }

    /// Builds a renderer over an already acquired backend.
    ///
    /// On failure the backend is released before returning.
    pub fn with_backend(mut backend: B, config: RendererConfig) -> Result<Self, InitializationError> {
        let layout = match config.validate(&backend.capabilities()) {
            Ok(layout) => layout,
            Err(err) => {
                backend.release();
                return Err(err);
            }
        };
        let mut resources = match FrameResources::create(&mut backend, layout) {
            Ok(resources) => resources,
            Err(err) => {
                backend.release();
                return Err(err.into());
            }
        };
        resources.geometry.set_retention(config.geometry_retention_frames);

        log::info!(
            "{} ready: {} slots x {} bytes, epoch {}",
            config.label,
            layout.max_slots(),
            layout.slot_size(),
            backend.epoch()
        );

        Ok(Self {
            lifecycle: DeviceLifecycleManager::new(backend.epoch()),
            timer: FrameTimer::new(config.frame_budget),
            backend,
            config,
            resources,
            scheduler: DrawScheduler::new(),
            tracker: StatsTracker::default(),
            disposed: false,
        })
    }

    /// Renders one frame of `scene` as seen from `camera`.
    ///
    /// Device loss is not an error: the call that first observes it tries to
    /// recover and, if recovery fails, reports [`FrameStatus::NotReady`].
    pub fn render<S>(&mut self, scene: &S, camera: &Camera) -> Result<RenderOutcome, RenderError>
    where
        S: RenderableSource + ?Sized,
    {
        self.ensure_live()?;
        self.timer.begin();

        if let Some(err) = self.backend.poll_device_lost() {
            self.lifecycle.mark_lost(err);
        }

        let mut recovered = false;
        if !self.lifecycle.is_active() {
            if self.recover().is_err() {
                return Ok(Self::not_ready());
            }
            recovered = true;
        }

        let input = FrameInput {
            camera,
            clear_color: self.config.clear_color,
            label: self.config.label,
        };
        let frame = match self
            .scheduler
            .run(&mut self.backend, &mut self.resources, scene, input)
        {
            Ok(frame) => frame,
            Err(BackendError::DeviceLost) => {
                let err = self.backend.poll_device_lost().unwrap_or_else(|| {
                    DeviceLostError::new(DeviceLostReason::DuringFrame, "GPU call failed on a lost device")
                });
                self.lifecycle.mark_lost(err);
                return Ok(Self::not_ready());
            }
            Err(err) => return Err(err.into()),
        };

        self.tracker.record(frame);
        if let Some(time) = self.timer.end() {
            if time.over_budget {
                log::warn!(
                    "frame {} took {:.2} ms (budget {:.2} ms)",
                    self.tracker.frame_number(),
                    time.elapsed.as_secs_f64() * 1e3,
                    self.timer.budget().as_secs_f64() * 1e3
                );
            }
        }
        if let Some(limit) = self.config.draw_call_warning {
            if frame.draw_calls > limit {
                log::warn!(
                    "frame {} issued {} draw calls (warning threshold {limit})",
                    self.tracker.frame_number(),
                    frame.draw_calls
                );
            }
        }

        let status = if frame.is_degraded() {
            FrameStatus::Degraded
        } else {
            FrameStatus::Complete
        };
        Ok(RenderOutcome {
            status,
            frame,
            recovered,
        })
    }

    fn not_ready() -> RenderOutcome {
        RenderOutcome {
            status: FrameStatus::NotReady,
            frame: FrameStats::default(),
            recovered: false,
        }
    }

    fn recover(&mut self) -> Result<DeviceEpoch, InitializationError> {
        let backend = &mut self.backend;
        let resources = &mut self.resources;
        self.lifecycle.recover(|epoch| {
            backend.recreate_device(epoch)?;
            resources.rebuild(backend)?;
            Ok(())
        })
    }

    /// Forces the device into the lost state. The next `render` recovers.
    pub fn simulate_context_loss(&mut self) -> Result<(), DisposedError> {
        self.ensure_live()?;
        self.lifecycle.mark_lost(DeviceLostError::new(
            DeviceLostReason::Simulated,
            "context loss requested",
        ));
        Ok(())
    }

    pub fn stats(&self) -> Result<RenderStats, DisposedError> {
        self.ensure_live()?;
        let last = self.tracker.last();
        Ok(RenderStats {
            triangles: last.triangles,
            draw_calls: last.draw_calls,
            compiled_programs: self.resources.pipelines.len(),
            frame_number: self.tracker.frame_number(),
            skipped_draws: last.skipped_draws,
            capacity_warnings: self.tracker.capacity_warnings(),
            shader_errors: self.tracker.shader_errors(),
            buffer_writes: self.resources.allocator.buffer_writes(),
            bind_group_creations: self.resources.bind_groups.creations(),
            pipeline_compilations: self.resources.pipelines.compilations(),
            device_losses: self.lifecycle.losses(),
            recoveries: self.lifecycle.recoveries(),
            device_epoch: self.lifecycle.epoch(),
            resident_geometries: self.resources.geometry.len(),
            geometry_evictions: self.resources.geometry.evictions(),
            last_frame_time: self.timer.last(),
            average_frame_time: self.timer.average(),
            budget_overruns: self.timer.overruns(),
        })
    }

    /// Frees the GPU buffers uploaded for `geometry`. Returns whether any
    /// were resident. Drawing it again re-uploads.
    pub fn release_geometry(&mut self, geometry: GeometryId) -> Result<bool, DisposedError> {
        self.ensure_live()?;
        Ok(self.resources.geometry.release(geometry, &mut self.backend))
    }

    /// Releases every GPU object. Later calls fail with [`DisposedError`].
    pub fn dispose(&mut self) -> Result<(), DisposedError> {
        self.ensure_live()?;
        self.resources.invalidate();
        self.backend.release();
        self.disposed = true;
        log::debug!("{} disposed", self.config.label);
        Ok(())
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Resizes the render target. Zero sizes are ignored by the backend.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), DisposedError> {
        self.ensure_live()?;
        self.backend.resize(width, height);
        Ok(())
    }

    /// Compilation error currently attached to `material`.
    pub fn material_error(&self, material: MaterialId) -> Option<&ShaderCompilationError> {
        self.scheduler.material_error(material)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn device_state(&self) -> DeviceState {
        self.lifecycle.state()
    }

    pub fn epoch(&self) -> DeviceEpoch {
        self.lifecycle.epoch()
    }

    pub fn slot_layout(&self) -> SlotLayout {
        self.resources.allocator.layout()
    }

    /// Buffer holding this frame's staged transforms.
    pub fn uniform_buffer(&self) -> BufferHandle {
        self.resources.allocator.buffer()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn ensure_live(&self) -> Result<(), DisposedError> {
        if self.disposed {
            return Err(DisposedError);
        }
        Ok(())
    }
}
