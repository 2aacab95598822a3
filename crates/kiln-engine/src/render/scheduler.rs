//! Per-frame draw orchestration.
//!
//! One `run` walks `Begin → Stage* → Commit → Draw* → End`:
//! - `Begin` resets the uniform cursor and last frame's pipeline failures
//! - `Stage` resolves each renderable's pipeline and geometry, then stages its
//!   transforms; a renderable that fails any step is skipped
//! - `Commit` uploads all staged transforms with one buffer write
//! - `Draw` records one draw per staged renderable against the layout's bind
//!   group at the renderable's dynamic offset, then submits the pass
//!
//! Nothing in a frame suspends; the only fallible outcome surfaced to the
//! caller is a backend error (device loss included).

use rustc_hash::FxHashMap;

use crate::device::{ClearColor, DrawCommand, FramePass, GpuBackend};
use crate::error::{BackendError, PipelineError, ShaderCompilationError};
use crate::layout::{SlotOffset, TransformUniforms};
use crate::scene::{Camera, MaterialId, Renderable, RenderableSource};

use super::geometry_cache::GpuGeometry;
use super::pipeline::PipelineEntry;
use super::pipeline_key::PipelineSignature;
use super::resources::FrameResources;
use super::stats::FrameStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Begin,
    Stage,
    Commit,
    Draw,
    End,
}

/// Per-frame inputs besides the renderables.
#[derive(Debug, Copy, Clone)]
pub struct FrameInput<'a> {
    pub camera: &'a Camera,
    pub clear_color: ClearColor,
    pub label: &'a str,
}

#[derive(Debug, Copy, Clone)]
struct StagedDraw {
    pipeline: PipelineEntry,
    geometry: GpuGeometry,
    offset: SlotOffset,
}

/// Drives one frame through the allocator and caches.
///
/// Scratch vectors are kept between frames; no per-frame allocation once
/// warmed.
#[derive(Debug)]
pub struct DrawScheduler {
    phase: FramePhase,
    staged: Vec<StagedDraw>,
    commands: Vec<DrawCommand>,
    material_errors: FxHashMap<MaterialId, ShaderCompilationError>,
}

impl Default for DrawScheduler {
    fn default() -> Self {
        Self {
            phase: FramePhase::Idle,
            staged: Vec::new(),
            commands: Vec::new(),
            material_errors: FxHashMap::default(),
        }
    }
}

impl DrawScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Last compilation error of `material`, cleared once it compiles.
    pub fn material_error(&self, material: MaterialId) -> Option<&ShaderCompilationError> {
        self.material_errors.get(&material)
    }

    /// Draw commands submitted by the last successful frame.
    pub fn last_commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn run<B, S>(
        &mut self,
        backend: &mut B,
        resources: &mut FrameResources,
        source: &S,
        input: FrameInput<'_>,
    ) -> Result<FrameStats, BackendError>
    where
        B: GpuBackend + ?Sized,
        S: RenderableSource + ?Sized,
    {
        let result = self.run_phases(backend, resources, source, input);
        self.phase = FramePhase::Idle;
        result
    }

    fn run_phases<B, S>(
        &mut self,
        backend: &mut B,
        resources: &mut FrameResources,
        source: &S,
        input: FrameInput<'_>,
    ) -> Result<FrameStats, BackendError>
    where
        B: GpuBackend + ?Sized,
        S: RenderableSource + ?Sized,
    {
        let mut stats = FrameStats::default();

        // ── begin ──
        self.phase = FramePhase::Begin;
        resources.allocator.begin_frame();
        resources.pipelines.begin_frame();
        resources.geometry.begin_frame();
        self.staged.clear();
        self.commands.clear();

        // ── stage ──
        self.phase = FramePhase::Stage;
        for renderable in source.renderables() {
            match self.stage_one(backend, resources, renderable, input.camera, &mut stats)? {
                Some(draw) => self.staged.push(draw),
                None => stats.skipped_draws += 1,
            }
        }
        if stats.capacity_skips > 0 {
            log::warn!(
                "uniform capacity exceeded: {} renderables skipped ({} slots per frame)",
                stats.capacity_skips,
                resources.allocator.layout().max_slots()
            );
        }
        if stats.empty_skips > 0 {
            log::warn!(
                "{} renderables skipped: geometry has no vertices or indices",
                stats.empty_skips
            );
        }

        // ── commit ──
        self.phase = FramePhase::Commit;
        if resources.allocator.commit(backend)? {
            stats.buffer_writes = 1;
        }

        // ── draw ──
        self.phase = FramePhase::Draw;
        let buffer = resources.allocator.buffer();
        for draw in &self.staged {
            let bind_group = resources
                .bind_groups
                .get_or_create(draw.pipeline.layout, buffer, backend)?;
            self.commands.push(DrawCommand {
                pipeline: draw.pipeline.handle,
                bind_group: bind_group.handle,
                dynamic_offset: draw.offset,
                geometry: draw.geometry.handle,
                count: draw.geometry.count,
            });
            stats.draw_calls += 1;
            stats.triangles += draw.geometry.count.triangles();
        }
        backend.submit(&FramePass {
            label: input.label,
            clear_color: input.clear_color,
            draws: &self.commands,
        })?;

        // ── end ──
        self.phase = FramePhase::End;
        stats.geometry_evictions = resources.geometry.evict_idle(backend) as u32;
        Ok(stats)
    }

    /// Resolves and stages one renderable. `Ok(None)` means skip it.
    fn stage_one<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        resources: &mut FrameResources,
        renderable: &Renderable,
        camera: &Camera,
        stats: &mut FrameStats,
    ) -> Result<Option<StagedDraw>, BackendError> {
        if renderable.geometry.is_empty() {
            stats.empty_skips += 1;
            return Ok(None);
        }

        let material = &renderable.material;
        let program = material.program();
        let signature = PipelineSignature {
            vertex_layout: renderable.geometry.layout().clone(),
            program: program.key(),
            layout: program.layout_key(),
            blend: material.blend,
            depth: material.depth,
            cull: material.cull,
            topology: wgpu::PrimitiveTopology::TriangleList,
        };

        let failures_before = resources.pipelines.failures();
        let pipeline = match resources.pipelines.get_or_compile(&signature, program, backend) {
            Ok(entry) => {
                self.material_errors.remove(&material.id());
                entry
            }
            Err(PipelineError::Compilation(err)) => {
                if resources.pipelines.failures() > failures_before {
                    stats.shader_errors += 1;
                    log::warn!("material `{}`: {err}", material.label());
                    if !err.source_excerpt.is_empty() {
                        log::warn!("  at: {}", err.source_excerpt);
                    }
                }
                self.material_errors.insert(material.id(), err);
                return Ok(None);
            }
            Err(PipelineError::Backend(BackendError::DeviceLost)) => {
                return Err(BackendError::DeviceLost);
            }
            Err(PipelineError::Backend(err)) => {
                log::warn!("material `{}`: pipeline unavailable: {err}", material.label());
                return Ok(None);
            }
        };

        let geometry = match resources.geometry.get_or_upload(&renderable.geometry, backend) {
            Ok(geometry) => geometry,
            Err(BackendError::DeviceLost) => return Err(BackendError::DeviceLost),
            Err(err) => {
                log::warn!(
                    "geometry `{}`: upload failed: {err}",
                    renderable.geometry.label()
                );
                return Ok(None);
            }
        };

        let transforms = TransformUniforms::new(camera.projection, camera.view, renderable.transform);
        match resources.allocator.stage(&transforms) {
            Ok(offset) => Ok(Some(StagedDraw {
                pipeline,
                geometry,
                offset,
            })),
            Err(_) => {
                stats.capacity_skips += 1;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::device::RecordingBackend;
    use crate::layout::SlotLayout;
    use crate::scene::{Geometry, Material, Scene};
    use crate::shader::{builtin, ShaderProgram};

    struct Fixture {
        backend: RecordingBackend,
        resources: FrameResources,
        scheduler: DrawScheduler,
        camera: Camera,
    }

    impl Fixture {
        fn new(max_slots: u32) -> Self {
            let mut backend = RecordingBackend::default();
            let layout = SlotLayout::new(256, max_slots, 256).unwrap();
            let resources = FrameResources::create(&mut backend, layout).unwrap();
            Self {
                backend,
                resources,
                scheduler: DrawScheduler::new(),
                camera: Camera::default(),
            }
        }

        fn run(&mut self, scene: &Scene) -> Result<FrameStats, BackendError> {
            self.scheduler.run(
                &mut self.backend,
                &mut self.resources,
                scene,
                FrameInput {
                    camera: &self.camera,
                    clear_color: ClearColor::BLACK,
                    label: "test frame",
                },
            )
        }
    }

    fn row(count: usize, material: &Arc<Material>) -> Scene {
        let cube = Arc::new(Geometry::cube("cube", [1.0; 3]));
        let mut scene = Scene::new();
        for i in 0..count {
            scene.add(
                Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)),
                &cube,
                material,
            );
        }
        scene
    }

    #[test]
    fn frame_draws_in_supplied_order_with_slot_offsets() {
        let mut fx = Fixture::new(16);
        let material = Arc::new(Material::new("basic", Arc::new(builtin::basic())));
        let stats = fx.run(&row(4, &material)).unwrap();

        assert_eq!(stats.draw_calls, 4);
        assert_eq!(stats.triangles, 48);
        assert_eq!(stats.buffer_writes, 1);
        let offsets: Vec<u32> = fx
            .backend
            .last_draws()
            .iter()
            .map(|d| d.dynamic_offset.bytes())
            .collect();
        assert_eq!(offsets, vec![0, 256, 512, 768]);
        assert_eq!(fx.scheduler.phase(), FramePhase::Idle);
    }

    #[test]
    fn overflow_skips_only_excess_renderables() {
        let mut fx = Fixture::new(3);
        let material = Arc::new(Material::new("basic", Arc::new(builtin::basic())));
        let stats = fx.run(&row(5, &material)).unwrap();

        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.capacity_skips, 2);
        assert_eq!(stats.skipped_draws, 2);
        assert!(stats.is_degraded());
    }

    #[test]
    fn broken_material_is_skipped_and_recorded() {
        let mut fx = Fixture::new(16);
        let good = Arc::new(Material::new("good", Arc::new(builtin::unlit())));
        let bad = Arc::new(Material::new(
            "bad",
            Arc::new(ShaderProgram::wgsl("bad program", "@vertex fn vs_main( {")),
        ));

        let mut scene = row(2, &good);
        scene.extend_from(&row(3, &bad));
        let stats = fx.run(&scene).unwrap();

        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.skipped_draws, 3);
        assert_eq!(stats.shader_errors, 1);
        assert!(fx.scheduler.material_error(bad.id()).is_some());
        assert!(fx.scheduler.material_error(good.id()).is_none());
    }

    #[test]
    fn empty_scene_submits_clear_pass_without_write() {
        let mut fx = Fixture::new(4);
        let stats = fx.run(&Scene::new()).unwrap();
        assert_eq!(stats.buffer_writes, 0);
        assert_eq!(fx.backend.counters().buffer_writes, 0);
        assert_eq!(fx.backend.counters().submits, 1);
    }

    #[test]
    fn empty_geometry_is_skipped_without_upload() {
        let mut fx = Fixture::new(8);
        let material = Arc::new(Material::new("basic", Arc::new(builtin::basic())));
        let empty = Arc::new(Geometry::from_vertices("empty", &[], None));
        let tri = Geometry::triangle("tri", [1.0; 3]);
        let no_indices = Arc::new(Geometry::from_raw(
            "no indices",
            tri.layout().clone(),
            tri.vertex_bytes().to_vec(),
            Some(Vec::new()),
        ));

        let mut scene = row(2, &material);
        scene.add(Mat4::IDENTITY, &empty, &material);
        scene.add(Mat4::IDENTITY, &no_indices, &material);
        let stats = fx.run(&scene).unwrap();

        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.empty_skips, 2);
        assert_eq!(stats.skipped_draws, 2);
        assert_eq!(stats.capacity_skips, 0);
        assert_eq!(fx.backend.counters().geometries_uploaded, 1);
        assert_eq!(fx.resources.allocator.cursor(), 2);
    }

    #[test]
    fn device_loss_aborts_frame() {
        let mut fx = Fixture::new(4);
        let material = Arc::new(Material::new("basic", Arc::new(builtin::basic())));
        fx.backend.lose_device("reset");
        assert_eq!(fx.run(&row(2, &material)), Err(BackendError::DeviceLost));
        assert_eq!(fx.scheduler.phase(), FramePhase::Idle);
    }
}
