use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use kiln_engine::device::{RecordingBackend, RecordingProvider, RenderSurface};
use kiln_engine::error::ShaderStage;
use kiln_engine::layout::{MAX_MESHES_PER_FRAME, TRANSFORM_PAYLOAD_SIZE, UNIFORM_BUFFER_SIZE};
use kiln_engine::render::DeviceState;
use kiln_engine::scene::{Camera, Geometry, Material, Scene};
use kiln_engine::shader::{builtin, ShaderProgram};
use kiln_engine::{
    DisposedError, FrameStatus, InitializationError, RenderError, Renderer, RendererConfig,
};

// ── helpers ───────────────────────────────────────────────────────────────

fn renderer() -> Renderer<RecordingBackend> {
    pollster::block_on(Renderer::initialize(
        RecordingProvider::new(),
        RendererConfig::default(),
    ))
    .unwrap()
}

fn basic_material() -> Arc<Material> {
    Arc::new(Material::new("basic", Arc::new(builtin::basic())))
}

fn row_at(xs: &[f32], material: &Arc<Material>) -> Scene {
    let cube = Arc::new(Geometry::cube("cube", [0.8, 0.4, 0.2]));
    let mut scene = Scene::with_capacity(xs.len());
    for &x in xs {
        scene.add(Mat4::from_translation(Vec3::new(x, 0.0, 0.0)), &cube, material);
    }
    scene
}

fn row(count: usize, material: &Arc<Material>) -> Scene {
    let xs: Vec<f32> = (0..count).map(|i| i as f32).collect();
    row_at(&xs, material)
}

fn translation_at(renderer: &Renderer<RecordingBackend>, offset: u64) -> Vec3 {
    renderer
        .backend()
        .read_transform(renderer.uniform_buffer(), offset)
        .unwrap()
        .model_translation()
}

// ── layout contract ───────────────────────────────────────────────────────

#[test]
fn default_renderer_uses_contract_layout() {
    let r = renderer();
    let layout = r.slot_layout();
    assert_eq!(layout.buffer_size(), UNIFORM_BUFFER_SIZE);
    assert_eq!(layout.max_slots(), MAX_MESHES_PER_FRAME);
    for i in 0..layout.max_slots() {
        assert_eq!(layout.offset(i).unwrap().bytes() % 256, 0);
    }
}

// ── scenarios ─────────────────────────────────────────────────────────────

#[test]
fn three_meshes_land_in_consecutive_slots() {
    let mut r = renderer();
    let scene = row_at(&[-5.0, 0.0, 5.0], &basic_material());

    let outcome = r.render(&scene, &Camera::default()).unwrap();
    assert_eq!(outcome.status, FrameStatus::Complete);

    let offsets: Vec<u32> = r
        .backend()
        .last_draws()
        .iter()
        .map(|d| d.dynamic_offset.bytes())
        .collect();
    assert_eq!(offsets, vec![0, 256, 512]);

    assert_eq!(translation_at(&r, 0).x, -5.0);
    assert_eq!(translation_at(&r, 256).x, 0.0);
    assert_eq!(translation_at(&r, 512).x, 5.0);
}

#[test]
fn one_hundred_fifty_meshes_fit_without_warnings() {
    let mut r = renderer();
    let outcome = r.render(&row(150, &basic_material()), &Camera::default()).unwrap();

    assert_eq!(outcome.status, FrameStatus::Complete);
    assert_eq!(outcome.frame.draw_calls, 150);
    let stats = r.stats().unwrap();
    assert_eq!(stats.capacity_warnings, 0);
    assert_eq!(stats.skipped_draws, 0);
    assert_eq!(stats.triangles, 150 * 12);
}

#[test]
fn two_hundred_meshes_fill_the_buffer_exactly() {
    let mut r = renderer();
    let outcome = r.render(&row(200, &basic_material()), &Camera::default()).unwrap();

    assert_eq!(outcome.status, FrameStatus::Complete);
    let last = r.backend().last_draws().last().unwrap().dynamic_offset;
    assert_eq!(last.bytes(), 50_944);
    assert!(last.as_u64() + TRANSFORM_PAYLOAD_SIZE <= UNIFORM_BUFFER_SIZE);
    assert_eq!(translation_at(&r, 50_944).x, 199.0);
}

#[test]
fn two_hundred_first_mesh_is_skipped_with_warning() {
    let mut r = renderer();
    let outcome = r.render(&row(201, &basic_material()), &Camera::default()).unwrap();

    assert_eq!(outcome.status, FrameStatus::Degraded);
    assert_eq!(outcome.frame.draw_calls, 200);
    assert_eq!(outcome.frame.capacity_skips, 1);

    let stats = r.stats().unwrap();
    assert_eq!(stats.skipped_draws, 1);
    assert_eq!(stats.capacity_warnings, 1);
    // The overflow never reached the GPU buffer.
    let write = *r.backend().writes().last().unwrap();
    assert_eq!(write.len, UNIFORM_BUFFER_SIZE);
}

#[test]
fn simulated_context_loss_recovers_on_next_frame() {
    let mut r = renderer();
    let scene = row_at(&[-5.0, 0.0, 5.0], &basic_material());
    r.render(&scene, &Camera::default()).unwrap();

    r.simulate_context_loss().unwrap();
    assert_eq!(r.device_state(), DeviceState::Lost);

    let first = r.render(&scene, &Camera::default()).unwrap();
    assert!(first.recovered);
    assert!(first.is_ready());
    assert_eq!(r.device_state(), DeviceState::Active);

    let second = r.render(&scene, &Camera::default()).unwrap();
    assert_eq!(second.status, FrameStatus::Complete);
    assert!(!second.recovered);
    assert_eq!(translation_at(&r, 0).x, -5.0);
    assert_eq!(translation_at(&r, 256).x, 0.0);
    assert_eq!(translation_at(&r, 512).x, 5.0);

    let stats = r.stats().unwrap();
    assert_eq!(stats.device_losses, 1);
    assert_eq!(stats.recoveries, 1);
    assert_eq!(stats.device_epoch.get(), 1);
    // One bind group per (layout, epoch).
    assert_eq!(stats.bind_group_creations, 2);
}

#[test]
fn sixty_frames_issue_sixty_writes() {
    let mut r = renderer();
    let xs: Vec<f32> = (0..10).map(|i| i as f32 * 1.5 - 7.0).collect();
    let scene = row_at(&xs, &basic_material());

    for _ in 0..60 {
        let outcome = r.render(&scene, &Camera::default()).unwrap();
        assert_eq!(outcome.status, FrameStatus::Complete);
        for (i, &x) in xs.iter().enumerate() {
            assert_eq!(translation_at(&r, i as u64 * 256).x, x);
        }
    }

    let counters = r.backend().counters();
    assert_eq!(counters.buffer_writes, 60);
    assert_eq!(counters.bind_groups_created, 1);
    assert_eq!(counters.pipelines_created, 1);
    assert_eq!(counters.geometries_uploaded, 1);

    let stats = r.stats().unwrap();
    assert_eq!(stats.frame_number, 60);
    assert_eq!(stats.buffer_writes, 60);
    assert_eq!(stats.compiled_programs, 1);
}

#[test]
fn full_transforms_survive_the_uniform_buffer() {
    let mut r = renderer();
    let camera = Camera::perspective(60f32.to_radians(), 16.0 / 9.0, 0.1, 500.0)
        .looking_at(Vec3::new(3.0, 12.0, 40.0), Vec3::new(0.0, 0.0, -5.0), Vec3::Y);
    let cube = Arc::new(Geometry::cube("cube", [0.8, 0.4, 0.2]));
    let material = basic_material();

    let models: Vec<Mat4> = (0..MAX_MESHES_PER_FRAME)
        .map(|i| {
            let i = i as f32;
            Mat4::from_scale_rotation_translation(
                Vec3::new(1.0 + i * 0.01, 0.5, 2.0),
                Quat::from_euler(glam::EulerRot::YXZ, i * 0.1, i * 0.05, -i * 0.02),
                Vec3::new(i, -i * 0.5, i * 0.25),
            )
        })
        .collect();
    let mut scene = Scene::with_capacity(models.len());
    for model in &models {
        scene.add(*model, &cube, &material);
    }

    let outcome = r.render(&scene, &camera).unwrap();
    assert_eq!(outcome.status, FrameStatus::Complete);

    for slot in [0u32, 1, 57, 123, 198, 199] {
        let offset = r.slot_layout().offset(slot).unwrap().as_u64();
        let read = r.backend().read_transform(r.uniform_buffer(), offset).unwrap();
        assert!(read.projection_matrix().abs_diff_eq(camera.projection, 1e-6), "slot {slot}");
        assert!(read.view_matrix().abs_diff_eq(camera.view, 1e-6), "slot {slot}");
        assert!(read.model_matrix().abs_diff_eq(models[slot as usize], 1e-6), "slot {slot}");
    }
}

// ── geometry residency ────────────────────────────────────────────────────

#[test]
fn per_frame_geometry_stays_bounded() {
    let mut r = pollster::block_on(Renderer::initialize(
        RecordingProvider::new(),
        RendererConfig::default().with_geometry_retention(4),
    ))
    .unwrap();
    let material = basic_material();

    for _ in 0..500 {
        let triangle = Arc::new(Geometry::triangle("fresh", [0.2, 0.9, 0.3]));
        let mut scene = Scene::new();
        scene.add(Mat4::IDENTITY, &triangle, &material);
        r.render(&scene, &Camera::default()).unwrap();
    }

    let stats = r.stats().unwrap();
    assert!(stats.resident_geometries <= 5);
    assert!(r.backend().live_geometries() <= 5);
    assert_eq!(r.backend().counters().geometries_uploaded, 500);
    assert_eq!(stats.geometry_evictions, 500 - stats.resident_geometries as u64);
}

#[test]
fn drawn_geometry_is_never_evicted() {
    let mut r = pollster::block_on(Renderer::initialize(
        RecordingProvider::new(),
        RendererConfig::default().with_geometry_retention(0),
    ))
    .unwrap();
    let scene = row(3, &basic_material());

    for _ in 0..10 {
        r.render(&scene, &Camera::default()).unwrap();
    }

    assert_eq!(r.backend().counters().geometries_uploaded, 1);
    assert_eq!(r.stats().unwrap().geometry_evictions, 0);
}

#[test]
fn released_geometry_is_uploaded_again_when_drawn() {
    let mut r = renderer();
    let cube = Arc::new(Geometry::cube("cube", [0.8, 0.4, 0.2]));
    let mut scene = Scene::new();
    scene.add(Mat4::IDENTITY, &cube, &basic_material());

    r.render(&scene, &Camera::default()).unwrap();
    assert!(r.release_geometry(cube.id()).unwrap());
    assert!(!r.release_geometry(cube.id()).unwrap());
    assert_eq!(r.backend().live_geometries(), 0);

    let outcome = r.render(&scene, &Camera::default()).unwrap();
    assert_eq!(outcome.status, FrameStatus::Complete);
    assert_eq!(r.backend().counters().geometries_uploaded, 2);
    assert_eq!(r.backend().live_geometries(), 1);
}

// ── frame isolation ───────────────────────────────────────────────────────

#[test]
fn each_frame_writes_only_its_own_slots() {
    let mut r = renderer();
    let material = basic_material();
    r.render(&row(5, &material), &Camera::default()).unwrap();
    r.render(&row_at(&[42.0, 43.0], &material), &Camera::default()).unwrap();

    let writes = r.backend().writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|w| w.offset == 0));
    assert_eq!(writes[0].len, 5 * 256);
    assert_eq!(writes[1].len, 2 * 256);
    assert_eq!(r.backend().last_draws().len(), 2);
    assert_eq!(translation_at(&r, 0).x, 42.0);
}

#[test]
fn empty_frame_clears_without_writing() {
    let mut r = renderer();
    let outcome = r.render(&Scene::new(), &Camera::default()).unwrap();
    assert_eq!(outcome.status, FrameStatus::Complete);
    assert_eq!(r.backend().counters().buffer_writes, 0);
    assert_eq!(r.backend().counters().submits, 1);
}

// ── device loss ───────────────────────────────────────────────────────────

#[test]
fn platform_device_loss_is_recovered_transparently() {
    let mut r = renderer();
    let scene = row(3, &basic_material());
    r.render(&scene, &Camera::default()).unwrap();

    r.backend_mut().lose_device("driver reset");
    let outcome = r.render(&scene, &Camera::default()).unwrap();
    assert!(outcome.recovered);
    assert_eq!(outcome.status, FrameStatus::Complete);
    assert_eq!(r.epoch().get(), 1);
    assert_eq!(r.backend().counters().pipelines_created, 2);
}

#[test]
fn failed_recovery_reports_not_ready_then_retries() {
    let mut r = renderer();
    let scene = row(3, &basic_material());
    r.backend_mut().lose_device("driver reset");
    r.backend_mut().fail_next_recreations(1);

    let first = r.render(&scene, &Camera::default()).unwrap();
    assert_eq!(first.status, FrameStatus::NotReady);
    assert_eq!(r.device_state(), DeviceState::Lost);
    assert_eq!(r.stats().unwrap().frame_number, 0);

    let second = r.render(&scene, &Camera::default()).unwrap();
    assert!(second.recovered);
    assert_eq!(second.status, FrameStatus::Complete);
    assert_eq!(translation_at(&r, 512).x, 2.0);
}

// ── shader errors ─────────────────────────────────────────────────────────

#[test]
fn broken_shader_skips_only_its_renderables() {
    let mut r = renderer();
    let good = basic_material();
    let bad = Arc::new(Material::new(
        "bad",
        Arc::new(ShaderProgram::wgsl(
            "bad program",
            "@vertex\nfn vs_main() -> @builtin(position) vec4<f32> {\n    return missing;\n}\n",
        )),
    ));

    let mut scene = row(3, &good);
    scene.extend_from(&row(2, &bad));
    let outcome = r.render(&scene, &Camera::default()).unwrap();

    assert_eq!(outcome.status, FrameStatus::Degraded);
    assert_eq!(outcome.frame.draw_calls, 3);
    assert_eq!(outcome.frame.skipped_draws, 2);

    let err = r.material_error(bad.id()).unwrap();
    assert_eq!(err.stage, ShaderStage::Vertex);
    assert!(err.message.contains("missing"));
    assert_eq!(r.stats().unwrap().shader_errors, 1);
}

#[test]
fn rejected_pipeline_is_retried_next_frame() {
    let mut r = renderer();
    r.backend_mut().reject_pipelines_for("kiln basic");
    let material = basic_material();
    let scene = row(2, &material);

    let outcome = r.render(&scene, &Camera::default()).unwrap();
    assert_eq!(outcome.frame.draw_calls, 0);
    assert_eq!(outcome.frame.shader_errors, 1);
    assert_eq!(
        r.material_error(material.id()).unwrap().stage,
        ShaderStage::Pipeline
    );

    r.render(&scene, &Camera::default()).unwrap();
    assert_eq!(r.stats().unwrap().shader_errors, 2);
}

// ── lifecycle ─────────────────────────────────────────────────────────────

#[test]
fn operations_after_dispose_fail() {
    let mut r = renderer();
    r.dispose().unwrap();

    assert!(r.backend().is_released());
    assert_eq!(
        r.render(&Scene::new(), &Camera::default()),
        Err(RenderError::Disposed(DisposedError))
    );
    assert_eq!(r.stats(), Err(DisposedError));
    assert_eq!(r.simulate_context_loss(), Err(DisposedError));
    assert_eq!(r.dispose(), Err(DisposedError));
}

#[test]
fn destroyed_surface_fails_initialization() {
    let surface = RenderSurface::new(640, 480);
    let provider = RecordingProvider::new().with_surface(surface.watch());
    drop(surface);

    let result = pollster::block_on(Renderer::initialize(provider, RendererConfig::default()));
    assert!(matches!(result, Err(InitializationError::SurfaceDestroyed)));
}

#[test]
fn live_surface_sizes_the_target() {
    let surface = RenderSurface::new(640, 480);
    let provider = RecordingProvider::new().with_surface(surface.watch());
    let mut r = pollster::block_on(Renderer::initialize(provider, RendererConfig::default())).unwrap();
    assert_eq!(r.backend().size(), (640, 480));

    r.resize(1024, 768).unwrap();
    r.resize(0, 0).unwrap();
    assert_eq!(r.backend().size(), (1024, 768));
}

#[test]
fn missing_adapter_is_fatal() {
    let result = pollster::block_on(Renderer::initialize(
        RecordingProvider::new().without_adapter(),
        RendererConfig::default(),
    ));
    assert!(matches!(result, Err(InitializationError::NoAdapter(_))));
}

#[test]
fn misaligned_slot_size_is_rejected() {
    let result = pollster::block_on(Renderer::initialize(
        RecordingProvider::new(),
        RendererConfig::default().with_slot_size(200),
    ));
    assert!(matches!(result, Err(InitializationError::InvalidConfig(_))));
}

#[test]
fn smaller_capacity_is_honored() {
    let mut r = pollster::block_on(Renderer::initialize(
        RecordingProvider::new(),
        RendererConfig::default().with_max_slots(8),
    ))
    .unwrap();
    let outcome = r.render(&row(10, &basic_material()), &Camera::default()).unwrap();
    assert_eq!(outcome.frame.draw_calls, 8);
    assert_eq!(outcome.frame.capacity_skips, 2);
}
