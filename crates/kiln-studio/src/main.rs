use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3};

use kiln_engine::device::{ClearColor, WgpuBackend, WgpuInit, WgpuProvider};
use kiln_engine::logging::{init_logging, LoggingConfig};
use kiln_engine::scene::{Camera, Geometry, Material, Scene};
use kiln_engine::shader::builtin;
use kiln_engine::{FrameStatus, Renderer, RendererConfig};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const GRID: i32 = 8;
const DEFAULT_FRAMES: u64 = 240;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let frames = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("invalid frame count `{arg}`"))?,
        None => DEFAULT_FRAMES,
    };

    let provider = WgpuProvider::new(WgpuInit::default()).with_size(WIDTH, HEIGHT);
    let config = RendererConfig::default().with_clear_color(ClearColor::rgba(0.02, 0.02, 0.04, 1.0));
    let mut renderer: Renderer<WgpuBackend> = pollster::block_on(Renderer::initialize(provider, config))
        .context("failed to initialize the GPU renderer")?;

    let info = renderer.backend().adapter_info();
    log::info!("adapter: {} ({:?})", info.name, info.backend);

    let camera = Camera::perspective(
        45f32.to_radians(),
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        200.0,
    )
    .looking_at(Vec3::new(0.0, 18.0, 28.0), Vec3::ZERO, Vec3::Y);

    let cube = Arc::new(Geometry::cube("cube", [0.85, 0.55, 0.25]));
    let lit = Arc::new(Material::new("lit", Arc::new(builtin::basic())));
    let flat = Arc::new(Material::new("flat", Arc::new(builtin::unlit())));

    let mut scene = Scene::with_capacity((GRID * GRID) as usize);
    let mut degraded = 0u64;
    let mut not_ready = 0u64;

    for frame in 0..frames {
        if frame == frames / 3 {
            log::info!("frame {frame}: simulating context loss");
            renderer.simulate_context_loss()?;
        }
        if frame == 2 * frames / 3 {
            log::info!("frame {frame}: destroying the device");
            renderer.backend().destroy_device();
        }

        build_grid(&mut scene, frame as f32 / 60.0, &cube, &lit, &flat);
        let outcome = renderer
            .render(&scene, &camera)
            .with_context(|| format!("frame {frame} failed"))?;

        if outcome.recovered {
            log::info!("frame {frame}: device recovered at epoch {}", renderer.epoch());
        }
        match outcome.status {
            FrameStatus::Complete => {}
            FrameStatus::Degraded => degraded += 1,
            FrameStatus::NotReady => not_ready += 1,
        }
    }

    let stats = renderer.stats()?;
    println!();
    println!("  frames rendered      {}", stats.frame_number);
    println!("  draw calls (last)    {}", stats.draw_calls);
    println!("  triangles (last)     {}", stats.triangles);
    println!("  pipelines            {}", stats.compiled_programs);
    println!("  buffer writes        {}", stats.buffer_writes);
    println!("  bind groups created  {}", stats.bind_group_creations);
    println!("  device losses        {}", stats.device_losses);
    println!("  recoveries           {}", stats.recoveries);
    println!("  device epoch         {}", stats.device_epoch);
    println!("  geometry evictions   {}", stats.geometry_evictions);
    println!("  degraded frames      {degraded}");
    println!("  not-ready frames     {not_ready}");
    println!(
        "  avg frame time       {:.3} ms",
        stats.average_frame_time.as_secs_f64() * 1e3
    );
    println!("  budget overruns      {}", stats.budget_overruns);
    println!();

    renderer.dispose()?;
    Ok(())
}

/// Rebuilds a GRID x GRID field of spinning cubes, alternating materials.
fn build_grid(
    scene: &mut Scene,
    t: f32,
    cube: &Arc<Geometry>,
    lit: &Arc<Material>,
    flat: &Arc<Material>,
) {
    scene.clear();
    let half = GRID as f32 / 2.0;
    for z in 0..GRID {
        for x in 0..GRID {
            let position = Vec3::new((x as f32 - half) * 2.0, 0.0, (z as f32 - half) * 2.0);
            let spin = Quat::from_rotation_y(t + (x + z) as f32 * 0.15);
            let transform = Mat4::from_rotation_translation(spin, position);
            let material = if (x + z) % 2 == 0 { lit } else { flat };
            scene.add(transform, cube, material);
        }
    }
}
