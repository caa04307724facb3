//! 无窗口演示：运行几秒粒子模拟并把绘制统计输出到日志
//!
//! 用法：`particle_engine [config.toml]`

use bevy_ecs::world::World;
use glam::Vec2;
use particle_engine::physics::RapierParticlePhysics;
use particle_engine::prelude::*;
use std::sync::Arc;

const FRAME_DT: f32 = 1.0 / 60.0;
const FRAMES: u32 = 240;

fn run() -> ParticleResult<()> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => ParticleSystemConfig::load_or_default(path),
        None => ParticleSystemConfig::default(),
    };
    config.apply_env_overrides();
    init_logging(&config.logging);

    let physics = Arc::new(RapierParticlePhysics::new());
    physics.add_static_box(Vec2::new(640.0, 700.0), Vec2::new(640.0, 10.0), 0)?;

    let mut camera = Camera2D::new(Vec2::new(1280.0, 720.0));
    camera.position = Vec2::new(640.0, 360.0);
    let view = Arc::new(camera);
    let mut system = ParticleSystem::new(config, view)?.with_physics(physics.clone());

    system.create_fire(320.0, 600.0)?;
    system.create_smoke(320.0, 560.0)?;
    system.create_explosion(640.0, 360.0, 300)?;
    system.create_physical_burst(960.0, 300.0, 60)?;

    let mut world = World::new();
    let comet = world.spawn(Position2D(Vec2::new(100.0, 150.0))).id();
    system.create_trail(comet)?;

    let mut surface = RecordingSurface::new();
    for frame in 0..FRAMES {
        if frame % 60 == 30 {
            system.create_sparks(200.0 + frame as f32 * 3.0, 400.0, 80)?;
        }
        physics.step(FRAME_DT);
        let collisions = physics.drain_collisions();
        system.process_collisions(&collisions);

        if let Some(mut position) = world.get_mut::<Position2D>(comet) {
            position.0.x += 240.0 * FRAME_DT;
        }
        system.update_with_entities(FRAME_DT, &world);
        surface.clear();
        system.render(&mut surface);

        if frame % 60 == 0 {
            tracing::info!(
                target: "particles",
                "frame {}: {} ({} draw calls, {} state changes)",
                frame,
                system.stats().summary(),
                surface.draw_calls(),
                surface.state_changes()
            );
        }
    }

    system.shutdown();
    match serde_json::to_string(system.stats()) {
        Ok(json) => tracing::info!(target: "particles", "Final stats: {}", json),
        Err(e) => tracing::warn!(target: "particles", "Failed to serialize stats: {}", e),
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Particle demo failed: {}", e);
        std::process::exit(1);
    }
}
