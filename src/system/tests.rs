use super::*;
use crate::emitter::fixed_preset;
use crate::physics::test_support::StubPhysics;
use crate::physics::BodyHandle;
use crate::render::{DrawCommand, FixedView, RecordingSurface};
use std::collections::HashMap;

fn view() -> Arc<dyn ViewProvider> {
    Arc::new(FixedView(Rect::new(-500.0, -500.0, 1000.0, 1000.0)))
}

fn serial_config() -> ParticleSystemConfig {
    ParticleSystemConfig {
        enable_multi_threading: false,
        ..ParticleSystemConfig::default()
    }
}

fn system(config: ParticleSystemConfig) -> ParticleSystem {
    ParticleSystem::new(config, view()).unwrap()
}

/// 速度为零的持续发射：粒子停在发射器位置
fn still_preset() -> EffectPreset {
    fixed_preset(8.0, 1000, true)
        .with("minSpeed", 0.0)
        .with("maxSpeed", 0.0)
}

#[test]
fn test_rejects_invalid_config() {
    let config = ParticleSystemConfig {
        task_timeout_ms: 0,
        ..ParticleSystemConfig::default()
    };
    assert!(ParticleSystem::new(config, view()).is_err());
}

#[test]
fn test_explosion_lifecycle() {
    let mut system = system(serial_config());
    assert_eq!(system.state(), SystemState::Idle);

    let id = system.create_explosion(0.0, 0.0, 100).unwrap();
    assert_eq!(system.emitter_count(), 1);
    assert_eq!(system.live_particle_count(), 100);
    assert!(!system.emitter(id).unwrap().is_active());
    assert_eq!(system.state(), SystemState::Running);

    system.update(0.016);
    assert_eq!(system.live_particle_count(), 100);
    assert_eq!(system.stats().live_particles, 100);

    // 最长寿命 1.2 秒
    for _ in 0..70 {
        system.update(0.02);
    }
    assert_eq!(system.emitter_count(), 0);
    assert_eq!(system.live_particle_count(), 0);
    assert_eq!(system.state(), SystemState::Idle);
    assert_eq!(system.stats().peak_particles, 100);

    // 被移除发射器的粒子回到储备池
    assert_eq!(system.stats().pool.available, 100);
}

#[test]
fn test_large_explosion_raises_capacity() {
    let mut system = system(serial_config());
    let id = system.create_explosion(0.0, 0.0, 800).unwrap();
    assert_eq!(system.emitter(id).unwrap().particle_count(), 800);
    assert_eq!(system.emitter(id).unwrap().settings().max_particles, 800);
}

#[test]
fn test_new_emitter_seeded_from_reserve() {
    let mut system = system(serial_config());
    system.create_explosion(0.0, 0.0, 100).unwrap();
    for _ in 0..70 {
        system.update(0.02);
    }
    assert_eq!(system.emitter_count(), 0);

    let id = system.create_explosion(0.0, 0.0, 10).unwrap();
    let stats = system.emitter(id).unwrap().pool_stats();
    assert_eq!(stats.total_created, 0);
    assert_eq!(stats.in_use, 10);
}

#[test]
fn test_reserve_is_capped() {
    let mut system = system(ParticleSystemConfig {
        pool_reserve: 4,
        ..serial_config()
    });
    system.create_explosion(0.0, 0.0, 200).unwrap();
    for _ in 0..70 {
        system.update(0.02);
    }
    assert_eq!(system.emitter_count(), 0);
    assert_eq!(system.stats().pool.available, 4 * RESERVE_POOL_FACTOR);
}

#[test]
fn test_paused_system_still_renders() {
    let mut system = system(serial_config());
    let id = system.create_emitter(EmitterKind::Color, &still_preset()).unwrap();
    system.update(0.25);
    assert_eq!(system.live_particle_count(), 2);

    system.set_paused(true);
    assert_eq!(system.state(), SystemState::Paused);
    system.update(1.0);
    assert_eq!(system.emitter(id).unwrap().particle_count(), 2);

    let mut surface = RecordingSurface::new();
    system.render(&mut surface);
    assert_eq!(system.stats().rendered_particles, 2);
    assert!(surface.draw_calls() > 0);

    system.set_paused(false);
    system.update(0.25);
    assert_eq!(system.live_particle_count(), 4);
}

#[test]
fn test_invalid_time_step_is_contained() {
    let mut system = system(serial_config());
    system.create_emitter(EmitterKind::Color, &still_preset()).unwrap();
    system.update(f32::NAN);
    system.update(-1.0);
    assert_eq!(system.live_particle_count(), 0);
    system.update(0.25);
    assert_eq!(system.live_particle_count(), 2);
}

#[test]
fn test_remove_and_clear() {
    let mut system = system(serial_config());
    let a = system.create_fire(0.0, 0.0).unwrap();
    let b = system.create_smoke(10.0, 0.0).unwrap();
    assert_ne!(a, b);
    system.update(0.5);

    assert!(system.remove_emitter(a));
    assert!(!system.remove_emitter(a));
    assert!(system.emitter(a).is_none());
    assert_eq!(system.emitter_count(), 1);

    system.clear();
    assert_eq!(system.emitter_count(), 0);
    assert!(system.particles_in_region(&Rect::new(-100.0, -100.0, 200.0, 200.0)).is_empty());
}

#[test]
fn test_factories() {
    let mut system = system(serial_config());
    let sparks = system.create_sparks(5.0, 5.0, 30).unwrap();
    assert_eq!(system.emitter(sparks).unwrap().particle_count(), 30);
    assert_eq!(system.emitter(sparks).unwrap().position(), Vec2::new(5.0, 5.0));

    let fire = system.create_effect("fire", EmitterKind::Color, 1.0, 2.0).unwrap();
    assert!(system.emitter(fire).unwrap().is_continuous());
    assert!(system.create_effect("nope", EmitterKind::Color, 0.0, 0.0).is_err());

    // 没有物理后端
    assert!(matches!(
        system.create_physical_burst(0.0, 0.0, 5),
        Err(ParticleError::Physics(_))
    ));
}

#[test]
fn test_custom_library_effect() {
    let mut system = system(serial_config());
    let puff = EffectPreset {
        name: "puff".to_string(),
        ..fixed_preset(0.0, 50, false)
    };
    system.library_mut().insert(puff);
    let id = system.create_effect("puff", EmitterKind::Color, 0.0, 0.0).unwrap();
    assert_eq!(system.emitter(id).unwrap().settings().max_particles, 50);
}

#[test]
fn test_trail_follows_entity() {
    let mut system = system(serial_config());
    let entity = Entity::from_raw(7);
    let id = system.create_trail(entity).unwrap();

    let mut positions = HashMap::new();
    positions.insert(entity, Vec2::new(40.0, -20.0));
    system.update_with_entities(0.1, &positions);
    assert_eq!(system.emitter(id).unwrap().position(), Vec2::new(40.0, -20.0));

    positions.insert(entity, Vec2::new(60.0, -20.0));
    system.update_with_entities(0.1, &positions);
    assert_eq!(system.emitter(id).unwrap().position(), Vec2::new(60.0, -20.0));

    // 实体消失时保持原位
    system.update(0.1);
    assert_eq!(system.emitter(id).unwrap().position(), Vec2::new(60.0, -20.0));
}

#[test]
fn test_spatial_queries_follow_update() {
    let mut system = system(serial_config());
    let id = system.create_emitter(EmitterKind::Color, &still_preset()).unwrap();
    system.emitter_mut(id).unwrap().set_position(100.0, 100.0);
    system.update(0.25);

    assert!(system.is_populated(Vec2::new(100.0, 100.0)));
    assert!(!system.is_populated(Vec2::new(-300.0, 0.0)));
    let hits = system.particles_in_region(&Rect::new(90.0, 90.0, 20.0, 20.0));
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|e| e.emitter == id));
}

#[test]
fn test_culling_uses_view_and_populated_region() {
    let mut system = system(serial_config());
    let id = system.create_emitter(EmitterKind::Color, &still_preset()).unwrap();
    system.update(0.25);

    // 发射器移出视口，而粒子仍留在原点
    system.emitter_mut(id).unwrap().set_position(5000.0, 5000.0);
    let mut surface = RecordingSurface::new();
    system.render(&mut surface);
    assert_eq!(system.stats().culled_emitters, 1);
    assert_eq!(system.stats().rendered_particles, 0);
    assert_eq!(surface.draw_calls(), 0);

    system.set_option("enableCulling", false).unwrap();
    system.render(&mut surface);
    assert_eq!(system.stats().culled_emitters, 0);
    assert_eq!(system.stats().rendered_particles, 2);
}

#[test]
fn test_populated_emitter_outside_view_is_drawn() {
    let mut system = system(serial_config());
    let id = system.create_emitter(EmitterKind::Color, &still_preset()).unwrap();
    system.emitter_mut(id).unwrap().set_position(3000.0, 3000.0);
    system.update(0.25);

    let mut surface = RecordingSurface::new();
    system.render(&mut surface);
    assert_eq!(system.stats().culled_emitters, 0);
    assert_eq!(system.stats().rendered_particles, 2);
}

fn mixed_system(config: ParticleSystemConfig) -> (ParticleSystem, EmitterId, EmitterId, EmitterId) {
    let physics = Arc::new(StubPhysics::new());
    let mut system = ParticleSystem::new(config, view()).unwrap().with_physics(physics);
    let color = system.create_emitter(EmitterKind::Color, &still_preset()).unwrap();
    let sprite = system
        .create_sprite_effect(ImageHandle(3), 10.0, 10.0, &still_preset())
        .unwrap();
    let physical = system.create_physical_burst(-10.0, 0.0, 5).unwrap();
    system.update(0.25);
    (system, color, sprite, physical)
}

#[test]
fn test_batch_routing() {
    let config = ParticleSystemConfig {
        enable_culling: false,
        enable_instanced_rendering: false,
        ..serial_config()
    };
    let (mut system, color, sprite, physical) = mixed_system(config);
    let mut surface = RecordingSurface::new();
    system.render(&mut surface);

    let stats = *system.stats();
    assert_eq!(stats.rendered_particles, 9);
    assert_eq!(stats.direct_draws, 1);
    assert!(stats.batches_flushed >= 2);

    let color = system.emitter(color).unwrap();
    assert!(color.particles().iter().all(|p| p.batch_group == 1 && p.last_rendered_frame == 1));
    let sprite = system.emitter(sprite).unwrap();
    assert!(sprite.particles().iter().all(|p| p.batch_group == 2));
    let physical = system.emitter(physical).unwrap();
    assert!(physical.particles().iter().all(|p| p.batch_group == 0));

    let images = surface
        .commands()
        .iter()
        .filter(|c| matches!(c, DrawCommand::DrawImage { image: ImageHandle(3), .. }))
        .count();
    assert_eq!(images, 2);
}

#[test]
fn test_instanced_routing() {
    let config = ParticleSystemConfig {
        enable_culling: false,
        enable_instanced_rendering: true,
        ..serial_config()
    };
    let (mut system, _, sprite, _) = mixed_system(config);
    let mut surface = RecordingSurface::new();
    surface.native_instancing = true;
    system.render(&mut surface);

    let sprite = system.emitter(sprite).unwrap();
    assert!(sprite.particles().iter().all(|p| p.batch_group == 3));
    let instanced: Vec<_> = surface
        .commands()
        .iter()
        .filter(|c| matches!(c, DrawCommand::DrawInstances { .. }))
        .collect();
    assert_eq!(
        instanced,
        vec![&DrawCommand::DrawInstances {
            image: ImageHandle(3),
            count: 2
        }]
    );
}

#[test]
fn test_batching_disabled_draws_directly() {
    let config = ParticleSystemConfig {
        enable_culling: false,
        enable_batch_rendering: false,
        ..serial_config()
    };
    let (mut system, color, _, _) = mixed_system(config);
    let mut surface = RecordingSurface::new();
    system.render(&mut surface);

    assert_eq!(system.stats().direct_draws, 3);
    assert_eq!(system.stats().batches_flushed, 0);
    assert_eq!(system.stats().rendered_particles, 9);
    assert!(system
        .emitter(color)
        .unwrap()
        .particles()
        .iter()
        .all(|p| p.batch_group == 0 && p.last_rendered_frame == 1));
}

#[test]
fn test_process_collisions_shortens_life() {
    let (mut system, _, _, physical) = mixed_system(serial_config());
    let before = system.emitter(physical).unwrap().particles()[0].remaining_lifetime;
    let body = system.emitter(physical).unwrap().particles()[0].body.unwrap();

    let pairs = [
        CollisionPair {
            body_a: body,
            tag_a: ParticleBodyTag::encode(physical),
            body_b: BodyHandle(9999),
            tag_b: 0,
        },
        // 不属于任何发射器
        CollisionPair {
            body_a: BodyHandle(1234),
            tag_a: ParticleBodyTag::encode(4242),
            body_b: BodyHandle(9999),
            tag_b: 0,
        },
    ];
    assert_eq!(system.process_collisions(&pairs), 1);

    let emitter = system.emitter(physical).unwrap();
    let after = emitter.particles().iter().find(|p| p.body == Some(body)).unwrap();
    assert!((after.remaining_lifetime - before * 0.5).abs() < 1e-5);
    assert_eq!(emitter.collision_count(), 1);
}

#[test]
fn test_lod_skips_far_emitters() {
    let config = ParticleSystemConfig {
        enable_lod: true,
        distance_threshold: 100,
        lod_update_interval: 3,
        ..serial_config()
    };
    let mut system = system(config);
    let near = system.create_emitter(EmitterKind::Color, &fixed_preset(8.0, 1000, true)).unwrap();
    let far = system.create_emitter(EmitterKind::Color, &fixed_preset(8.0, 1000, true)).unwrap();
    system.emitter_mut(far).unwrap().set_position(1000.0, 0.0);

    system.update(0.25);
    assert_eq!(system.stats().lod_skipped, 1);
    assert_eq!(system.emitter(near).unwrap().particle_count(), 2);
    assert_eq!(system.emitter(far).unwrap().particle_count(), 0);

    system.update(0.25);
    assert_eq!(system.emitter(far).unwrap().particle_count(), 0);

    // 第三帧补上累计的 0.75 秒
    system.update(0.25);
    assert_eq!(system.stats().lod_skipped, 0);
    assert_eq!(system.emitter(near).unwrap().particle_count(), 6);
    assert_eq!(system.emitter(far).unwrap().particle_count(), 6);
}

fn run_scenario(config: ParticleSystemConfig) -> (ParticleSystem, Vec<Vec<Vec2>>) {
    let mut system = system(config);
    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(system.create_fire(i as f32 * 40.0 - 100.0, 0.0).unwrap());
    }
    ids.push(system.create_explosion(0.0, 50.0, 200).unwrap());
    for _ in 0..10 {
        system.update(0.05);
    }
    let positions = ids
        .iter()
        .map(|id| {
            system
                .emitter(*id)
                .map(|e| e.particles().iter().map(|p| p.position).collect())
                .unwrap_or_default()
        })
        .collect();
    (system, positions)
}

#[test]
fn test_parallel_update_matches_serial() {
    let (serial, expected) = run_scenario(serial_config());
    let (mut parallel, actual) = run_scenario(ParticleSystemConfig {
        enable_multi_threading: true,
        parallel_threshold: 0,
        worker_threads: 3,
        task_timeout_ms: 10_000,
        ..ParticleSystemConfig::default()
    });

    assert_eq!(serial.stats().parallel_tasks, 0);
    assert!(parallel.stats().parallel_tasks > 1);
    assert_eq!(parallel.stats().timed_out_tasks, 0);
    assert_eq!(parallel.emitter_count(), serial.emitter_count());
    assert_eq!(actual, expected);

    parallel.shutdown();
    assert_eq!(parallel.emitter_count(), 7);
}

#[test]
fn test_below_threshold_stays_serial() {
    let mut system = system(ParticleSystemConfig {
        enable_multi_threading: true,
        parallel_threshold: 8,
        ..ParticleSystemConfig::default()
    });
    system.create_fire(0.0, 0.0).unwrap();
    system.update(0.1);
    assert_eq!(system.stats().parallel_tasks, 0);
    assert!(system.workers.is_none());
}

#[test]
fn test_timed_out_tasks_are_reclaimed() {
    let physics = Arc::new(StubPhysics::new());
    let mut system = system(ParticleSystemConfig {
        enable_multi_threading: true,
        parallel_threshold: 2,
        worker_threads: 2,
        task_timeout_ms: 50,
        ..ParticleSystemConfig::default()
    })
    .with_physics(physics.clone());

    let fast = system.create_emitter(EmitterKind::Color, &still_preset()).unwrap();
    system.create_emitter(EmitterKind::Color, &still_preset()).unwrap();
    let mut slow = Vec::new();
    for _ in 0..2 {
        let backend: Arc<dyn PhysicsBackend> = physics.clone();
        let id = system
            .create_emitter(EmitterKind::Physical { backend }, &fixed_preset(0.0, 10, false))
            .unwrap();
        assert_eq!(system.emitter_mut(id).unwrap().burst(1), 1);
        slow.push(id);
    }

    // 两个物理发射器分到同一个任务，每次读取刚体卡 150ms
    physics.set_read_delay(Duration::from_millis(150));
    system.update(0.25);
    assert_eq!(system.stats().timed_out_tasks, 1);
    assert_eq!(system.stats().emitters_in_flight, 2);
    assert_eq!(system.emitter_count(), 2);
    assert_eq!(system.emitter(fast).unwrap().particle_count(), 2);
    assert!(system.emitter(slow[0]).is_none());

    // 下一帧收回
    std::thread::sleep(Duration::from_millis(500));
    physics.set_read_delay(Duration::ZERO);
    system.update(0.25);
    assert_eq!(system.stats().timed_out_tasks, 0);
    assert_eq!(system.stats().emitters_in_flight, 0);
    assert_eq!(system.emitter_count(), 4);
    assert_eq!(system.emitter(slow[1]).unwrap().particle_count(), 1);

    // 关闭时收回
    physics.set_read_delay(Duration::from_millis(150));
    system.update(0.25);
    assert_eq!(system.stats().timed_out_tasks, 1);
    assert_eq!(system.emitter_count(), 2);
    std::thread::sleep(Duration::from_millis(500));
    system.shutdown();
    assert_eq!(system.emitter_count(), 4);
    assert!(slow.iter().all(|id| system.emitter(*id).is_some()));
}

#[test]
fn test_region_query_covering_everything() {
    let mut system = system(serial_config());
    system.create_explosion(0.0, 0.0, 20).unwrap();
    system.update(0.016);
    let hits = system.particles_in_region(&Rect::new(-1.0e30, -1.0e30, 2.0e30, 2.0e30));
    assert_eq!(hits.len(), 20);
}

#[test]
fn test_set_option() {
    let mut system = system(serial_config());
    system.set_option("enableLOD", true).unwrap();
    assert!(system.config().enable_lod);
    system.set_option("distanceThreshold", 750).unwrap();
    assert_eq!(system.config().distance_threshold, 750);

    assert!(system.set_option("distanceThreshold", -5).is_err());
    assert!(system.set_option("enableWarpDrive", true).is_err());
    assert_eq!(system.config().distance_threshold, 750);
}

#[test]
fn test_render_callback_priority() {
    let system = system(serial_config());
    let callback: &dyn RenderCallback = &system;
    assert_eq!(callback.priority(), PARTICLE_RENDER_PRIORITY);
}
