//! 基于 rapier2d 的粒子物理后端
//!
//! 整个物理世界放在一把互斥锁后面；碰撞事件由自定义的事件处理器
//! 通过 crossbeam 通道转发，宿主每帧调用 [`RapierParticlePhysics::drain_collisions`]
//! 取出后交给 `ParticleSystem::process_collisions`。

use super::{BodyDesc, BodyHandle, BodyState, CollisionPair, PhysicsBackend};
use crate::core::{ParticleError, ParticleResult};
use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec2;
use rapier2d::prelude::DefaultBroadPhase;
use rapier2d::prelude::*;
use std::sync::Mutex;

/// 默认重力（y 轴向下的像素坐标）
pub const DEFAULT_GRAVITY: Vec2 = Vec2::new(0.0, 98.1);

struct RapierWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
}

/// 把 rapier 的碰撞事件转成 [`CollisionPair`]
struct CollisionForwarder {
    tx: Sender<CollisionPair>,
}

impl CollisionForwarder {
    fn resolve(
        &self,
        colliders: &ColliderSet,
        handle: ColliderHandle,
    ) -> Option<(BodyHandle, u128)> {
        let collider = colliders.get(handle)?;
        let body = collider.parent()?;
        Some((to_body_handle(body), collider.user_data))
    }
}

impl EventHandler for CollisionForwarder {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let CollisionEvent::Started(h1, h2, _) = event {
            let (Some((body_a, tag_a)), Some((body_b, tag_b))) =
                (self.resolve(colliders, h1), self.resolve(colliders, h2))
            else {
                return;
            };
            let _ = self.tx.send(CollisionPair {
                body_a,
                tag_a,
                body_b,
                tag_b,
            });
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

fn to_body_handle(handle: RigidBodyHandle) -> BodyHandle {
    let (index, generation) = handle.into_raw_parts();
    BodyHandle(((generation as u64) << 32) | index as u64)
}

fn to_rigid_body_handle(handle: BodyHandle) -> RigidBodyHandle {
    RigidBodyHandle::from_raw_parts(handle.0 as u32, (handle.0 >> 32) as u32)
}

/// rapier2d 物理后端
pub struct RapierParticlePhysics {
    world: Mutex<RapierWorld>,
    forwarder: CollisionForwarder,
    collision_rx: Receiver<CollisionPair>,
}

impl RapierParticlePhysics {
    pub fn new() -> Self {
        Self::with_gravity(DEFAULT_GRAVITY)
    }

    pub fn with_gravity(gravity: Vec2) -> Self {
        let (tx, collision_rx) = unbounded();
        let world = RapierWorld {
            gravity: vector![gravity.x, gravity.y],
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        };
        Self {
            world: Mutex::new(world),
            forwarder: CollisionForwarder { tx },
            collision_rx,
        }
    }

    /// 推进物理世界
    pub fn step(&self, dt: f32) {
        let Ok(mut guard) = self.world.lock() else {
            tracing::error!(target: "particles::physics", "Physics world lock poisoned, skipping step");
            return;
        };
        let w = &mut *guard;
        w.integration_parameters.dt = dt.max(0.0001);
        w.physics_pipeline.step(
            &w.gravity,
            &w.integration_parameters,
            &mut w.island_manager,
            &mut w.broad_phase,
            &mut w.narrow_phase,
            &mut w.rigid_body_set,
            &mut w.collider_set,
            &mut w.impulse_joint_set,
            &mut w.multibody_joint_set,
            &mut w.ccd_solver,
            None,
            &(),
            &self.forwarder,
        );
    }

    /// 添加静态矩形碰撞体（地面、墙壁等）
    pub fn add_static_box(&self, center: Vec2, half_extents: Vec2, tag: u128) -> ParticleResult<BodyHandle> {
        let mut w = self.lock()?;
        let body = RigidBodyBuilder::fixed()
            .translation(vector![center.x, center.y])
            .user_data(tag)
            .build();
        let handle = w.rigid_body_set.insert(body);
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y)
            .user_data(tag)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let RapierWorld {
            collider_set,
            rigid_body_set,
            ..
        } = &mut *w;
        collider_set.insert_with_parent(collider, handle, rigid_body_set);
        Ok(to_body_handle(handle))
    }

    /// 取出自上次调用以来的全部碰撞
    pub fn drain_collisions(&self) -> Vec<CollisionPair> {
        self.collision_rx.try_iter().collect()
    }

    pub fn body_count(&self) -> usize {
        self.world
            .lock()
            .map(|w| w.rigid_body_set.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> ParticleResult<std::sync::MutexGuard<'_, RapierWorld>> {
        self.world
            .lock()
            .map_err(|_| ParticleError::Physics("physics world lock poisoned".to_string()))
    }
}

impl Default for RapierParticlePhysics {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsBackend for RapierParticlePhysics {
    fn create_body(&self, desc: BodyDesc) -> ParticleResult<BodyHandle> {
        if !(desc.radius > 0.0) {
            return Err(ParticleError::Physics(format!(
                "invalid body radius {}",
                desc.radius
            )));
        }
        let mut w = self.lock()?;
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![desc.position.x, desc.position.y])
            .linvel(vector![desc.velocity.x, desc.velocity.y])
            .user_data(desc.user_tag)
            .build();
        let collider = ColliderBuilder::ball(desc.radius)
            .restitution(0.4)
            .user_data(desc.user_tag)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let RapierWorld {
            rigid_body_set,
            collider_set,
            ..
        } = &mut *w;
        let handle = rigid_body_set.insert(body);
        collider_set.insert_with_parent(collider, handle, rigid_body_set);
        Ok(to_body_handle(handle))
    }

    fn remove_body(&self, handle: BodyHandle) {
        let Ok(mut guard) = self.world.lock() else {
            return;
        };
        let w = &mut *guard;
        w.rigid_body_set.remove(
            to_rigid_body_handle(handle),
            &mut w.island_manager,
            &mut w.collider_set,
            &mut w.impulse_joint_set,
            &mut w.multibody_joint_set,
            true,
        );
    }

    fn body_state(&self, handle: BodyHandle) -> Option<BodyState> {
        let w = self.world.lock().ok()?;
        let body = w.rigid_body_set.get(to_rigid_body_handle(handle))?;
        let t = body.translation();
        let v = body.linvel();
        Some(BodyState {
            position: Vec2::new(t.x, t.y),
            velocity: Vec2::new(v.x, v.y),
            rotation: body.rotation().angle(),
        })
    }
}
