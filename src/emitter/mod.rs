//! 粒子发射器
//!
//! 每个发射器拥有自己的活跃粒子列表、对象池和随机数发生器，
//! 同一时刻只会被一个线程更新。三种发射器共享同一套发射/更新/渲染逻辑，
//! 差异只在粒子构造（[`EmitterKind`]）上。
//!
//! ## 更新顺序
//!
//! 1. 持续发射：以 f64 累计发射时间，本帧发射 `floor(累计时间 * rate) - 已消耗槽数` 个粒子
//! 2. 同步挂载实体的位置
//! 3. 推进所有粒子，死亡粒子通过 swap-remove 移出并回收到对象池

pub mod anchor;
pub mod settings;

pub use anchor::{EntityPositions, NoEntities, Position2D};
pub use settings::EmitterSettings;

use crate::config::EffectPreset;
use crate::core::{ParticleError, ParticleResult, Rect};
use crate::particles::{Particle, ParticlePool, PoolStats};
use crate::physics::{BodyDesc, BodyHandle, ParticleBodyTag, PhysicsBackend};
use crate::render::batch::{COLOR_BATCH, SPRITE_BATCH};
use crate::render::{DrawSurface, ImageHandle};
use crate::spatial::SpatialEntry;
use bevy_ecs::entity::Entity;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// 发射器 ID
pub type EmitterId = u64;

const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// 吸收 f32 帧间隔的表示误差，避免 `1/144` 之类的间隔少发一个槽
const EMISSION_TOLERANCE: f64 = 1e-6;

/// 发射器种类
#[derive(Clone)]
pub enum EmitterKind {
    /// 纯色矩形
    Color,
    /// 精灵图像
    Sprite { image: ImageHandle },
    /// 位置由外部物理引擎驱动
    Physical { backend: Arc<dyn PhysicsBackend> },
}

impl fmt::Debug for EmitterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitterKind::Color => write!(f, "Color"),
            EmitterKind::Sprite { image } => write!(f, "Sprite({:?})", image),
            EmitterKind::Physical { .. } => write!(f, "Physical"),
        }
    }
}

/// 发射器种类标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EmitterKindTag {
    Color,
    Sprite,
    Physical,
}

impl EmitterKindTag {
    /// 对应的批渲染器类型；`None` 表示直接绘制
    pub fn batch_type(&self) -> Option<&'static str> {
        match self {
            EmitterKindTag::Color => Some(COLOR_BATCH),
            EmitterKindTag::Sprite => Some(SPRITE_BATCH),
            EmitterKindTag::Physical => None,
        }
    }
}

impl EmitterKind {
    pub fn tag(&self) -> EmitterKindTag {
        match self {
            EmitterKind::Color => EmitterKindTag::Color,
            EmitterKind::Sprite { .. } => EmitterKindTag::Sprite,
            EmitterKind::Physical { .. } => EmitterKindTag::Physical,
        }
    }
}

/// 远距离发射器的降频状态
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LodState {
    skipped_frames: u32,
    pending_dt: f32,
}

impl LodState {
    /// 返回本帧应推进的时间；`None` 表示本帧跳过
    ///
    /// 跳过的时间会累加到下一次更新，模拟时间不丢失。
    pub(crate) fn gate(&mut self, dt: f32, far: bool, interval: u32) -> Option<f32> {
        self.pending_dt += dt;
        if far {
            self.skipped_frames += 1;
            if self.skipped_frames < interval.max(1) {
                return None;
            }
        }
        let total = self.pending_dt;
        *self = Self::default();
        Some(total)
    }
}

/// 粒子发射器
pub struct ParticleEmitter {
    id: EmitterId,
    kind: EmitterKind,
    settings: EmitterSettings,
    position: Vec2,
    emission_time: f64,
    emission_slots: u64,
    active: bool,
    attached_entity: Option<Entity>,
    particles: Vec<Particle>,
    pool: ParticlePool,
    rng: StdRng,
    pub(crate) lod: LodState,
    render_frame: u64,
    total_emitted: u64,
    collisions: u64,
}

impl fmt::Debug for ParticleEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleEmitter")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("position", &self.position)
            .field("active", &self.active)
            .field("particles", &self.particles.len())
            .finish()
    }
}

impl ParticleEmitter {
    pub fn new(id: EmitterId, kind: EmitterKind, settings: EmitterSettings) -> Self {
        Self {
            id,
            kind,
            settings,
            position: Vec2::ZERO,
            emission_time: 0.0,
            emission_slots: 0,
            active: true,
            attached_entity: None,
            particles: Vec::new(),
            pool: ParticlePool::new(),
            rng: StdRng::seed_from_u64(id.wrapping_mul(SEED_MIX)),
            lod: LodState::default(),
            render_frame: 0,
            total_emitted: 0,
            collisions: 0,
        }
    }

    /// 用预设创建
    pub fn from_preset(id: EmitterId, kind: EmitterKind, preset: &EffectPreset) -> ParticleResult<Self> {
        Ok(Self::new(id, kind, EmitterSettings::from_preset(preset)?))
    }

    pub fn id(&self) -> EmitterId {
        self.id
    }

    pub fn kind(&self) -> &EmitterKind {
        &self.kind
    }

    pub fn kind_tag(&self) -> EmitterKindTag {
        self.kind.tag()
    }

    pub fn settings(&self) -> &EmitterSettings {
        &self.settings
    }

    /// 重新应用命名参数
    pub fn configure(&mut self, preset: &EffectPreset) -> ParticleResult<()> {
        let rate = self.settings.emission_rate;
        let result = self.settings.configure(preset);
        if self.settings.emission_rate != rate {
            self.reset_emission_clock();
        }
        result
    }

    fn reset_emission_clock(&mut self) {
        self.emission_time = 0.0;
        self.emission_slots = 0;
    }

    /// 推进一帧
    pub fn update(&mut self, dt: f32) -> ParticleResult<()> {
        self.update_anchored(dt, None)
    }

    /// 推进一帧；`anchor` 是挂载实体本帧的位置
    pub fn update_anchored(&mut self, dt: f32, anchor: Option<Vec2>) -> ParticleResult<()> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(ParticleError::InvalidConfig(format!(
                "emitter {}: invalid time step {}",
                self.id, dt
            )));
        }
        if self.settings.continuous && self.active && self.settings.emission_rate > 0.0 {
            self.emission_time += f64::from(dt);
            let due = (self.emission_time
                * f64::from(self.settings.emission_rate)
                * (1.0 + EMISSION_TOLERANCE))
                .floor() as u64;
            let slots = due.saturating_sub(self.emission_slots);
            if slots > 0 {
                // 超出容量的槽同样被消耗
                self.emission_slots = due;
                let room = self.settings.max_particles.saturating_sub(self.particles.len());
                self.emit(usize::try_from(slots).unwrap_or(usize::MAX).min(room));
            }
        }

        if let Some(position) = anchor {
            self.position = position;
        }

        self.update_particles(dt);
        Ok(())
    }

    fn update_particles(&mut self, dt: f32) {
        let backend = match &self.kind {
            EmitterKind::Physical { backend } => Some(backend.clone()),
            _ => None,
        };

        let mut i = 0;
        while i < self.particles.len() {
            let particle = &mut self.particles[i];
            match (&backend, particle.body) {
                (Some(backend), Some(body)) => match backend.body_state(body) {
                    Some(state) => particle.update_from_body(dt, state),
                    None => particle.update(dt),
                },
                _ => particle.update(dt),
            }

            if particle.active {
                i += 1;
                continue;
            }
            let dead = self.particles.swap_remove(i);
            if let (Some(backend), Some(body)) = (&backend, dead.body) {
                backend.remove_body(body);
            }
            self.pool.recycle_particle(dead);
        }
    }

    /// 发射最多 `count` 个粒子，返回实际发射数
    pub fn emit(&mut self, count: usize) -> usize {
        let mut emitted = 0;
        for _ in 0..count {
            if self.particles.len() >= self.settings.max_particles {
                break;
            }
            if let Some(particle) = self.create_particle() {
                self.particles.push(particle);
                emitted += 1;
            }
        }
        self.total_emitted += emitted as u64;
        emitted
    }

    /// 一次性发射，不影响持续发射状态和发射时钟
    pub fn burst(&mut self, count: usize) -> usize {
        let continuous = self.settings.continuous;
        self.settings.continuous = false;
        let emitted = self.emit(count);
        self.settings.continuous = continuous;
        emitted
    }

    fn sample(&mut self, min: f32, max: f32) -> f32 {
        if min >= max {
            min
        } else {
            self.rng.gen_range(min..=max)
        }
    }

    fn create_particle(&mut self) -> Option<Particle> {
        let s = &self.settings;
        let (min_size, max_size) = (s.min_size, s.max_size);
        let (min_speed, max_speed) = (s.min_speed, s.max_speed);
        let (min_life, max_life) = (s.min_lifetime, s.max_lifetime);
        let (base, spread) = (s.base_angle, s.spread_angle);

        let angle = base + (self.rng.gen::<f32>() - 0.5) * spread;
        let speed = self.sample(min_speed, max_speed);
        let size = self.sample(min_size, max_size);
        let lifetime = self.sample(min_life, max_life);
        if lifetime <= 0.0 {
            tracing::trace!(target: "particles", "Emitter {}: non-positive lifetime, particle skipped", self.id);
            return None;
        }

        let s = &self.settings;
        let mut particle = self
            .pool
            .obtain_particle(self.position.x, self.position.y, size, s.start_color, lifetime);
        particle.velocity = Vec2::new(angle.cos(), angle.sin()) * speed;
        particle.acceleration = Vec2::new(0.0, s.gravity);
        particle.final_size = size * s.end_size_scale;
        particle.end_color = s.end_color;
        particle.rotation_speed = s.rotation_speed;

        match &self.kind {
            EmitterKind::Color => {}
            EmitterKind::Sprite { image } => particle.image = Some(*image),
            EmitterKind::Physical { backend } => {
                let radius = if s.body_radius > 0.0 {
                    s.body_radius
                } else {
                    (size * 0.5).max(0.1)
                };
                let desc = BodyDesc {
                    position: particle.position,
                    velocity: particle.velocity,
                    radius,
                    user_tag: ParticleBodyTag::encode(self.id),
                };
                match backend.create_body(desc) {
                    Ok(handle) => particle.body = Some(handle),
                    Err(e) => {
                        tracing::debug!(target: "particles::physics", "Emitter {}: {}", self.id, e);
                        self.pool.recycle_particle(particle);
                        return None;
                    }
                }
            }
        }
        Some(particle)
    }

    /// 物理碰撞回调：缩短对应粒子的剩余寿命
    pub fn handle_collision(&mut self, body: BodyHandle) -> bool {
        let scale = self.settings.collision_life_scale;
        match self.particles.iter_mut().find(|p| p.body == Some(body)) {
            Some(particle) => {
                particle.scale_lifetime(scale);
                self.collisions += 1;
                true
            }
            None => false,
        }
    }

    /// 直接绘制全部活跃粒子，返回绘制数
    pub fn render(&mut self, surface: &mut dyn DrawSurface) -> usize {
        let frame = self.advance_render_frame();
        let mut drawn = 0;
        for particle in self.particles.iter_mut().filter(|p| p.active) {
            particle.render(surface);
            particle.batch_group = 0;
            particle.last_rendered_frame = frame;
            drawn += 1;
        }
        drawn
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    /// 停止持续发射；已有粒子继续存活
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_continuous(&self) -> bool {
        self.settings.continuous
    }

    pub fn set_continuous(&mut self, continuous: bool) {
        self.settings.continuous = continuous;
    }

    /// 已停止且没有存活粒子，可以移除
    pub fn is_finished(&self) -> bool {
        !self.active && self.particles.is_empty()
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position = Vec2::new(x, y);
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn set_attached_entity(&mut self, entity: Option<Entity>) {
        self.attached_entity = entity;
    }

    pub fn attached_entity(&self) -> Option<Entity> {
        self.attached_entity
    }

    pub fn total_emitted(&self) -> u64 {
        self.total_emitted
    }

    pub fn collision_count(&self) -> u64 {
        self.collisions
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub(crate) fn pool_mut(&mut self) -> &mut ParticlePool {
        &mut self.pool
    }

    pub(crate) fn advance_render_frame(&mut self) -> u64 {
        self.render_frame += 1;
        self.render_frame
    }

    /// 存活粒子的空间索引条目
    pub fn collect_spatial_entries(&self, out: &mut Vec<SpatialEntry>) {
        out.extend(self.particles.iter().enumerate().filter(|(_, p)| p.active).map(|(i, p)| {
            let half = (p.size * 0.5).max(0.0);
            SpatialEntry {
                emitter: self.id,
                particle: i as u32,
                bounds: Rect::from_center(p.position, Vec2::splat(half)),
            }
        }));
    }

    /// 移除所有粒子（释放刚体）
    pub fn clear_particles(&mut self) {
        let backend = match &self.kind {
            EmitterKind::Physical { backend } => Some(backend.clone()),
            _ => None,
        };
        for particle in self.particles.drain(..) {
            if let (Some(backend), Some(body)) = (&backend, particle.body) {
                backend.remove_body(body);
            }
            self.pool.recycle_particle(particle);
        }
    }
}

impl Drop for ParticleEmitter {
    fn drop(&mut self) {
        if matches!(self.kind, EmitterKind::Physical { .. }) {
            self.clear_particles();
        }
    }
}

/// 测试用：起止颜色相同、寿命固定的纯色预设
#[cfg(test)]
pub(crate) fn fixed_preset(rate: f32, max_particles: i64, continuous: bool) -> EffectPreset {
    EffectPreset::new("fixed")
        .with("startColor", [1.0, 1.0, 1.0, 1.0])
        .with("endColor", [1.0, 1.0, 1.0, 1.0])
        .with("minLifetime", 100.0)
        .with("maxLifetime", 100.0)
        .with("minSpeed", 10.0)
        .with("maxSpeed", 10.0)
        .with("emissionRate", rate)
        .with("maxParticles", max_particles)
        .with("continuous", continuous)
}
