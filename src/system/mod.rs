//! 粒子系统
//!
//! [`ParticleSystem`] 管理所有发射器，负责每帧的更新（可选多线程）、
//! 空间索引重建、剔除与批量渲染。
//!
//! ## 状态
//!
//! - **Idle**：没有发射器
//! - **Running**：至少一个发射器
//! - **Paused**：`update` 直接返回，`render` 照常进行
//!
//! 停止且没有存活粒子的发射器在更新结束后的清理阶段移除，不会在迭代中途删除。
//!
//! ## 错误处理
//!
//! `update` / `render` 从不向调用者传播错误或 panic：发射器级错误记录 `warn`
//! 并跳过该发射器本帧，帧级错误记录 `error` 后丢弃。

pub mod stats;
pub(crate) mod worker;

pub use stats::ParticleSystemStats;

use crate::config::{EffectLibrary, EffectPreset, OptionValue, ParticleSystemConfig};
use crate::core::{ParticleError, ParticleResult, Rect};
use crate::emitter::{
    EmitterId, EmitterKind, EntityPositions, NoEntities, ParticleEmitter,
};
use crate::particles::ParticlePool;
use crate::physics::{CollisionPair, ParticleBodyTag, PhysicsBackend};
use crate::render::batch::{INSTANCED_SPRITE_BATCH, SPRITE_BATCH};
use crate::render::{
    BatchRenderer, ColorBatchRenderer, DrawSurface, ImageHandle, InstancedSpriteRenderer,
    RenderCallback, SpriteBatchRenderer, ViewProvider, PARTICLE_RENDER_PRIORITY,
};
use crate::spatial::{QuadTree, SpatialEntry, SpatialHashGrid, SpatialIndex};
use bevy_ecs::entity::Entity;
use crossbeam_channel::RecvTimeoutError;
use glam::Vec2;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use worker::{run_job, EmitterWork, UpdateJob, UpdateOutcome, UpdateWorkerPool};

/// 系统储备池最多保留 `pool_reserve` 的这么多倍
const RESERVE_POOL_FACTOR: usize = 16;

/// 粒子系统状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    Idle,
    Running,
    Paused,
}

/// 粒子系统
pub struct ParticleSystem {
    config: ParticleSystemConfig,
    view: Arc<dyn ViewProvider>,
    view_bounds: Rect,
    emitters: Vec<ParticleEmitter>,
    next_emitter_id: EmitterId,
    hash_grid: SpatialHashGrid,
    quad_tree: QuadTree,
    renderers: Vec<Box<dyn BatchRenderer>>,
    workers: Option<UpdateWorkerPool>,
    worker_start_failed: bool,
    reserve: ParticlePool,
    physics: Option<Arc<dyn PhysicsBackend>>,
    library: EffectLibrary,
    paused: bool,
    frame: u64,
    stats: ParticleSystemStats,
}

impl ParticleSystem {
    /// 创建粒子系统
    ///
    /// 工作线程在第一次需要并行更新时才启动。
    pub fn new(config: ParticleSystemConfig, view: Arc<dyn ViewProvider>) -> ParticleResult<Self> {
        config.validate()?;
        let view_bounds = view.world_view_bounds();
        tracing::info!(
            target: "particles",
            "Particle system created (culling={}, batching={}, multithreading={}, instancing={}, lod={})",
            config.enable_culling,
            config.enable_batch_rendering,
            config.enable_multi_threading,
            config.enable_instanced_rendering,
            config.enable_lod
        );
        let renderers: Vec<Box<dyn BatchRenderer>> = vec![
            Box::new(ColorBatchRenderer::new()),
            Box::new(SpriteBatchRenderer::new()),
            Box::new(InstancedSpriteRenderer::new()),
        ];
        Ok(Self {
            hash_grid: SpatialHashGrid::new(config.grid_cell_size),
            quad_tree: QuadTree::new(
                config.quad_tree_extent,
                config.quad_tree_max_objects,
                config.quad_tree_max_depth,
            ),
            config,
            view,
            view_bounds,
            emitters: Vec::new(),
            next_emitter_id: 0,
            renderers,
            workers: None,
            worker_start_failed: false,
            reserve: ParticlePool::new(),
            physics: None,
            library: EffectLibrary::with_builtins(),
            paused: false,
            frame: 0,
            stats: ParticleSystemStats::default(),
        })
    }

    /// 设置物理后端（物理粒子需要）
    pub fn with_physics(mut self, backend: Arc<dyn PhysicsBackend>) -> Self {
        self.physics = Some(backend);
        self
    }

    pub fn set_physics_backend(&mut self, backend: Option<Arc<dyn PhysicsBackend>>) {
        self.physics = backend;
    }

    pub fn config(&self) -> &ParticleSystemConfig {
        &self.config
    }

    /// 按名称修改开关，例如 `set_option("enableCulling", false)`
    pub fn set_option(&mut self, name: &str, value: impl Into<OptionValue>) -> ParticleResult<()> {
        let value = value.into();
        self.config.set_option(name, value)?;
        tracing::debug!(target: "particles::config", "Option {} set to {:?}", name, value);
        if !self.config.enable_multi_threading {
            self.stop_workers();
        }
        Ok(())
    }

    pub fn library(&self) -> &EffectLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut EffectLibrary {
        &mut self.library
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            tracing::debug!(target: "particles", "Particle system {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> SystemState {
        if self.paused {
            SystemState::Paused
        } else if self.emitters.is_empty() && self.emitters_in_flight() == 0 {
            SystemState::Idle
        } else {
            SystemState::Running
        }
    }

    pub fn stats(&self) -> &ParticleSystemStats {
        &self.stats
    }

    /// 最近一次更新时的视口
    pub fn view_bounds(&self) -> Rect {
        self.view_bounds
    }

    // ------------------------------------------------------------------
    // 发射器管理
    // ------------------------------------------------------------------

    fn preset(&self, name: &str) -> EffectPreset {
        self.library
            .get(name)
            .cloned()
            .or_else(|| EffectPreset::builtin(name))
            .unwrap_or_else(|| EffectPreset::new(name))
    }

    /// 按预设创建发射器
    pub fn create_emitter(&mut self, kind: EmitterKind, preset: &EffectPreset) -> ParticleResult<EmitterId> {
        self.next_emitter_id += 1;
        let id = self.next_emitter_id;
        let mut emitter = ParticleEmitter::from_preset(id, kind, preset)?;
        let seed = emitter.settings().max_particles.min(self.config.pool_reserve);
        emitter.pool_mut().absorb(self.reserve.take_available(seed));
        tracing::debug!(
            target: "particles",
            "Created {:?} emitter {} from preset '{}'",
            emitter.kind_tag(),
            id,
            preset.name
        );
        self.emitters.push(emitter);
        Ok(id)
    }

    /// 按特效库中的名称创建发射器
    pub fn create_effect(&mut self, name: &str, kind: EmitterKind, x: f32, y: f32) -> ParticleResult<EmitterId> {
        let preset = self
            .library
            .get(name)
            .cloned()
            .ok_or_else(|| ParticleError::InvalidConfig(format!("unknown effect '{}'", name)))?;
        let id = self.create_emitter(kind, &preset)?;
        self.place(id, x, y)?;
        Ok(id)
    }

    fn place(&mut self, id: EmitterId, x: f32, y: f32) -> ParticleResult<&mut ParticleEmitter> {
        let emitter = self.emitter_mut(id).ok_or(ParticleError::EmitterNotFound(id))?;
        emitter.set_position(x, y);
        Ok(emitter)
    }

    /// 一次性爆发：停止的发射器 + `count` 个粒子，粒子全部死亡后自动移除
    fn spawn_burst(
        &mut self,
        kind: EmitterKind,
        preset: EffectPreset,
        x: f32,
        y: f32,
        count: usize,
    ) -> ParticleResult<EmitterId> {
        let capacity = preset
            .get("maxParticles")
            .and_then(|v| v.as_f32())
            .map_or(0, |v| v as usize);
        let preset = if capacity < count {
            preset.with("maxParticles", count as i64)
        } else {
            preset
        };
        let id = self.create_emitter(kind, &preset)?;
        let emitter = self.place(id, x, y)?;
        emitter.stop();
        emitter.burst(count);
        Ok(id)
    }

    /// 在 (x, y) 处爆炸
    pub fn create_explosion(&mut self, x: f32, y: f32, count: usize) -> ParticleResult<EmitterId> {
        let preset = self.preset("explosion");
        self.spawn_burst(EmitterKind::Color, preset, x, y, count)
    }

    /// 火花爆发
    pub fn create_sparks(&mut self, x: f32, y: f32, count: usize) -> ParticleResult<EmitterId> {
        let preset = self.preset("sparks");
        self.spawn_burst(EmitterKind::Color, preset, x, y, count)
    }

    /// 持续燃烧的火焰
    pub fn create_fire(&mut self, x: f32, y: f32) -> ParticleResult<EmitterId> {
        let preset = self.preset("fire");
        let id = self.create_emitter(EmitterKind::Color, &preset)?;
        self.place(id, x, y)?;
        Ok(id)
    }

    /// 持续的烟雾
    pub fn create_smoke(&mut self, x: f32, y: f32) -> ParticleResult<EmitterId> {
        let preset = self.preset("smoke");
        let id = self.create_emitter(EmitterKind::Color, &preset)?;
        self.place(id, x, y)?;
        Ok(id)
    }

    /// 跟随实体的拖尾
    pub fn create_trail(&mut self, entity: Entity) -> ParticleResult<EmitterId> {
        let preset = self.preset("trail");
        let id = self.create_emitter(EmitterKind::Color, &preset)?;
        let emitter = self.emitter_mut(id).ok_or(ParticleError::EmitterNotFound(id))?;
        emitter.set_attached_entity(Some(entity));
        Ok(id)
    }

    /// 使用图像的持续特效
    pub fn create_sprite_effect(
        &mut self,
        image: ImageHandle,
        x: f32,
        y: f32,
        preset: &EffectPreset,
    ) -> ParticleResult<EmitterId> {
        let id = self.create_emitter(EmitterKind::Sprite { image }, preset)?;
        self.place(id, x, y)?;
        Ok(id)
    }

    /// 由物理引擎驱动的爆发
    pub fn create_physical_burst(&mut self, x: f32, y: f32, count: usize) -> ParticleResult<EmitterId> {
        let backend = self
            .physics
            .clone()
            .ok_or_else(|| ParticleError::Physics("no physics backend configured".to_string()))?;
        let preset = self.preset("sparks");
        self.spawn_burst(EmitterKind::Physical { backend }, preset, x, y, count)
    }

    pub fn emitter(&self, id: EmitterId) -> Option<&ParticleEmitter> {
        self.emitters.iter().find(|e| e.id() == id)
    }

    pub fn emitter_mut(&mut self, id: EmitterId) -> Option<&mut ParticleEmitter> {
        self.emitters.iter_mut().find(|e| e.id() == id)
    }

    pub fn emitters(&self) -> impl Iterator<Item = &ParticleEmitter> {
        self.emitters.iter()
    }

    /// 立即移除发射器，返回是否存在
    pub fn remove_emitter(&mut self, id: EmitterId) -> bool {
        let Some(index) = self.emitters.iter().position(|e| e.id() == id) else {
            return false;
        };
        let emitter = self.emitters.remove(index);
        self.retire(emitter);
        true
    }

    /// 移除所有发射器
    pub fn clear(&mut self) {
        for emitter in std::mem::take(&mut self.emitters) {
            self.retire(emitter);
        }
        self.hash_grid.clear();
        self.quad_tree.clear();
    }

    fn retire(&mut self, mut emitter: ParticleEmitter) {
        emitter.clear_particles();
        let spare = emitter.pool_mut().take_available(usize::MAX);
        self.reserve.absorb(spare);
        tracing::debug!(target: "particles", "Emitter {} removed", emitter.id());
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    pub fn live_particle_count(&self) -> usize {
        self.emitters.iter().map(|e| e.particle_count()).sum()
    }

    fn emitters_in_flight(&self) -> usize {
        self.workers.as_ref().map_or(0, |w| w.emitters_in_flight())
    }

    // ------------------------------------------------------------------
    // 更新
    // ------------------------------------------------------------------

    /// 推进一帧（无挂载实体）
    pub fn update(&mut self, dt: f32) {
        self.update_with_entities(dt, &NoEntities);
    }

    /// 推进一帧，挂载实体的位置从 `entities` 读取
    pub fn update_with_entities(&mut self, dt: f32, entities: &dyn EntityPositions) {
        if self.paused {
            return;
        }
        let started = Instant::now();
        match catch_unwind(AssertUnwindSafe(|| self.try_update(dt, entities))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(target: "particles", "Particle update failed: {}", e),
            Err(payload) => tracing::error!(
                target: "particles",
                "Particle update failed: {}",
                ParticleError::from_panic(payload)
            ),
        }
        self.stats.update_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::trace!(target: "particles", "{}", self.stats.summary());
    }

    fn try_update(&mut self, dt: f32, entities: &dyn EntityPositions) -> ParticleResult<()> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(ParticleError::InvalidConfig(format!("invalid time step {}", dt)));
        }
        self.frame += 1;
        let frame = self.frame;
        self.stats.timed_out_tasks = 0;
        self.stats.faulted_emitters = 0;
        self.stats.lod_skipped = 0;
        self.stats.parallel_tasks = 0;

        self.reclaim_late_results();
        self.view_bounds = self.view.world_view_bounds();
        self.hash_grid.clear();
        self.quad_tree.clear();

        let work = self.prepare_work(dt, entities);
        let outcomes = if self.config.enable_multi_threading && work.len() > self.config.parallel_threshold {
            self.update_parallel(frame, work)
        } else {
            vec![run_job(UpdateJob { frame, work })]
        };
        for outcome in outcomes {
            self.hash_grid.insert_particles(&outcome.entries);
            self.quad_tree.insert_particles(&outcome.entries);
            self.absorb_emitters(outcome);
        }
        self.emitters.sort_by_key(|e| e.id());

        self.purge_finished();
        self.rebalance_pools();
        self.refresh_stats();
        Ok(())
    }

    /// 为每个发射器决定本帧的 dt（LOD）和挂载位置
    fn prepare_work(&mut self, dt: f32, entities: &dyn EntityPositions) -> Vec<EmitterWork> {
        let centre = self.view_bounds.center();
        let threshold = self.config.distance_threshold as f32;
        let interval = self.config.lod_update_interval;
        let lod = self.config.enable_lod;

        let mut work = Vec::with_capacity(self.emitters.len());
        for mut emitter in std::mem::take(&mut self.emitters) {
            let far = lod && emitter.position().distance(centre) > threshold;
            let step = emitter.lod.gate(dt, far, interval);
            if step.is_none() {
                self.stats.lod_skipped += 1;
            }
            let anchor = emitter
                .attached_entity()
                .and_then(|entity| entities.position_of(entity));
            work.push(EmitterWork {
                emitter,
                dt: step,
                anchor,
            });
        }
        work
    }

    fn update_parallel(&mut self, frame: u64, work: Vec<EmitterWork>) -> Vec<UpdateOutcome> {
        if self.workers.is_none() && !self.worker_start_failed {
            match UpdateWorkerPool::new(self.config.worker_count()) {
                Ok(pool) => self.workers = Some(pool),
                Err(e) => {
                    tracing::warn!(target: "particles::worker", "Falling back to single-threaded update: {}", e);
                    self.worker_start_failed = true;
                }
            }
        }
        let Some(pool) = self.workers.as_mut() else {
            return vec![run_job(UpdateJob { frame, work })];
        };

        let chunk = work.len().div_ceil(pool.thread_count()).max(1);
        let mut outcomes = Vec::new();
        let mut submitted = 0;
        let mut work = work.into_iter().peekable();
        while work.peek().is_some() {
            let group: Vec<EmitterWork> = work.by_ref().take(chunk).collect();
            match pool.submit(UpdateJob { frame, work: group }) {
                Ok(()) => submitted += 1,
                Err(job) => outcomes.push(run_job(job)),
            }
        }
        self.stats.parallel_tasks = submitted;

        let timeout = Duration::from_millis(self.config.task_timeout_ms);
        let mut pending = submitted;
        while pending > 0 {
            match pool.recv_timeout(timeout) {
                Ok(outcome) => {
                    if outcome.frame == frame {
                        pending -= 1;
                    }
                    outcomes.push(outcome);
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        target: "particles::worker",
                        "{} particle update task(s) timed out after {:?}, reclaiming later",
                        pending,
                        timeout
                    );
                    self.stats.timed_out_tasks += pending;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::error!(target: "particles::worker", "Particle workers disconnected");
                    self.stats.timed_out_tasks += pending;
                    break;
                }
            }
        }
        outcomes
    }

    fn absorb_emitters(&mut self, outcome: UpdateOutcome) {
        self.stats.faulted_emitters += outcome.faulted;
        self.emitters.extend(outcome.emitters);
    }

    /// 收回之前超时任务的发射器
    fn reclaim_late_results(&mut self) {
        let Some(pool) = self.workers.as_mut() else {
            return;
        };
        for outcome in pool.drain_ready() {
            tracing::debug!(
                target: "particles::worker",
                "Reclaimed {} emitter(s) from frame {}",
                outcome.emitters.len(),
                outcome.frame
            );
            self.absorb_emitters(outcome);
        }
    }

    fn purge_finished(&mut self) {
        let (finished, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.emitters)
            .into_iter()
            .partition(|e| e.is_finished());
        self.emitters = live;
        for emitter in finished {
            self.retire(emitter);
        }
    }

    /// 把各发射器多余的空闲粒子归还到系统储备池
    fn rebalance_pools(&mut self) {
        let keep = self.config.pool_reserve;
        for emitter in &mut self.emitters {
            let excess = emitter.pool_mut().release_excess(keep);
            self.reserve.absorb(excess);
        }
        self.reserve.truncate_available(keep.max(1) * RESERVE_POOL_FACTOR);
    }

    fn refresh_stats(&mut self) {
        let live = self.live_particle_count();
        self.stats.emitters = self.emitters.len();
        self.stats.live_particles = live;
        self.stats.peak_particles = self.stats.peak_particles.max(live);
        self.stats.emitters_in_flight = self.emitters_in_flight();
        self.stats.pool = self
            .emitters
            .iter()
            .map(|e| e.pool_stats())
            .fold(self.reserve.stats(), |acc, s| acc.combine(s));
    }

    // ------------------------------------------------------------------
    // 查询
    // ------------------------------------------------------------------

    /// 与区域相交的粒子（本帧空间索引）
    pub fn particles_in_region(&self, region: &Rect) -> Vec<SpatialEntry> {
        let mut out = Vec::new();
        self.hash_grid.query_region(region, &mut out);
        out
    }

    /// 世界坐标处是否有粒子
    pub fn is_populated(&self, point: Vec2) -> bool {
        self.quad_tree.contains_point(point)
    }

    /// 处理物理碰撞，返回转发给发射器的数量
    pub fn process_collisions(&mut self, pairs: &[CollisionPair]) -> usize {
        let mut forwarded = 0;
        for pair in pairs {
            for (body, tag) in [(pair.body_a, pair.tag_a), (pair.body_b, pair.tag_b)] {
                let Some(emitter_id) = ParticleBodyTag::decode(tag) else {
                    continue;
                };
                if let Some(emitter) = self.emitter_mut(emitter_id) {
                    if emitter.handle_collision(body) {
                        forwarded += 1;
                    }
                }
            }
        }
        forwarded
    }

    // ------------------------------------------------------------------
    // 渲染
    // ------------------------------------------------------------------

    /// 绘制一帧（暂停时也会绘制）
    pub fn render(&mut self, surface: &mut dyn DrawSurface) {
        let started = Instant::now();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.render_frame(surface))) {
            tracing::error!(
                target: "particles::render",
                "Particle render failed: {}",
                ParticleError::from_panic(payload)
            );
        }
        self.stats.render_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    }

    fn render_frame(&mut self, surface: &mut dyn DrawSurface) {
        for renderer in &mut self.renderers {
            renderer.reset();
        }
        let visible = self.view.world_view_bounds().expanded(self.config.view_margin);
        let culling = self.config.enable_culling;
        let batching = self.config.enable_batch_rendering;
        let instancing = self.config.enable_instanced_rendering;

        // 同类发射器相邻，提高批次命中
        let mut order: Vec<usize> = (0..self.emitters.len()).collect();
        order.sort_by_key(|&i| (self.emitters[i].kind_tag(), self.emitters[i].id()));

        let mut rendered = 0;
        let mut culled = 0;
        let mut direct = 0;
        for index in order {
            let emitter = &mut self.emitters[index];
            let position = emitter.position();
            if culling && !visible.contains(position) && !self.quad_tree.contains_point(position) {
                culled += 1;
                continue;
            }

            let route = if batching {
                emitter.kind_tag().batch_type().map(|t| {
                    if t == SPRITE_BATCH && instancing {
                        INSTANCED_SPRITE_BATCH
                    } else {
                        t
                    }
                })
            } else {
                None
            };
            let slot = route.and_then(|t| self.renderers.iter().position(|r| r.batch_type() == t));

            match slot {
                Some(slot) => {
                    let frame = emitter.advance_render_frame();
                    let renderer = &mut self.renderers[slot];
                    for particle in emitter.particles_mut() {
                        if renderer.add_particle(particle) {
                            particle.batch_group = slot as u32 + 1;
                            particle.last_rendered_frame = frame;
                            rendered += 1;
                        }
                    }
                }
                None => {
                    rendered += emitter.render(surface);
                    direct += 1;
                }
            }
        }

        let mut batches = 0;
        for renderer in &mut self.renderers {
            batches += renderer.render(surface).groups;
        }

        self.stats.rendered_particles = rendered;
        self.stats.culled_emitters = culled;
        self.stats.direct_draws = direct;
        self.stats.batches_flushed = batches;
    }

    // ------------------------------------------------------------------
    // 关闭
    // ------------------------------------------------------------------

    fn stop_workers(&mut self) {
        let Some(mut pool) = self.workers.take() else {
            return;
        };
        let grace = Duration::from_millis(self.config.task_timeout_ms);
        for outcome in pool.shutdown(grace) {
            self.absorb_emitters(outcome);
        }
        self.emitters.sort_by_key(|e| e.id());
    }

    /// 关闭工作线程并收回仍在途的发射器，不会无限阻塞
    pub fn shutdown(&mut self) {
        self.stop_workers();
        tracing::info!(
            target: "particles",
            "Particle system shut down ({} emitters, {} particles)",
            self.emitters.len(),
            self.live_particle_count()
        );
    }
}

impl Drop for ParticleSystem {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

impl RenderCallback for ParticleSystem {
    fn render(&mut self, surface: &mut dyn DrawSurface) {
        ParticleSystem::render(self, surface);
    }

    fn priority(&self) -> i32 {
        PARTICLE_RENDER_PRIORITY
    }
}

#[cfg(test)]
mod tests;
