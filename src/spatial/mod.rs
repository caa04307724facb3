//! 空间索引
//!
//! 每次 `update` 都会清空并完整重建，不做增量维护。
//! 并行更新时工作线程只收集 [`SpatialEntry`]，在汇合后由调用线程统一插入。

pub mod hash_grid;
pub mod quad_tree;

pub use hash_grid::SpatialHashGrid;
pub use quad_tree::QuadTree;

use crate::core::Rect;
use crate::emitter::EmitterId;
use glam::Vec2;

/// 索引中的一个粒子
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialEntry {
    pub emitter: EmitterId,
    /// 粒子在发射器活跃列表中的下标（仅在本帧有效）
    pub particle: u32,
    pub bounds: Rect,
}

impl SpatialEntry {
    pub fn new(emitter: EmitterId, particle: u32, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            emitter,
            particle,
            bounds: Rect::new(x, y, width, height),
        }
    }

    fn key(&self) -> (EmitterId, u32) {
        (self.emitter, self.particle)
    }
}

/// 空间索引接口
pub trait SpatialIndex {
    fn clear(&mut self);

    /// 插入一个对象；被拒绝时返回 false
    fn insert_object(&mut self, entry: SpatialEntry) -> bool;

    /// 批量插入，返回成功插入的数量
    fn insert_particles(&mut self, entries: &[SpatialEntry]) -> usize {
        entries
            .iter()
            .filter(|entry| self.insert_object(**entry))
            .count()
    }

    /// 点是否落在任何已占用的区域
    fn contains_point(&self, point: Vec2) -> bool;

    /// 与 `region` 相交的对象（每个对象只出现一次）
    fn query_region(&self, region: &Rect, out: &mut Vec<SpatialEntry>);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
