//! 粒子对象池

use super::Particle;
use glam::Vec4;
use std::collections::VecDeque;

/// 对象池统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 空闲粒子数
    pub available: usize,
    /// 已借出粒子数
    pub in_use: usize,
    /// 借出数峰值
    pub peak_usage: usize,
    /// 累计新分配的粒子数
    pub total_created: usize,
}

impl PoolStats {
    /// 汇总多个池的统计
    pub fn combine(self, other: PoolStats) -> PoolStats {
        PoolStats {
            available: self.available + other.available,
            in_use: self.in_use + other.in_use,
            peak_usage: self.peak_usage + other.peak_usage,
            total_created: self.total_created + other.total_created,
        }
    }
}

/// 粒子对象池 - 复用已死亡的粒子，避免每帧分配
///
/// 空闲队列按需增长，没有上限。
#[derive(Debug, Default)]
pub struct ParticlePool {
    available: VecDeque<Particle>,
    in_use: usize,
    peak_usage: usize,
    total_created: usize,
}

impl ParticlePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预分配 `count` 个空闲粒子
    pub fn with_capacity(count: usize) -> Self {
        let mut pool = Self::new();
        pool.available.extend((0..count).map(|_| Particle::default()));
        pool.total_created = count;
        pool
    }

    /// 取出一个粒子并完全重新初始化
    pub fn obtain_particle(&mut self, x: f32, y: f32, size: f32, color: Vec4, lifetime: f32) -> Particle {
        let particle = match self.available.pop_front() {
            Some(mut particle) => {
                particle.reset(x, y, size, color, lifetime);
                particle
            }
            None => {
                self.total_created += 1;
                Particle::new(x, y, size, color, lifetime)
            }
        };
        self.in_use += 1;
        self.peak_usage = self.peak_usage.max(self.in_use);
        particle
    }

    /// 归还粒子；图像和刚体引用会被清除
    pub fn recycle_particle(&mut self, mut particle: Particle) {
        particle.active = false;
        particle.recyclable = false;
        particle.image = None;
        particle.body = None;
        self.in_use = self.in_use.saturating_sub(1);
        self.available.push_back(particle);
    }

    pub fn recycle_particles(&mut self, particles: impl IntoIterator<Item = Particle>) {
        for particle in particles {
            self.recycle_particle(particle);
        }
    }

    /// 取出最多 `count` 个空闲粒子（用于在池之间转移）
    pub fn take_available(&mut self, count: usize) -> Vec<Particle> {
        let count = count.min(self.available.len());
        self.available.drain(..count).collect()
    }

    /// 只保留 `keep` 个空闲粒子，返回多余的
    pub fn release_excess(&mut self, keep: usize) -> Vec<Particle> {
        if self.available.len() <= keep {
            return Vec::new();
        }
        self.available.drain(keep..).collect()
    }

    /// 只保留 `keep` 个空闲粒子，多余的直接丢弃
    pub fn truncate_available(&mut self, keep: usize) {
        self.available.truncate(keep);
    }

    /// 接收其他池转移来的空闲粒子
    pub fn absorb(&mut self, particles: Vec<Particle>) {
        self.available.extend(particles);
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    pub fn peak_usage(&self) -> usize {
        self.peak_usage
    }

    pub fn total_created(&self) -> usize {
        self.total_created
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            available: self.available.len(),
            in_use: self.in_use,
            peak_usage: self.peak_usage,
            total_created: self.total_created,
        }
    }

    /// 丢弃所有空闲粒子
    pub fn clear(&mut self) {
        self.available.clear();
    }
}
