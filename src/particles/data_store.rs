//! SoA（Structure of Arrays）粒子存储
//!
//! 每个属性一个数组，容量固定，不会隐式增长。`update_all` 之后活跃粒子
//! 在数组前部保持连续，且相对顺序不变。
//!
//! 这是独立于 [`ParticleEmitter`](crate::emitter::ParticleEmitter) 对象池的另一种表示，
//! 适合由宿主直接驱动的大批量、无需单独渲染状态的粒子。

use glam::{Vec2, Vec4};

/// 创建参数
#[derive(Debug, Clone, Copy)]
pub struct ParticleSpawn {
    pub position: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub size: f32,
    pub color: Vec4,
    pub lifetime: f32,
    pub rotation_speed: f32,
}

impl Default for ParticleSpawn {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            size: 1.0,
            color: Vec4::ONE,
            lifetime: 1.0,
            rotation_speed: 0.0,
        }
    }
}

/// SoA 粒子存储
#[derive(Debug)]
pub struct ParticleDataStore {
    capacity: usize,
    count: usize,
    pub pos_x: Vec<f32>,
    pub pos_y: Vec<f32>,
    pub vel_x: Vec<f32>,
    pub vel_y: Vec<f32>,
    pub acc_x: Vec<f32>,
    pub acc_y: Vec<f32>,
    pub size: Vec<f32>,
    pub rotation: Vec<f32>,
    pub rotation_speed: Vec<f32>,
    pub color: Vec<Vec4>,
    pub alpha: Vec<f32>,
    pub initial_alpha: Vec<f32>,
    pub remaining: Vec<f32>,
    pub max_lifetime: Vec<f32>,
    pub active: Vec<bool>,
}

impl ParticleDataStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            count: 0,
            pos_x: vec![0.0; capacity],
            pos_y: vec![0.0; capacity],
            vel_x: vec![0.0; capacity],
            vel_y: vec![0.0; capacity],
            acc_x: vec![0.0; capacity],
            acc_y: vec![0.0; capacity],
            size: vec![0.0; capacity],
            rotation: vec![0.0; capacity],
            rotation_speed: vec![0.0; capacity],
            color: vec![Vec4::ZERO; capacity],
            alpha: vec![0.0; capacity],
            initial_alpha: vec![0.0; capacity],
            remaining: vec![0.0; capacity],
            max_lifetime: vec![0.0; capacity],
            active: vec![false; capacity],
        }
    }

    /// 在 `count` 处追加粒子；已满时返回 `None`
    pub fn create_particle(&mut self, spawn: ParticleSpawn) -> Option<usize> {
        if self.count >= self.capacity {
            return None;
        }
        let i = self.count;
        self.pos_x[i] = spawn.position.x;
        self.pos_y[i] = spawn.position.y;
        self.vel_x[i] = spawn.velocity.x;
        self.vel_y[i] = spawn.velocity.y;
        self.acc_x[i] = spawn.acceleration.x;
        self.acc_y[i] = spawn.acceleration.y;
        self.size[i] = spawn.size;
        self.rotation[i] = 0.0;
        self.rotation_speed[i] = spawn.rotation_speed;
        self.color[i] = spawn.color;
        self.alpha[i] = spawn.color.w;
        self.initial_alpha[i] = spawn.color.w;
        self.remaining[i] = spawn.lifetime;
        self.max_lifetime[i] = spawn.lifetime;
        self.active[i] = spawn.lifetime > 0.0;
        self.count += 1;
        Some(i)
    }

    /// 推进所有活跃粒子并压缩，返回本帧移除的粒子数
    pub fn update_all(&mut self, dt: f32) -> usize {
        let half_dt2 = 0.5 * dt * dt;
        for i in 0..self.count {
            if !self.active[i] {
                continue;
            }
            self.remaining[i] -= dt;
            if self.remaining[i] <= 0.0 {
                self.remaining[i] = 0.0;
                self.active[i] = false;
                continue;
            }
            self.pos_x[i] += self.vel_x[i] * dt + self.acc_x[i] * half_dt2;
            self.pos_y[i] += self.vel_y[i] * dt + self.acc_y[i] * half_dt2;
            self.vel_x[i] += self.acc_x[i] * dt;
            self.vel_y[i] += self.acc_y[i] * dt;
            self.rotation[i] += self.rotation_speed[i] * dt;

            let progress = if self.max_lifetime[i] > 0.0 {
                1.0 - self.remaining[i] / self.max_lifetime[i]
            } else {
                1.0
            };
            self.alpha[i] = self.initial_alpha[i] * (1.0 - progress);
        }
        self.compact()
    }

    /// 把活跃粒子搬到数组前部，保持相对顺序
    fn compact(&mut self) -> usize {
        let before = self.count;
        let mut write = 0;
        for read in 0..self.count {
            if !self.active[read] {
                continue;
            }
            if read != write {
                self.copy_slot(read, write);
            }
            write += 1;
        }
        self.count = write;
        before - write
    }

    fn copy_slot(&mut self, from: usize, to: usize) {
        self.pos_x[to] = self.pos_x[from];
        self.pos_y[to] = self.pos_y[from];
        self.vel_x[to] = self.vel_x[from];
        self.vel_y[to] = self.vel_y[from];
        self.acc_x[to] = self.acc_x[from];
        self.acc_y[to] = self.acc_y[from];
        self.size[to] = self.size[from];
        self.rotation[to] = self.rotation[from];
        self.rotation_speed[to] = self.rotation_speed[from];
        self.color[to] = self.color[from];
        self.alpha[to] = self.alpha[from];
        self.initial_alpha[to] = self.initial_alpha[from];
        self.remaining[to] = self.remaining[from];
        self.max_lifetime[to] = self.max_lifetime[from];
        self.active[to] = self.active[from];
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    pub fn position(&self, index: usize) -> Option<Vec2> {
        (index < self.count).then(|| Vec2::new(self.pos_x[index], self.pos_y[index]))
    }

    pub fn clear(&mut self) {
        self.active[..self.count].fill(false);
        self.count = 0;
    }
}
