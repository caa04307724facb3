//! 单个粒子
//!
//! 位置使用 Verlet 风格积分：`pos += vel*dt + 0.5*acc*dt²`，随后 `vel += acc*dt`。
//! 大小、颜色和透明度按生命进度 `t = 1 - remaining/max` 在起止值之间线性插值。

use crate::physics::{BodyHandle, BodyState};
use crate::render::{DrawSurface, ImageHandle};
use glam::{Vec2, Vec4};

/// 粒子
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    /// 当前大小（边长）
    pub size: f32,
    pub initial_size: f32,
    pub final_size: f32,
    /// 当前颜色（RGBA）
    pub color: Vec4,
    pub start_color: Vec4,
    pub end_color: Vec4,
    /// 当前透明度，等于插值后颜色的 alpha
    pub alpha: f32,
    /// 旋转（弧度）
    pub rotation: f32,
    pub rotation_speed: f32,
    pub max_lifetime: f32,
    pub remaining_lifetime: f32,
    pub active: bool,
    /// 已死亡、等待回收
    pub recyclable: bool,
    /// 最近一次渲染所在的批次（0 表示直接绘制）
    pub batch_group: u32,
    pub last_rendered_frame: u64,
    /// 精灵粒子的图像
    pub image: Option<ImageHandle>,
    /// 物理粒子的刚体
    pub body: Option<BodyHandle>,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            size: 0.0,
            initial_size: 0.0,
            final_size: 0.0,
            color: Vec4::ONE,
            start_color: Vec4::ONE,
            end_color: Vec4::ONE,
            alpha: 1.0,
            rotation: 0.0,
            rotation_speed: 0.0,
            max_lifetime: 0.0,
            remaining_lifetime: 0.0,
            active: false,
            recyclable: false,
            batch_group: 0,
            last_rendered_frame: 0,
            image: None,
            body: None,
        }
    }
}

impl Particle {
    /// 创建活跃粒子
    pub fn new(x: f32, y: f32, size: f32, color: Vec4, lifetime: f32) -> Self {
        let mut particle = Self::default();
        particle.reset(x, y, size, color, lifetime);
        particle
    }

    /// 重新初始化为活跃粒子，清除上一次使用留下的全部状态
    pub fn reset(&mut self, x: f32, y: f32, size: f32, color: Vec4, lifetime: f32) {
        *self = Self {
            position: Vec2::new(x, y),
            size,
            initial_size: size,
            final_size: size,
            color,
            start_color: color,
            end_color: color,
            alpha: color.w,
            max_lifetime: lifetime,
            remaining_lifetime: lifetime,
            active: true,
            ..Self::default()
        };
    }

    /// 生命进度，0 为刚出生，1 为死亡
    pub fn life_progress(&self) -> f32 {
        if self.max_lifetime <= 0.0 {
            return 1.0;
        }
        (1.0 - self.remaining_lifetime / self.max_lifetime).clamp(0.0, 1.0)
    }

    /// 推进一帧
    pub fn update(&mut self, dt: f32) {
        if !self.decay(dt) {
            return;
        }
        let acc = self.acceleration;
        self.position += self.velocity * dt + acc * (0.5 * dt * dt);
        self.velocity += acc * dt;
        self.rotation += self.rotation_speed * dt;
        self.refresh_appearance();
    }

    /// 物理粒子：位置和速度取自刚体，寿命和外观照常推进
    pub fn update_from_body(&mut self, dt: f32, state: BodyState) {
        if !self.decay(dt) {
            return;
        }
        self.position = state.position;
        self.velocity = state.velocity;
        self.rotation = state.rotation + self.rotation_speed * dt;
        self.refresh_appearance();
    }

    /// 按比例缩短剩余寿命
    pub fn scale_lifetime(&mut self, factor: f32) {
        if !self.active {
            return;
        }
        self.remaining_lifetime = (self.remaining_lifetime * factor.max(0.0)).max(0.0);
        if self.remaining_lifetime <= 0.0 {
            self.deactivate();
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.recyclable = true;
    }

    /// 按当前状态直接绘制
    pub fn render(&self, surface: &mut dyn DrawSurface) {
        if !self.active {
            return;
        }
        let half = self.size * 0.5;
        surface.set_alpha(self.alpha);
        surface.translate(self.position.x, self.position.y);
        if self.rotation != 0.0 {
            surface.rotate(self.rotation);
        }
        match self.image {
            Some(image) => surface.draw_image(image, -half, -half, self.size, self.size),
            None => {
                surface.set_color(self.color);
                surface.fill_rect(-half, -half, self.size, self.size);
            }
        }
        surface.reset_transform();
    }

    /// 扣减寿命；返回 false 表示粒子已（或本帧）死亡
    fn decay(&mut self, dt: f32) -> bool {
        if !self.active {
            return false;
        }
        self.remaining_lifetime -= dt;
        if self.remaining_lifetime <= 0.0 {
            self.remaining_lifetime = 0.0;
            self.deactivate();
            return false;
        }
        true
    }

    fn refresh_appearance(&mut self) {
        let t = self.life_progress();
        self.size = self.initial_size + (self.final_size - self.initial_size) * t;
        self.color = self.start_color.lerp(self.end_color, t);
        self.alpha = self.color.w;
    }
}
