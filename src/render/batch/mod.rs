//! 批量渲染
//!
//! 批渲染器把粒子按共享的绘制状态（图像、离散化的透明度和大小）分组，
//! 每组只切换一次透明度状态。
//!
//! ## 分桶
//!
//! - 透明度按 [`ALPHA_BUCKET_STEP`] 取最近的桶
//! - 大小按 [`SIZE_BUCKET_STEP`] 取最近的桶
//!
//! ## 旋转
//!
//! 组内所有粒子旋转角相差不超过 [`ROTATION_TOLERANCE`] 时，整组只做一次旋转：
//! 粒子坐标先做逆旋转，绘制完成后复位一次。否则每个粒子单独平移、旋转、绘制、复位。

pub mod color;
pub mod instanced;
pub mod sprite;

pub use color::ColorBatchRenderer;
pub use instanced::{InstancedSpriteRenderer, SpriteInstance};
pub use sprite::SpriteBatchRenderer;

use super::DrawSurface;
use crate::particles::Particle;
use glam::{Vec2, Vec4};

pub const ALPHA_BUCKET_STEP: f32 = 0.05;
pub const SIZE_BUCKET_STEP: f32 = 0.5;
/// 视为“同一旋转”的容差（弧度）
pub const ROTATION_TOLERANCE: f32 = 0.01;

/// 批次类型名
pub const COLOR_BATCH: &str = "color";
pub const SPRITE_BATCH: &str = "sprite";
pub const INSTANCED_SPRITE_BATCH: &str = "instanced_sprite";

/// 透明度桶
pub fn alpha_bucket(alpha: f32) -> u32 {
    (alpha.clamp(0.0, 1.0) / ALPHA_BUCKET_STEP).round() as u32
}

/// 桶中心对应的透明度
pub fn bucket_alpha(bucket: u32) -> f32 {
    (bucket as f32 * ALPHA_BUCKET_STEP).min(1.0)
}

/// 大小桶
pub fn size_bucket(size: f32) -> u32 {
    (size.max(0.0) / SIZE_BUCKET_STEP).round() as u32
}

/// 批渲染时需要的粒子状态快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSnapshot {
    pub position: Vec2,
    pub size: f32,
    pub color: Vec4,
    pub rotation: f32,
}

impl From<&Particle> for RenderSnapshot {
    fn from(p: &Particle) -> Self {
        Self {
            position: p.position,
            size: p.size,
            color: p.color,
            rotation: p.rotation,
        }
    }
}

/// 一次刷新的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchFlushStats {
    /// 刷新的分组数
    pub groups: usize,
    /// 绘制的粒子数
    pub particles: usize,
}

/// 批渲染器接口
pub trait BatchRenderer: Send {
    /// 收集粒子；不属于本批次类型的粒子返回 false
    fn add_particle(&mut self, particle: &Particle) -> bool;

    /// 绘制所有分组
    fn render(&mut self, surface: &mut dyn DrawSurface) -> BatchFlushStats;

    /// 清空本帧收集的粒子（保留分配）
    fn reset(&mut self);

    fn batch_type(&self) -> &'static str;

    /// 已收集但尚未绘制的粒子数
    fn pending(&self) -> usize;
}

/// 组内旋转是否一致（在容差内），一致时返回第一个粒子的角度
pub(crate) fn uniform_rotation(snapshots: &[RenderSnapshot]) -> Option<f32> {
    let first = snapshots.first()?.rotation;
    snapshots
        .iter()
        .all(|s| (s.rotation - first).abs() <= ROTATION_TOLERANCE)
        .then_some(first)
}

fn rotate_point(point: Vec2, angle: f32) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(point.x * cos - point.y * sin, point.x * sin + point.y * cos)
}

/// 以一次透明度切换绘制一组粒子
///
/// `draw` 在粒子中心为 `center` 的局部坐标下绘制一个粒子。
pub(crate) fn draw_group<F>(
    surface: &mut dyn DrawSurface,
    alpha: f32,
    snapshots: &[RenderSnapshot],
    mut draw: F,
) where
    F: FnMut(&mut dyn DrawSurface, &RenderSnapshot, Vec2),
{
    if snapshots.is_empty() {
        return;
    }
    surface.set_alpha(alpha);
    match uniform_rotation(snapshots) {
        Some(angle) if angle.abs() <= ROTATION_TOLERANCE => {
            for s in snapshots {
                draw(surface, s, s.position);
            }
        }
        Some(angle) => {
            surface.rotate(angle);
            for s in snapshots {
                draw(surface, s, rotate_point(s.position, -angle));
            }
            surface.reset_transform();
        }
        None => {
            for s in snapshots {
                surface.translate(s.position.x, s.position.y);
                surface.rotate(s.rotation);
                draw(surface, s, Vec2::ZERO);
                surface.reset_transform();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DrawCommand, RecordingSurface};
    use proptest::prelude::*;

    fn snapshot(x: f32, rotation: f32) -> RenderSnapshot {
        RenderSnapshot {
            position: Vec2::new(x, 0.0),
            size: 2.0,
            color: Vec4::ONE,
            rotation,
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(alpha_bucket(0.0), 0);
        assert_eq!(alpha_bucket(1.0), 20);
        assert_eq!(alpha_bucket(1.5), 20);
        assert_eq!(alpha_bucket(0.51), alpha_bucket(0.49));
        assert_eq!(bucket_alpha(alpha_bucket(0.5)), 0.5);
        assert_eq!(size_bucket(2.2), 4);
        assert_eq!(size_bucket(-3.0), 0);
    }

    #[test]
    fn test_uniform_rotation_single_transform() {
        let mut surface = RecordingSurface::new();
        let group = [snapshot(1.0, 0.5), snapshot(2.0, 0.505), snapshot(3.0, 0.495)];
        draw_group(&mut surface, 1.0, &group, |s, snap, c| {
            s.fill_rect(c.x - snap.size / 2.0, c.y - snap.size / 2.0, snap.size, snap.size)
        });
        let rotates = surface
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Rotate(_)))
            .count();
        let resets = surface
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::ResetTransform))
            .count();
        assert_eq!(rotates, 1);
        assert_eq!(resets, 1);
        assert_eq!(surface.draw_calls(), 3);
    }

    #[test]
    fn test_mixed_rotation_per_particle_transform() {
        let mut surface = RecordingSurface::new();
        let group = [snapshot(1.0, 0.0), snapshot(2.0, 1.0)];
        draw_group(&mut surface, 0.5, &group, |s, snap, c| {
            s.fill_rect(c.x, c.y, snap.size, snap.size)
        });
        let translates = surface
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Translate(..)))
            .count();
        assert_eq!(translates, 2);
        assert_eq!(surface.commands()[0], DrawCommand::SetAlpha(0.5));
    }

    #[test]
    fn test_no_rotation_no_transform() {
        let mut surface = RecordingSurface::new();
        let group = [snapshot(1.0, 0.0), snapshot(2.0, 0.001)];
        draw_group(&mut surface, 1.0, &group, |s, snap, c| {
            s.fill_rect(c.x, c.y, snap.size, snap.size)
        });
        assert_eq!(surface.state_changes(), 1);
    }

    #[test]
    fn test_inverse_rotation_maps_back() {
        let p = Vec2::new(3.0, 4.0);
        let angle = 0.7;
        let back = rotate_point(rotate_point(p, -angle), angle);
        assert!((back - p).length() < 1e-5);
    }

    proptest! {
        #[test]
        fn alpha_near_bucket_centre_shares_bucket(
            bucket in 0u32..=20,
            d1 in -0.0249f32..0.0249,
            d2 in -0.0249f32..0.0249
        ) {
            let centre = bucket as f32 * ALPHA_BUCKET_STEP;
            let a = (centre + d1).clamp(0.0, 1.0);
            let b = (centre + d2).clamp(0.0, 1.0);
            prop_assert_eq!(alpha_bucket(a), alpha_bucket(b));
        }

        #[test]
        fn distant_alphas_never_share_bucket(a in 0.0f32..=1.0, b in 0.0f32..=1.0) {
            prop_assume!((a - b).abs() >= 0.075);
            prop_assert_ne!(alpha_bucket(a), alpha_bucket(b));
        }

        #[test]
        fn alpha_bucket_within_half_step(a in 0.0f32..=1.0) {
            let centre = bucket_alpha(alpha_bucket(a));
            prop_assert!((centre - a).abs() <= ALPHA_BUCKET_STEP / 2.0 + 1e-6);
        }
    }
}
