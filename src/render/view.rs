//! 视口提供者
//!
//! 粒子系统每帧向 [`ViewProvider`] 询问世界坐标下的可见矩形，用于剔除和 LOD。

use crate::core::Rect;
use glam::Vec2;
use std::sync::RwLock;

/// 视口接口
pub trait ViewProvider: Send + Sync {
    /// 世界坐标下的可见区域
    fn world_view_bounds(&self) -> Rect;

    fn world_to_screen(&self, point: Vec2) -> Vec2;

    fn screen_to_world(&self, point: Vec2) -> Vec2;
}

/// 固定视口（世界坐标与屏幕坐标相同）
#[derive(Debug, Clone, Copy)]
pub struct FixedView(pub Rect);

impl ViewProvider for FixedView {
    fn world_view_bounds(&self) -> Rect {
        self.0
    }

    fn world_to_screen(&self, point: Vec2) -> Vec2 {
        point - self.0.min()
    }

    fn screen_to_world(&self, point: Vec2) -> Vec2 {
        point + self.0.min()
    }
}

/// 2D 相机：中心点 + 缩放 + 视口尺寸（像素）
#[derive(Debug, Clone, Copy)]
pub struct Camera2D {
    pub position: Vec2,
    pub zoom: f32,
    pub viewport: Vec2,
}

impl Camera2D {
    pub fn new(viewport: Vec2) -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: 1.0,
            viewport,
        }
    }

    fn effective_zoom(&self) -> f32 {
        if self.zoom > f32::EPSILON {
            self.zoom
        } else {
            1.0
        }
    }
}

impl ViewProvider for Camera2D {
    fn world_view_bounds(&self) -> Rect {
        let half = self.viewport * 0.5 / self.effective_zoom();
        Rect::new(
            self.position.x - half.x,
            self.position.y - half.y,
            half.x * 2.0,
            half.y * 2.0,
        )
    }

    fn world_to_screen(&self, point: Vec2) -> Vec2 {
        (point - self.position) * self.effective_zoom() + self.viewport * 0.5
    }

    fn screen_to_world(&self, point: Vec2) -> Vec2 {
        (point - self.viewport * 0.5) / self.effective_zoom() + self.position
    }
}

/// 宿主持有 `Arc<RwLock<Camera2D>>` 并在帧间移动相机
impl<T: ViewProvider> ViewProvider for RwLock<T> {
    fn world_view_bounds(&self) -> Rect {
        match self.read() {
            Ok(view) => view.world_view_bounds(),
            Err(poisoned) => poisoned.into_inner().world_view_bounds(),
        }
    }

    fn world_to_screen(&self, point: Vec2) -> Vec2 {
        match self.read() {
            Ok(view) => view.world_to_screen(point),
            Err(poisoned) => poisoned.into_inner().world_to_screen(point),
        }
    }

    fn screen_to_world(&self, point: Vec2) -> Vec2 {
        match self.read() {
            Ok(view) => view.screen_to_world(point),
            Err(poisoned) => poisoned.into_inner().screen_to_world(point),
        }
    }
}
