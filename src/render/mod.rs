//! 渲染接口
//!
//! 粒子核心不直接接触图形 API：
//! - [`DrawSurface`] - 宿主实现的即时模式绘制表面
//! - [`ViewProvider`] - 宿主提供的视口
//! - [`ImageLoader`] - 精灵图像加载
//! - [`batch`] - 按绘制状态分组的批渲染器
//! - [`RenderCallback`] - 接入宿主渲染管线的回调

pub mod batch;
pub mod image;
pub mod surface;
pub mod view;

pub use batch::{
    BatchFlushStats, BatchRenderer, ColorBatchRenderer, InstancedSpriteRenderer, SpriteBatchRenderer,
    SpriteInstance,
};
pub use image::{ImageHandle, ImageInfo, ImageLoader, ImageRegistry};
pub use surface::{DrawCommand, DrawSurface, RecordingSurface};
pub use view::{Camera2D, FixedView, ViewProvider};

/// 粒子层的渲染优先级（数值越大越靠后绘制）
pub const PARTICLE_RENDER_PRIORITY: i32 = 900;

/// 宿主渲染管线中的一个回调
pub trait RenderCallback {
    fn render(&mut self, surface: &mut dyn DrawSurface);

    /// 宿主按优先级从小到大调用
    fn priority(&self) -> i32;
}
