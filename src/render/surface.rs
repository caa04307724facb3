//! 2D 绘制表面抽象
//!
//! 粒子核心只发出即时模式的绘制调用，由宿主实现 [`DrawSurface`]。
//! [`RecordingSurface`] 把调用记录为命令列表，用于测试和无头运行。

use super::batch::SpriteInstance;
use super::image::ImageHandle;
use glam::Vec4;

/// 即时模式 2D 绘制接口
pub trait DrawSurface {
    /// 设置全局透明度
    fn set_alpha(&mut self, alpha: f32);
    /// 设置填充颜色
    fn set_color(&mut self, color: Vec4);
    fn translate(&mut self, x: f32, y: f32);
    /// 旋转（弧度）
    fn rotate(&mut self, angle: f32);
    /// 恢复单位变换
    fn reset_transform(&mut self);
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32);
    fn draw_image(&mut self, image: ImageHandle, x: f32, y: f32, width: f32, height: f32);

    /// 一次提交同一图像的多个实例
    ///
    /// 默认实现逐个实例绘制，支持实例化的宿主可以覆盖。
    fn draw_instances(&mut self, image: ImageHandle, instances: &[SpriteInstance]) {
        for instance in instances {
            let [x, y] = instance.position;
            let half = instance.size * 0.5;
            self.set_alpha(instance.color[3]);
            self.translate(x, y);
            if instance.rotation != 0.0 {
                self.rotate(instance.rotation);
            }
            self.draw_image(image, -half, -half, instance.size, instance.size);
            self.reset_transform();
        }
    }
}

/// 记录下来的绘制命令
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    SetAlpha(f32),
    SetColor(Vec4),
    Translate(f32, f32),
    Rotate(f32),
    ResetTransform,
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    DrawImage {
        image: ImageHandle,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    DrawInstances {
        image: ImageHandle,
        count: usize,
    },
}

impl DrawCommand {
    /// 是否是实际的绘制（而非状态切换）
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DrawCommand::FillRect { .. } | DrawCommand::DrawImage { .. } | DrawCommand::DrawInstances { .. }
        )
    }
}

/// 记录绘制命令的表面
#[derive(Debug, Default)]
pub struct RecordingSurface {
    commands: Vec<DrawCommand>,
    /// 为 true 时直接记录 `draw_instances`，否则走默认的逐个绘制
    pub native_instancing: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// 绘制调用数
    pub fn draw_calls(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }

    /// 状态切换数（透明度、颜色、变换）
    pub fn state_changes(&self) -> usize {
        self.commands.len() - self.draw_calls()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl DrawSurface for RecordingSurface {
    fn set_alpha(&mut self, alpha: f32) {
        self.commands.push(DrawCommand::SetAlpha(alpha));
    }

    fn set_color(&mut self, color: Vec4) {
        self.commands.push(DrawCommand::SetColor(color));
    }

    fn translate(&mut self, x: f32, y: f32) {
        self.commands.push(DrawCommand::Translate(x, y));
    }

    fn rotate(&mut self, angle: f32) {
        self.commands.push(DrawCommand::Rotate(angle));
    }

    fn reset_transform(&mut self) {
        self.commands.push(DrawCommand::ResetTransform);
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.commands.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
        });
    }

    fn draw_image(&mut self, image: ImageHandle, x: f32, y: f32, width: f32, height: f32) {
        self.commands.push(DrawCommand::DrawImage {
            image,
            x,
            y,
            width,
            height,
        });
    }

    fn draw_instances(&mut self, image: ImageHandle, instances: &[SpriteInstance]) {
        if !self.native_instancing {
            for instance in instances {
                let [x, y] = instance.position;
                let half = instance.size * 0.5;
                self.set_alpha(instance.color[3]);
                self.translate(x, y);
                if instance.rotation != 0.0 {
                    self.rotate(instance.rotation);
                }
                self.draw_image(image, -half, -half, instance.size, instance.size);
                self.reset_transform();
            }
            return;
        }
        self.commands.push(DrawCommand::DrawInstances {
            image,
            count: instances.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_counts() {
        let mut surface = RecordingSurface::new();
        surface.set_alpha(0.5);
        surface.translate(1.0, 2.0);
        surface.fill_rect(0.0, 0.0, 1.0, 1.0);
        surface.reset_transform();
        assert_eq!(surface.draw_calls(), 1);
        assert_eq!(surface.state_changes(), 3);
        surface.clear();
        assert!(surface.commands().is_empty());
    }

    #[test]
    fn test_native_instancing_single_command() {
        let mut surface = RecordingSurface::new();
        surface.native_instancing = true;
        let instance = SpriteInstance {
            position: [0.0, 0.0],
            size: 2.0,
            rotation: 0.0,
            color: [1.0; 4],
        };
        surface.draw_instances(ImageHandle(1), &[instance; 3]);
        assert_eq!(
            surface.commands(),
            &[DrawCommand::DrawInstances {
                image: ImageHandle(1),
                count: 3
            }]
        );
    }
}
