//! 实例化精灵渲染
//!
//! 跨发射器收集同一图像的所有精灵粒子，每个图像只提交一次
//! [`DrawSurface::draw_instances`]。实例数据是 `Pod`，可以直接上传到 GPU 缓冲区。

use super::{BatchFlushStats, BatchRenderer, INSTANCED_SPRITE_BATCH};
use crate::particles::Particle;
use crate::render::{DrawSurface, ImageHandle};
use std::collections::BTreeMap;

/// 精灵实例数据
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpriteInstance {
    /// 中心位置
    pub position: [f32; 2],
    pub size: f32,
    /// 旋转（弧度）
    pub rotation: f32,
    /// 颜色 (RGBA)
    pub color: [f32; 4],
}

impl From<&Particle> for SpriteInstance {
    fn from(p: &Particle) -> Self {
        Self {
            position: p.position.to_array(),
            size: p.size,
            rotation: p.rotation,
            color: p.color.to_array(),
        }
    }
}

/// 按图像聚合的实例化渲染器
#[derive(Debug, Default)]
pub struct InstancedSpriteRenderer {
    instances: BTreeMap<ImageHandle, Vec<SpriteInstance>>,
    pending: usize,
}

impl InstancedSpriteRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某个图像当前的实例数据（字节视图）
    pub fn instance_bytes(&self, image: ImageHandle) -> &[u8] {
        self.instances
            .get(&image)
            .map(|v| bytemuck::cast_slice(v.as_slice()))
            .unwrap_or(&[])
    }
}

impl BatchRenderer for InstancedSpriteRenderer {
    fn add_particle(&mut self, particle: &Particle) -> bool {
        let Some(image) = particle.image else {
            return false;
        };
        if !particle.active {
            return false;
        }
        let mut instance = SpriteInstance::from(particle);
        instance.color[3] = particle.alpha;
        self.instances.entry(image).or_default().push(instance);
        self.pending += 1;
        true
    }

    fn render(&mut self, surface: &mut dyn DrawSurface) -> BatchFlushStats {
        let mut stats = BatchFlushStats::default();
        for (image, instances) in &self.instances {
            if instances.is_empty() {
                continue;
            }
            surface.draw_instances(*image, instances);
            stats.groups += 1;
            stats.particles += instances.len();
        }
        self.reset();
        stats
    }

    fn reset(&mut self) {
        for instances in self.instances.values_mut() {
            instances.clear();
        }
        self.pending = 0;
    }

    fn batch_type(&self) -> &'static str {
        INSTANCED_SPRITE_BATCH
    }

    fn pending(&self) -> usize {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DrawCommand, RecordingSurface};
    use glam::Vec4;

    #[test]
    fn test_instance_layout() {
        assert_eq!(std::mem::size_of::<SpriteInstance>(), 32);
    }

    #[test]
    fn test_one_submission_per_image() {
        let mut renderer = InstancedSpriteRenderer::new();
        for i in 0..10 {
            let mut p = Particle::new(i as f32, 0.0, 2.0, Vec4::ONE, 1.0);
            p.image = Some(ImageHandle(if i % 2 == 0 { 1 } else { 2 }));
            assert!(renderer.add_particle(&p));
        }
        assert_eq!(renderer.instance_bytes(ImageHandle(1)).len(), 5 * 32);

        let mut surface = RecordingSurface::new();
        surface.native_instancing = true;
        let stats = renderer.render(&mut surface);
        assert_eq!(stats.groups, 2);
        assert_eq!(
            surface.commands(),
            &[
                DrawCommand::DrawInstances {
                    image: ImageHandle(1),
                    count: 5
                },
                DrawCommand::DrawInstances {
                    image: ImageHandle(2),
                    count: 5
                },
            ]
        );
        assert!(renderer.instance_bytes(ImageHandle(1)).is_empty());
    }
}
