use super::{
    alpha_bucket, bucket_alpha, draw_group, size_bucket, BatchFlushStats, BatchRenderer,
    RenderSnapshot, COLOR_BATCH,
};
use crate::particles::Particle;
use crate::render::DrawSurface;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ColorKey {
    alpha: u32,
    size: u32,
}

/// 纯色粒子批渲染器，按（透明度桶，大小桶）分组
#[derive(Debug, Default)]
pub struct ColorBatchRenderer {
    groups: HashMap<ColorKey, Vec<RenderSnapshot>>,
    pending: usize,
}

impl ColorBatchRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前非空分组数
    pub fn group_count(&self) -> usize {
        self.groups.values().filter(|g| !g.is_empty()).count()
    }
}

impl BatchRenderer for ColorBatchRenderer {
    fn add_particle(&mut self, particle: &Particle) -> bool {
        if !particle.active || particle.image.is_some() {
            return false;
        }
        let key = ColorKey {
            alpha: alpha_bucket(particle.alpha),
            size: size_bucket(particle.size),
        };
        self.groups.entry(key).or_default().push(RenderSnapshot::from(particle));
        self.pending += 1;
        true
    }

    fn render(&mut self, surface: &mut dyn DrawSurface) -> BatchFlushStats {
        let mut keys: Vec<ColorKey> = self
            .groups
            .iter()
            .filter(|(_, g)| !g.is_empty())
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();

        let mut stats = BatchFlushStats::default();
        for key in keys {
            let Some(group) = self.groups.get(&key) else {
                continue;
            };
            let mut current_color = None;
            draw_group(surface, bucket_alpha(key.alpha), group, |s, snap, centre| {
                let rgb = snap.color.truncate();
                if current_color != Some(rgb) {
                    s.set_color(snap.color);
                    current_color = Some(rgb);
                }
                let half = snap.size * 0.5;
                s.fill_rect(centre.x - half, centre.y - half, snap.size, snap.size);
            });
            stats.groups += 1;
            stats.particles += group.len();
        }
        self.reset();
        stats
    }

    fn reset(&mut self) {
        for group in self.groups.values_mut() {
            group.clear();
        }
        self.pending = 0;
    }

    fn batch_type(&self) -> &'static str {
        COLOR_BATCH
    }

    fn pending(&self) -> usize {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DrawCommand, ImageHandle, RecordingSurface};
    use glam::Vec4;

    fn particle(alpha: f32, size: f32) -> Particle {
        Particle::new(0.0, 0.0, size, Vec4::new(1.0, 0.0, 0.0, alpha), 1.0)
    }

    #[test]
    fn test_groups_by_alpha_and_size() {
        let mut renderer = ColorBatchRenderer::new();
        assert!(renderer.add_particle(&particle(0.5, 2.0)));
        assert!(renderer.add_particle(&particle(0.51, 2.1)));
        assert!(renderer.add_particle(&particle(0.9, 2.0)));
        assert!(renderer.add_particle(&particle(0.5, 8.0)));
        assert_eq!(renderer.group_count(), 3);
        assert_eq!(renderer.pending(), 4);

        let mut surface = RecordingSurface::new();
        let stats = renderer.render(&mut surface);
        assert_eq!(stats, BatchFlushStats { groups: 3, particles: 4 });
        let alpha_changes = surface
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::SetAlpha(_)))
            .count();
        assert_eq!(alpha_changes, 3);
        assert_eq!(renderer.pending(), 0);
    }

    #[test]
    fn test_rejects_sprite_and_dead_particles() {
        let mut renderer = ColorBatchRenderer::new();
        let mut sprite = particle(1.0, 1.0);
        sprite.image = Some(ImageHandle(1));
        assert!(!renderer.add_particle(&sprite));

        let mut dead = particle(1.0, 1.0);
        dead.deactivate();
        assert!(!renderer.add_particle(&dead));
        assert_eq!(renderer.pending(), 0);
    }

    #[test]
    fn test_same_color_set_once_per_group() {
        let mut renderer = ColorBatchRenderer::new();
        for _ in 0..5 {
            renderer.add_particle(&particle(1.0, 2.0));
        }
        let mut surface = RecordingSurface::new();
        renderer.render(&mut surface);
        let color_changes = surface
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::SetColor(_)))
            .count();
        assert_eq!(color_changes, 1);
        assert_eq!(surface.draw_calls(), 5);
    }
}
