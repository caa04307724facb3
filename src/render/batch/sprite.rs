use super::{
    alpha_bucket, bucket_alpha, draw_group, size_bucket, BatchFlushStats, BatchRenderer,
    RenderSnapshot, SPRITE_BATCH,
};
use crate::particles::Particle;
use crate::render::{DrawSurface, ImageHandle};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SpriteKey {
    image: ImageHandle,
    alpha: u32,
    size: u32,
}

/// 精灵粒子批渲染器，按（图像，透明度桶，大小桶）分组
#[derive(Debug, Default)]
pub struct SpriteBatchRenderer {
    groups: HashMap<SpriteKey, Vec<RenderSnapshot>>,
    pending: usize,
}

impl SpriteBatchRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_count(&self) -> usize {
        self.groups.values().filter(|g| !g.is_empty()).count()
    }
}

impl BatchRenderer for SpriteBatchRenderer {
    fn add_particle(&mut self, particle: &Particle) -> bool {
        let Some(image) = particle.image else {
            return false;
        };
        if !particle.active {
            return false;
        }
        let key = SpriteKey {
            image,
            alpha: alpha_bucket(particle.alpha),
            size: size_bucket(particle.size),
        };
        self.groups.entry(key).or_default().push(RenderSnapshot::from(particle));
        self.pending += 1;
        true
    }

    fn render(&mut self, surface: &mut dyn DrawSurface) -> BatchFlushStats {
        let mut keys: Vec<SpriteKey> = self
            .groups
            .iter()
            .filter(|(_, g)| !g.is_empty())
            .map(|(k, _)| *k)
            .collect();
        // 同一图像的分组相邻
        keys.sort_unstable();

        let mut stats = BatchFlushStats::default();
        for key in keys {
            let Some(group) = self.groups.get(&key) else {
                continue;
            };
            draw_group(surface, bucket_alpha(key.alpha), group, |s, snap, centre| {
                let half = snap.size * 0.5;
                s.draw_image(key.image, centre.x - half, centre.y - half, snap.size, snap.size);
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
        SPRITE_BATCH
    }

    fn pending(&self) -> usize {
        self.pending
    }
}
