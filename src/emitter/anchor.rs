//! 发射器挂载到实体
//!
//! 实体句柄使用 `bevy_ecs::entity::Entity`。位置由 [`EntityPositions`] 在调用线程上解析，
//! 工作线程只拿到解析好的坐标。

use bevy_ecs::prelude::*;
use glam::Vec2;
use std::collections::HashMap;

/// 实体的 2D 世界坐标组件
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct Position2D(pub Vec2);

/// 查询实体位置
pub trait EntityPositions {
    /// 实体不存在或没有位置时返回 `None`
    fn position_of(&self, entity: Entity) -> Option<Vec2>;
}

impl EntityPositions for World {
    fn position_of(&self, entity: Entity) -> Option<Vec2> {
        self.get::<Position2D>(entity).map(|p| p.0)
    }
}

impl EntityPositions for HashMap<Entity, Vec2> {
    fn position_of(&self, entity: Entity) -> Option<Vec2> {
        self.get(&entity).copied()
    }
}

/// 没有实体来源
pub struct NoEntities;

impl EntityPositions for NoEntities {
    fn position_of(&self, _entity: Entity) -> Option<Vec2> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_lookup() {
        let mut world = World::new();
        let moving = world.spawn(Position2D(Vec2::new(3.0, 4.0))).id();
        let bare = world.spawn_empty().id();
        assert_eq!(world.position_of(moving), Some(Vec2::new(3.0, 4.0)));
        assert_eq!(world.position_of(bare), None);

        world.despawn(moving);
        assert_eq!(world.position_of(moving), None);
    }

    #[test]
    fn test_snapshot_lookup() {
        let mut world = World::new();
        let e = world.spawn_empty().id();
        let mut snapshot = HashMap::new();
        snapshot.insert(e, Vec2::ONE);
        assert_eq!(snapshot.position_of(e), Some(Vec2::ONE));
        assert_eq!(NoEntities.position_of(e), None);
    }
}
