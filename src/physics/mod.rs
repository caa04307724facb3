//! 物理粒子接口
//!
//! 粒子核心不包含物理引擎，只通过 [`PhysicsBackend`] 创建/移除刚体并回读状态。
//! 碰撞事件以 [`CollisionPair`] 的形式输入，刚体的不透明用户标签
//! （[`ParticleBodyTag`]）用来识别“属于某个物理粒子发射器”的刚体。

#[cfg(feature = "physics_2d")]
pub mod rapier;

#[cfg(feature = "physics_2d")]
pub use rapier::RapierParticlePhysics;

use crate::core::ParticleResult;
use crate::emitter::EmitterId;
use glam::Vec2;

/// 外部物理引擎中的刚体句柄（不透明）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub u64);

/// 刚体创建参数
#[derive(Debug, Clone, Copy)]
pub struct BodyDesc {
    pub position: Vec2,
    pub velocity: Vec2,
    /// 圆形碰撞体半径
    pub radius: f32,
    /// 用户标签，碰撞事件中原样返回
    pub user_tag: u128,
}

/// 每帧回读的刚体状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
}

/// 一对接触的刚体及其用户标签
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPair {
    pub body_a: BodyHandle,
    pub tag_a: u128,
    pub body_b: BodyHandle,
    pub tag_b: u128,
}

/// 物理引擎适配接口
///
/// 方法都只需要 `&self`，实现者自行同步；物理发射器可能在工作线程上调用。
pub trait PhysicsBackend: Send + Sync {
    /// 创建动态刚体
    fn create_body(&self, desc: BodyDesc) -> ParticleResult<BodyHandle>;

    /// 移除刚体（句柄无效时忽略）
    fn remove_body(&self, handle: BodyHandle);

    /// 回读刚体位置和速度
    fn body_state(&self, handle: BodyHandle) -> Option<BodyState>;
}

/// 物理粒子刚体的用户标签
///
/// 高 32 位是固定标记，低 64 位是所属发射器 ID。
pub struct ParticleBodyTag;

impl ParticleBodyTag {
    /// 标记值（ASCII "PTCL"）
    pub const MARKER: u128 = 0x5054_434C;

    pub fn encode(emitter: EmitterId) -> u128 {
        (Self::MARKER << 96) | emitter as u128
    }

    /// 不是粒子刚体时返回 `None`
    pub fn decode(tag: u128) -> Option<EmitterId> {
        if tag >> 96 == Self::MARKER && (tag >> 64) & 0xFFFF_FFFF == 0 {
            Some(tag as u64)
        } else {
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_tag_roundtrip() {
        let tag = ParticleBodyTag::encode(42);
        assert_eq!(ParticleBodyTag::decode(tag), Some(42));
        assert_eq!(ParticleBodyTag::decode(u64::MAX as u128), None);
        assert_eq!(ParticleBodyTag::decode(0), None);
    }
}
