//! 粒子数据
//!
//! - [`Particle`] - 对象池中复用的单个粒子
//! - [`ParticlePool`] - 粒子对象池
//! - [`ParticleDataStore`] - 固定容量的 SoA 存储

pub mod data_store;
pub mod particle;
pub mod pool;


pub use data_store::{ParticleDataStore, ParticleSpawn};
pub use particle::Particle;
pub use pool::{ParticlePool, PoolStats};
