//! # Particle Engine
//!
//! A multi-threaded 2D particle simulation and batch rendering core built with Rust.
//!
//! ## Features
//!
//! - **Emitters**: Continuous and burst emission with deterministic per-emitter randomness
//! - **Pooling**: Particle object pools shared through a system-wide reserve
//! - **Multi-threading**: Emitter updates dispatched to a worker pool with per-task timeouts
//! - **Spatial Indexing**: Spatial hash grid and quad-tree rebuilt every frame
//! - **Batch Rendering**: Color, sprite and instanced-sprite batching with culling and LOD
//! - **Physics**: Rapier-backed physical particles with collision feedback
//!
//! ### Example
//!
//! ```ignore
//! use particle_engine::prelude::*;
//! use std::sync::Arc;
//!
//! let view = Arc::new(FixedView(Rect::new(0.0, 0.0, 1280.0, 720.0)));
//! let mut system = ParticleSystem::new(ParticleSystemConfig::default(), view)?;
//! system.create_explosion(640.0, 360.0, 200)?;
//!
//! let mut surface = RecordingSurface::new();
//! system.update(1.0 / 60.0);
//! system.render(&mut surface);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Errors, geometry and logging
//! - [`config`]: System configuration and effect presets
//! - [`particles`]: Particle, object pool and SoA data store
//! - [`emitter`]: Particle emitters
//! - [`physics`]: Physics backend seam and Rapier adapter
//! - [`spatial`]: Spatial hash grid and quad-tree
//! - [`render`]: Draw surface, view and batch renderers
//! - [`system`]: The particle system orchestrator

/// Errors, geometry helpers and logging setup
pub mod core;
/// Configuration system and effect presets
pub mod config;
/// Particle data, pooling and SoA storage
pub mod particles;
/// Particle emitters
pub mod emitter;
/// Physics backend seam for physical particles
pub mod physics;
/// Spatial indexing structures
pub mod spatial;
/// Drawing abstractions and batch renderers
pub mod render;
/// Particle system orchestration
pub mod system;

/// 常用类型
pub mod prelude {
    pub use crate::config::{EffectLibrary, EffectPreset, ParticleSystemConfig};
    pub use crate::core::{init_logging, ParticleError, ParticleResult, Rect};
    pub use crate::emitter::{EmitterId, EmitterKind, ParticleEmitter, Position2D};
    pub use crate::particles::{Particle, ParticlePool};
    pub use crate::physics::{CollisionPair, PhysicsBackend};
    pub use crate::render::{
        Camera2D, DrawSurface, FixedView, ImageHandle, RecordingSurface, RenderCallback, ViewProvider,
    };
    pub use crate::system::{ParticleSystem, ParticleSystemStats, SystemState};
}
