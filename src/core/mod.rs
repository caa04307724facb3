//! 核心模块
//!
//! 包含粒子核心的基础设施：
//! - `error` - 错误类型定义
//! - `geometry` - 矩形等几何辅助类型
//! - `logging` - tracing 日志初始化
//! - `macros` - `Default` 实现宏

pub mod error;
pub mod geometry;
pub mod logging;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{ParticleError, ParticleResult};

pub use geometry::Rect;
pub use logging::init_logging;
