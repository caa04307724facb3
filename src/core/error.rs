//! 统一错误处理模块
//!
//! 提供粒子核心范围内的统一错误类型定义
//!
//! ## 错误分层
//!
//! - **粒子级**：配置错误的单个粒子不会被创建，只记录 `trace`/`debug` 日志
//! - **发射器级**：发射器更新/渲染失败时记录 `warn` 并跳过该帧
//! - **帧级**：`update`/`render` 最外层捕获所有错误并记录 `error`，从不向外传播

use crate::config::ConfigError;
use thiserror::Error;

/// 粒子核心错误类型
#[derive(Error, Debug)]
pub enum ParticleError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Invalid value for parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Emitter not found: {0}")]
    EmitterNotFound(u64),

    #[error("Failed to load image {id} from {path}: {reason}")]
    ImageLoad {
        id: String,
        path: String,
        reason: String,
    },

    #[error("Physics error: {0}")]
    Physics(String),

    #[error("Worker pool error: {0}")]
    Worker(String),

    #[error("Emitter update panicked: {0}")]
    Panicked(String),
}

impl ParticleError {
    /// 构造参数错误
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// 从 `catch_unwind` 的 panic 负载中提取消息
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panicked(message)
    }
}

/// 粒子核心结果类型别名
pub type ParticleResult<T> = Result<T, ParticleError>;
