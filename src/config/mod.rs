//! 粒子系统配置
//!
//! 提供TOML/JSON配置文件、环境变量和运行时命名开关
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub mod presets;

pub use presets::{EffectLibrary, EffectPreset, ParamValue};

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
    /// 未知的命名开关
    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 粒子系统主配置
///
/// 序列化键名即对外暴露的命名开关（`enableCulling` 等）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticleSystemConfig {
    /// 视锥剔除
    pub enable_culling: bool,
    /// 批量渲染
    pub enable_batch_rendering: bool,
    /// 多线程更新
    pub enable_multi_threading: bool,
    /// 精灵实例化渲染
    pub enable_instanced_rendering: bool,
    /// 远距离发射器降频更新
    #[serde(rename = "enableLOD")]
    pub enable_lod: bool,
    /// LOD 距离阈值（世界单位）
    pub distance_threshold: i32,
    /// 发射器数量超过该值才分发到工作线程
    pub parallel_threshold: usize,
    /// 工作线程数，0 表示 `max(1, cores - 1)`
    pub worker_threads: usize,
    /// 单个更新任务的等待上限（毫秒）
    pub task_timeout_ms: u64,
    /// 远距离发射器每隔多少帧更新一次
    pub lod_update_interval: u32,
    /// 剔除时视口四周扩展的边距
    pub view_margin: f32,
    /// 哈希网格单元尺寸
    pub grid_cell_size: f32,
    /// 四叉树根节点边长
    pub quad_tree_extent: f32,
    /// 四叉树节点分裂前的对象数
    pub quad_tree_max_objects: usize,
    /// 四叉树最大深度
    pub quad_tree_max_depth: u32,
    /// 每帧更新后每个发射器保留的空闲粒子数
    pub pool_reserve: usize,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl_default!(ParticleSystemConfig {
    enable_culling: true,
    enable_batch_rendering: true,
    enable_multi_threading: true,
    enable_instanced_rendering: false,
    enable_lod: false,
    distance_threshold: 2000,
    parallel_threshold: 8,
    worker_threads: 0,
    task_timeout_ms: 100,
    lod_update_interval: 3,
    view_margin: 100.0,
    grid_cell_size: 128.0,
    quad_tree_extent: 20_000.0,
    quad_tree_max_objects: 8,
    quad_tree_max_depth: 8,
    pool_reserve: 64,
    logging: LoggingConfig::default(),
});

/// 命名开关的取值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl ParticleSystemConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 加载配置文件，失败时回退到默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let loaded = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        };
        match loaded {
            Ok(config) => {
                tracing::info!(target: "particles::config", "Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!(target: "particles::config", "Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        let bool_vars: [(&str, &str); 5] = [
            ("PARTICLES_ENABLE_CULLING", "enableCulling"),
            ("PARTICLES_ENABLE_BATCH_RENDERING", "enableBatchRendering"),
            ("PARTICLES_ENABLE_MULTI_THREADING", "enableMultiThreading"),
            ("PARTICLES_ENABLE_INSTANCED_RENDERING", "enableInstancedRendering"),
            ("PARTICLES_ENABLE_LOD", "enableLOD"),
        ];
        for (var, option) in bool_vars {
            if let Ok(val) = env::var(var) {
                if let Ok(flag) = val.parse::<bool>() {
                    let _ = self.set_option(option, OptionValue::Bool(flag));
                }
            }
        }
        if let Ok(val) = env::var("PARTICLES_DISTANCE_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.distance_threshold = threshold;
            }
        }
        if let Ok(val) = env::var("PARTICLES_WORKER_THREADS") {
            if let Ok(threads) = val.parse() {
                self.worker_threads = threads;
            }
        }
    }

    /// 按名称设置开关
    ///
    /// 名称与序列化键一致，例如 `enableCulling`、`distanceThreshold`。
    pub fn set_option(&mut self, name: &str, value: OptionValue) -> ConfigResult<()> {
        let flag = match value {
            OptionValue::Bool(b) => b,
            OptionValue::Int(i) => i != 0,
        };
        match name {
            "enableCulling" => self.enable_culling = flag,
            "enableBatchRendering" => self.enable_batch_rendering = flag,
            "enableMultiThreading" => self.enable_multi_threading = flag,
            "enableInstancedRendering" => self.enable_instanced_rendering = flag,
            "enableLOD" => self.enable_lod = flag,
            "distanceThreshold" => match value {
                OptionValue::Int(i) if (0..=i32::MAX as i64).contains(&i) => {
                    self.distance_threshold = i as i32
                }
                _ => {
                    return Err(ConfigError::ValidationError(format!(
                        "distanceThreshold must be a non-negative integer, got {:?}",
                        value
                    )))
                }
            },
            other => return Err(ConfigError::UnknownOption(other.to_string())),
        }
        Ok(())
    }

    /// 实际使用的工作线程数
    pub fn worker_count(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get().saturating_sub(1).max(1)
        } else {
            self.worker_threads
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.distance_threshold < 0 {
            return Err(ConfigError::ValidationError(
                "distanceThreshold must be non-negative".to_string(),
            ));
        }
        if self.task_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "taskTimeoutMs must be positive".to_string(),
            ));
        }
        if self.lod_update_interval == 0 {
            return Err(ConfigError::ValidationError(
                "lodUpdateInterval must be at least 1".to_string(),
            ));
        }
        if !(self.grid_cell_size > 0.0) || !(self.quad_tree_extent > 0.0) {
            return Err(ConfigError::ValidationError(
                "Spatial sizes must be positive".to_string(),
            ));
        }
        if self.quad_tree_max_objects == 0 {
            return Err(ConfigError::ValidationError(
                "quadTreeMaxObjects must be at least 1".to_string(),
            ));
        }
        if self.view_margin < 0.0 {
            return Err(ConfigError::ValidationError(
                "viewMargin must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 优先）
    pub level: LogLevel,

    /// 是否输出日志 target
    pub with_target: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    with_target: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParticleSystemConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_toml_uses_named_options() {
        let config = ParticleSystemConfig::from_toml_str(
            r#"
enableCulling = false
enableLOD = true
distanceThreshold = 500

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert!(!config.enable_culling);
        assert!(config.enable_lod);
        assert_eq!(config.distance_threshold, 500);
        assert_eq!(config.logging.level, LogLevel::Debug);
        // 未写出的字段保持默认值
        assert!(config.enable_batch_rendering);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ParticleSystemConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("enableLOD"));
        let parsed = ParticleSystemConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_json_parse() {
        let config =
            ParticleSystemConfig::from_json_str(r#"{"enableMultiThreading": false}"#).unwrap();
        assert!(!config.enable_multi_threading);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ParticleSystemConfig::from_toml_str("taskTimeoutMs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_set_option() {
        let mut config = ParticleSystemConfig::default();
        config.set_option("enableInstancedRendering", true.into()).unwrap();
        assert!(config.enable_instanced_rendering);
        config.set_option("distanceThreshold", 750.into()).unwrap();
        assert_eq!(config.distance_threshold, 750);
        assert!(config.set_option("distanceThreshold", (-1).into()).is_err());
        assert!(matches!(
            config.set_option("enableBloom", true.into()),
            Err(ConfigError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("particles.toml");
        let mut config = ParticleSystemConfig::default();
        config.parallel_threshold = 3;
        config.save_toml(&path).unwrap();
        let loaded = ParticleSystemConfig::load_or_default(&path);
        assert_eq!(loaded.parallel_threshold, 3);

        let missing = ParticleSystemConfig::load_or_default(dir.path().join("missing.toml"));
        assert_eq!(missing, ParticleSystemConfig::default());
    }
}
