//! 特效预设
//!
//! 预设是一组命名参数（`startColor`、`minSpeed` 等），由
//! [`EmitterSettings::configure`](crate::emitter::EmitterSettings::configure) 应用到发射器。
//! 除内置预设外，还可以从 TOML 中加载 `[effects.<name>]` 表。

use super::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::f32::consts::{FRAC_PI_2, TAU};

/// 命名参数的取值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<f64>),
    Text(String),
}

impl ParamValue {
    /// 数值（整数自动转换）
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ParamValue::Float(f) => Some(*f as f32),
            ParamValue::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// 颜色：3 或 4 个分量，缺省 alpha 为 1
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            ParamValue::List(v) if v.len() == 4 => {
                Some([v[0] as f32, v[1] as f32, v[2] as f32, v[3] as f32])
            }
            ParamValue::List(v) if v.len() == 3 => Some([v[0] as f32, v[1] as f32, v[2] as f32, 1.0]),
            _ => None,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v as f64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<[f32; 4]> for ParamValue {
    fn from(v: [f32; 4]) -> Self {
        ParamValue::List(v.iter().map(|c| *c as f64).collect())
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// 特效预设
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectPreset {
    /// 预设名称
    pub name: String,
    /// 命名参数
    pub params: BTreeMap<String, ParamValue>,
}

impl EffectPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// 设置参数（链式）
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// 用 `other` 的参数覆盖当前参数
    pub fn merged(mut self, other: &EffectPreset) -> Self {
        for (k, v) in &other.params {
            self.params.insert(k.clone(), v.clone());
        }
        self
    }

    /// 爆炸：一次性全向爆发
    pub fn explosion() -> Self {
        Self::new("explosion")
            .with("startColor", [1.0, 0.8, 0.2, 1.0])
            .with("endColor", [0.8, 0.1, 0.0, 0.0])
            .with("minSize", 2.0)
            .with("maxSize", 6.0)
            .with("endSizeScale", 0.2)
            .with("minSpeed", 50.0)
            .with("maxSpeed", 100.0)
            .with("minLifetime", 0.5)
            .with("maxLifetime", 1.2)
            .with("spreadAngle", TAU)
            .with("baseAngle", 0.0)
            .with("emissionRate", 0.0)
            .with("gravity", 0.0)
            .with("continuous", false)
            .with("maxParticles", 500)
    }

    /// 火焰：持续向上发射
    pub fn fire() -> Self {
        Self::new("fire")
            .with("startColor", [1.0, 0.6, 0.1, 1.0])
            .with("endColor", [0.6, 0.1, 0.0, 0.0])
            .with("minSize", 4.0)
            .with("maxSize", 10.0)
            .with("endSizeScale", 0.3)
            .with("minSpeed", 20.0)
            .with("maxSpeed", 60.0)
            .with("minLifetime", 0.6)
            .with("maxLifetime", 1.4)
            .with("spreadAngle", 0.6)
            .with("baseAngle", -FRAC_PI_2)
            .with("emissionRate", 60.0)
            .with("gravity", -20.0)
            .with("continuous", true)
            .with("maxParticles", 300)
    }

    /// 烟雾：缓慢上升并扩散
    pub fn smoke() -> Self {
        Self::new("smoke")
            .with("startColor", [0.5, 0.5, 0.5, 0.6])
            .with("endColor", [0.3, 0.3, 0.3, 0.0])
            .with("minSize", 8.0)
            .with("maxSize", 16.0)
            .with("endSizeScale", 2.5)
            .with("minSpeed", 10.0)
            .with("maxSpeed", 30.0)
            .with("minLifetime", 1.5)
            .with("maxLifetime", 3.0)
            .with("spreadAngle", 0.8)
            .with("baseAngle", -FRAC_PI_2)
            .with("emissionRate", 20.0)
            .with("gravity", -5.0)
            .with("rotationSpeed", 0.5)
            .with("continuous", true)
            .with("maxParticles", 200)
    }

    /// 火花：高速、受重力下坠
    pub fn sparks() -> Self {
        Self::new("sparks")
            .with("startColor", [1.0, 1.0, 0.8, 1.0])
            .with("endColor", [1.0, 0.5, 0.0, 0.0])
            .with("minSize", 1.0)
            .with("maxSize", 3.0)
            .with("endSizeScale", 0.5)
            .with("minSpeed", 120.0)
            .with("maxSpeed", 240.0)
            .with("minLifetime", 0.3)
            .with("maxLifetime", 0.8)
            .with("spreadAngle", TAU)
            .with("baseAngle", 0.0)
            .with("emissionRate", 0.0)
            .with("gravity", 300.0)
            .with("continuous", false)
            .with("maxParticles", 400)
    }

    /// 拖尾：跟随实体的短命粒子
    pub fn trail() -> Self {
        Self::new("trail")
            .with("startColor", [0.4, 0.9, 1.0, 0.9])
            .with("endColor", [0.1, 0.3, 1.0, 0.0])
            .with("minSize", 2.0)
            .with("maxSize", 4.0)
            .with("endSizeScale", 0.0)
            .with("minSpeed", 0.0)
            .with("maxSpeed", 10.0)
            .with("minLifetime", 0.3)
            .with("maxLifetime", 0.6)
            .with("spreadAngle", TAU)
            .with("baseAngle", 0.0)
            .with("emissionRate", 80.0)
            .with("gravity", 0.0)
            .with("continuous", true)
            .with("maxParticles", 200)
    }

    /// 按名称查找内置预设
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "explosion" => Some(Self::explosion()),
            "fire" => Some(Self::fire()),
            "smoke" => Some(Self::smoke()),
            "sparks" => Some(Self::sparks()),
            "trail" => Some(Self::trail()),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct LibraryFile {
    #[serde(default)]
    effects: BTreeMap<String, BTreeMap<String, ParamValue>>,
}

/// 特效库：内置预设 + 从 TOML 加载的自定义预设
#[derive(Debug, Clone, Default)]
pub struct EffectLibrary {
    presets: HashMap<String, EffectPreset>,
}

impl EffectLibrary {
    /// 仅包含内置预设
    pub fn with_builtins() -> Self {
        let mut library = Self::default();
        for name in ["explosion", "fire", "smoke", "sparks", "trail"] {
            if let Some(preset) = EffectPreset::builtin(name) {
                library.insert(preset);
            }
        }
        library
    }

    /// 从 TOML 解析 `[effects.<name>]` 表
    ///
    /// 同名的内置预设作为基础，TOML 中的键覆盖它。
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let file: LibraryFile =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut library = Self::with_builtins();
        for (name, params) in file.effects {
            let overrides = EffectPreset {
                name: name.clone(),
                params,
            };
            let preset = match library.presets.remove(&name) {
                Some(base) => base.merged(&overrides),
                None => overrides,
            };
            library.insert(preset);
        }
        Ok(library)
    }

    pub fn insert(&mut self, preset: EffectPreset) {
        self.presets.insert(preset.name.clone(), preset);
    }

    pub fn get(&self, name: &str) -> Option<&EffectPreset> {
        self.presets.get(name)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}
