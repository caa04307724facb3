//! 发射器参数

use crate::config::{EffectPreset, ParamValue};
use crate::core::{ParticleError, ParticleResult};
use glam::Vec4;

/// 发射器参数
///
/// 速度方向在 `base_angle ± spread_angle/2` 的扇形内均匀随机，
/// 大小、速度、寿命在各自的 `[min, max]` 内均匀随机。
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterSettings {
    pub start_color: Vec4,
    pub end_color: Vec4,
    pub min_size: f32,
    pub max_size: f32,
    /// 死亡时大小 = 初始大小 × 该系数
    pub end_size_scale: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub min_lifetime: f32,
    pub max_lifetime: f32,
    /// 扇形张角（弧度）
    pub spread_angle: f32,
    /// 扇形中心方向（弧度）
    pub base_angle: f32,
    /// 每秒发射数
    pub emission_rate: f32,
    /// y 方向恒定加速度
    pub gravity: f32,
    pub rotation_speed: f32,
    pub max_particles: usize,
    pub continuous: bool,
    /// 物理粒子碰撞后剩余寿命的缩放
    pub collision_life_scale: f32,
    /// 物理粒子刚体半径；0 表示取粒子大小的一半
    pub body_radius: f32,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            start_color: Vec4::ONE,
            end_color: Vec4::new(1.0, 1.0, 1.0, 0.0),
            min_size: 2.0,
            max_size: 4.0,
            end_size_scale: 1.0,
            min_speed: 10.0,
            max_speed: 50.0,
            min_lifetime: 1.0,
            max_lifetime: 2.0,
            spread_angle: std::f32::consts::TAU,
            base_angle: 0.0,
            emission_rate: 10.0,
            gravity: 0.0,
            rotation_speed: 0.0,
            max_particles: 1000,
            continuous: true,
            collision_life_scale: 0.5,
            body_radius: 0.0,
        }
    }
}

impl EmitterSettings {
    /// 从预设创建
    pub fn from_preset(preset: &EffectPreset) -> ParticleResult<Self> {
        let mut settings = Self::default();
        settings.configure(preset)?;
        Ok(settings)
    }

    /// 应用命名参数
    ///
    /// 合法的参数全部生效；遇到未知或非法参数时记录日志，最后返回第一个错误。
    pub fn configure(&mut self, preset: &EffectPreset) -> ParticleResult<()> {
        let mut first_error = None;
        for (name, value) in &preset.params {
            if let Err(e) = self.apply(name, value) {
                tracing::debug!(
                    target: "particles",
                    "Preset '{}': skipping parameter: {}",
                    preset.name,
                    e
                );
                first_error.get_or_insert(e);
            }
        }
        self.normalize_ranges();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn apply(&mut self, name: &str, value: &ParamValue) -> ParticleResult<()> {
        match name {
            "startColor" => self.start_color = color(name, value)?,
            "endColor" => self.end_color = color(name, value)?,
            "minSize" => self.min_size = non_negative(name, value)?,
            "maxSize" => self.max_size = non_negative(name, value)?,
            "endSizeScale" => self.end_size_scale = non_negative(name, value)?,
            "minSpeed" => self.min_speed = non_negative(name, value)?,
            "maxSpeed" => self.max_speed = non_negative(name, value)?,
            "minLifetime" => self.min_lifetime = positive(name, value)?,
            "maxLifetime" => self.max_lifetime = positive(name, value)?,
            "spreadAngle" => self.spread_angle = number(name, value)?,
            "baseAngle" => self.base_angle = number(name, value)?,
            "emissionRate" => self.emission_rate = non_negative(name, value)?,
            "gravity" => self.gravity = number(name, value)?,
            "rotationSpeed" => self.rotation_speed = number(name, value)?,
            "maxParticles" => self.max_particles = non_negative(name, value)? as usize,
            "collisionLifeScale" => self.collision_life_scale = non_negative(name, value)?,
            "radius" => self.body_radius = non_negative(name, value)?,
            "continuous" => {
                self.continuous = value
                    .as_bool()
                    .ok_or_else(|| ParticleError::invalid_parameter(name, "expected a boolean"))?
            }
            _ => return Err(ParticleError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    /// min > max 时交换
    fn normalize_ranges(&mut self) {
        for (min, max) in [
            (&mut self.min_size, &mut self.max_size),
            (&mut self.min_speed, &mut self.max_speed),
            (&mut self.min_lifetime, &mut self.max_lifetime),
        ] {
            if *min > *max {
                std::mem::swap(min, max);
            }
        }
    }
}

fn number(name: &str, value: &ParamValue) -> ParticleResult<f32> {
    match value.as_f32() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ParticleError::invalid_parameter(name, "expected a finite number")),
    }
}

fn non_negative(name: &str, value: &ParamValue) -> ParticleResult<f32> {
    let v = number(name, value)?;
    if v < 0.0 {
        return Err(ParticleError::invalid_parameter(name, "must not be negative"));
    }
    Ok(v)
}

fn positive(name: &str, value: &ParamValue) -> ParticleResult<f32> {
    let v = number(name, value)?;
    if v <= 0.0 {
        return Err(ParticleError::invalid_parameter(name, "must be positive"));
    }
    Ok(v)
}

fn color(name: &str, value: &ParamValue) -> ParticleResult<Vec4> {
    value
        .as_color()
        .map(|c| Vec4::from_array(c).clamp(Vec4::ZERO, Vec4::ONE))
        .ok_or_else(|| ParticleError::invalid_parameter(name, "expected 3 or 4 color components"))
}
