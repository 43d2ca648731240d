//! 位置单位与步数换算
//!
//! 控制器内部以步（step）计数，对外位置属性可配置为
//! step / mm / µm / rad / µrad / mrad。
//!
//! 线性单位按 `steps_per_mm` 换算，角度单位按 `steps_per_rad` 换算。

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// 位置单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unit {
    /// 步
    #[default]
    Step,
    /// 毫米
    Millimeter,
    /// 微米
    Micrometer,
    /// 弧度
    Radian,
    /// 微弧度
    Microradian,
    /// 毫弧度
    Milliradian,
}

impl Unit {
    /// 所有单位
    pub const ALL: [Unit; 6] = [
        Unit::Step,
        Unit::Millimeter,
        Unit::Micrometer,
        Unit::Radian,
        Unit::Microradian,
        Unit::Milliradian,
    ];

    /// 单位符号
    pub const fn symbol(self) -> &'static str {
        match self {
            Unit::Step => "step",
            Unit::Millimeter => "mm",
            Unit::Micrometer => "um",
            Unit::Radian => "rad",
            Unit::Microradian => "urad",
            Unit::Milliradian => "mrad",
        }
    }

    /// 是否为角度单位
    pub const fn is_angular(self) -> bool {
        matches!(self, Unit::Radian | Unit::Microradian | Unit::Milliradian)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "step" | "steps" => Ok(Unit::Step),
            "mm" => Ok(Unit::Millimeter),
            "um" | "µm" => Ok(Unit::Micrometer),
            "rad" => Ok(Unit::Radian),
            "urad" | "µrad" => Ok(Unit::Microradian),
            "mrad" => Ok(Unit::Milliradian),
            _ => Err(ProtocolError::InvalidUnit(s.to_string())),
        }
    }
}

/// 轴标定参数
///
/// 两个系数都必须是有限正数。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisScale {
    /// 每毫米步数
    steps_per_mm: f64,
    /// 每弧度步数
    steps_per_rad: f64,
}

impl AxisScale {
    /// 创建标定参数
    ///
    /// # 错误
    /// - `ProtocolError::InvalidValue`: 系数不是有限正数
    pub fn new(steps_per_mm: f64, steps_per_rad: f64) -> Result<Self, ProtocolError> {
        check_positive("steps_per_mm", steps_per_mm)?;
        check_positive("steps_per_rad", steps_per_rad)?;
        Ok(Self {
            steps_per_mm,
            steps_per_rad,
        })
    }

    /// 每毫米步数
    pub fn steps_per_mm(&self) -> f64 {
        self.steps_per_mm
    }

    /// 每弧度步数
    pub fn steps_per_rad(&self) -> f64 {
        self.steps_per_rad
    }

    /// 某单位下 1 个单位对应的步数
    fn steps_per_unit(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Step => 1.0,
            Unit::Millimeter => self.steps_per_mm,
            Unit::Micrometer => self.steps_per_mm / 1_000.0,
            Unit::Radian => self.steps_per_rad,
            Unit::Microradian => self.steps_per_rad / 1_000_000.0,
            Unit::Milliradian => self.steps_per_rad / 1_000.0,
        }
    }

    /// 换算为步数（浮点）
    pub fn to_steps(&self, value: f64, unit: Unit) -> f64 {
        value * self.steps_per_unit(unit)
    }

    /// 从步数换算为指定单位
    pub fn from_steps(&self, steps: f64, unit: Unit) -> f64 {
        steps / self.steps_per_unit(unit)
    }

    /// 换算为整数步数（四舍五入），用于下发运动命令
    ///
    /// # 错误
    /// - `ProtocolError::InvalidValue`: 输入非有限值或超出 i64 范围
    pub fn to_step_count(&self, value: f64, unit: Unit) -> Result<i64, ProtocolError> {
        let steps = self.to_steps(value, unit).round();
        if !steps.is_finite() || steps.abs() >= i64::MAX as f64 {
            return Err(ProtocolError::InvalidValue {
                field: "position".to_string(),
                value: format!("{value} {unit}"),
            });
        }
        Ok(steps as i64)
    }
}

impl Default for AxisScale {
    fn default() -> Self {
        Self {
            steps_per_mm: 1_000.0,
            steps_per_rad: 10_000.0,
        }
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), ProtocolError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ProtocolError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

/// 换算为步数
pub fn convert_to_steps(value: f64, unit: Unit, scale: &AxisScale) -> f64 {
    scale.to_steps(value, unit)
}

/// 从步数换算
pub fn convert_from_steps(steps: f64, unit: Unit, scale: &AxisScale) -> f64 {
    scale.from_steps(steps, unit)
}
