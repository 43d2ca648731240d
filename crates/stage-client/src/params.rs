//! 轴参数
//!
//! 结构参数（标定）与运动参数在本地缓存，
//! 初始化与重连恢复时整体下发给控制器。

use crate::error::{Result, StageError};
use serde::{Deserialize, Serialize};
use stage_protocol::AxisScale;
use stage_tools::{AxisSection, SafetySettings};

/// 结构参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureParameters {
    /// 每毫米步数
    pub steps_per_mm: f64,
    /// 每弧度步数
    pub steps_per_rad: f64,
    /// 丝杠导程（mm）
    pub lead_mm: f64,
    /// 减速比
    pub gear_ratio: f64,
}

impl StructureParameters {
    /// 校验并返回换算系数
    pub fn scale(&self) -> Result<AxisScale> {
        for (field, value) in [("lead_mm", self.lead_mm), ("gear_ratio", self.gear_ratio)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(StageError::config(format!("{field} must be positive, got {value}")));
            }
        }
        Ok(AxisScale::new(self.steps_per_mm, self.steps_per_rad)?)
    }
}

impl From<&AxisSection> for StructureParameters {
    fn from(axis: &AxisSection) -> Self {
        Self {
            steps_per_mm: axis.steps_per_mm,
            steps_per_rad: axis.steps_per_rad,
            lead_mm: axis.lead_mm,
            gear_ratio: axis.gear_ratio,
        }
    }
}

/// 运动参数（步/秒，步/秒²）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveParameters {
    pub speed: f64,
    pub acceleration: f64,
    pub deceleration: f64,
}

impl MoveParameters {
    /// 按安全设置校验
    pub fn validate(&self, safety: &SafetySettings) -> Result<()> {
        for (field, value) in [
            ("speed", self.speed),
            ("acceleration", self.acceleration),
            ("deceleration", self.deceleration),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(StageError::config(format!("{field} must be positive, got {value}")));
            }
        }
        if !safety.check_speed(self.speed) {
            return Err(StageError::config(format!(
                "speed {} exceeds limit {}",
                self.speed, safety.max_speed
            )));
        }
        for (field, value) in [
            ("acceleration", self.acceleration),
            ("deceleration", self.deceleration),
        ] {
            if !safety.check_acceleration(value) {
                return Err(StageError::config(format!(
                    "{field} {value} exceeds limit {}",
                    safety.max_acceleration
                )));
            }
        }
        Ok(())
    }
}

impl From<&AxisSection> for MoveParameters {
    fn from(axis: &AxisSection) -> Self {
        Self {
            speed: axis.speed,
            acceleration: axis.acceleration,
            deceleration: axis.deceleration,
        }
    }
}

/// 导出的轴参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisParameters {
    pub device: String,
    pub axis_id: u32,
    pub unit: String,
    pub encoder_scale: f64,
    pub structure: StructureParameters,
    pub motion: MoveParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_axis_section() {
        let axis = AxisSection::default();
        let structure = StructureParameters::from(&axis);
        assert_eq!(structure.scale().unwrap().steps_per_mm(), 1_000.0);

        let motion = MoveParameters::from(&axis);
        assert!(motion.validate(&SafetySettings::default()).is_ok());
    }

    #[test]
    fn test_move_parameter_validation() {
        let safety = SafetySettings {
            max_speed: 5_000.0,
            ..Default::default()
        };
        let ok = MoveParameters {
            speed: 4_000.0,
            acceleration: 1_000.0,
            deceleration: 1_000.0,
        };
        assert!(ok.validate(&safety).is_ok());

        let too_fast = MoveParameters { speed: 6_000.0, ..ok };
        assert!(matches!(too_fast.validate(&safety), Err(StageError::Config(_))));

        let zero = MoveParameters { deceleration: 0.0, ..ok };
        assert!(zero.validate(&safety).is_err());
    }

    #[test]
    fn test_structure_validation() {
        let structure = StructureParameters {
            steps_per_mm: 400.0,
            steps_per_rad: 8_000.0,
            lead_mm: 2.0,
            gear_ratio: 1.0,
        };
        assert!(structure.scale().is_ok());
        assert!(StructureParameters { gear_ratio: -1.0, ..structure }.scale().is_err());
        assert!(StructureParameters { steps_per_mm: 0.0, ..structure }.scale().is_err());
    }
}
