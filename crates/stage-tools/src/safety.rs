//! # 安全设置
//!
//! 属性文件 `[safety]` 段：限位接线极性、抱闸、故障处理与固件版本下限。

use crate::ConfigError;
use semver::Version;
use serde::{Deserialize, Serialize};
use stage_protocol::LimitPolarity;

/// 安全设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    /// 限位开关接线极性（`active_high` / `active_low`）
    pub limit_polarity: LimitPolarity,

    /// 是否带抱闸（未设置时按设备类型决定）
    pub brake_present: Option<bool>,

    /// 抱闸端口号（仅记录，由控制器固件使用）
    pub brake_port: Option<u32>,

    /// 故障锁存时是否抱闸
    pub engage_brake_on_fault: bool,

    /// 重连恢复时是否按之前的使能状态重新上电
    pub power_on_restore: bool,

    /// 控制器固件最低版本
    pub min_firmware: String,

    /// 最大速度（步/秒）
    pub max_speed: f64,

    /// 最大加速度（步/秒²）
    pub max_acceleration: f64,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            limit_polarity: LimitPolarity::ActiveHigh,
            brake_present: None,
            brake_port: None,
            engage_brake_on_fault: true,
            power_on_restore: true,
            min_firmware: "2.0.0".to_string(),
            max_speed: 200_000.0,
            max_acceleration: 2_000_000.0,
        }
    }
}

impl SafetySettings {
    /// 解析固件版本下限
    pub fn min_firmware_version(&self) -> Result<Version, ConfigError> {
        Version::parse(self.min_firmware.trim())
            .map_err(|e| ConfigError::invalid("safety.min_firmware", e.to_string()))
    }

    /// 固件版本是否满足下限
    ///
    /// 无法解析的版本字符串视为不满足。
    pub fn firmware_supported(&self, firmware: &str) -> Result<bool, ConfigError> {
        let minimum = self.min_firmware_version()?;
        Ok(Version::parse(firmware.trim().trim_start_matches('v'))
            .map(|version| version >= minimum)
            .unwrap_or(false))
    }

    /// 检查速度是否在限制内
    pub fn check_speed(&self, speed: f64) -> bool {
        speed.is_finite() && speed.abs() <= self.max_speed
    }

    /// 检查加速度是否在限制内
    pub fn check_acceleration(&self, acceleration: f64) -> bool {
        acceleration.is_finite() && acceleration.abs() <= self.max_acceleration
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.min_firmware_version()?;
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return Err(ConfigError::invalid("safety.max_speed", "must be positive"));
        }
        if !(self.max_acceleration.is_finite() && self.max_acceleration > 0.0) {
            return Err(ConfigError::invalid("safety.max_acceleration", "must be positive"));
        }
        Ok(())
    }
}
