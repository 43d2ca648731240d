//! 设备注册表
//!
//! 启动时构建一次的显式值（无全局状态），按设备类型名查找设备能力，
//! 以引用方式传给 builder。

use crate::error::{Result, StageError};
use serde::Serialize;
use std::collections::BTreeMap;

/// 设备能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    /// 带抱闸
    pub has_brake: bool,
    /// 支持运动命令
    pub supports_motion: bool,
    /// 使用独立编码器远程读取位置
    pub uses_encoder: bool,
}

/// 设备注册表
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    profiles: BTreeMap<String, DeviceProfile>,
}

impl DeviceRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置设备类型
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "LinearStage",
            DeviceProfile {
                has_brake: true,
                supports_motion: true,
                uses_encoder: true,
            },
        );
        registry.register(
            "MotionController",
            DeviceProfile {
                has_brake: false,
                supports_motion: true,
                uses_encoder: false,
            },
        );
        registry.register(
            "ForceSensor",
            DeviceProfile {
                has_brake: false,
                supports_motion: false,
                uses_encoder: false,
            },
        );
        registry
    }

    /// 注册（或覆盖）设备类型
    pub fn register(&mut self, class: impl Into<String>, profile: DeviceProfile) {
        self.profiles.insert(class.into(), profile);
    }

    /// 查找设备类型
    pub fn lookup(&self, class: &str) -> Result<DeviceProfile> {
        self.profiles.get(class).copied().ok_or_else(|| {
            StageError::config(format!(
                "unknown device class {class:?} (known: {})",
                self.classes().join(", ")
            ))
        })
    }

    /// 已注册的设备类型
    pub fn classes(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classes() {
        let registry = DeviceRegistry::with_defaults();
        assert_eq!(registry.classes(), vec!["ForceSensor", "LinearStage", "MotionController"]);
        assert!(registry.lookup("LinearStage").unwrap().has_brake);
        assert!(!registry.lookup("ForceSensor").unwrap().supports_motion);
    }

    #[test]
    fn test_unknown_class() {
        let registry = DeviceRegistry::with_defaults();
        let err = registry.lookup("Gripper").unwrap_err();
        assert_eq!(err.code(), 4);
        assert!(err.to_string().contains("LinearStage"));
        assert!(DeviceRegistry::new().lookup("LinearStage").is_err());
    }
}
