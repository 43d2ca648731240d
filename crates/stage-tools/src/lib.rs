//! # Stage Tools - 配置与属性
//!
//! **依赖原则**: 只依赖 `stage-protocol`，不依赖 driver/client
//!
//! ## 包含模块
//!
//! - `properties` - 只读属性存储（启动时从 TOML 文件加载一次）与类型化设备属性
//! - `safety` - 安全设置（限位极性、抱闸、固件版本下限、速度上限）

pub mod properties;
pub mod safety;

pub use properties::{
    AxisSection, DeviceProperties, DeviceSection, MonitorSection, PropertyStore, RemoteSection,
};
pub use safety::SafetySettings;

use std::path::PathBuf;
use thiserror::Error;

/// 配置错误
///
/// 出现时不会修改任何设备状态。
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 读取文件失败
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("Invalid property file: {0}")]
    Parse(String),

    /// 属性类型不匹配
    #[error("Property {key} has wrong type (expected {expected})")]
    WrongType { key: String, expected: &'static str },

    /// 属性值非法
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// 单位/标定参数错误
    #[error(transparent)]
    Protocol(#[from] stage_protocol::ProtocolError),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
