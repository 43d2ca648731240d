//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use stage_sdk::prelude::*;
//! ```

// 客户端层
pub use crate::client::{
    DeviceRegistry, MoveParameters, PollOutcome, StageDevice, StageDeviceBuilder,
    StructureParameters,
};

// 配置
pub use crate::tools::{DeviceProperties, PropertyStore};

// 协议层
pub use crate::protocol::{DeviceState, FaultCode, Operation, Unit};

// 错误类型
pub use crate::client::StageError;
pub use crate::driver::DriverError;
pub use crate::protocol::ProtocolError;
pub use crate::tools::ConfigError;
