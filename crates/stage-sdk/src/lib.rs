//! Stage SDK - 运动台监控 Rust SDK
//!
//! 为带抱闸、限位与独立编码器的单轴运动台提供连接监控、
//! 重连后延迟恢复、故障锁存与状态门控。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 设备状态、操作表、单位换算、限位解码
//! - **链路层** (`link`): 远程设备代理、可重建的连接句柄、仿真后端
//! - **驱动层** (`driver`): 健康监控线程、待恢复流程、故障锁存、状态机
//! - **工具层** (`tools`): 只读属性文件与安全设置
//! - **客户端层** (`client`): 门控后的设备命令接口
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use stage_sdk::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! stage_sdk::init_logger("info")?;
//!
//! let properties = PropertyStore::load("stage.toml")?.device_properties()?;
//! let device = StageDevice::builder().properties(properties).build()?;
//! device.wait_until_ready(Duration::from_secs(5));
//! device.set_power(true)?;
//! device.move_absolute(10.0)?;
//! # Ok(())
//! # }
//! ```

pub use stage_client as client;
pub use stage_driver as driver;
pub use stage_link as link;
pub use stage_protocol as protocol;
pub use stage_tools as tools;

pub mod logging;
pub mod prelude;

pub use logging::{LoggingError, init_logger};

// 客户端层（推荐入口）
pub use client::{
    CommandResult, DeviceRegistry, StageDevice, StageDeviceBuilder, StageError, StatusSnapshot,
};

// 驱动层错误与监控类型
pub use driver::{DriverError, HealthMonitor, MetricsSnapshot};

// 协议层
pub use protocol::{DeviceState, Operation, ProtocolError, Unit};

// 配置
pub use tools::{ConfigError, DeviceProperties, PropertyStore};
