//! # Stage Client
//!
//! 运动台设备的命令层：
//!
//! - **状态门控**：每个操作按当前设备状态检查，拒绝时不修改任何状态
//! - **维护锁定**：锁定期间拒绝运动与参数写入
//! - **延迟恢复**：重连后在命令上下文中重新下发配置、恢复上电与位置
//! - **故障锁存**：限位触发时只执行一次停止与抱闸，只能通过复位离开 Fault
//! - **事件日志**：操作、故障与恢复结果，可导出为文本
//!
//! # 示例
//!
//! ```rust,no_run
//! use stage_client::StageDevice;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = StageDevice::builder().simulated(true).build()?;
//! device.wait_until_ready(Duration::from_secs(5));
//!
//! device.set_power(true)?;
//! device.set_unit("mm")?;
//! device.move_relative(2.5)?;
//! println!("{}", device.status_json()?);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod device;
mod device_core;
mod dispatch;
pub mod error;
pub mod event_log;
pub mod gate;
pub mod params;
pub mod registry;
pub mod status;
mod ticker;

pub use builder::StageDeviceBuilder;
pub use device_core::PollOutcome;
pub use device::StageDevice;
pub use error::{CommandResult, Result, StageError};
pub use event_log::{EventEntry, EventLevel, EventLog};
pub use gate::{CommandGate, CommandRule, StateError};
pub use params::{AxisParameters, MoveParameters, StructureParameters};
pub use registry::{DeviceProfile, DeviceRegistry};
pub use status::{LimitPositions, LockStatus, RemoteCheck, SelfCheckReport, StatusSnapshot};
