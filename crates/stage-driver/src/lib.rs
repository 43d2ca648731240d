//! # Stage Driver
//!
//! 运动台连接监控层，包括：
//! - 共享监控上下文（连接句柄、健康标志、待恢复标志）
//! - 原子设备状态机
//! - 故障锁存（一次性 test-and-set）
//! - 后台健康监控线程与重连退避
//! - 重连后的延迟恢复流程
//! - 运行指标
//!
//! 命令路径只读原子标志，所有阻塞的网络探测都在监控线程中完成。
//! 大多数用户应该使用 `stage-client` 提供的 `StageDevice`。

pub mod backoff;
pub mod context;
mod error;
pub mod fault;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod restore;
pub mod state;

pub use backoff::BackoffPolicy;
pub use context::{ContextConfig, SupervisorContext};
pub use error::DriverError;
pub use fault::{FaultLatch, FaultRecord, SafetyActions};
pub use health::{ConnectionHealth, PendingRestore};
pub use metrics::{MetricsSnapshot, SupervisorMetrics};
pub use monitor::{CycleReport, HealthMonitor, MonitorConfig};
pub use restore::{RestoreCoordinator, RestoreOutcome, RestoreSteps};
pub use state::{AtomicDeviceState, DeviceStateMachine};
