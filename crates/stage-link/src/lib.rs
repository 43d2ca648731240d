//! # Stage Link Layer
//!
//! 远程设备链路抽象层。
//!
//! 运动控制器、编码器读取器等硬件都通过网络链路访问，
//! 本层只暴露两种能力：
//! - [`RemoteDeviceProxy`]: 已建立的连接（ping / 带超时的命令调用）
//! - [`RemoteConnector`]: 按远程名称建立连接
//!
//! 连接本身由 [`ProxyHandle`] 持有，支持原子替换，
//! 读取方永远不会看到半销毁的连接。

pub mod handle;
pub mod sim;

pub use handle::{Link, ProxyHandle, Rebuilt};
pub use sim::{SimConnector, SimulatedStage};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// 链路层统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// 远程不可达（连接失败、ping 失败）
    #[error("Remote {remote} unreachable: {reason}")]
    Unreachable { remote: String, reason: String },

    /// 调用超时
    #[error("Remote {remote} timed out after {timeout_ms} ms")]
    Timeout { remote: String, timeout_ms: u64 },

    /// 远程接受了调用但报告失败
    #[error("Remote {remote} reported failure for {command} (code {code}): {message}")]
    Hardware {
        remote: String,
        command: String,
        code: i32,
        message: String,
    },

    /// 当前没有可用连接
    #[error("No connection to remote {0}")]
    NoHandle(String),

    /// 返回值格式错误
    #[error("Malformed reply from {remote} for {command}: {detail}")]
    MalformedReply {
        remote: String,
        command: String,
        detail: String,
    },
}

impl LinkError {
    /// 是否为连接类失败（需要重连才能恢复）
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            LinkError::Unreachable { .. } | LinkError::Timeout { .. } | LinkError::NoHandle(_)
        )
    }

    /// 是否为硬件报告的失败
    pub fn is_hardware(&self) -> bool {
        matches!(self, LinkError::Hardware { .. })
    }

    /// 出错的远程名称
    pub fn remote(&self) -> &str {
        match self {
            LinkError::Unreachable { remote, .. }
            | LinkError::Timeout { remote, .. }
            | LinkError::Hardware { remote, .. }
            | LinkError::MalformedReply { remote, .. } => remote,
            LinkError::NoHandle(remote) => remote,
        }
    }
}

/// 远程设备连接
///
/// 由硬件绑定层实现（运动卡 SDK、编码器寄存器读取等）。
/// 所有方法都必须在给定超时内返回。
pub trait RemoteDeviceProxy: Send + Sync {
    /// 远程名称
    fn name(&self) -> &str;

    /// 存活探测
    fn ping(&self, timeout: Duration) -> Result<(), LinkError>;

    /// 调用远程命令
    fn invoke(&self, command: &str, args: Value, timeout: Duration) -> Result<Value, LinkError>;

    /// 当前默认调用超时
    fn timeout(&self) -> Duration;

    /// 设置默认调用超时
    fn set_timeout(&self, timeout: Duration);
}

/// 连接工厂
pub trait RemoteConnector: Send + Sync {
    /// 按名称建立连接
    ///
    /// 实现只负责建立连接，存活探测由 [`ProxyHandle::rebuild`] 完成。
    fn connect(
        &self,
        remote: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn RemoteDeviceProxy>, LinkError>;
}
