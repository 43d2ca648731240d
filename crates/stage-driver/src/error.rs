//! 驱动层错误类型定义

use stage_link::LinkError;
use stage_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// 链路错误
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 参数/换算错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 链路当前不可用（监控线程负责恢复）
    #[error("Hardware unavailable ({remote}): {reason}")]
    Unavailable { remote: String, reason: String },

    /// 恢复过程中连接被替换
    #[error("Connection to {0} changed during restore")]
    HandleChanged(String),

    /// 恢复步骤失败
    #[error("Restore step '{step}' failed: {reason}")]
    RestoreStep { step: &'static str, reason: String },

    /// 未配置真实硬件连接工厂
    #[error("No hardware backend configured")]
    NoBackend,

    /// 后台线程错误
    #[error("Background thread error: {0}")]
    Thread(String),
}

impl DriverError {
    /// 是否为连接类失败
    pub fn is_connection_failure(&self) -> bool {
        match self {
            DriverError::Link(err) => err.is_connection_failure(),
            DriverError::Unavailable { .. } | DriverError::HandleChanged(_) => true,
            _ => false,
        }
    }

    /// 构造"不可用"错误
    pub fn unavailable(remote: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::Unavailable {
            remote: remote.into(),
            reason: reason.into(),
        }
    }
}
