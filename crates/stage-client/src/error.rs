//! 设备层错误类型

use crate::gate::StateError;
use stage_driver::DriverError;
use stage_link::LinkError;
use stage_protocol::ProtocolError;
use stage_tools::ConfigError;
use std::fmt;
use thiserror::Error;

/// 设备操作错误
///
/// 所有错误都不会导致进程退出；硬件相关错误最终让设备停在 Fault 并给出状态文本。
#[derive(Error, Debug)]
pub enum StageError {
    /// 当前状态不允许该操作（不修改任何状态）
    #[error(transparent)]
    State(#[from] StateError),

    /// 链路不可用（由监控线程恢复）
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// 远程报告的硬件错误
    #[error("Hardware error from {remote} during {command} (code {code}): {message}")]
    Hardware {
        remote: String,
        command: String,
        code: i32,
        message: String,
    },

    /// 配置/参数错误（不修改任何状态）
    #[error("Configuration error: {0}")]
    Config(String),

    /// 设备处于维护锁定
    #[error("Device locked by {owner}")]
    Locked { owner: String },

    /// 文件导出错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 链路返回格式错误
    #[error("Link error: {0}")]
    Link(LinkError),

    /// 驱动层内部错误
    #[error("Driver error: {0}")]
    Driver(DriverError),
}

impl StageError {
    /// 对外结果码（0 保留给成功）
    pub fn code(&self) -> i32 {
        match self {
            StageError::State(_) => 1,
            StageError::HardwareUnavailable(_) => 2,
            StageError::Hardware { .. } => 3,
            StageError::Config(_) => 4,
            StageError::Locked { .. } => 5,
            StageError::Io(_) => 6,
            StageError::Link(_) => 7,
            StageError::Driver(_) => 8,
        }
    }

    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        StageError::Config(msg.into())
    }

    pub fn is_state_error(&self) -> bool {
        matches!(self, StageError::State(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StageError::HardwareUnavailable(_))
    }
}

impl From<LinkError> for StageError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Hardware {
                remote,
                command,
                code,
                message,
            } => StageError::Hardware {
                remote,
                command,
                code,
                message,
            },
            err if err.is_connection_failure() => StageError::HardwareUnavailable(err.to_string()),
            err => StageError::Link(err),
        }
    }
}

impl From<DriverError> for StageError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Link(link) => link.into(),
            DriverError::Protocol(protocol) => protocol.into(),
            DriverError::NoBackend => StageError::Config(err.to_string()),
            err if err.is_connection_failure() => StageError::HardwareUnavailable(err.to_string()),
            err => StageError::Driver(err),
        }
    }
}

impl From<ProtocolError> for StageError {
    fn from(err: ProtocolError) -> Self {
        StageError::Config(err.to_string())
    }
}

impl From<ConfigError> for StageError {
    fn from(err: ConfigError) -> Self {
        StageError::Config(err.to_string())
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, StageError>;

/// 传输层使用的命令结果（0 = 成功，非 0 = 失败）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub code: i32,
    pub message: String,
}

impl CommandResult {
    pub const SUCCESS: i32 = 0;

    /// 成功结果
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: Self::SUCCESS,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Self::SUCCESS
    }
}

impl From<StageError> for CommandResult {
    fn from(err: StageError) -> Self {
        CommandResult {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl<T: fmt::Display> From<Result<T>> for CommandResult {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => CommandResult::ok(value.to_string()),
            Err(err) => err.into(),
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "[{}]", self.code)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_mapping() {
        let err: StageError = LinkError::Timeout {
            remote: "stage/motion".to_string(),
            timeout_ms: 800,
        }
        .into();
        assert!(err.is_unavailable());
        assert_eq!(err.code(), 2);

        let err: StageError = LinkError::Hardware {
            remote: "stage/motion".to_string(),
            command: "MoveRelative".to_string(),
            code: 4,
            message: "brake engaged".to_string(),
        }
        .into();
        assert_eq!(err.code(), 3);
        assert!(err.to_string().contains("brake engaged"));
    }

    #[test]
    fn test_driver_error_mapping() {
        let err: StageError = DriverError::unavailable("stage/motion", "restore pending").into();
        assert!(err.is_unavailable());

        let err: StageError = DriverError::NoBackend.into();
        assert_eq!(err.code(), 4);

        let err: StageError = DriverError::Thread("spawn failed".to_string()).into();
        assert_eq!(err.code(), 8);
    }

    #[test]
    fn test_command_result() {
        let ok: CommandResult = Ok::<_, StageError>(2.5).into();
        assert!(ok.is_ok());
        assert_eq!(ok.message, "2.5");

        let err: CommandResult = Err::<f64, _>(StageError::config("bad unit")).into();
        assert_eq!(err.code, 4);
        assert_eq!(err.to_string(), "[4] Configuration error: bad unit");
    }
}
