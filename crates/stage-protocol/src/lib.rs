//! # Stage Protocol
//!
//! 运动台监控协议层定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `state`: 设备状态 `DeviceState` 与状态集合 `StateSet`
//! - `operation`: 对外操作标识 `Operation` 及其门控类别
//! - `units`: 位置单位与步数换算
//! - `fault`: 故障码与限位信号解码
//!
//! 本 crate 只包含纯数据结构与纯函数，不进行任何 IO，
//! 供 link/driver/client 各层共享。

pub mod fault;
pub mod operation;
pub mod state;
pub mod units;

// 重新导出常用类型
pub use fault::{FaultCode, LimitPolarity, LimitReading, decode_limit};
pub use operation::{Operation, RuleCategory};
pub use state::{DeviceState, StateSet};
pub use units::{AxisScale, Unit, convert_from_steps, convert_to_steps};

use thiserror::Error;

/// 协议层错误类型
///
/// 对应配置类错误（非法单位字符串、参数个数错误等），
/// 出现时不会修改任何设备状态。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid unit: {0:?} (expected one of step, mm, um, rad, urad, mrad)")]
    InvalidUnit(String),

    #[error("Unknown operation: {0:?}")]
    UnknownOperation(String),

    #[error("Wrong argument count for {operation}: expected {expected}, got {actual}")]
    ArgumentCount {
        operation: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// 检查参数个数
///
/// 传输层把外部调用的参数展开成列表后，用于在执行前校验参数个数。
pub fn check_arg_count(
    operation: Operation,
    expected: usize,
    actual: usize,
) -> Result<(), ProtocolError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ProtocolError::ArgumentCount {
            operation: operation.name().to_string(),
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_arg_count() {
        assert!(check_arg_count(Operation::MoveRelative, 1, 1).is_ok());

        let err = check_arg_count(Operation::MoveRelative, 1, 2).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ArgumentCount {
                operation: "moveRelative".to_string(),
                expected: 1,
                actual: 2,
            }
        );
        assert!(err.to_string().contains("moveRelative"));
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidUnit("inch".to_string());
        assert!(err.to_string().contains("inch"));

        let err = ProtocolError::InvalidValue {
            field: "speed".to_string(),
            value: "-1".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value for field speed: -1");
    }
}
