//! 命令门控
//!
//! 静态查找表：操作 → 允许的设备状态集合，启动时一次性构建。
//! 检查是纯函数，不做任何 IO，也不修改状态。

use stage_protocol::{DeviceState, Operation, RuleCategory, StateSet};
use thiserror::Error;

/// 状态门控拒绝
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation {operation} not allowed in state {state} (allowed: {allowed})")]
pub struct StateError {
    pub operation: Operation,
    pub state: DeviceState,
    pub allowed: StateSet,
}

/// 单个操作的门控规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRule {
    pub operation: Operation,
    pub category: RuleCategory,
    pub allowed: StateSet,
}

/// 命令门控表
#[derive(Debug, Clone)]
pub struct CommandGate {
    rules: [CommandRule; Operation::COUNT],
}

impl CommandGate {
    pub fn new() -> Self {
        let rules = Operation::ALL.map(|operation| {
            let category = operation.category();
            CommandRule {
                operation,
                category,
                allowed: category.allowed(),
            }
        });
        Self { rules }
    }

    /// 某操作的规则
    pub fn rule(&self, operation: Operation) -> &CommandRule {
        &self.rules[operation.index()]
    }

    /// 检查 `operation` 在 `state` 下是否允许
    pub fn check(&self, operation: Operation, state: DeviceState) -> Result<(), StateError> {
        let allowed = self.rule(operation).allowed;
        if allowed.contains(state) {
            Ok(())
        } else {
            Err(StateError {
                operation,
                state,
                allowed,
            })
        }
    }

    pub fn is_allowed(&self, operation: Operation, state: DeviceState) -> bool {
        self.rule(operation).allowed.contains(state)
    }

    /// `state` 下允许的所有操作
    pub fn allowed_operations(&self, state: DeviceState) -> Vec<Operation> {
        self.rules
            .iter()
            .filter(|rule| rule.allowed.contains(state))
            .map(|rule| rule.operation)
            .collect()
    }

    /// 所有规则
    pub fn rules(&self) -> &[CommandRule] {
        &self.rules
    }
}

impl Default for CommandGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_indexed_by_operation() {
        let gate = CommandGate::new();
        for operation in Operation::ALL {
            assert_eq!(gate.rule(operation).operation, operation);
        }
    }

    #[test]
    fn test_motion_only_on() {
        let gate = CommandGate::new();
        assert!(gate.check(Operation::MoveRelative, DeviceState::On).is_ok());
        for state in [
            DeviceState::Unknown,
            DeviceState::Off,
            DeviceState::Moving,
            DeviceState::Fault,
        ] {
            assert!(gate.check(Operation::MoveAbsolute, state).is_err());
        }
    }

    #[test]
    fn test_state_error_names_everything() {
        let gate = CommandGate::new();
        let err = gate.check(Operation::Init, DeviceState::On).unwrap_err();
        assert_eq!(err.operation, Operation::Init);
        assert_eq!(err.state, DeviceState::On);
        let text = err.to_string();
        assert!(text.contains("init"));
        assert!(text.contains("ON"));
        assert!(text.contains("UNKNOWN"));
        assert!(text.contains("FAULT"));
    }

    #[test]
    fn test_always_operations() {
        let gate = CommandGate::new();
        for state in DeviceState::ALL {
            assert!(gate.is_allowed(Operation::Diagnose, state));
            assert!(gate.is_allowed(Operation::LockQuery, state));
        }
        let unknown = gate.allowed_operations(DeviceState::Unknown);
        assert!(unknown.contains(&Operation::Init));
        assert!(!unknown.contains(&Operation::Reset));
    }
}
