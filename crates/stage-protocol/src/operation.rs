//! 对外操作标识
//!
//! 传输层在启动时把外部命令名解析为 `Operation`，之后按枚举值分发，
//! 不再进行逐次字符串查找。

use crate::ProtocolError;
use crate::state::{DeviceState, StateSet};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::str::FromStr;

/// 门控规则类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RuleCategory {
    /// 任何状态下都允许（诊断、锁查询）
    Always,
    /// 非 On 状态：{Unknown, Off, Fault}
    NotOn,
    /// 非 Unknown 状态：{Off, On, Moving, Fault}
    NotUnknown,
    /// 仅 On 状态（运动命令）
    OnlyOn,
}

impl RuleCategory {
    /// 该类别允许的状态集合
    pub const fn allowed(self) -> StateSet {
        match self {
            RuleCategory::Always => StateSet::ALL,
            RuleCategory::NotOn => {
                StateSet::of(&[DeviceState::Unknown, DeviceState::Off, DeviceState::Fault])
            },
            RuleCategory::NotUnknown => StateSet::of(&[
                DeviceState::Off,
                DeviceState::On,
                DeviceState::Moving,
                DeviceState::Fault,
            ]),
            RuleCategory::OnlyOn => StateSet::of(&[DeviceState::On]),
        }
    }
}

/// 对外可调用的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Operation {
    // === 诊断 ===
    Diagnose = 0,
    LockQuery = 1,

    // === Lock/Unlock ===
    Lock = 2,
    Unlock = 3,

    // === System ===
    SelfCheck = 4,
    Init = 5,
    Reset = 6,

    // === Parameter-set ===
    SetMoveParameters = 7,
    SetStructureParameters = 8,
    SetUnit = 9,
    SetPower = 10,
    SetBrake = 11,

    // === Motion ===
    MoveRelative = 12,
    MoveAbsolute = 13,
    Stop = 14,

    // === Read ===
    ReadEncoderPosition = 15,
    ReadOriginPosition = 16,
    ReadLimitPositions = 17,
    ReadStatus = 18,

    // === Export ===
    ExportLogs = 19,
    ExportAxisParameters = 20,

    // === 仿真开关 ===
    SimSwitch = 21,
}

impl Operation {
    /// 操作总数
    pub const COUNT: usize = 22;

    /// 所有操作（按数值顺序，可直接作为查找表下标）
    pub const ALL: [Operation; Operation::COUNT] = [
        Operation::Diagnose,
        Operation::LockQuery,
        Operation::Lock,
        Operation::Unlock,
        Operation::SelfCheck,
        Operation::Init,
        Operation::Reset,
        Operation::SetMoveParameters,
        Operation::SetStructureParameters,
        Operation::SetUnit,
        Operation::SetPower,
        Operation::SetBrake,
        Operation::MoveRelative,
        Operation::MoveAbsolute,
        Operation::Stop,
        Operation::ReadEncoderPosition,
        Operation::ReadOriginPosition,
        Operation::ReadLimitPositions,
        Operation::ReadStatus,
        Operation::ExportLogs,
        Operation::ExportAxisParameters,
        Operation::SimSwitch,
    ];

    /// 外部命令名（传输层使用的名称）
    pub const fn name(self) -> &'static str {
        match self {
            Operation::Diagnose => "diagnose",
            Operation::LockQuery => "lockQuery",
            Operation::Lock => "lock",
            Operation::Unlock => "unlock",
            Operation::SelfCheck => "selfCheck",
            Operation::Init => "init",
            Operation::Reset => "reset",
            Operation::SetMoveParameters => "setMoveParameters",
            Operation::SetStructureParameters => "setStructureParameters",
            Operation::SetUnit => "setUnit",
            Operation::SetPower => "setPower",
            Operation::SetBrake => "setBrake",
            Operation::MoveRelative => "moveRelative",
            Operation::MoveAbsolute => "moveAbsolute",
            Operation::Stop => "stop",
            Operation::ReadEncoderPosition => "readEncoderPosition",
            Operation::ReadOriginPosition => "readOriginPosition",
            Operation::ReadLimitPositions => "readLimitPositions",
            Operation::ReadStatus => "readStatus",
            Operation::ExportLogs => "exportLogs",
            Operation::ExportAxisParameters => "exportAxisParameters",
            Operation::SimSwitch => "simSwitch",
        }
    }

    /// 该操作的门控类别
    pub const fn category(self) -> RuleCategory {
        match self {
            Operation::Diagnose | Operation::LockQuery => RuleCategory::Always,

            Operation::Lock | Operation::Unlock | Operation::SelfCheck | Operation::Init => {
                RuleCategory::NotOn
            },

            Operation::MoveRelative | Operation::MoveAbsolute => RuleCategory::OnlyOn,

            Operation::Reset
            | Operation::SetMoveParameters
            | Operation::SetStructureParameters
            | Operation::SetUnit
            | Operation::SetPower
            | Operation::SetBrake
            | Operation::Stop
            | Operation::ReadEncoderPosition
            | Operation::ReadOriginPosition
            | Operation::ReadLimitPositions
            | Operation::ReadStatus
            | Operation::ExportLogs
            | Operation::ExportAxisParameters
            | Operation::SimSwitch => RuleCategory::NotUnknown,
        }
    }

    /// 是否为运动命令
    pub const fn is_motion(self) -> bool {
        matches!(self, Operation::MoveRelative | Operation::MoveAbsolute)
    }

    /// 锁定期间是否被禁止（运动、上电、参数设置）
    pub const fn blocked_by_lockout(self) -> bool {
        matches!(
            self,
            Operation::MoveRelative
                | Operation::MoveAbsolute
                | Operation::SetPower
                | Operation::SetBrake
                | Operation::SetMoveParameters
                | Operation::SetStructureParameters
        )
    }

    /// 查找表下标
    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownOperation(s.to_string()))
    }
}
