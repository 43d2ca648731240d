//! 设备状态定义
//!
//! `DeviceState` 是对外可见的"设备是否可用"语义的唯一来源，
//! `StateSet` 用于描述命令门控的允许状态集合。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// 设备状态
///
/// # 状态转换
///
/// ```text
/// Unknown --连接成功--> On | Off
/// On      --运动命令被接受--> Moving
/// Moving  --硬件报告运动完成--> On
/// On | Off | Moving --检测到故障--> Fault
/// Fault   --显式 reset--> On | Off
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DeviceState {
    /// 未知（设备刚创建，尚未成功连接）
    #[default]
    Unknown = 0,
    /// 已连接，执行器未上电
    Off = 1,
    /// 已连接，执行器已上电，可接受运动命令
    On = 2,
    /// 运动中
    Moving = 3,
    /// 故障（需要显式 reset 才能离开）
    Fault = 4,
}

impl DeviceState {
    /// 所有状态（按数值顺序）
    pub const ALL: [DeviceState; 5] = [
        DeviceState::Unknown,
        DeviceState::Off,
        DeviceState::On,
        DeviceState::Moving,
        DeviceState::Fault,
    ];

    /// 状态名称
    pub const fn name(self) -> &'static str {
        match self {
            DeviceState::Unknown => "UNKNOWN",
            DeviceState::Off => "OFF",
            DeviceState::On => "ON",
            DeviceState::Moving => "MOVING",
            DeviceState::Fault => "FAULT",
        }
    }

    /// 从 u8 转换（无效值返回 Unknown）
    pub fn from_u8(value: u8) -> Self {
        Self::try_from(value).unwrap_or(DeviceState::Unknown)
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self.into()
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 状态集合（位掩码）
///
/// 用于命令门控规则，`const` 构造，运行期不可变。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateSet(u8);

impl StateSet {
    /// 空集合
    pub const EMPTY: StateSet = StateSet(0);

    /// 全部状态
    pub const ALL: StateSet = StateSet::of(&DeviceState::ALL);

    /// 从状态列表构造
    pub const fn of(states: &[DeviceState]) -> StateSet {
        let mut bits = 0u8;
        let mut i = 0;
        while i < states.len() {
            bits |= states[i].bit();
            i += 1;
        }
        StateSet(bits)
    }

    /// 是否包含某个状态
    pub const fn contains(self, state: DeviceState) -> bool {
        self.0 & state.bit() != 0
    }

    /// 并集
    pub const fn union(self, other: StateSet) -> StateSet {
        StateSet(self.0 | other.0)
    }

    /// 是否为空
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 集合中的状态数量
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// 遍历集合中的状态（按数值顺序）
    pub fn iter(self) -> impl Iterator<Item = DeviceState> {
        DeviceState::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl fmt::Debug for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, state) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.name())?;
        }
        f.write_str("}")
    }
}
