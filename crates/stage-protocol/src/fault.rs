//! 故障码与限位信号解码

use std::fmt;

/// 故障码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FaultCode {
    /// 无故障
    #[default]
    None,
    /// 正限位触发
    LimitPositive,
    /// 负限位触发
    LimitNegative,
}

impl FaultCode {
    /// 是否为故障
    pub fn is_fault(self) -> bool {
        self != FaultCode::None
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FaultCode::None => "none",
            FaultCode::LimitPositive => "positive limit",
            FaultCode::LimitNegative => "negative limit",
        };
        f.write_str(s)
    }
}

/// 限位开关接线极性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LimitPolarity {
    /// 高电平有效：原始值 1 = 正限位，2 = 负限位，0 = 无触发
    #[default]
    ActiveHigh,
    /// 低电平有效：bit0 = 正限位正常，bit1 = 负限位正常
    ///
    /// 某位为 0 表示对应方向触发；两位都为 0（无信号）时无法区分方向。
    ActiveLow,
}

/// 限位解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitReading {
    pub code: FaultCode,
    pub message: String,
}

impl LimitReading {
    fn clear() -> Self {
        Self {
            code: FaultCode::None,
            message: String::new(),
        }
    }

    fn triggered(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 是否检测到限位故障
    pub fn is_fault(&self) -> bool {
        self.code.is_fault()
    }
}

/// 解码控制器上报的原始限位值
///
/// 低电平有效接线下，"无信号"（两位都为 0）被视为限位触发，
/// 但方向无法判断，统一报告为 `LimitPositive`。
/// 这一行为与现场接线保持一致，未经硬件确认前不要修改。
pub fn decode_limit(raw: u8, polarity: LimitPolarity) -> LimitReading {
    match polarity {
        LimitPolarity::ActiveHigh => match raw {
            0 => LimitReading::clear(),
            1 => LimitReading::triggered(FaultCode::LimitPositive, "positive limit switch active"),
            2 => LimitReading::triggered(FaultCode::LimitNegative, "negative limit switch active"),
            // 两个方向同时触发：按正限位处理，消息中保留原始值
            other => LimitReading::triggered(
                FaultCode::LimitPositive,
                format!("both limit switches active (raw=0x{other:02X})"),
            ),
        },
        LimitPolarity::ActiveLow => {
            let positive_ok = raw & 0b01 != 0;
            let negative_ok = raw & 0b10 != 0;
            match (positive_ok, negative_ok) {
                (true, true) => LimitReading::clear(),
                (false, true) => {
                    LimitReading::triggered(FaultCode::LimitPositive, "positive limit switch active")
                },
                (true, false) => {
                    LimitReading::triggered(FaultCode::LimitNegative, "negative limit switch active")
                },
                (false, false) => LimitReading::triggered(
                    FaultCode::LimitPositive,
                    "limit switch active (no signal, direction unknown)",
                ),
            }
        },
    }
}
