//! 移动命令
//!
//! 上电后按当前单位执行相对或绝对运动，可选等待运动结束

use anyhow::{Context, Result};
use clap::Args;
use stage_sdk::{DeviceState, StageDevice};
use std::time::{Duration, Instant};

/// 移动命令参数
#[derive(Args, Debug)]
pub struct MoveCommand {
    /// 相对移动距离
    #[arg(short, long, allow_hyphen_values = true, conflicts_with = "absolute")]
    pub relative: Option<f64>,

    /// 绝对目标位置
    #[arg(short, long, allow_hyphen_values = true)]
    pub absolute: Option<f64>,

    /// 位置单位（step, mm, um, rad, deg），不指定时沿用设备默认单位
    #[arg(short, long)]
    pub unit: Option<String>,

    /// 等待运动结束的最长时间（秒），0 表示不等待
    #[arg(short, long, default_value_t = 10.0)]
    pub wait: f64,
}

/// 解析后的运动目标
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveTarget {
    Relative(f64),
    Absolute(f64),
}

impl MoveCommand {
    pub fn target(&self) -> Result<MoveTarget> {
        let target = match (self.relative, self.absolute) {
            (Some(distance), None) => MoveTarget::Relative(distance),
            (None, Some(position)) => MoveTarget::Absolute(position),
            _ => anyhow::bail!("需要且只能指定 --relative 或 --absolute 之一"),
        };

        let value = match target {
            MoveTarget::Relative(v) | MoveTarget::Absolute(v) => v,
        };
        if !value.is_finite() {
            anyhow::bail!("无效的位置: {}", value);
        }

        Ok(target)
    }

    /// 执行移动
    pub fn execute(&self, device: &StageDevice) -> Result<()> {
        let target = self.target()?;

        if let Some(unit) = &self.unit {
            device.set_unit(unit).context("设置单位失败")?;
        }
        if device.state() == DeviceState::Off {
            println!("⏳ 上电...");
            device.set_power(true).context("上电失败")?;
        }

        let steps = match target {
            MoveTarget::Relative(distance) => device.move_relative(distance)?,
            MoveTarget::Absolute(position) => device.move_absolute(position)?,
        };
        println!("✅ 已下发 {:?} ({} steps, {})", target, steps, device.unit());

        if self.wait > 0.0 {
            let timeout = Duration::from_secs_f64(self.wait);
            if !wait_for_motion(device, timeout) {
                anyhow::bail!("等待运动结束超时 ({:.1}s)", self.wait);
            }
            println!("📍 当前状态: {}", device.status_text());
        }

        Ok(())
    }
}

/// 等待设备离开 Moving，返回 false 表示超时
pub fn wait_for_motion(device: &StageDevice, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while device.state() == DeviceState::Moving {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    true
}
