//! 停止命令
//!
//! 停止当前运动，可选随后断电（有刹车时先抱闸）

use anyhow::Result;
use clap::Args;
use stage_sdk::{DeviceState, StageDevice};

/// 停止命令参数
#[derive(Args, Debug, Default)]
pub struct StopCommand {
    /// 停止后断电
    #[arg(long)]
    pub power_off: bool,
}

impl StopCommand {
    pub fn execute(&self, device: &StageDevice) -> Result<()> {
        println!("🛑 停止运动...");
        device.stop()?;

        if self.power_off && device.state() == DeviceState::On {
            println!("⏳ 断电...");
            device.set_power(false)?;
        }

        println!("✅ {}", device.status_text());
        Ok(())
    }
}
