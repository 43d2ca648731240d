//! One-shot 模式
//!
//! 每个命令独立执行：
//! 1. 读取配置和属性
//! 2. 启动设备并等待连接就绪
//! 3. 执行操作
//! 4. 关闭后台线程

use anyhow::{Context, Result};
use stage_sdk::{CommandResult, DeviceProperties, Operation, StageDevice, StageError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::commands::{MoveCommand, StopCommand};

/// 等待设备就绪的最长时间
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot 模式
pub struct OneShotMode {
    device: StageDevice,
}

impl OneShotMode {
    /// 启动设备并等待就绪
    pub fn new(properties: DeviceProperties) -> Result<Self> {
        let device = StageDevice::builder()
            .properties(properties)
            .build()
            .context("创建设备失败")?;

        println!("⏳ 连接到 {} ...", device.name());
        if !device.wait_until_ready(READY_TIMEOUT) {
            let diagnose = device.diagnose().unwrap_or_default();
            warn!("Device {} not ready after {:?}: {}", device.name(), READY_TIMEOUT, diagnose);
            anyhow::bail!("设备未就绪: {}", diagnose);
        }
        info!(
            "Device {} ready ({})",
            device.name(),
            if device.is_simulated() { "simulated" } else { "hardware" }
        );
        println!("✅ 已就绪: {}", device.status_text());

        Ok(Self { device })
    }

    pub fn device(&self) -> &StageDevice {
        &self.device
    }

    /// 状态
    pub fn status(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", self.device.status_json()?);
        } else {
            println!("{}", self.device.diagnose()?);
            println!("{}", self.device.fault_text());
        }
        Ok(())
    }

    /// 移动
    pub fn move_to(&self, args: MoveCommand) -> Result<()> {
        args.execute(&self.device)
    }

    /// 停止
    pub fn stop(&self, args: StopCommand) -> Result<()> {
        args.execute(&self.device)
    }

    /// 复位
    pub fn reset(&self) -> Result<()> {
        println!("⏳ 复位...");
        let state = self.device.reset()?;
        println!("✅ 复位完成: {}", state);
        Ok(())
    }

    /// 按名称执行任意操作，返回结果码
    pub fn exec(&self, name: &str, args: &[String]) -> i32 {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let result: CommandResult = match name.parse::<Operation>() {
            Ok(operation) => self.device.execute_op(operation, &args),
            Err(err) => StageError::from(err).into(),
        };
        println!("{}", result);
        result.code
    }

    /// 周期打印状态，直到 Ctrl+C
    pub fn monitor(&self, interval: Duration) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("安装 Ctrl+C 处理失败")?;

        println!("📊 监控中（每 {} ms）...", interval.as_millis());
        println!("按 Ctrl+C 停止\n");

        let mut last = String::new();
        while running.load(Ordering::SeqCst) {
            let line = monitor_line(&self.device);
            if line != last {
                println!("{}", line);
                last = line;
            }
            std::thread::sleep(interval);
        }

        println!("\n✅ 监控已结束");
        println!("{:#?}", self.device.metrics());
        Ok(())
    }

    /// 关闭设备
    pub fn close(mut self) {
        info!("Shutting down device {}", self.device.name());
        self.device.shutdown();
    }
}

/// 单行状态摘要（仅在变化时打印）
fn monitor_line(device: &StageDevice) -> String {
    let position = device
        .position()
        .map(|p| format!("{:.4} {}", p, device.unit()))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "state={} healthy={} pending_restore={} power={} brake={} position={} fault={}",
        device.state(),
        device.is_healthy(),
        device.pending_restore(),
        device.power(),
        device.brake_engaged(),
        position,
        device.fault_text()
    )
}
