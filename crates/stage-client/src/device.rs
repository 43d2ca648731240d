//! 运动台设备
//!
//! [`StageDevice`] 是对外的命令入口。每个操作都在命令处理上下文中执行：
//! 先按当前状态门控，再检查维护锁定，然后处理重连后的待恢复，最后才访问硬件。
//!
//! 后台有两个线程：
//! - 健康监控线程（`stage-health`）：探测与重连，只写原子标志
//! - 定时线程（`stage-ticker`）：在命令上下文中执行待恢复、自动初始化与硬件轮询

use crate::builder::StageDeviceBuilder;
use crate::device_core::{DeviceCore, PollOutcome};
use crate::error::{Result, StageError};
use crate::event_log::EventEntry;
use crate::params::{AxisParameters, MoveParameters, StructureParameters};
use crate::status::{LimitPositions, LockStatus, RemoteCheck, SelfCheckReport, StatusSnapshot};
use crate::ticker::Ticker;
use serde::Deserialize;
use stage_driver::{
    CycleReport, FaultRecord, HealthMonitor, MetricsSnapshot, RestoreOutcome, SupervisorContext,
};
use stage_link::SimConnector;
use stage_protocol::{DeviceState, FaultCode, Operation, Unit};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// `SelfCheck` 返回值
#[derive(Debug, Deserialize)]
struct SelfCheckReply {
    ok: bool,
    firmware: String,
    detail: String,
}

/// `GetLimitPositions` 返回值（步）
#[derive(Debug, Deserialize)]
struct LimitReply {
    negative: i64,
    positive: i64,
}

/// 运动台设备
pub struct StageDevice {
    core: Arc<DeviceCore>,
    monitor: HealthMonitor,
    ticker: Option<Ticker>,
}

impl StageDevice {
    /// 创建 builder
    pub fn builder<'r>() -> StageDeviceBuilder<'r> {
        StageDeviceBuilder::new()
    }

    pub(crate) fn from_parts(
        core: Arc<DeviceCore>,
        monitor: HealthMonitor,
        ticker: Option<Ticker>,
    ) -> Self {
        Self {
            core,
            monitor,
            ticker,
        }
    }

    // ==================== 锁定 ====================

    /// 查询维护锁定状态（任何状态都允许）
    pub fn lock_status(&self) -> Result<LockStatus> {
        self.core.check_gate(Operation::LockQuery)?;
        let owner = self.core.cache().lock_owner;
        Ok(LockStatus {
            locked: owner.is_some(),
            owner,
        })
    }

    /// 维护锁定
    ///
    /// 锁定期间运动与参数写入命令返回 [`StageError::Locked`]。
    /// 同一持有者重复锁定是幂等的。
    pub fn lock(&self, owner: &str) -> Result<()> {
        self.core.execute(Operation::Lock, |core| {
            let owner = owner.trim();
            if owner.is_empty() {
                return Err(StageError::config("lock owner must not be empty"));
            }
            let mut result = Ok(());
            core.update_cache(|cache| match &cache.lock_owner {
                Some(current) if current != owner => {
                    result = Err(StageError::Locked {
                        owner: current.clone(),
                    })
                },
                _ => cache.lock_owner = Some(owner.to_string()),
            });
            if result.is_ok() {
                info!("{} locked by {}", core.name, owner);
            }
            result
        })
    }

    /// 解除维护锁定（只有持有者可以解锁）
    pub fn unlock(&self, owner: &str) -> Result<()> {
        self.core.execute(Operation::Unlock, |core| {
            let owner = owner.trim();
            let mut result = Ok(());
            core.update_cache(|cache| match &cache.lock_owner {
                Some(current) if current != owner => {
                    result = Err(StageError::Locked {
                        owner: current.clone(),
                    })
                },
                _ => cache.lock_owner = None,
            });
            if result.is_ok() {
                info!("{} unlocked", core.name);
            }
            result
        })
    }

    // ==================== 诊断 ====================

    /// 诊断摘要（任何状态都允许，不访问硬件）
    pub fn diagnose(&self) -> Result<String> {
        self.core.check_gate(Operation::Diagnose)?;
        let ctx = &self.core.ctx;
        let remotes: Vec<String> = ctx
            .handles()
            .iter()
            .map(|handle| match handle.get() {
                Some(link) => format!("{} (connected, generation {})", handle.remote(), link.generation()),
                None => format!("{} (disconnected)", handle.remote()),
            })
            .collect();
        Ok(format!(
            "state={} healthy={} reachable={} pending_restore={} restore_retries={} \
             fault_latched={} backend={} remotes=[{}]",
            ctx.machine.state(),
            ctx.health.is_healthy(),
            ctx.health.is_reachable(),
            ctx.pending.is_pending(),
            ctx.pending.retry_count(),
            ctx.latch.is_latched(),
            if ctx.is_simulated() { "simulated" } else { "hardware" },
            remotes.join(", ")
        ))
    }

    /// 自检所有远程并检查控制器固件版本
    pub fn self_check(&self) -> Result<SelfCheckReport> {
        self.core.execute(Operation::SelfCheck, |core| {
            let safety = &core.properties.safety;
            let mut remotes = Vec::with_capacity(2);

            let primary = core.primary_link()?;
            let reply: SelfCheckReply =
                core.call(core.ctx.primary(), &primary, "SelfCheck", ())?;
            let firmware_supported = safety.firmware_supported(&reply.firmware)?;
            remotes.push(RemoteCheck {
                remote: primary.remote().to_string(),
                ok: reply.ok,
                firmware: reply.firmware,
                firmware_supported,
                detail: reply.detail,
            });

            if let Some((handle, encoder)) = core.encoder_link()? {
                let reply: SelfCheckReply = core.call(handle, &encoder, "SelfCheck", ())?;
                remotes.push(RemoteCheck {
                    remote: encoder.remote().to_string(),
                    ok: reply.ok,
                    firmware: reply.firmware,
                    firmware_supported: true,
                    detail: reply.detail,
                });
            }

            let report = SelfCheckReport { remotes };
            if !report.passed() {
                warn!("Self check of {} failed: {}", core.name, report);
                core.log.warn(format!("Self check failed: {report}"));
            }
            Ok(report)
        })
    }

    // ==================== 生命周期 ====================

    /// 初始化：下发参数并读取上电状态（Unknown | Off | Fault）
    pub fn init(&self) -> Result<DeviceState> {
        self.core.execute(Operation::Init, |core| core.initialize())
    }

    /// 复位：停止运动、清除故障锁存、重新读取上电状态
    ///
    /// 是离开 Fault 的唯一途径，重复调用是幂等的。
    pub fn reset(&self) -> Result<DeviceState> {
        self.core.execute(Operation::Reset, |core| {
            let link = core.primary_link()?;
            let primary = core.ctx.primary();

            if let Err(err) = link.call::<_, ()>("Stop", ()) {
                if err.is_connection_failure() {
                    return Err(core.command_failure(primary, &link, err));
                }
                warn!("Stop during reset failed: {}", err);
            }
            core.call::<_, ()>(primary, &link, "ClearFault", ())?;
            let power: bool = core.call(primary, &link, "GetPowerStatus", ())?;
            let brake_engaged: bool = if core.has_brake {
                core.call(primary, &link, "GetBrakeStatus", ())?
            } else {
                false
            };

            if core.ctx.latch.clear() {
                core.log.info("Fault latch cleared");
            }
            core.update_cache(|cache| {
                cache.power = power;
                cache.power_intent = power;
                cache.brake_engaged = brake_engaged;
            });
            let previous = core.ctx.machine.on_reset(power);
            let state = core.ctx.machine.state();
            info!("{} reset: {} -> {}", core.name, previous, state);
            Ok(state)
        })
    }

    // ==================== 参数 ====================

    /// 设置运动参数（校验后下发并缓存）
    pub fn set_move_parameters(&self, params: MoveParameters) -> Result<()> {
        self.core.execute(Operation::SetMoveParameters, |core| {
            params.validate(&core.properties.safety)?;
            let link = core.primary_link()?;
            core.call::<_, ()>(core.ctx.primary(), &link, "ApplyMoveParameters", params)?;
            core.update_cache(|cache| cache.motion = params);
            Ok(())
        })
    }

    /// 设置结构参数（校验后下发并缓存，同时更新单位换算）
    pub fn set_structure_parameters(&self, params: StructureParameters) -> Result<()> {
        self.core.execute(Operation::SetStructureParameters, |core| {
            let scale = params.scale()?;
            let link = core.primary_link()?;
            core.call::<_, ()>(core.ctx.primary(), &link, "ApplyStructureParameters", params)?;
            core.update_cache(|cache| {
                cache.structure = params;
                cache.scale = scale;
            });
            Ok(())
        })
    }

    /// 设置位置单位
    pub fn set_unit(&self, unit: &str) -> Result<Unit> {
        self.core.execute(Operation::SetUnit, |core| {
            let unit: Unit = unit.parse()?;
            core.update_cache(|cache| cache.unit = unit);
            Ok(unit)
        })
    }

    /// 上电/断电
    ///
    /// 带抱闸的设备上电后松闸，断电前先抱闸。
    pub fn set_power(&self, on: bool) -> Result<()> {
        self.core.execute(Operation::SetPower, |core| {
            let link = core.primary_link()?;
            let primary = core.ctx.primary();

            if !on && core.has_brake {
                core.call::<_, ()>(primary, &link, "SetBrake", true)?;
            }
            core.call::<_, ()>(primary, &link, "SetPower", on)?;
            if on && core.has_brake {
                core.call::<_, ()>(primary, &link, "SetBrake", false)?;
            }

            let has_brake = core.has_brake;
            core.update_cache(|cache| {
                cache.power = on;
                cache.power_intent = on;
                if has_brake {
                    cache.brake_engaged = !on;
                }
            });
            core.ctx.machine.on_power(on);
            Ok(())
        })
    }

    /// 抱闸/松闸
    pub fn set_brake(&self, engaged: bool) -> Result<()> {
        self.core.execute(Operation::SetBrake, |core| {
            if !core.has_brake {
                return Err(StageError::config(format!("{} has no brake", core.name)));
            }
            let link = core.primary_link()?;
            core.call::<_, ()>(core.ctx.primary(), &link, "SetBrake", engaged)?;
            core.update_cache(|cache| cache.brake_engaged = engaged);
            Ok(())
        })
    }

    // ==================== 运动 ====================

    /// 相对运动（当前单位），返回下发的步数
    pub fn move_relative(&self, distance: f64) -> Result<i64> {
        self.motion(Operation::MoveRelative, "MoveRelative", distance)
    }

    /// 绝对运动（当前单位），返回下发的目标步数
    pub fn move_absolute(&self, position: f64) -> Result<i64> {
        self.motion(Operation::MoveAbsolute, "MoveAbsolute", position)
    }

    fn motion(&self, operation: Operation, command: &'static str, value: f64) -> Result<i64> {
        self.core.execute(operation, |core| {
            if !core.profile.supports_motion {
                return Err(StageError::config(format!(
                    "device class {} does not support motion",
                    core.class
                )));
            }
            let cache = core.cache();
            let steps = cache.scale.to_step_count(value, cache.unit)?;
            let link = core.primary_link()?;

            match core.call::<_, ()>(core.ctx.primary(), &link, command, steps) {
                Ok(()) => {
                    core.ctx.machine.on_motion_accepted();
                    core.log
                        .info(format!("{operation} {value} {} ({steps} steps)", cache.unit));
                    Ok(steps)
                },
                Err(err @ StageError::Hardware { .. }) => {
                    core.trip_fault(&link, FaultCode::None, format!("{operation} rejected: {err}"));
                    Err(err)
                },
                Err(err) => Err(err),
            }
        })
    }

    /// 停止运动
    pub fn stop(&self) -> Result<()> {
        self.core.execute(Operation::Stop, |core| {
            let link = core.primary_link()?;
            core.call::<_, ()>(core.ctx.primary(), &link, "Stop", ())?;
            core.ctx.machine.on_motion_complete();
            Ok(())
        })
    }

    // ==================== 读取 ====================

    /// 读取当前位置（当前单位）
    ///
    /// 配置了编码器时从编码器读取并按比例换算成步数。
    pub fn read_encoder_position(&self) -> Result<f64> {
        self.core.execute(Operation::ReadEncoderPosition, |core| {
            let steps = match core.encoder_link()? {
                Some((handle, encoder)) => {
                    let counts: i64 = core.call(handle, &encoder, "GetPosition", ())?;
                    core.encoder_to_steps(counts)
                },
                None => {
                    let link = core.primary_link()?;
                    core.call(core.ctx.primary(), &link, "GetPosition", ())?
                },
            };
            core.update_cache(|cache| cache.position_steps = Some(steps));
            Ok(core.to_unit(steps))
        })
    }

    /// 读取原点位置（当前单位）
    pub fn read_origin_position(&self) -> Result<f64> {
        self.core.execute(Operation::ReadOriginPosition, |core| {
            let link = core.primary_link()?;
            let steps: i64 = core.call(core.ctx.primary(), &link, "GetOriginPosition", ())?;
            Ok(core.to_unit(steps))
        })
    }

    /// 读取限位位置（当前单位）
    pub fn read_limit_positions(&self) -> Result<LimitPositions> {
        self.core.execute(Operation::ReadLimitPositions, |core| {
            let link = core.primary_link()?;
            let reply: LimitReply =
                core.call(core.ctx.primary(), &link, "GetLimitPositions", ())?;
            Ok(LimitPositions {
                negative: core.to_unit(reply.negative),
                positive: core.to_unit(reply.positive),
            })
        })
    }

    /// 状态快照（Unknown 之外的状态都允许，不访问硬件）
    pub fn status(&self) -> Result<StatusSnapshot> {
        self.core.check_gate(Operation::ReadStatus)?;
        Ok(self.snapshot())
    }

    /// 状态快照 JSON
    pub fn status_json(&self) -> Result<String> {
        self.status().map(|snapshot| snapshot.to_json())
    }

    fn snapshot(&self) -> StatusSnapshot {
        let core = &self.core;
        let ctx = &core.ctx;
        let cache = core.cache();
        StatusSnapshot {
            device: core.name.clone(),
            class: core.class.clone(),
            state: ctx.machine.state().to_string(),
            status: ctx.machine.status().to_string(),
            healthy: ctx.health.is_healthy(),
            reachable: ctx.health.is_reachable(),
            pending_restore: ctx.pending.is_pending(),
            restore_retries: ctx.pending.retry_count(),
            fault: ctx.latch.record(),
            lock: LockStatus {
                locked: cache.lock_owner.is_some(),
                owner: cache.lock_owner.clone(),
            },
            power: cache.power,
            brake_engaged: cache.brake_engaged,
            position: cache
                .position_steps
                .map(|steps| cache.scale.from_steps(steps as f64, cache.unit)),
            unit: cache.unit.to_string(),
            simulated: ctx.is_simulated(),
            metrics: ctx.metrics.snapshot(),
        }
    }

    // ==================== 导出 ====================

    /// 导出事件日志，返回写入的条目数
    pub fn export_logs<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        self.core.execute(Operation::ExportLogs, |core| {
            let written = core.log.export(path.as_ref())?;
            info!("Exported {} log entries to {}", written, path.as_ref().display());
            Ok(written)
        })
    }

    /// 导出轴参数（JSON）
    pub fn export_axis_parameters<P: AsRef<Path>>(&self, path: P) -> Result<AxisParameters> {
        self.core.execute(Operation::ExportAxisParameters, |core| {
            let cache = core.cache();
            let params = AxisParameters {
                device: core.name.clone(),
                axis_id: core.properties.axis.axis_id,
                unit: cache.unit.to_string(),
                encoder_scale: core.properties.axis.encoder_scale,
                structure: cache.structure,
                motion: cache.motion,
            };
            let json = serde_json::to_string_pretty(&params).map_err(std::io::Error::other)?;
            std::fs::write(path.as_ref(), json)?;
            Ok(params)
        })
    }

    // ==================== 仿真 ====================

    /// 切换真实/仿真后端，返回是否发生了切换
    ///
    /// 切换后连接由监控线程按新后端重建，重连后自动恢复配置。
    pub fn sim_switch(&self, simulated: bool) -> Result<bool> {
        self.core.execute(Operation::SimSwitch, |core| {
            let switched = core.ctx.switch_backend(simulated)?;
            if switched {
                core.log.info(format!(
                    "Switched to {} backend",
                    if simulated { "simulated" } else { "hardware" }
                ));
            }
            Ok(switched)
        })
    }

    // ==================== 属性 ====================

    /// 设备名称
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// 当前状态
    pub fn state(&self) -> DeviceState {
        self.core.ctx.machine.state()
    }

    /// 状态文本
    pub fn status_text(&self) -> String {
        self.core.ctx.machine.status().to_string()
    }

    /// 最近一次读取的位置（当前单位）
    pub fn position(&self) -> Option<f64> {
        let cache = self.core.cache();
        cache
            .position_steps
            .map(|steps| cache.scale.from_steps(steps as f64, cache.unit))
    }

    /// 当前单位
    pub fn unit(&self) -> Unit {
        self.core.cache().unit
    }

    /// 故障记录
    pub fn fault(&self) -> FaultRecord {
        self.core.ctx.latch.record()
    }

    /// 故障文本（未锁存时为空）
    pub fn fault_text(&self) -> String {
        self.fault().message
    }

    pub fn power(&self) -> bool {
        self.core.cache().power
    }

    pub fn brake_engaged(&self) -> bool {
        self.core.cache().brake_engaged
    }

    pub fn has_brake(&self) -> bool {
        self.core.has_brake
    }

    pub fn is_healthy(&self) -> bool {
        self.core.ctx.health.is_healthy()
    }

    pub fn is_reachable(&self) -> bool {
        self.core.ctx.health.is_reachable()
    }

    pub fn pending_restore(&self) -> bool {
        self.core.ctx.pending.is_pending()
    }

    pub fn is_simulated(&self) -> bool {
        self.core.ctx.is_simulated()
    }

    /// 允许在当前状态下执行的操作
    pub fn allowed_operations(&self) -> Vec<Operation> {
        self.core.gate.allowed_operations(self.state())
    }

    /// 运行指标
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.ctx.metrics.snapshot()
    }

    /// 事件日志
    pub fn events(&self) -> Vec<EventEntry> {
        self.core.log.entries()
    }

    /// 监控上下文
    pub fn context(&self) -> &Arc<SupervisorContext> {
        &self.core.ctx
    }

    /// 仿真连接工厂
    pub fn sim(&self) -> &Arc<SimConnector> {
        self.core.ctx.sim()
    }

    // ==================== 监控与定时任务 ====================

    /// 健康监控器
    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// 手动执行一个监控周期
    pub fn run_monitor_cycle(&self, now: Instant) -> CycleReport {
        self.monitor.run_cycle(now)
    }

    /// 手动执行一次命令上下文定时任务（待恢复与自动初始化）
    pub fn tick(&self) -> RestoreOutcome {
        self.core.tick()
    }

    /// 手动执行一次硬件轮询
    pub fn poll(&self) -> PollOutcome {
        self.core.poll()
    }

    /// 等待连接就绪且初始化完成
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_healthy() && self.state() != DeviceState::Unknown {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// 停止后台线程并断开所有连接
    pub fn shutdown(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        self.monitor.stop();
        for handle in self.core.ctx.handles() {
            handle.reset();
        }
        self.core.ctx.health.mark_unhealthy();
    }
}

impl Drop for StageDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StageDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDevice")
            .field("name", &self.core.name)
            .field("class", &self.core.class)
            .field("context", &self.core.ctx)
            .field("ticker", &self.ticker.is_some())
            .finish()
    }
}
