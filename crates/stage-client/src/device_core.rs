//! 设备内核
//!
//! 命令处理上下文的共享部分：命令锁、门控、参数缓存、事件日志。
//! 由 [`StageDevice`](crate::StageDevice) 与定时线程共同持有。

use crate::error::{Result, StageError};
use crate::event_log::EventLog;
use crate::gate::CommandGate;
use crate::params::{MoveParameters, StructureParameters};
use crate::registry::DeviceProfile;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stage_driver::{
    DriverError, RestoreCoordinator, RestoreOutcome, RestoreSteps, SafetyActions,
    SupervisorContext, SupervisorMetrics,
};
use stage_link::{Link, LinkError, ProxyHandle};
use stage_protocol::{AxisScale, DeviceState, FaultCode, Operation, Unit, decode_limit};
use stage_tools::DeviceProperties;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// `GetMotionStatus` 返回值
#[derive(Debug, Deserialize)]
struct MotionStatus {
    moving: bool,
    position: i64,
    limit: u8,
}

/// 一次硬件轮询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// 未轮询（未初始化或链路不可用）
    Skipped,
    /// 无变化
    Idle,
    /// 运动完成（Moving → On）
    MotionComplete,
    /// 本次轮询锁存了故障
    FaultLatched,
    /// 故障信号仍在，已处于锁存
    FaultActive,
    /// 轮询失败
    Failed,
}

/// 本地缓存
#[derive(Debug, Clone)]
pub(crate) struct DeviceCache {
    pub structure: StructureParameters,
    pub motion: MoveParameters,
    pub scale: AxisScale,
    pub unit: Unit,
    pub power: bool,
    /// 最近一次显式设置的使能状态，恢复时按此重新上电
    pub power_intent: bool,
    pub brake_engaged: bool,
    pub position_steps: Option<i64>,
    pub lock_owner: Option<String>,
}

/// 锁存故障时通过指定连接执行的安全动作
struct LinkSafety<'a> {
    link: &'a Link,
    braked: AtomicBool,
}

impl<'a> LinkSafety<'a> {
    fn new(link: &'a Link) -> Self {
        Self {
            link,
            braked: AtomicBool::new(false),
        }
    }
}

impl SafetyActions for LinkSafety<'_> {
    fn stop_motion(&self) -> std::result::Result<(), DriverError> {
        self.link.call::<_, ()>("Stop", ())?;
        Ok(())
    }

    fn engage_brake(&self) -> std::result::Result<(), DriverError> {
        self.link.call::<_, ()>("SetBrake", true)?;
        self.braked.store(true, Ordering::Relaxed);
        Ok(())
    }
}

pub(crate) struct DeviceCore {
    pub name: String,
    pub class: String,
    pub ctx: Arc<SupervisorContext>,
    pub gate: CommandGate,
    pub profile: DeviceProfile,
    pub has_brake: bool,
    pub properties: DeviceProperties,
    pub log: EventLog,
    restore: RestoreCoordinator,
    command_lock: Mutex<()>,
    cache: RwLock<DeviceCache>,
}

impl DeviceCore {
    pub fn new(
        ctx: Arc<SupervisorContext>,
        profile: DeviceProfile,
        has_brake: bool,
        properties: DeviceProperties,
        cache: DeviceCache,
    ) -> Self {
        Self {
            name: properties.device.name.clone(),
            class: properties.device.class.clone(),
            restore: RestoreCoordinator::new(ctx.clone()),
            ctx,
            gate: CommandGate::new(),
            profile,
            has_brake,
            properties,
            log: EventLog::default(),
            command_lock: Mutex::new(()),
            cache: RwLock::new(cache),
        }
    }

    pub fn cache(&self) -> DeviceCache {
        self.cache.read().clone()
    }

    pub fn update_cache(&self, update: impl FnOnce(&mut DeviceCache)) {
        update(&mut self.cache.write());
    }

    // ==================== 门控与执行 ====================

    /// 状态门控（纯检查，不加命令锁）
    pub fn check_gate(&self, operation: Operation) -> Result<()> {
        let state = self.ctx.machine.state();
        self.gate.check(operation, state).map_err(|err| {
            SupervisorMetrics::bump(&self.ctx.metrics.gate_rejections);
            debug!("{}", err);
            StageError::from(err)
        })
    }

    fn check_lockout(&self, operation: Operation) -> Result<()> {
        if !operation.blocked_by_lockout() {
            return Ok(());
        }
        match self.cache.read().lock_owner.as_ref() {
            Some(owner) => Err(StageError::Locked {
                owner: owner.clone(),
            }),
            None => Ok(()),
        }
    }

    /// 在命令处理上下文中执行操作
    ///
    /// 顺序：命令锁 → 状态门控 → 锁定检查 → 待恢复处理 → 操作本身。
    pub fn execute<T>(&self, operation: Operation, body: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let _guard = self.command_lock.lock();
        self.check_gate(operation)?;
        self.check_lockout(operation)?;
        self.restore_if_pending();

        let result = body(self);
        match &result {
            Ok(_) => {
                SupervisorMetrics::bump(&self.ctx.metrics.commands_executed);
                self.log.info(format!("{operation} ok"));
            },
            Err(err) => {
                SupervisorMetrics::bump(&self.ctx.metrics.commands_failed);
                warn!("{} failed: {}", operation, err);
                self.log.warn(format!("{operation} failed: {err}"));
            },
        }
        result
    }

    fn restore_if_pending(&self) -> RestoreOutcome {
        let outcome = self.restore.run(self);
        match outcome {
            RestoreOutcome::NotNeeded => {},
            RestoreOutcome::Restored => self.log.info("Restore after reconnect complete"),
            RestoreOutcome::Retrying { attempt } => {
                self.log.warn(format!("Restore attempt {attempt} failed, retrying"))
            },
            RestoreOutcome::Abandoned => {
                self.log.error("Restore abandoned until next reconnect")
            },
        }
        outcome
    }

    // ==================== 链路访问 ====================

    /// 主远程连接（快速失败；链路断开时强制进入 Fault）
    pub fn primary_link(&self) -> Result<Arc<Link>> {
        self.ctx.primary_link().map_err(|err| self.unavailable(err))
    }

    /// 编码器句柄与连接（未配置编码器时返回 None）
    pub fn encoder_link(&self) -> Result<Option<(&Arc<ProxyHandle>, Arc<Link>)>> {
        let Some(handle) = self.ctx.encoder() else {
            return Ok(None);
        };
        let link = self.ctx.encoder_link().map_err(|err| self.unavailable(err))?;
        Ok(link.map(|link| (handle, link)))
    }

    fn unavailable(&self, err: DriverError) -> StageError {
        if !self.ctx.health.is_reachable() {
            self.ctx
                .machine
                .force_fault(format!("Hardware unavailable: {err}"));
        }
        err.into()
    }

    /// 调用远程命令并处理失败
    pub fn call<A, T>(&self, handle: &ProxyHandle, link: &Link, command: &str, args: A) -> Result<T>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        link.call(command, args)
            .map_err(|err| self.command_failure(handle, link, err))
    }

    /// 命令路径上的链路失败
    ///
    /// - 连接失败：清空句柄、标记不健康、强制 Fault
    /// - 硬件报错：清空句柄、标记不健康，远程错误文本原样上报
    pub fn command_failure(&self, handle: &ProxyHandle, link: &Link, err: LinkError) -> StageError {
        if err.is_connection_failure() {
            self.ctx.on_link_failure(handle, link, &err);
            let message = format!("Connection to {} lost: {}", handle.remote(), err);
            self.log.error(&message);
            self.ctx.machine.force_fault(message);
        } else if err.is_hardware() {
            self.ctx.on_link_failure(handle, link, &err);
        }
        err.into()
    }

    // ==================== 故障 ====================

    /// 锁存故障，返回本次是否锁存
    pub fn trip_fault(&self, link: &Link, code: FaultCode, message: String) -> bool {
        let safety = LinkSafety::new(link);
        let tripped = self.ctx.latch_fault(code, message.clone(), &safety);
        if tripped {
            self.log.error(format!("Fault latched: {message}"));
            if safety.braked.load(Ordering::Relaxed) {
                self.cache.write().brake_engaged = true;
            }
        }
        tripped
    }

    // ==================== 换算 ====================

    pub fn to_unit(&self, steps: i64) -> f64 {
        let cache = self.cache.read();
        cache.scale.from_steps(steps as f64, cache.unit)
    }

    pub fn encoder_to_steps(&self, counts: i64) -> i64 {
        (counts as f64 * self.properties.axis.encoder_scale).round() as i64
    }

    // ==================== 初始化 ====================

    /// 下发参数、读取上电/抱闸/位置，并完成 Unknown | Off → On | Off
    ///
    /// 处于 Fault 时只重新下发参数，离开 Fault 必须复位。
    pub fn initialize(&self) -> Result<DeviceState> {
        let link = self.primary_link()?;
        let primary = self.ctx.primary();
        let cache = self.cache();

        self.call::<_, ()>(primary, &link, "ApplyStructureParameters", cache.structure)?;
        self.call::<_, ()>(primary, &link, "ApplyMoveParameters", cache.motion)?;
        let power: bool = self.call(primary, &link, "GetPowerStatus", ())?;
        let brake_engaged: bool = if self.has_brake {
            self.call(primary, &link, "GetBrakeStatus", ())?
        } else {
            false
        };
        let position: i64 = self.call(primary, &link, "GetPosition", ())?;

        self.update_cache(|cache| {
            cache.power = power;
            cache.power_intent = power;
            cache.brake_engaged = brake_engaged;
            cache.position_steps = Some(position);
        });

        if self.ctx.machine.state() == DeviceState::Fault {
            warn!("Init in FAULT: parameters applied, reset required");
            self.log.warn("Init in FAULT: parameters applied, reset required");
        } else {
            self.ctx.machine.on_connected(power);
        }
        Ok(self.ctx.machine.state())
    }

    // ==================== 定时任务 ====================

    /// 命令上下文定时任务：执行待恢复，连接就绪后自动初始化
    pub fn tick(&self) -> RestoreOutcome {
        let _guard = self.command_lock.lock();
        let outcome = self.restore_if_pending();

        if self.properties.device.auto_init
            && self.ctx.machine.state() == DeviceState::Unknown
            && self.ctx.health.is_healthy()
        {
            match self.initialize() {
                Ok(state) => {
                    info!("{} initialized ({})", self.name, state);
                    self.log.info(format!("Initialized ({state})"));
                },
                Err(err) => warn!("Automatic init of {} failed: {}", self.name, err),
            }
        }
        outcome
    }

    /// 硬件轮询：运动完成检测与限位故障锁存
    pub fn poll(&self) -> PollOutcome {
        let _guard = self.command_lock.lock();
        if self.ctx.machine.state() == DeviceState::Unknown {
            return PollOutcome::Skipped;
        }
        let Ok(link) = self.ctx.primary_link() else {
            return PollOutcome::Skipped;
        };

        let status: MotionStatus =
            match self.call(self.ctx.primary(), &link, "GetMotionStatus", ()) {
                Ok(status) => status,
                Err(err) => {
                    debug!("Motion status poll failed: {}", err);
                    return PollOutcome::Failed;
                },
            };
        self.cache.write().position_steps = Some(status.position);

        let reading = decode_limit(status.limit, self.properties.safety.limit_polarity);
        if reading.is_fault() {
            return if self.trip_fault(&link, reading.code, reading.message) {
                PollOutcome::FaultLatched
            } else {
                PollOutcome::FaultActive
            };
        }

        if !status.moving && self.ctx.machine.on_motion_complete() {
            self.log.info("Motion complete");
            return PollOutcome::MotionComplete;
        }
        PollOutcome::Idle
    }
}

impl RestoreSteps for DeviceCore {
    fn apply_configuration(&self, link: &Link) -> std::result::Result<(), DriverError> {
        let cache = self.cache();
        link.call::<_, ()>("ApplyStructureParameters", cache.structure)?;
        link.call::<_, ()>("ApplyMoveParameters", cache.motion)?;
        Ok(())
    }

    fn restore_power(&self, link: &Link) -> std::result::Result<(), DriverError> {
        if !(self.properties.safety.power_on_restore && self.cache.read().power_intent) {
            return Ok(());
        }
        // 锁存的故障已经停机抱闸，只有复位可以重新上电
        if self.ctx.latch.is_latched() {
            info!("Fault latched, leaving power and brake to reset");
            return Ok(());
        }
        link.call::<_, ()>("SetPower", true)?;
        if self.has_brake {
            link.call::<_, ()>("SetBrake", false)?;
        }
        let has_brake = self.has_brake;
        self.update_cache(|cache| {
            cache.power = true;
            if has_brake {
                cache.brake_engaged = false;
            }
        });
        Ok(())
    }

    fn restore_position(&self, link: &Link) -> std::result::Result<(), DriverError> {
        let steps = match self.ctx.encoder() {
            Some(handle) => {
                let encoder = handle
                    .get()
                    .ok_or_else(|| DriverError::unavailable(handle.remote(), "no connection"))?;
                let counts: i64 = encoder.call("GetPosition", ())?;
                let steps = self.encoder_to_steps(counts);
                link.call::<_, ()>("SetPosition", steps)?;
                steps
            },
            None => link.call("GetPosition", ())?,
        };
        self.cache.write().position_steps = Some(steps);
        Ok(())
    }
}
