//! 监控上下文
//!
//! 设备生命周期内由命令路径、健康监控线程与轮询线程共享的状态：
//! 连接句柄、连接工厂（真实/仿真）、健康标志、待恢复标志、
//! 状态机、故障锁存器与运行指标。

use crate::DriverError;
use crate::fault::{FaultLatch, SafetyActions};
use crate::health::{ConnectionHealth, PendingRestore};
use crate::metrics::SupervisorMetrics;
use crate::state::DeviceStateMachine;
use smallvec::SmallVec;
use stage_link::{Link, LinkError, ProxyHandle, RemoteConnector, SimConnector};
use stage_protocol::FaultCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// 上下文配置
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// 主远程（运动控制器）
    pub primary: String,
    /// 编码器远程（可选）
    pub encoder: Option<String>,
    /// 单次命令调用超时
    pub call_timeout: Duration,
    /// 恢复重试上限
    pub max_restore_retries: u32,
    /// 故障锁存时是否抱闸
    pub engage_brake_on_fault: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            primary: "stage/motion".to_string(),
            encoder: None,
            call_timeout: Duration::from_millis(800),
            max_restore_retries: 3,
            engage_brake_on_fault: false,
        }
    }
}

/// 监控上下文
pub struct SupervisorContext {
    /// 第 0 个为主远程
    handles: SmallVec<[Arc<ProxyHandle>; 2]>,
    has_encoder: bool,
    real: Option<Arc<dyn RemoteConnector>>,
    sim: Arc<SimConnector>,
    simulated: AtomicBool,
    backend_epoch: AtomicU64,
    pub health: ConnectionHealth,
    pub pending: PendingRestore,
    pub machine: DeviceStateMachine,
    pub latch: FaultLatch,
    pub metrics: SupervisorMetrics,
}

impl SupervisorContext {
    /// 创建上下文
    ///
    /// 没有提供真实连接工厂时强制使用仿真后端。
    pub fn new(
        config: ContextConfig,
        real: Option<Arc<dyn RemoteConnector>>,
        sim: Arc<SimConnector>,
        simulated: bool,
    ) -> Self {
        let mut handles = SmallVec::new();
        handles.push(Arc::new(ProxyHandle::new(config.primary, config.call_timeout)));
        if let Some(encoder) = config.encoder.as_ref() {
            handles.push(Arc::new(ProxyHandle::new(encoder.clone(), config.call_timeout)));
        }

        let simulated = simulated || real.is_none();
        Self {
            handles,
            has_encoder: config.encoder.is_some(),
            real,
            sim,
            simulated: AtomicBool::new(simulated),
            backend_epoch: AtomicU64::new(0),
            health: ConnectionHealth::new(),
            pending: PendingRestore::new(config.max_restore_retries),
            machine: DeviceStateMachine::new(),
            latch: FaultLatch::new(config.engage_brake_on_fault),
            metrics: SupervisorMetrics::new(),
        }
    }

    // ==================== 连接句柄 ====================

    /// 主远程句柄
    pub fn primary(&self) -> &Arc<ProxyHandle> {
        &self.handles[0]
    }

    /// 编码器远程句柄
    pub fn encoder(&self) -> Option<&Arc<ProxyHandle>> {
        if self.has_encoder { self.handles.get(1) } else { None }
    }

    /// 所有远程句柄（主远程在前）
    pub fn handles(&self) -> &[Arc<ProxyHandle>] {
        &self.handles
    }

    /// 所有远程是否都持有连接
    pub fn all_connected(&self) -> bool {
        self.handles.iter().all(|handle| handle.is_connected())
    }

    /// 命令路径获取主远程连接
    ///
    /// 只读原子标志，不做网络 IO。连接不健康（含待恢复）时快速失败。
    pub fn primary_link(&self) -> Result<Arc<Link>, DriverError> {
        self.healthy_link(self.primary())
    }

    /// 命令路径获取编码器连接（未配置编码器时返回 None）
    pub fn encoder_link(&self) -> Result<Option<Arc<Link>>, DriverError> {
        match self.encoder() {
            Some(handle) => self.healthy_link(handle).map(Some),
            None => Ok(None),
        }
    }

    fn healthy_link(&self, handle: &ProxyHandle) -> Result<Arc<Link>, DriverError> {
        if !self.health.is_reachable() {
            return Err(DriverError::unavailable(handle.remote(), "connection down"));
        }
        if self.pending.is_pending() {
            return Err(DriverError::unavailable(handle.remote(), "restore pending"));
        }
        handle
            .get()
            .ok_or_else(|| DriverError::unavailable(handle.remote(), "no connection"))
    }

    /// 命令路径上的链路失败
    ///
    /// 连接类失败与硬件报错都会清掉该连接并标记为不健康，
    /// 由监控线程负责重建。
    pub fn on_link_failure(&self, handle: &ProxyHandle, link: &Link, err: &LinkError) {
        if handle.reset_if_current(link) {
            warn!("Dropping connection to {} after failure: {}", handle.remote(), err);
        }
        self.health.mark_unhealthy();
    }

    // ==================== 后端切换 ====================

    /// 当前是否使用仿真后端
    pub fn is_simulated(&self) -> bool {
        self.simulated.load(Ordering::Acquire)
    }

    /// 仿真连接工厂
    pub fn sim(&self) -> &Arc<SimConnector> {
        &self.sim
    }

    /// 当前使用的连接工厂
    pub fn connector(&self) -> Arc<dyn RemoteConnector> {
        match (&self.real, self.is_simulated()) {
            (Some(real), false) => real.clone(),
            _ => self.sim.clone() as Arc<dyn RemoteConnector>,
        }
    }

    /// 后端代数，每次切换加 1
    pub fn backend_epoch(&self) -> u64 {
        self.backend_epoch.load(Ordering::Acquire)
    }

    /// 切换真实/仿真后端
    ///
    /// 清空所有句柄并标记为不健康，由监控线程按新后端重建。
    /// 返回是否发生了切换。
    pub fn switch_backend(&self, simulated: bool) -> Result<bool, DriverError> {
        if !simulated && self.real.is_none() {
            return Err(DriverError::NoBackend);
        }
        if self.simulated.swap(simulated, Ordering::AcqRel) == simulated {
            return Ok(false);
        }
        self.backend_epoch.fetch_add(1, Ordering::AcqRel);
        for handle in &self.handles {
            handle.reset();
        }
        self.health.mark_unhealthy();
        info!(
            "Switched to {} backend",
            if simulated { "simulated" } else { "hardware" }
        );
        Ok(true)
    }

    // ==================== 故障 ====================

    /// 锁存故障并计数
    pub fn latch_fault(
        &self,
        code: FaultCode,
        message: impl Into<String>,
        actions: &dyn SafetyActions,
    ) -> bool {
        let tripped = self.latch.trip(code, message, &self.machine, actions);
        if tripped {
            SupervisorMetrics::bump(&self.metrics.faults_latched);
        }
        tripped
    }
}

impl std::fmt::Debug for SupervisorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorContext")
            .field("handles", &self.handles)
            .field("simulated", &self.is_simulated())
            .field("state", &self.machine.state())
            .field("healthy", &self.health.is_healthy())
            .field("pending", &self.pending.is_pending())
            .finish()
    }
}
