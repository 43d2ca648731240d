//! 健康监控线程
//!
//! 独立于命令流量，按固定周期：
//! 1. 探测所有已持有的连接，失败则清空句柄并标记为不健康
//! 2. 达到重连间隔且存在断开的远程时逐个重建；主远程重连成功后设置待恢复
//! 3. 发布 `healthy = 全部可达 && !待恢复`（仅在变化时）
//!
//! 监控线程从不向硬件写入任何带副作用的命令。
//!
//! 测试中可以关闭线程，直接调用 [`HealthMonitor::run_cycle`] 驱动单个周期。

use crate::DriverError;
use crate::backoff::BackoffPolicy;
use crate::context::SupervisorContext;
use crate::metrics::SupervisorMetrics;
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use stage_protocol::DeviceState;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 监控配置
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// 监控周期
    pub period: Duration,
    /// 存活探测超时
    pub ping_timeout: Duration,
    /// 重连超时
    pub reconnect_timeout: Duration,
    /// 重连退避策略
    pub backoff: BackoffPolicy,
    /// 是否启动后台线程（默认启用）
    pub enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(500),
            ping_timeout: Duration::from_millis(300),
            reconnect_timeout: Duration::from_millis(500),
            backoff: BackoffPolicy::default(),
            enabled: true,
        }
    }
}

/// 单个监控周期的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 本周期探测失败而断开的远程
    pub lost: Vec<String>,
    /// 本周期是否进行了重连尝试
    pub attempted: bool,
    /// 本周期重连成功的远程
    pub reconnected: Vec<String>,
    /// 本周期是否设置了待恢复
    pub restore_scheduled: bool,
    /// 本周期 healthy 标志是否变化
    pub health_changed: bool,
}

/// 健康监控器
///
/// 在后台线程中持续维护连接；Drop 时停止并等待线程退出。
pub struct HealthMonitor {
    ctx: Arc<SupervisorContext>,
    config: MonitorConfig,
    shutdown: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl HealthMonitor {
    /// 启动健康监控
    ///
    /// `config.enabled == false` 时不启动线程，只能通过 `run_cycle` 驱动。
    ///
    /// # 错误
    /// 线程创建失败时返回 `DriverError::Thread`。
    pub fn start(ctx: Arc<SupervisorContext>, config: MonitorConfig) -> Result<Self, DriverError> {
        if !config.enabled {
            return Ok(Self {
                ctx,
                config,
                shutdown: None,
                handle: None,
            });
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let thread_ctx = ctx.clone();
        let thread_config = config.clone();
        let handle = thread::Builder::new()
            .name("stage-health".to_string())
            .spawn(move || {
                info!("Health monitor started (period {:?})", thread_config.period);
                loop {
                    Self::cycle(&thread_ctx, &thread_config, Instant::now());
                    match shutdown_rx.recv_timeout(thread_config.period) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        // 收到停止信号或发送端已释放
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Health monitor stopped");
            })
            .map_err(|e| DriverError::Thread(format!("failed to spawn health monitor: {e}")))?;

        Ok(Self {
            ctx,
            config,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// 监控配置
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// 后台线程是否在运行
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// 手动执行一个监控周期
    pub fn run_cycle(&self, now: Instant) -> CycleReport {
        Self::cycle(&self.ctx, &self.config, now)
    }

    /// 停止后台线程并等待退出
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Health monitor thread panicked");
        }
    }

    fn cycle(ctx: &SupervisorContext, config: &MonitorConfig, now: Instant) -> CycleReport {
        let mut report = CycleReport::default();

        // 1. 探测已持有的连接
        for handle in ctx.handles() {
            let Some(link) = handle.get() else {
                continue;
            };
            SupervisorMetrics::bump(&ctx.metrics.pings);
            match link.ping(config.ping_timeout) {
                Ok(()) => trace!("Ping {} ok", handle.remote()),
                Err(e) => {
                    SupervisorMetrics::bump(&ctx.metrics.ping_failures);
                    warn!("Ping {} failed: {}", handle.remote(), e);
                    if handle.reset_if_current(&link) {
                        report.lost.push(handle.remote().to_string());
                    }
                },
            }
        }

        if let Some(remote) = report.lost.first() {
            ctx.health.mark_unhealthy();
            if matches!(
                ctx.machine.state(),
                DeviceState::On | DeviceState::Off | DeviceState::Moving
            ) {
                ctx.machine.force_fault(format!("Connection to {remote} lost"));
            }
        }

        // 2. 重连
        if !ctx.all_connected() {
            let interval = config.backoff.interval_for(ctx.health.consecutive_failures());
            let due = ctx
                .health
                .last_attempt()
                .is_none_or(|last| now.saturating_duration_since(last) >= interval);
            if due {
                Self::reconnect(ctx, config, now, &mut report);
            } else {
                trace!("Reconnect deferred (interval {:?})", interval);
            }
        }

        // 3. 发布健康状态
        report.health_changed = ctx
            .health
            .publish(ctx.all_connected(), ctx.pending.is_pending());
        report
    }

    fn reconnect(
        ctx: &SupervisorContext,
        config: &MonitorConfig,
        now: Instant,
        report: &mut CycleReport,
    ) {
        report.attempted = true;
        ctx.health.record_attempt(now);

        let epoch = ctx.backend_epoch();
        let connector = ctx.connector();
        let mut failed = false;

        for (index, handle) in ctx.handles().iter().enumerate() {
            if handle.is_connected() {
                continue;
            }
            SupervisorMetrics::bump(&ctx.metrics.reconnect_attempts);
            match handle.rebuild(connector.as_ref(), config.reconnect_timeout) {
                Ok(rebuilt) => {
                    // 重建期间切换了后端：丢弃按旧后端建立的连接
                    if ctx.backend_epoch() != epoch {
                        handle.reset_if_current(&rebuilt.link);
                        failed = true;
                        continue;
                    }
                    SupervisorMetrics::bump(&ctx.metrics.reconnect_successes);
                    report.reconnected.push(handle.remote().to_string());
                    if index == 0 && rebuilt.reconnect {
                        ctx.pending.set_pending();
                        report.restore_scheduled = true;
                        info!("Reconnected to {}, restore scheduled", handle.remote());
                    }
                },
                Err(e) => {
                    failed = true;
                    debug!("Reconnect to {} failed: {}", handle.remote(), e);
                },
            }
        }

        if failed {
            let failures = ctx.health.record_failure();
            if failures == config.backoff.threshold() + 1 {
                warn!(
                    "{} consecutive reconnect failures, backing off (cap {:?})",
                    failures,
                    config.backoff.cap()
                );
            }
        } else {
            ctx.health.reset_failures();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
