//! 监控指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 监控器运行指标
#[derive(Debug, Default)]
pub struct SupervisorMetrics {
    /// 存活探测次数
    pub pings: AtomicU64,
    /// 存活探测失败次数
    pub ping_failures: AtomicU64,
    /// 重连尝试次数（按远程计）
    pub reconnect_attempts: AtomicU64,
    /// 重连成功次数
    pub reconnect_successes: AtomicU64,
    /// 恢复尝试次数
    pub restore_attempts: AtomicU64,
    /// 恢复失败次数
    pub restore_failures: AtomicU64,
    /// 达到重试上限而放弃的恢复次数
    pub restores_abandoned: AtomicU64,
    /// 故障锁存次数
    pub faults_latched: AtomicU64,
    /// 被状态门控拒绝的命令数
    pub gate_rejections: AtomicU64,
    /// 执行成功的命令数
    pub commands_executed: AtomicU64,
    /// 执行失败的命令数
    pub commands_failed: AtomicU64,
}

impl SupervisorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计数器加 1
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取快照
    ///
    /// 各计数器分别读取，彼此之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pings: self.pings.load(Ordering::Relaxed),
            ping_failures: self.ping_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnect_successes: self.reconnect_successes.load(Ordering::Relaxed),
            restore_attempts: self.restore_attempts.load(Ordering::Relaxed),
            restore_failures: self.restore_failures.load(Ordering::Relaxed),
            restores_abandoned: self.restores_abandoned.load(Ordering::Relaxed),
            faults_latched: self.faults_latched.load(Ordering::Relaxed),
            gate_rejections: self.gate_rejections.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        for counter in [
            &self.pings,
            &self.ping_failures,
            &self.reconnect_attempts,
            &self.reconnect_successes,
            &self.restore_attempts,
            &self.restore_failures,
            &self.restores_abandoned,
            &self.faults_latched,
            &self.gate_rejections,
            &self.commands_executed,
            &self.commands_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub pings: u64,
    pub ping_failures: u64,
    pub reconnect_attempts: u64,
    pub reconnect_successes: u64,
    pub restore_attempts: u64,
    pub restore_failures: u64,
    pub restores_abandoned: u64,
    pub faults_latched: u64,
    pub gate_rejections: u64,
    pub commands_executed: u64,
    pub commands_failed: u64,
}

impl MetricsSnapshot {
    /// 存活探测失败率（0.0 ~ 1.0）
    pub fn ping_failure_rate(&self) -> f64 {
        if self.pings == 0 {
            0.0
        } else {
            self.ping_failures as f64 / self.pings as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = SupervisorMetrics::new();
        SupervisorMetrics::bump(&metrics.pings);
        SupervisorMetrics::bump(&metrics.pings);
        SupervisorMetrics::bump(&metrics.ping_failures);
        SupervisorMetrics::bump(&metrics.faults_latched);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pings, 2);
        assert_eq!(snapshot.faults_latched, 1);
        assert_eq!(snapshot.ping_failure_rate(), 0.5);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert_eq!(MetricsSnapshot::default().ping_failure_rate(), 0.0);
    }
}
