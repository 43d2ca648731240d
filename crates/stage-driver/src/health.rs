//! 连接健康状态与待恢复标志
//!
//! 两个标志分开维护：
//! - `reachable`: 所有远程当前都持有连接
//! - `healthy`: `reachable` 且没有待执行的恢复
//!
//! 命令路径只读这些原子标志，不做任何网络 IO。

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// 连接健康状态
#[derive(Debug, Default)]
pub struct ConnectionHealth {
    reachable: AtomicBool,
    healthy: AtomicBool,
    last_attempt: Mutex<Option<Instant>>,
    consecutive_failures: AtomicU32,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有远程是否都持有连接
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    /// 连接是否健康（可达且无待恢复）
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// 发布健康状态，只在变化时记录日志
    ///
    /// 返回 `healthy` 是否发生变化。
    pub fn publish(&self, reachable: bool, pending_restore: bool) -> bool {
        self.reachable.store(reachable, Ordering::Release);
        let healthy = reachable && !pending_restore;
        let previous = self.healthy.swap(healthy, Ordering::AcqRel);
        if previous != healthy {
            if healthy {
                info!("Connection healthy");
            } else if reachable {
                info!("Connection up, restore pending");
            } else {
                warn!("Connection unhealthy");
            }
        }
        previous != healthy
    }

    /// 标记为不可达（命令路径失败或切换后端时使用）
    pub fn mark_unhealthy(&self) {
        self.reachable.store(false, Ordering::Release);
        if self.healthy.swap(false, Ordering::AcqRel) {
            warn!("Connection marked unhealthy");
        }
    }

    /// 最近一次重连尝试的时间
    pub fn last_attempt(&self) -> Option<Instant> {
        *self.last_attempt.lock()
    }

    /// 记录一次重连尝试
    pub fn record_attempt(&self, now: Instant) {
        *self.last_attempt.lock() = Some(now);
    }

    /// 连续重连失败次数
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// 记录一轮重连失败，返回新的连续失败次数
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    /// 重连成功后清零
    pub fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }
}

/// 待恢复标志与重试计数
#[derive(Debug)]
pub struct PendingRestore {
    pending: AtomicBool,
    retry_count: AtomicU32,
    max_retries: u32,
}

impl PendingRestore {
    /// `max_retries` 至少为 1
    pub fn new(max_retries: u32) -> Self {
        Self {
            pending: AtomicBool::new(false),
            retry_count: AtomicU32::new(0),
            max_retries: max_retries.max(1),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// 设置待恢复（监控线程在主远程重连后调用）
    pub fn set_pending(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// 取走待恢复标志
    ///
    /// 恢复期间若又发生重连，标志会被重新设置，不会丢失。
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// 清除待恢复标志
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 记录一次失败，返回新的重试计数
    pub fn record_failure(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    /// 重试计数清零
    pub fn reset_retries(&self) {
        self.retry_count.store(0, Ordering::Relaxed);
    }
}

impl Default for PendingRestore {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_requires_reachable_and_no_pending() {
        let health = ConnectionHealth::new();
        assert!(!health.is_healthy());

        assert!(health.publish(true, false));
        assert!(health.is_healthy());
        // 未变化
        assert!(!health.publish(true, false));

        assert!(health.publish(true, true));
        assert!(health.is_reachable());
        assert!(!health.is_healthy());

        health.publish(true, false);
        health.mark_unhealthy();
        assert!(!health.is_reachable());
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_failure_counter() {
        let health = ConnectionHealth::new();
        assert_eq!(health.record_failure(), 1);
        assert_eq!(health.record_failure(), 2);
        assert_eq!(health.consecutive_failures(), 2);
        health.reset_failures();
        assert_eq!(health.consecutive_failures(), 0);

        let now = Instant::now();
        assert!(health.last_attempt().is_none());
        health.record_attempt(now);
        assert_eq!(health.last_attempt(), Some(now));
    }

    #[test]
    fn test_pending_take() {
        let pending = PendingRestore::new(3);
        assert!(!pending.take());
        pending.set_pending();
        assert!(pending.is_pending());
        assert!(pending.take());
        assert!(!pending.is_pending());

        assert_eq!(pending.record_failure(), 1);
        assert_eq!(pending.record_failure(), 2);
        pending.reset_retries();
        assert_eq!(pending.retry_count(), 0);
        assert_eq!(PendingRestore::new(0).max_retries(), 1);
    }
}
