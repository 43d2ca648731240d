//! 重连退避策略

use std::time::Duration;

/// 重连退避策略
///
/// 连续失败次数不超过 `threshold` 时按最小间隔重试；
/// 超出后每多失败一次间隔翻倍，直到 `cap`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    min_interval: Duration,
    threshold: u32,
    cap: Duration,
}

impl BackoffPolicy {
    /// 创建退避策略
    ///
    /// `cap` 小于 `min_interval` 时按 `min_interval` 处理。
    pub fn new(min_interval: Duration, threshold: u32, cap: Duration) -> Self {
        Self {
            min_interval,
            threshold,
            cap: cap.max(min_interval),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// 连续失败 `failures` 次之后的重试间隔
    pub fn interval_for(&self, failures: u32) -> Duration {
        let excess = failures.saturating_sub(self.threshold);
        if excess == 0 {
            return self.min_interval;
        }
        // 2^31 以上必然超过上限
        let factor = 1u32.checked_shl(excess.min(31)).unwrap_or(u32::MAX);
        self.min_interval
            .checked_mul(factor)
            .map_or(self.cap, |interval| interval.min(self.cap))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 5, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_interval_below_threshold() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), 3, Duration::from_secs(30));
        for failures in 0..=3 {
            assert_eq!(policy.interval_for(failures), Duration::from_secs(2));
        }
    }

    #[test]
    fn test_interval_doubles_then_caps() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), 3, Duration::from_secs(30));
        assert_eq!(policy.interval_for(4), Duration::from_secs(4));
        assert_eq!(policy.interval_for(5), Duration::from_secs(8));
        assert_eq!(policy.interval_for(6), Duration::from_secs(16));
        assert_eq!(policy.interval_for(7), Duration::from_secs(30));
        assert_eq!(policy.interval_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_cap_below_min_interval() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), 0, Duration::from_secs(1));
        assert_eq!(policy.cap(), Duration::from_secs(5));
        assert_eq!(policy.interval_for(10), Duration::from_secs(5));
    }

    proptest! {
        #[test]
        fn prop_intervals_non_decreasing_and_capped(
            min_ms in 1u64..5_000,
            threshold in 0u32..10,
            cap_ms in 1u64..120_000,
            failures in 0u32..200,
        ) {
            let policy = BackoffPolicy::new(
                Duration::from_millis(min_ms),
                threshold,
                Duration::from_millis(cap_ms),
            );
            let current = policy.interval_for(failures);
            let next = policy.interval_for(failures + 1);
            prop_assert!(next >= current);
            prop_assert!(next <= policy.cap());
            prop_assert!(current >= policy.min_interval());
        }
    }
}
