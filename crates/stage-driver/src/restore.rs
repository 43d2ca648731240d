//! 重连后的延迟恢复
//!
//! 主远程重连后，控制器可能已经丢失配置与使能状态。
//! 监控线程只负责设置待恢复标志，真正的恢复在命令处理上下文中执行：
//!
//! 1. 重新下发缓存的结构/运动参数
//! 2. 按之前的使能意图重新上电，配置了抱闸时松闸
//! 3. 读取编码器位置并写回主远程
//!
//! 任一步失败即中止。连接在恢复开始时读取一次，
//! 步骤之间若发现连接已被替换则以 `HandleChanged` 失败。

use crate::DriverError;
use crate::context::SupervisorContext;
use crate::metrics::SupervisorMetrics;
use stage_link::Link;
use std::sync::Arc;
use tracing::{info, warn};

/// 恢复步骤
///
/// 由客户端层实现（它持有参数缓存与单位换算）。
pub trait RestoreSteps {
    /// 重新下发结构/运动参数
    fn apply_configuration(&self, link: &Link) -> Result<(), DriverError>;

    /// 恢复上电与抱闸状态
    fn restore_power(&self, link: &Link) -> Result<(), DriverError>;

    /// 同步编码器位置
    fn restore_position(&self, link: &Link) -> Result<(), DriverError>;
}

/// 一次恢复调用的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// 无待恢复，或连接尚未恢复
    NotNeeded,
    /// 恢复成功
    Restored,
    /// 失败，已重新排队
    Retrying { attempt: u32 },
    /// 达到重试上限，放弃直到下次重连
    Abandoned,
}

/// 恢复协调器
#[derive(Debug, Clone)]
pub struct RestoreCoordinator {
    ctx: Arc<SupervisorContext>,
}

impl RestoreCoordinator {
    pub fn new(ctx: Arc<SupervisorContext>) -> Self {
        Self { ctx }
    }

    /// 有待恢复且连接已恢复时执行恢复
    ///
    /// 只能在命令处理上下文中调用（调用方持有命令锁）。
    pub fn run(&self, steps: &dyn RestoreSteps) -> RestoreOutcome {
        let ctx = &self.ctx;
        if !ctx.pending.is_pending() || !ctx.health.is_reachable() {
            return RestoreOutcome::NotNeeded;
        }
        let Some(link) = ctx.primary().get() else {
            return RestoreOutcome::NotNeeded;
        };
        if !ctx.pending.take() {
            return RestoreOutcome::NotNeeded;
        }

        SupervisorMetrics::bump(&ctx.metrics.restore_attempts);
        info!("Restoring {} after reconnect", link.remote());

        match self.execute(&link, steps) {
            Ok(()) => {
                ctx.pending.reset_retries();
                ctx.health
                    .publish(ctx.all_connected(), ctx.pending.is_pending());
                info!("Restore of {} complete", link.remote());
                RestoreOutcome::Restored
            },
            Err(e) => self.on_failure(&link, e),
        }
    }

    fn execute(&self, link: &Link, steps: &dyn RestoreSteps) -> Result<(), DriverError> {
        steps.apply_configuration(link)?;
        self.ensure_current(link)?;
        steps.restore_power(link)?;
        self.ensure_current(link)?;
        steps.restore_position(link)?;
        self.ensure_current(link)
    }

    fn ensure_current(&self, link: &Link) -> Result<(), DriverError> {
        if self.ctx.primary().is_current(link) {
            Ok(())
        } else {
            Err(DriverError::HandleChanged(link.remote().to_string()))
        }
    }

    fn on_failure(&self, link: &Link, err: DriverError) -> RestoreOutcome {
        let ctx = &self.ctx;
        SupervisorMetrics::bump(&ctx.metrics.restore_failures);
        if err.is_connection_failure() {
            ctx.primary().reset_if_current(link);
            ctx.health.mark_unhealthy();
        }

        let attempt = ctx.pending.record_failure();
        let max = ctx.pending.max_retries();
        if attempt < max {
            ctx.pending.set_pending();
            ctx.health.publish(ctx.all_connected(), true);
            warn!("Restore attempt {}/{} failed: {}", attempt, max, err);
            RestoreOutcome::Retrying { attempt }
        } else {
            ctx.pending.reset_retries();
            ctx.pending.clear();
            SupervisorMetrics::bump(&ctx.metrics.restores_abandoned);
            // 连接本身仍然可用时保留句柄，否则监控线程会立即重连并再次排队恢复
            ctx.health.publish(ctx.all_connected(), false);
            warn!(
                "Restore abandoned after {} attempts: {} (waiting for next reconnect)",
                attempt, err
            );
            RestoreOutcome::Abandoned
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;
    use parking_lot::Mutex;
    use stage_link::SimConnector;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedSteps {
        fail_power: Mutex<u32>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl RestoreSteps for ScriptedSteps {
        fn apply_configuration(&self, _link: &Link) -> Result<(), DriverError> {
            self.calls.lock().push("configuration");
            Ok(())
        }

        fn restore_power(&self, _link: &Link) -> Result<(), DriverError> {
            self.calls.lock().push("power");
            let mut remaining = self.fail_power.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::RestoreStep {
                    step: "power",
                    reason: "amplifier not ready".to_string(),
                });
            }
            Ok(())
        }

        fn restore_position(&self, _link: &Link) -> Result<(), DriverError> {
            self.calls.lock().push("position");
            Ok(())
        }
    }

    fn connected_context(max_retries: u32) -> Arc<SupervisorContext> {
        let config = ContextConfig {
            max_restore_retries: max_retries,
            ..Default::default()
        };
        let ctx = Arc::new(SupervisorContext::new(
            config,
            None,
            Arc::new(SimConnector::new()),
            true,
        ));
        let connector = ctx.connector();
        ctx.primary()
            .rebuild(connector.as_ref(), Duration::from_millis(300))
            .unwrap();
        ctx.pending.set_pending();
        ctx.health.publish(true, true);
        ctx
    }

    #[test]
    fn test_not_needed_without_pending() {
        let ctx = connected_context(3);
        ctx.pending.clear();
        let steps = ScriptedSteps::default();
        assert_eq!(RestoreCoordinator::new(ctx).run(&steps), RestoreOutcome::NotNeeded);
        assert!(steps.calls.lock().is_empty());
    }

    #[test]
    fn test_not_needed_while_link_down() {
        let ctx = connected_context(3);
        ctx.health.mark_unhealthy();
        let steps = ScriptedSteps::default();
        assert_eq!(
            RestoreCoordinator::new(ctx.clone()).run(&steps),
            RestoreOutcome::NotNeeded
        );
        // 待恢复标志保留
        assert!(ctx.pending.is_pending());
    }

    #[test]
    fn test_restore_success_marks_healthy() {
        let ctx = connected_context(3);
        let steps = ScriptedSteps::default();
        assert_eq!(
            RestoreCoordinator::new(ctx.clone()).run(&steps),
            RestoreOutcome::Restored
        );
        assert_eq!(*steps.calls.lock(), vec!["configuration", "power", "position"]);
        assert!(!ctx.pending.is_pending());
        assert!(ctx.health.is_healthy());
        assert_eq!(ctx.pending.retry_count(), 0);
    }

    #[test]
    fn test_failure_aborts_remaining_steps_and_retries() {
        let ctx = connected_context(3);
        let steps = ScriptedSteps {
            fail_power: Mutex::new(1),
            ..Default::default()
        };
        let coordinator = RestoreCoordinator::new(ctx.clone());

        assert_eq!(coordinator.run(&steps), RestoreOutcome::Retrying { attempt: 1 });
        assert_eq!(*steps.calls.lock(), vec!["configuration", "power"]);
        assert!(ctx.pending.is_pending());
        assert!(!ctx.health.is_healthy());

        assert_eq!(coordinator.run(&steps), RestoreOutcome::Restored);
        assert_eq!(ctx.pending.retry_count(), 0);
        assert!(ctx.health.is_healthy());
    }

    #[test]
    fn test_abandon_at_bound() {
        let ctx = connected_context(3);
        let steps = ScriptedSteps {
            fail_power: Mutex::new(u32::MAX),
            ..Default::default()
        };
        let coordinator = RestoreCoordinator::new(ctx.clone());

        assert_eq!(coordinator.run(&steps), RestoreOutcome::Retrying { attempt: 1 });
        assert_eq!(coordinator.run(&steps), RestoreOutcome::Retrying { attempt: 2 });
        assert_eq!(coordinator.run(&steps), RestoreOutcome::Abandoned);

        assert!(!ctx.pending.is_pending());
        assert_eq!(ctx.pending.retry_count(), 0);
        // 连接仍然存活，保留句柄
        assert!(ctx.primary().get().is_some());
        assert!(ctx.health.is_healthy());
        assert_eq!(ctx.metrics.snapshot().restores_abandoned, 1);

        // 放弃之后不再尝试
        assert_eq!(coordinator.run(&steps), RestoreOutcome::NotNeeded);
    }

    struct SwappingSteps {
        ctx: Arc<SupervisorContext>,
    }

    impl RestoreSteps for SwappingSteps {
        fn apply_configuration(&self, _link: &Link) -> Result<(), DriverError> {
            // 模拟监控线程在恢复期间重建了连接
            let connector = self.ctx.connector();
            self.ctx
                .primary()
                .rebuild(connector.as_ref(), Duration::from_millis(300))?;
            Ok(())
        }

        fn restore_power(&self, _link: &Link) -> Result<(), DriverError> {
            panic!("must not run after handle change");
        }

        fn restore_position(&self, _link: &Link) -> Result<(), DriverError> {
            panic!("must not run after handle change");
        }
    }

    #[test]
    fn test_handle_change_aborts_restore() {
        let ctx = connected_context(3);
        let steps = SwappingSteps { ctx: ctx.clone() };
        let outcome = RestoreCoordinator::new(ctx.clone()).run(&steps);
        assert_eq!(outcome, RestoreOutcome::Retrying { attempt: 1 });
        assert!(ctx.pending.is_pending());
    }
}
