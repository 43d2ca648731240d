//! 故障锁存
//!
//! 限位触发或运动命令硬件报错时锁存故障。锁存只发生一次：
//! 轮询线程与命令路径共享同一个原子 test-and-set，
//! 只有赢得竞争的一方执行停止运动与抱闸。
//! 解除锁存只能通过显式复位。

use crate::DriverError;
use crate::state::DeviceStateMachine;
use parking_lot::Mutex;
use serde::Serialize;
use stage_protocol::FaultCode;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

/// 锁存时执行的安全动作
///
/// 均为尽力而为：失败只记录日志，不影响锁存结果。
pub trait SafetyActions {
    /// 停止运动
    fn stop_motion(&self) -> Result<(), DriverError>;

    /// 抱闸
    fn engage_brake(&self) -> Result<(), DriverError>;
}

/// 故障记录
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FaultRecord {
    pub latched: bool,
    pub code: FaultCode,
    pub message: String,
}

/// 故障锁存器
#[derive(Debug)]
pub struct FaultLatch {
    latched: AtomicBool,
    record: Mutex<FaultRecord>,
    engage_brake: bool,
}

impl FaultLatch {
    /// 创建锁存器
    ///
    /// `engage_brake` 为 true 时锁存后抱闸（设备带抱闸时配置）。
    pub fn new(engage_brake: bool) -> Self {
        Self {
            latched: AtomicBool::new(false),
            record: Mutex::new(FaultRecord::default()),
            engage_brake,
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    /// 当前故障记录
    pub fn record(&self) -> FaultRecord {
        self.record.lock().clone()
    }

    /// 锁存故障
    ///
    /// 只有第一次调用返回 true 并执行安全动作，
    /// 已锁存时直接返回 false。
    pub fn trip(
        &self,
        code: FaultCode,
        message: impl Into<String>,
        machine: &DeviceStateMachine,
        actions: &dyn SafetyActions,
    ) -> bool {
        if self
            .latched
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let message = message.into();
        {
            let mut record = self.record.lock();
            record.latched = true;
            record.code = code;
            record.message = message.clone();
        }
        error!("Fault latched ({}): {}", code, message);
        machine.force_fault(message);

        if let Err(e) = actions.stop_motion() {
            warn!("Stop after fault latch failed: {}", e);
        }
        if self.engage_brake
            && let Err(e) = actions.engage_brake()
        {
            warn!("Brake engagement after fault latch failed: {}", e);
        }
        true
    }

    /// 解除锁存（仅由复位调用），返回之前是否处于锁存
    pub fn clear(&self) -> bool {
        let mut record = self.record.lock();
        *record = FaultRecord::default();
        self.latched.swap(false, Ordering::AcqRel)
    }
}
