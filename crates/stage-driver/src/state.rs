//! 设备状态机
//!
//! 设备状态由命令路径与后台线程（监控、轮询）共同驱动，
//! 所有转换都是对同一个原子值的 CAS 操作，不需要额外的锁。
//!
//! ```text
//! Unknown --connect--> On | Off
//! On      --motion--->  Moving
//! Moving  --complete-> On
//! On|Off|Moving --fault--> Fault
//! Fault   --reset---->  On | Off
//! ```
//!
//! 连接失败可以从任何状态强制进入 Fault（包括 Unknown 下的初始化失败）。

use arc_swap::ArcSwap;
use stage_protocol::{DeviceState, StateSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{error, info};

/// 设备状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicDeviceState {
    inner: AtomicU8,
}

impl AtomicDeviceState {
    /// 创建新的原子状态
    pub fn new(state: DeviceState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    /// 获取当前状态
    pub fn get(&self, ordering: Ordering) -> DeviceState {
        DeviceState::from_u8(self.inner.load(ordering))
    }

    /// 设置状态，返回旧状态
    pub fn swap(&self, state: DeviceState, ordering: Ordering) -> DeviceState {
        DeviceState::from_u8(self.inner.swap(state.as_u8(), ordering))
    }

    /// 当前状态属于 `from` 时切换到 `to`
    ///
    /// 成功返回旧状态，失败返回当时的实际状态。
    pub fn transition(&self, from: StateSet, to: DeviceState) -> Result<DeviceState, DeviceState> {
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(DeviceState::from_u8(current)).then_some(to.as_u8())
            })
            .map(DeviceState::from_u8)
            .map_err(DeviceState::from_u8)
    }
}

impl Default for AtomicDeviceState {
    fn default() -> Self {
        Self::new(DeviceState::Unknown)
    }
}

const CONNECTABLE: StateSet = StateSet::of(&[DeviceState::Unknown, DeviceState::Off, DeviceState::On]);
const POWER_SWITCHABLE: StateSet = StateSet::of(&[DeviceState::Off, DeviceState::On, DeviceState::Moving]);
const ONLY_ON: StateSet = StateSet::of(&[DeviceState::On]);
const ONLY_MOVING: StateSet = StateSet::of(&[DeviceState::Moving]);

fn powered_state(powered: bool) -> DeviceState {
    if powered { DeviceState::On } else { DeviceState::Off }
}

/// 设备状态机
///
/// 持有当前状态与面向操作员的状态文本。
#[derive(Debug)]
pub struct DeviceStateMachine {
    state: AtomicDeviceState,
    status: ArcSwap<String>,
}

impl DeviceStateMachine {
    pub fn new() -> Self {
        Self {
            state: AtomicDeviceState::default(),
            status: ArcSwap::from_pointee("Device state unknown".to_string()),
        }
    }

    /// 当前状态
    pub fn state(&self) -> DeviceState {
        self.state.get(Ordering::Acquire)
    }

    /// 状态文本
    pub fn status(&self) -> Arc<String> {
        self.status.load_full()
    }

    fn set_status(&self, text: impl Into<String>) {
        self.status.store(Arc::new(text.into()));
    }

    fn apply(&self, from: StateSet, to: DeviceState, status: impl FnOnce() -> String) -> bool {
        match self.state.transition(from, to) {
            Ok(previous) => {
                self.set_status(status());
                if previous != to {
                    info!("Device state {} -> {}", previous, to);
                }
                true
            },
            Err(_) => false,
        }
    }

    /// 初始化/连接完成：Unknown | Off | On → On | Off
    ///
    /// Fault 与 Moving 下不做转换。
    pub fn on_connected(&self, powered: bool) -> bool {
        let to = powered_state(powered);
        self.apply(CONNECTABLE, to, || format!("Device is {to}"))
    }

    /// 上电/断电：Off | On | Moving → On | Off
    ///
    /// Moving 下只接受断电（运动随之停止）。
    pub fn on_power(&self, powered: bool) -> bool {
        if powered {
            self.apply(StateSet::of(&[DeviceState::Off, DeviceState::On]), DeviceState::On, || {
                "Device is ON".to_string()
            })
        } else {
            self.apply(POWER_SWITCHABLE, DeviceState::Off, || "Device is OFF".to_string())
        }
    }

    /// 运动命令被接受：On → Moving
    pub fn on_motion_accepted(&self) -> bool {
        self.apply(ONLY_ON, DeviceState::Moving, || "Device is MOVING".to_string())
    }

    /// 运动完成（或被停止）：Moving → On
    pub fn on_motion_complete(&self) -> bool {
        self.apply(ONLY_MOVING, DeviceState::On, || "Device is ON".to_string())
    }

    /// 强制进入 Fault，返回旧状态
    pub fn force_fault(&self, message: impl Into<String>) -> DeviceState {
        let message = message.into();
        let previous = self.state.swap(DeviceState::Fault, Ordering::AcqRel);
        if previous != DeviceState::Fault {
            error!("Device state {} -> FAULT: {}", previous, message);
        }
        self.set_status(message);
        previous
    }

    /// 复位：任意状态 → On | Off
    pub fn on_reset(&self, powered: bool) -> DeviceState {
        let to = powered_state(powered);
        let previous = self.state.swap(to, Ordering::AcqRel);
        self.set_status(format!("Device is {to}"));
        if previous != to {
            info!("Device state {} -> {} (reset)", previous, to);
        }
        previous
    }
}

impl Default for DeviceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_unknown() {
        let machine = DeviceStateMachine::new();
        assert_eq!(machine.state(), DeviceState::Unknown);
        assert!(machine.status().contains("unknown"));
    }

    #[test]
    fn test_connect_and_motion_cycle() {
        let machine = DeviceStateMachine::new();
        assert!(machine.on_connected(true));
        assert_eq!(machine.state(), DeviceState::On);

        assert!(machine.on_motion_accepted());
        assert_eq!(machine.state(), DeviceState::Moving);
        // Moving 下不能再次接受运动
        assert!(!machine.on_motion_accepted());

        assert!(machine.on_motion_complete());
        assert_eq!(machine.state(), DeviceState::On);
        assert!(!machine.on_motion_complete());
    }

    #[test]
    fn test_connect_unpowered() {
        let machine = DeviceStateMachine::new();
        assert!(machine.on_connected(false));
        assert_eq!(machine.state(), DeviceState::Off);
        assert_eq!(machine.status().as_str(), "Device is OFF");
        assert!(!machine.on_motion_accepted());
    }

    #[test]
    fn test_fault_left_only_via_reset() {
        let machine = DeviceStateMachine::new();
        machine.on_connected(true);
        assert_eq!(machine.force_fault("positive limit switch active"), DeviceState::On);
        assert_eq!(machine.state(), DeviceState::Fault);
        assert_eq!(machine.status().as_str(), "positive limit switch active");

        // Fault 下其他转换都不生效
        assert!(!machine.on_connected(true));
        assert!(!machine.on_power(true));
        assert!(!machine.on_power(false));
        assert!(!machine.on_motion_accepted());
        assert_eq!(machine.state(), DeviceState::Fault);

        assert_eq!(machine.on_reset(false), DeviceState::Fault);
        assert_eq!(machine.state(), DeviceState::Off);
    }

    #[test]
    fn test_power_off_while_moving() {
        let machine = DeviceStateMachine::new();
        machine.on_connected(true);
        machine.on_motion_accepted();
        // 运动中不接受上电转换
        assert!(!machine.on_power(true));
        assert!(machine.on_power(false));
        assert_eq!(machine.state(), DeviceState::Off);
    }

    #[test]
    fn test_fault_from_unknown() {
        let machine = DeviceStateMachine::new();
        assert_eq!(machine.force_fault("connection lost"), DeviceState::Unknown);
        assert_eq!(machine.state(), DeviceState::Fault);
    }

    #[test]
    fn test_concurrent_transitions_single_winner() {
        let machine = Arc::new(DeviceStateMachine::new());
        machine.on_connected(true);

        let winners: usize = (0..8)
            .map(|_| {
                let machine = machine.clone();
                std::thread::spawn(move || machine.on_motion_accepted())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
        assert_eq!(machine.state(), DeviceState::Moving);
    }
}
