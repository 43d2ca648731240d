//! 进程内仿真远程
//!
//! 用于运行期仿真开关（simSwitch）以及无硬件测试。
//! 每个远程名称对应一个 [`SimulatedStage`]，模拟单轴运动控制器或编码器读取器：
//! 上电/抱闸状态、位置计数、运动完成、限位信号、可注入的故障与链路中断。

use crate::{LinkError, RemoteConnector, RemoteDeviceProxy};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::trace;

/// 注入的硬件故障
#[derive(Debug, Clone)]
struct InjectedFailure {
    code: i32,
    message: String,
    once: bool,
}

#[derive(Debug)]
struct SimState {
    reachable: bool,
    latency: Duration,
    power: bool,
    brake_engaged: bool,
    position: i64,
    target: i64,
    moving: bool,
    remaining_polls: u32,
    motion_polls: u32,
    limit_raw: u8,
    origin: i64,
    limit_negative: i64,
    limit_positive: i64,
    firmware: String,
    self_check_ok: bool,
    structure: Option<Value>,
    move_params: Option<Value>,
    failures: HashMap<String, InjectedFailure>,
    calls: Vec<(String, Value)>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            reachable: true,
            latency: Duration::ZERO,
            power: false,
            brake_engaged: false,
            position: 0,
            target: 0,
            moving: false,
            remaining_polls: 0,
            motion_polls: 1,
            limit_raw: 0,
            origin: 0,
            limit_negative: -100_000,
            limit_positive: 100_000,
            firmware: "2.4.1".to_string(),
            self_check_ok: true,
            structure: None,
            move_params: None,
            failures: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

/// 仿真单轴设备
#[derive(Debug, Default)]
pub struct SimulatedStage {
    state: Mutex<SimState>,
}

impl SimulatedStage {
    /// 创建仿真设备（可达、未上电、抱闸释放、位置 0）
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== 测试/仿真控制接口 ====================

    /// 设置是否可达（不可达时 connect/ping/invoke 全部失败）
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// 是否可达
    pub fn is_reachable(&self) -> bool {
        self.state.lock().reachable
    }

    /// 设置调用延迟（超过调用超时时返回 Timeout）
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// 设置原始限位值
    pub fn set_limit_raw(&self, raw: u8) {
        self.state.lock().limit_raw = raw;
    }

    /// 设置位置计数
    pub fn set_position(&self, position: i64) {
        let mut state = self.state.lock();
        state.position = position;
        state.target = position;
    }

    /// 当前位置计数
    pub fn position(&self) -> i64 {
        self.state.lock().position
    }

    /// 运动完成所需的状态轮询次数（默认 1）
    pub fn set_motion_polls(&self, polls: u32) {
        self.state.lock().motion_polls = polls.max(1);
    }

    /// 设置原点与软限位位置
    pub fn set_travel(&self, origin: i64, negative: i64, positive: i64) {
        let mut state = self.state.lock();
        state.origin = origin;
        state.limit_negative = negative;
        state.limit_positive = positive;
    }

    /// 设置固件版本与自检结果
    pub fn set_self_check(&self, firmware: impl Into<String>, ok: bool) {
        let mut state = self.state.lock();
        state.firmware = firmware.into();
        state.self_check_ok = ok;
    }

    /// 设置上电状态（模拟外部操作）
    pub fn set_power(&self, power: bool) {
        self.state.lock().power = power;
    }

    /// 上电状态
    pub fn power(&self) -> bool {
        self.state.lock().power
    }

    /// 抱闸状态
    pub fn brake_engaged(&self) -> bool {
        self.state.lock().brake_engaged
    }

    /// 是否运动中
    pub fn is_moving(&self) -> bool {
        self.state.lock().moving
    }

    /// 最近一次下发的结构参数
    pub fn structure_parameters(&self) -> Option<Value> {
        self.state.lock().structure.clone()
    }

    /// 最近一次下发的运动参数
    pub fn move_parameters(&self) -> Option<Value> {
        self.state.lock().move_params.clone()
    }

    /// 注入持续故障：之后每次调用 `command` 都返回硬件错误
    pub fn fail_command(&self, command: &str, code: i32, message: impl Into<String>) {
        self.state.lock().failures.insert(
            command.to_string(),
            InjectedFailure {
                code,
                message: message.into(),
                once: false,
            },
        );
    }

    /// 注入一次性故障
    pub fn fail_next(&self, command: &str, code: i32, message: impl Into<String>) {
        self.state.lock().failures.insert(
            command.to_string(),
            InjectedFailure {
                code,
                message: message.into(),
                once: true,
            },
        );
    }

    /// 清除所有注入的故障
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// 某命令被调用的次数
    pub fn call_count(&self, command: &str) -> usize {
        self.state.lock().calls.iter().filter(|(c, _)| c == command).count()
    }

    /// 某命令被调用时的参数（按调用顺序）
    pub fn call_args(&self, command: &str) -> Vec<Value> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(c, _)| c == command)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// 所有调用记录
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.iter().map(|(c, _)| c.clone()).collect()
    }

    /// 清空调用记录
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    // ==================== 命令执行 ====================

    fn execute(&self, remote: &str, command: &str, args: Value) -> Result<Value, LinkError> {
        let mut state = self.state.lock();

        if !state.reachable {
            return Err(unreachable(remote));
        }

        state.calls.push((command.to_string(), args.clone()));

        if let Some(failure) = state.failures.get(command).cloned() {
            if failure.once {
                state.failures.remove(command);
            }
            return Err(hardware(remote, command, failure.code, failure.message));
        }

        match command {
            "ApplyStructureParameters" => {
                state.structure = Some(args);
                Ok(Value::Null)
            },
            "ApplyMoveParameters" => {
                state.move_params = Some(args);
                Ok(Value::Null)
            },
            "SetPower" => {
                let on = expect_bool(remote, command, &args)?;
                state.power = on;
                if !on {
                    state.moving = false;
                    state.target = state.position;
                }
                Ok(Value::Null)
            },
            "SetBrake" => {
                state.brake_engaged = expect_bool(remote, command, &args)?;
                Ok(Value::Null)
            },
            "GetPowerStatus" => Ok(json!(state.power)),
            "GetBrakeStatus" => Ok(json!(state.brake_engaged)),
            "MoveRelative" | "MoveAbsolute" => {
                let steps = expect_i64(remote, command, &args)?;
                if !state.power {
                    return Err(hardware(remote, command, 3, "axis not enabled"));
                }
                if state.brake_engaged {
                    return Err(hardware(remote, command, 4, "brake engaged"));
                }
                let target = if command == "MoveRelative" {
                    state.target.saturating_add(steps)
                } else {
                    steps
                };
                state.target = target;
                state.moving = true;
                state.remaining_polls = state.motion_polls;
                Ok(Value::Null)
            },
            "Stop" => {
                state.moving = false;
                state.target = state.position;
                Ok(Value::Null)
            },
            "ClearFault" => Ok(Value::Null),
            "GetMotionStatus" => {
                if state.moving {
                    state.remaining_polls = state.remaining_polls.saturating_sub(1);
                    if state.remaining_polls == 0 {
                        state.position = state.target;
                        state.moving = false;
                    }
                }
                Ok(json!({
                    "moving": state.moving,
                    "position": state.position,
                    "limit": state.limit_raw,
                }))
            },
            "GetPosition" => Ok(json!(state.position)),
            "SetPosition" => {
                let position = expect_i64(remote, command, &args)?;
                state.position = position;
                state.target = position;
                Ok(Value::Null)
            },
            "GetOriginPosition" => Ok(json!(state.origin)),
            "GetLimitPositions" => Ok(json!({
                "negative": state.limit_negative,
                "positive": state.limit_positive,
            })),
            "SelfCheck" => {
                let detail = if state.self_check_ok {
                    "all checks passed"
                } else {
                    "driver self-test failed"
                };
                Ok(json!({
                    "ok": state.self_check_ok,
                    "firmware": state.firmware,
                    "detail": detail,
                }))
            },
            other => Err(hardware(remote, other, 1, "unknown command")),
        }
    }
}

fn unreachable(remote: &str) -> LinkError {
    LinkError::Unreachable {
        remote: remote.to_string(),
        reason: "simulated link down".to_string(),
    }
}

fn hardware(remote: &str, command: &str, code: i32, message: impl Into<String>) -> LinkError {
    LinkError::Hardware {
        remote: remote.to_string(),
        command: command.to_string(),
        code,
        message: message.into(),
    }
}

fn expect_bool(remote: &str, command: &str, args: &Value) -> Result<bool, LinkError> {
    args.as_bool()
        .ok_or_else(|| hardware(remote, command, 2, format!("expected bool argument, got {args}")))
}

fn expect_i64(remote: &str, command: &str, args: &Value) -> Result<i64, LinkError> {
    args.as_i64().ok_or_else(|| {
        hardware(remote, command, 2, format!("expected integer argument, got {args}"))
    })
}

/// 仿真连接
struct SimProxy {
    name: String,
    stage: Arc<SimulatedStage>,
    timeout_ms: AtomicU64,
}

impl SimProxy {
    /// 模拟链路延迟；超过超时返回 Timeout
    fn wait_latency(&self, timeout: Duration) -> Result<(), LinkError> {
        let latency = self.stage.state.lock().latency;
        if latency.is_zero() {
            return Ok(());
        }
        if latency > timeout {
            thread::sleep(timeout);
            return Err(LinkError::Timeout {
                remote: self.name.clone(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        thread::sleep(latency);
        Ok(())
    }
}

impl RemoteDeviceProxy for SimProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn ping(&self, timeout: Duration) -> Result<(), LinkError> {
        self.wait_latency(timeout)?;
        if self.stage.is_reachable() {
            trace!("Simulated ping to {} ok", self.name);
            Ok(())
        } else {
            Err(unreachable(&self.name))
        }
    }

    fn invoke(&self, command: &str, args: Value, timeout: Duration) -> Result<Value, LinkError> {
        self.wait_latency(timeout)?;
        self.stage.execute(&self.name, command, args)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(timeout.as_millis() as u64, Ordering::Relaxed);
    }
}

/// 仿真连接工厂
///
/// 按远程名称懒创建 [`SimulatedStage`]，同名远程共享同一个仿真设备。
#[derive(Default)]
pub struct SimConnector {
    stages: Mutex<HashMap<String, Arc<SimulatedStage>>>,
}

impl SimConnector {
    /// 创建空的仿真连接工厂
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取（或创建）某远程对应的仿真设备
    pub fn stage(&self, remote: &str) -> Arc<SimulatedStage> {
        self.stages
            .lock()
            .entry(remote.to_string())
            .or_insert_with(|| Arc::new(SimulatedStage::new()))
            .clone()
    }
}

impl RemoteConnector for SimConnector {
    fn connect(
        &self,
        remote: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn RemoteDeviceProxy>, LinkError> {
        let stage = self.stage(remote);
        if !stage.is_reachable() {
            return Err(unreachable(remote));
        }
        Ok(Arc::new(SimProxy {
            name: remote.to_string(),
            stage,
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
        }))
    }
}
