//! 按名称分发操作
//!
//! 外部传输层（命令行、控制台）把调用展开成名称与字符串参数列表，
//! 这里负责解析参数并转发到 [`StageDevice`] 的对应方法。

use crate::device::StageDevice;
use crate::error::{CommandResult, Result};
use crate::params::{MoveParameters, StructureParameters};
use stage_protocol::{Operation, ProtocolError, check_arg_count};

fn parse_f64(field: &str, value: &str) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|_| {
        ProtocolError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}

fn parse_bool(field: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ProtocolError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into()),
    }
}

impl StageDevice {
    /// 按操作名称执行，返回文本结果
    ///
    /// # 错误
    /// 未知操作、参数个数或参数格式错误返回 `StageError::Config`，不修改任何状态。
    pub fn dispatch(&self, name: &str, args: &[&str]) -> Result<String> {
        self.dispatch_op(name.parse()?, args)
    }

    /// 执行已解析的操作，返回文本结果
    pub fn dispatch_op(&self, operation: Operation, args: &[&str]) -> Result<String> {
        let arity = |expected: usize| check_arg_count(operation, expected, args.len());

        match operation {
            Operation::Diagnose => {
                arity(0)?;
                self.diagnose()
            },
            Operation::LockQuery => {
                arity(0)?;
                Ok(self.lock_status()?.to_string())
            },
            Operation::Lock => {
                arity(1)?;
                self.lock(args[0])?;
                Ok(format!("locked by {}", args[0].trim()))
            },
            Operation::Unlock => {
                arity(1)?;
                self.unlock(args[0])?;
                Ok("unlocked".to_string())
            },
            Operation::SelfCheck => {
                arity(0)?;
                Ok(self.self_check()?.to_string())
            },
            Operation::Init => {
                arity(0)?;
                Ok(self.init()?.to_string())
            },
            Operation::Reset => {
                arity(0)?;
                Ok(self.reset()?.to_string())
            },
            Operation::SetMoveParameters => {
                arity(3)?;
                self.set_move_parameters(MoveParameters {
                    speed: parse_f64("speed", args[0])?,
                    acceleration: parse_f64("acceleration", args[1])?,
                    deceleration: parse_f64("deceleration", args[2])?,
                })?;
                Ok("ok".to_string())
            },
            Operation::SetStructureParameters => {
                arity(4)?;
                self.set_structure_parameters(StructureParameters {
                    steps_per_mm: parse_f64("steps_per_mm", args[0])?,
                    steps_per_rad: parse_f64("steps_per_rad", args[1])?,
                    lead_mm: parse_f64("lead_mm", args[2])?,
                    gear_ratio: parse_f64("gear_ratio", args[3])?,
                })?;
                Ok("ok".to_string())
            },
            Operation::SetUnit => {
                arity(1)?;
                Ok(self.set_unit(args[0])?.to_string())
            },
            Operation::SetPower => {
                arity(1)?;
                self.set_power(parse_bool("power", args[0])?)?;
                Ok(self.state().to_string())
            },
            Operation::SetBrake => {
                arity(1)?;
                self.set_brake(parse_bool("brake", args[0])?)?;
                Ok("ok".to_string())
            },
            Operation::MoveRelative => {
                arity(1)?;
                let steps = self.move_relative(parse_f64("distance", args[0])?)?;
                Ok(format!("{steps} steps"))
            },
            Operation::MoveAbsolute => {
                arity(1)?;
                let steps = self.move_absolute(parse_f64("position", args[0])?)?;
                Ok(format!("{steps} steps"))
            },
            Operation::Stop => {
                arity(0)?;
                self.stop()?;
                Ok("stopped".to_string())
            },
            Operation::ReadEncoderPosition => {
                arity(0)?;
                Ok(format!("{} {}", self.read_encoder_position()?, self.unit()))
            },
            Operation::ReadOriginPosition => {
                arity(0)?;
                Ok(format!("{} {}", self.read_origin_position()?, self.unit()))
            },
            Operation::ReadLimitPositions => {
                arity(0)?;
                Ok(self.read_limit_positions()?.to_string())
            },
            Operation::ReadStatus => {
                arity(0)?;
                self.status_json()
            },
            Operation::ExportLogs => {
                arity(1)?;
                let written = self.export_logs(args[0])?;
                Ok(format!("{written} entries written to {}", args[0]))
            },
            Operation::ExportAxisParameters => {
                arity(1)?;
                self.export_axis_parameters(args[0])?;
                Ok(format!("axis parameters written to {}", args[0]))
            },
            Operation::SimSwitch => {
                arity(1)?;
                let simulated = parse_bool("simulated", args[0])?;
                self.sim_switch(simulated)?;
                Ok(if simulated { "simulated" } else { "hardware" }.to_string())
            },
        }
    }

    /// 按操作名称执行，返回结果码与消息
    pub fn execute(&self, name: &str, args: &[&str]) -> CommandResult {
        self.dispatch(name, args).into()
    }

    /// 执行已解析的操作，返回结果码与消息
    pub fn execute_op(&self, operation: Operation, args: &[&str]) -> CommandResult {
        self.dispatch_op(operation, args).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("power", "ON").unwrap());
        assert!(!parse_bool("power", "0").unwrap());
        assert!(matches!(parse_bool("power", "maybe"), Err(StageError::Config(_))));
    }

    #[test]
    fn test_parse_f64() {
        assert_eq!(parse_f64("distance", " 1.5 ").unwrap(), 1.5);
        assert!(parse_f64("distance", "far").is_err());
    }

    #[test]
    fn test_dispatch_by_name_and_operation_agree() {
        let device = StageDevice::builder()
            .sim_connector(std::sync::Arc::new(stage_link::SimConnector::new()))
            .monitor_enabled(false)
            .ticker_enabled(false)
            .build()
            .unwrap();
        device.run_monitor_cycle(std::time::Instant::now());
        device.tick();

        let by_name = device.execute("setUnit", &["mm"]);
        let by_op = device.execute_op(Operation::SetUnit, &["mm"]);
        assert_eq!(by_name.code, by_op.code);
        assert!(by_op.is_ok());

        // 参数个数在已解析路径上同样检查
        let err = device.dispatch_op(Operation::Diagnose, &["extra"]).unwrap_err();
        assert!(matches!(err, StageError::Config(_)));
        assert_eq!(device.execute_op(Operation::MoveRelative, &["1"]).code, 1);
        assert_eq!(device.execute("nonsense", &[]).code, 4);
    }
}
