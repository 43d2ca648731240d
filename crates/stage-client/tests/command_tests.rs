//! 命令层集成测试：锁定、分发、导出、后端切换、自检

use stage_client::{AxisParameters, DeviceRegistry, StageDevice, StageError};
use stage_link::{RemoteConnector, SimConnector, SimulatedStage};
use stage_protocol::{DeviceState, Unit};
use stage_tools::DeviceProperties;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn manual_device(properties: DeviceProperties) -> (StageDevice, Arc<SimulatedStage>) {
    let sim = Arc::new(SimConnector::new());
    let stage = sim.stage(&properties.remotes.primary);
    let device = StageDevice::builder()
        .properties(properties)
        .sim_connector(sim)
        .monitor_enabled(false)
        .ticker_enabled(false)
        .build()
        .unwrap();
    (device, stage)
}

/// 连接并初始化（Off）
fn connected() -> (StageDevice, Arc<SimulatedStage>) {
    let (device, stage) = manual_device(DeviceProperties::default());
    device.run_monitor_cycle(Instant::now());
    device.tick();
    assert_eq!(device.state(), DeviceState::Off);
    (device, stage)
}

#[test]
fn test_lockout_blocks_motion_and_parameters() {
    let (device, stage) = connected();

    device.lock("maintenance").unwrap();
    // 同一持有者重复锁定是幂等的
    device.lock("maintenance").unwrap();
    let status = device.lock_status().unwrap();
    assert!(status.locked);
    assert_eq!(status.owner.as_deref(), Some("maintenance"));

    stage.clear_calls();
    let err = device.set_power(true).unwrap_err();
    assert!(matches!(err, StageError::Locked { ref owner } if owner == "maintenance"));
    assert_eq!(err.code(), 5);
    assert!(stage.calls().is_empty());

    // 读取不受锁定影响
    device.read_origin_position().unwrap();

    assert!(matches!(device.lock("operator"), Err(StageError::Locked { .. })));
    assert!(matches!(device.unlock("operator"), Err(StageError::Locked { .. })));

    device.unlock("maintenance").unwrap();
    assert!(!device.lock_status().unwrap().locked);
    device.set_power(true).unwrap();
    assert_eq!(device.state(), DeviceState::On);
}

#[test]
fn test_lock_rejected_while_on() {
    let (device, _stage) = connected();
    device.set_power(true).unwrap();
    assert!(device.lock("maintenance").unwrap_err().is_state_error());
    assert!(device.lock("  ").is_err());
}

#[test]
fn test_lock_requires_owner() {
    let (device, _stage) = connected();
    assert!(matches!(device.lock("  "), Err(StageError::Config(_))));
}

#[test]
fn test_unknown_state_rejects_hardware_operations() {
    let (device, stage) = manual_device(DeviceProperties::default());
    assert_eq!(device.state(), DeviceState::Unknown);

    assert!(device.diagnose().unwrap().contains("state=UNKNOWN"));
    assert!(device.status().unwrap_err().is_state_error());
    assert!(!device.lock_status().unwrap().locked);
    assert!(device.reset().unwrap_err().is_state_error());
    assert!(device.set_unit("mm").unwrap_err().is_state_error());
    assert!(stage.calls().is_empty());
}

#[test]
fn test_dispatch_by_name() {
    let (device, _stage) = connected();

    assert_eq!(device.dispatch("setUnit", &["um"]).unwrap(), Unit::Micrometer.to_string());
    assert_eq!(device.unit(), Unit::Micrometer);
    assert_eq!(device.dispatch("setPower", &["on"]).unwrap(), "ON");
    assert_eq!(device.dispatch("moveRelative", &["250"]).unwrap(), "250 steps");
    assert_eq!(device.state(), DeviceState::Moving);

    let result = device.execute("moveRelative", &[]);
    assert_eq!(result.code, 4);
    assert!(result.message.contains("expected 1"));

    let result = device.execute("fly", &["1"]);
    assert_eq!(result.code, 4);

    let result = device.execute("init", &[]);
    assert_eq!(result.code, 1);

    let result = device.execute("readStatus", &[]);
    assert!(result.is_ok());
    assert!(result.message.starts_with('{'));
}

#[test]
fn test_status_snapshot() {
    let (device, _stage) = connected();
    device.set_unit("mm").unwrap();

    let json: serde_json::Value = serde_json::from_str(&device.status_json().unwrap()).unwrap();
    assert_eq!(json["state"], "OFF");
    assert_eq!(json["status"], "Device is OFF");
    assert_eq!(json["healthy"], true);
    assert_eq!(json["pending_restore"], false);
    assert_eq!(json["fault"]["latched"], false);
    assert_eq!(json["unit"], "mm");
    assert_eq!(json["simulated"], true);
}

#[test]
fn test_parameters_are_validated_and_cached() {
    let (device, stage) = connected();

    let err = device
        .set_move_parameters(stage_client::MoveParameters {
            speed: 1e9,
            acceleration: 1_000.0,
            deceleration: 1_000.0,
        })
        .unwrap_err();
    assert_eq!(err.code(), 4);
    stage.clear_calls();

    let params = stage_client::MoveParameters {
        speed: 20_000.0,
        acceleration: 100_000.0,
        deceleration: 80_000.0,
    };
    device.set_move_parameters(params).unwrap();
    assert_eq!(stage.call_count("ApplyMoveParameters"), 1);
    assert_eq!(
        stage.move_parameters().unwrap()["deceleration"],
        serde_json::json!(80_000.0)
    );

    let structure = stage_client::StructureParameters {
        steps_per_mm: 2_000.0,
        steps_per_rad: 10_000.0,
        lead_mm: 2.0,
        gear_ratio: 1.0,
    };
    device.set_structure_parameters(structure).unwrap();
    device.set_unit("mm").unwrap();
    device.set_power(true).unwrap();
    assert_eq!(device.move_relative(0.5).unwrap(), 1_000);
}

#[test]
fn test_reads_in_current_unit() {
    let (device, stage) = connected();
    stage.set_travel(2_000, -50_000, 75_000);
    device.set_unit("mm").unwrap();

    assert_eq!(device.read_origin_position().unwrap(), 2.0);
    let limits = device.read_limit_positions().unwrap();
    assert_eq!(limits.negative, -50.0);
    assert_eq!(limits.positive, 75.0);
}

#[test]
fn test_exports() {
    let (device, _stage) = connected();
    device.set_power(true).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let log_path = dir.path().join("events.log");
    let written = device.export_logs(&log_path).unwrap();
    assert!(written > 0);
    let content = std::fs::read_to_string(&log_path).unwrap();
    assert!(content.contains("setPower ok"));

    let params_path = dir.path().join("axis.json");
    let exported = device.export_axis_parameters(&params_path).unwrap();
    let parsed: AxisParameters =
        serde_json::from_str(&std::fs::read_to_string(&params_path).unwrap()).unwrap();
    assert_eq!(parsed, exported);
    assert_eq!(parsed.device, "stage");
}

#[test]
fn test_sim_switch_without_hardware_backend() {
    let (device, _stage) = connected();
    assert!(!device.sim_switch(true).unwrap());
    let err = device.sim_switch(false).unwrap_err();
    assert!(matches!(err, StageError::Config(_)));
    assert!(device.is_simulated());
}

#[test]
fn test_sim_switch_restores_onto_new_backend() {
    let hardware = Arc::new(SimConnector::new());
    let hardware_stage = hardware.stage("stage/motion");
    let sim = Arc::new(SimConnector::new());
    let sim_stage = sim.stage("stage/motion");

    let device = StageDevice::builder()
        .connector(hardware as Arc<dyn RemoteConnector>)
        .sim_connector(sim)
        .simulated(false)
        .monitor_enabled(false)
        .ticker_enabled(false)
        .build()
        .unwrap();
    assert!(!device.is_simulated());

    let t0 = Instant::now();
    device.run_monitor_cycle(t0);
    device.tick();
    assert_eq!(device.state(), DeviceState::Off);
    assert!(hardware_stage.structure_parameters().is_some());

    assert!(device.sim_switch(true).unwrap());
    assert!(device.is_simulated());
    assert!(!device.is_healthy());

    let report = device.run_monitor_cycle(t0 + Duration::from_secs(3));
    assert!(report.restore_scheduled);
    device.tick();
    assert!(device.is_healthy());
    assert!(sim_stage.structure_parameters().is_some());
}

#[test]
fn test_self_check_reports_firmware() {
    let (device, stage) = connected();

    let report = device.self_check().unwrap();
    assert!(report.passed());
    assert_eq!(report.remotes[0].firmware, "2.4.1");

    stage.set_self_check("1.2.0", true);
    let report = device.self_check().unwrap();
    assert!(!report.passed());
    assert!(!report.remotes[0].firmware_supported);
    assert!(report.to_string().starts_with("FAILED"));
}

#[test]
fn test_motion_unsupported_for_sensor_class() {
    let mut properties = DeviceProperties::default();
    properties.device.class = "ForceSensor".to_string();
    let (device, stage) = manual_device(properties);
    device.run_monitor_cycle(Instant::now());
    device.tick();
    device.set_power(true).unwrap();
    assert!(!device.has_brake());
    assert_eq!(stage.call_count("SetBrake"), 0);

    let err = device.move_relative(1.0).unwrap_err();
    assert!(matches!(err, StageError::Config(_)));
    assert_eq!(device.state(), DeviceState::On);
}

#[test]
fn test_unknown_class_rejected() {
    let mut properties = DeviceProperties::default();
    properties.device.class = "Rotator".to_string();
    let registry = DeviceRegistry::with_defaults();
    let err = StageDevice::builder()
        .properties(properties)
        .registry(&registry)
        .monitor_enabled(false)
        .ticker_enabled(false)
        .build()
        .unwrap_err();
    assert!(matches!(err, StageError::Config(ref msg) if msg.contains("LinearStage")));
}

#[test]
fn test_background_threads_bring_device_up() {
    let mut properties = DeviceProperties::default();
    properties.monitor.period_ms = 10;
    properties.monitor.tick_period_ms = 10;
    let mut device = StageDevice::builder().properties(properties).build().unwrap();

    assert!(device.wait_until_ready(Duration::from_secs(5)));
    assert_eq!(device.state(), DeviceState::Off);
    assert!(device.monitor().is_running());

    device.shutdown();
    assert!(!device.monitor().is_running());
    assert!(!device.is_healthy());
}
