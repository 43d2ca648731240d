//! StageDevice Builder
//!
//! 提供链式 API 创建 [`StageDevice`]：校验属性、按设备类型查找能力、
//! 创建监控上下文并启动后台线程。

use crate::device_core::{DeviceCache, DeviceCore};
use crate::device::StageDevice;
use crate::error::Result;
use crate::params::{MoveParameters, StructureParameters};
use crate::registry::DeviceRegistry;
use crate::ticker::Ticker;
use stage_driver::{BackoffPolicy, ContextConfig, HealthMonitor, MonitorConfig, SupervisorContext};
use stage_link::{RemoteConnector, SimConnector};
use stage_tools::DeviceProperties;
use std::sync::Arc;
use tracing::info;

/// StageDevice Builder
///
/// # 示例
///
/// ```rust,no_run
/// use stage_client::{DeviceRegistry, StageDevice};
/// use stage_tools::PropertyStore;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let properties = PropertyStore::load("stage.toml")?.device_properties()?;
/// let registry = DeviceRegistry::with_defaults();
///
/// let device = StageDevice::builder()
///     .properties(properties)
///     .registry(&registry)
///     .build()?;
///
/// device.wait_until_ready(std::time::Duration::from_secs(5));
/// device.move_relative(1.5)?;
/// # Ok(())
/// # }
/// ```
pub struct StageDeviceBuilder<'r> {
    properties: DeviceProperties,
    registry: Option<&'r DeviceRegistry>,
    connector: Option<Arc<dyn RemoteConnector>>,
    sim: Option<Arc<SimConnector>>,
    simulated: Option<bool>,
    monitor_enabled: bool,
    ticker_enabled: bool,
}

impl Default for StageDeviceBuilder<'_> {
    fn default() -> Self {
        Self {
            properties: DeviceProperties::default(),
            registry: None,
            connector: None,
            sim: None,
            simulated: None,
            monitor_enabled: true,
            ticker_enabled: true,
        }
    }
}

impl<'r> StageDeviceBuilder<'r> {
    /// 创建新的 Builder
    pub fn new() -> Self {
        Self::default()
    }

    /// 设备属性（默认: `DeviceProperties::default()`）
    pub fn properties(mut self, properties: DeviceProperties) -> Self {
        self.properties = properties;
        self
    }

    /// 设备注册表（默认: 内置设备类型）
    pub fn registry(mut self, registry: &'r DeviceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 真实硬件连接工厂
    pub fn connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 仿真连接工厂（默认新建一个）
    ///
    /// 测试中传入共享的工厂，以便操纵仿真设备。
    pub fn sim_connector(mut self, sim: Arc<SimConnector>) -> Self {
        self.sim = Some(sim);
        self
    }

    /// 覆盖属性中的 `device.simulated`
    ///
    /// 没有真实连接工厂时总是使用仿真后端。
    pub fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = Some(simulated);
        self
    }

    /// 是否启动健康监控线程（默认启用）
    pub fn monitor_enabled(mut self, enabled: bool) -> Self {
        self.monitor_enabled = enabled;
        self
    }

    /// 是否启动定时线程（默认启用）
    pub fn ticker_enabled(mut self, enabled: bool) -> Self {
        self.ticker_enabled = enabled;
        self
    }

    /// 构建设备
    ///
    /// # 错误
    /// - 属性校验失败、设备类型未注册：`StageError::Config`
    /// - 后台线程创建失败：`StageError::Driver`
    pub fn build(self) -> Result<StageDevice> {
        let properties = self.properties;
        properties.validate()?;

        let defaults;
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                defaults = DeviceRegistry::with_defaults();
                &defaults
            },
        };
        let profile = registry.lookup(&properties.device.class)?;
        let has_brake = properties.safety.brake_present.unwrap_or(profile.has_brake);

        let structure = StructureParameters::from(&properties.axis);
        let scale = structure.scale()?;
        let motion = MoveParameters::from(&properties.axis);
        motion.validate(&properties.safety)?;
        let unit = properties.axis.unit()?;

        let simulated = self.simulated.unwrap_or(properties.device.simulated);
        let encoder = if profile.uses_encoder {
            properties.remotes.encoder.clone()
        } else {
            None
        };
        let ctx = Arc::new(SupervisorContext::new(
            ContextConfig {
                primary: properties.remotes.primary.clone(),
                encoder,
                call_timeout: properties.command_timeout(),
                max_restore_retries: properties.monitor.max_restore_retries,
                engage_brake_on_fault: properties.safety.engage_brake_on_fault && has_brake,
            },
            self.connector,
            self.sim.unwrap_or_default(),
            simulated,
        ));

        let monitor_config = MonitorConfig {
            period: properties.monitor_period(),
            ping_timeout: properties.ping_timeout(),
            reconnect_timeout: properties.reconnect_timeout(),
            backoff: BackoffPolicy::new(
                properties.min_reconnect_interval(),
                properties.monitor.backoff_threshold,
                properties.backoff_cap(),
            ),
            enabled: self.monitor_enabled,
        };
        let tick_period = properties.tick_period();

        let cache = DeviceCache {
            structure,
            motion,
            scale,
            unit,
            power: false,
            power_intent: false,
            brake_engaged: false,
            position_steps: None,
            lock_owner: None,
        };
        let core = Arc::new(DeviceCore::new(ctx.clone(), profile, has_brake, properties, cache));

        let monitor = HealthMonitor::start(ctx.clone(), monitor_config)?;
        let ticker = if self.ticker_enabled {
            Some(Ticker::start(core.clone(), tick_period)?)
        } else {
            None
        };

        info!(
            "{} ({}) created: backend={}, brake={}",
            core.name,
            core.class,
            if ctx.is_simulated() { "simulated" } else { "hardware" },
            has_brake
        );
        Ok(StageDevice::from_parts(core, monitor, ticker))
    }
}
