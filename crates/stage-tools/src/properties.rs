//! # 属性存储
//!
//! 启动时从 TOML 文件加载一次的只读属性，运行期间不写回。
//!
//! ```toml
//! [device]
//! class = "LinearStage"
//!
//! [remotes]
//! primary = "lab/stage/motion"
//! encoder = "lab/stage/encoder"
//!
//! [axis]
//! steps_per_mm = 400.0
//! default_unit = "mm"
//!
//! [safety]
//! limit_polarity = "active_low"
//!
//! [monitor]
//! period_ms = 500
//! ```
//!
//! 所有键都有默认值，空文件也是合法配置。

use crate::ConfigError;
use crate::safety::SafetySettings;
use serde::{Deserialize, Serialize};
use stage_protocol::{AxisScale, Unit};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// 只读属性存储
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    path: Option<PathBuf>,
    source: String,
    root: toml::Table,
}

impl PropertyStore {
    /// 空属性存储（全部使用默认值）
    pub fn empty() -> Self {
        Self::default()
    }

    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut store: PropertyStore = source.parse()?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// 来源文件
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lookup(&self, key: &str) -> Option<&toml::Value> {
        let mut parts = key.split('.');
        let mut value = self.root.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }

    /// 是否存在某个键（`section.key` 形式）
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// 读取字符串属性
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        self.typed(key, "string", toml::Value::as_str)
    }

    /// 读取浮点属性（整数会被转换）
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        self.typed(key, "number", |value| {
            value.as_float().or_else(|| value.as_integer().map(|i| i as f64))
        })
    }

    /// 读取非负整数属性
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.typed(key, "non-negative integer", |value| {
            value.as_integer().and_then(|i| u64::try_from(i).ok())
        })
    }

    /// 读取布尔属性
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.typed(key, "boolean", toml::Value::as_bool)
    }

    fn typed<'a, T>(
        &'a self,
        key: &str,
        expected: &'static str,
        convert: impl FnOnce(&'a toml::Value) -> Option<T>,
    ) -> Result<Option<T>, ConfigError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(value) => convert(value).map(Some).ok_or_else(|| ConfigError::WrongType {
                key: key.to_string(),
                expected,
            }),
        }
    }

    /// 所有叶子键（`section.key` 形式，按字母序）
    pub fn keys(&self) -> Vec<String> {
        fn walk(prefix: &str, table: &toml::Table, out: &mut Vec<String>) {
            for (name, value) in table {
                let key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                match value.as_table() {
                    Some(child) => walk(&key, child, out),
                    None => out.push(key),
                }
            }
        }

        let mut keys = Vec::new();
        walk("", &self.root, &mut keys);
        keys.sort();
        keys
    }

    /// 类型化的设备属性（缺失的键使用默认值），并做校验
    pub fn device_properties(&self) -> Result<DeviceProperties, ConfigError> {
        let properties: DeviceProperties =
            toml::from_str(&self.source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        properties.validate()?;
        Ok(properties)
    }
}

impl FromStr for PropertyStore {
    type Err = ConfigError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        let root: toml::Table = source
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        Ok(Self {
            path: None,
            source: source.to_string(),
            root,
        })
    }
}

/// `[device]` 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// 设备类型（在设备注册表中查找）
    pub class: String,
    /// 设备名称（日志与导出中使用）
    pub name: String,
    /// 启动时使用仿真后端
    pub simulated: bool,
    /// 连接建立后自动初始化（Unknown → On/Off）
    pub auto_init: bool,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            class: "LinearStage".to_string(),
            name: "stage".to_string(),
            simulated: true,
            auto_init: true,
        }
    }
}

/// `[remotes]` 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// 主远程（运动控制器）
    pub primary: String,
    /// 编码器远程
    pub encoder: Option<String>,
    /// 命令调用超时（ms）
    pub command_timeout_ms: u64,
    /// 存活探测超时（ms）
    pub ping_timeout_ms: u64,
    /// 重连超时（ms）
    pub reconnect_timeout_ms: u64,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            primary: "stage/motion".to_string(),
            encoder: None,
            command_timeout_ms: 800,
            ping_timeout_ms: 300,
            reconnect_timeout_ms: 500,
        }
    }
}

/// `[axis]` 段：标定与默认运动参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisSection {
    /// 轴号
    pub axis_id: u32,
    /// 每毫米步数
    pub steps_per_mm: f64,
    /// 每弧度步数
    pub steps_per_rad: f64,
    /// 编码器计数到步数的比例
    pub encoder_scale: f64,
    /// 丝杠导程（mm）
    pub lead_mm: f64,
    /// 减速比
    pub gear_ratio: f64,
    /// 默认位置单位
    pub default_unit: String,
    /// 运动速度（步/秒）
    pub speed: f64,
    /// 加速度（步/秒²）
    pub acceleration: f64,
    /// 减速度（步/秒²）
    pub deceleration: f64,
}

impl Default for AxisSection {
    fn default() -> Self {
        Self {
            axis_id: 0,
            steps_per_mm: 1_000.0,
            steps_per_rad: 10_000.0,
            encoder_scale: 1.0,
            lead_mm: 5.0,
            gear_ratio: 1.0,
            default_unit: "step".to_string(),
            speed: 10_000.0,
            acceleration: 50_000.0,
            deceleration: 50_000.0,
        }
    }
}

impl AxisSection {
    /// 标定参数
    pub fn scale(&self) -> Result<AxisScale, ConfigError> {
        Ok(AxisScale::new(self.steps_per_mm, self.steps_per_rad)?)
    }

    /// 默认单位
    pub fn unit(&self) -> Result<Unit, ConfigError> {
        Ok(self.default_unit.parse()?)
    }
}

/// `[monitor]` 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// 健康监控周期（ms）
    pub period_ms: u64,
    /// 最小重连间隔（ms）
    pub min_reconnect_interval_ms: u64,
    /// 连续失败多少次之后开始退避
    pub backoff_threshold: u32,
    /// 退避间隔上限（ms）
    pub backoff_cap_ms: u64,
    /// 恢复重试上限
    pub max_restore_retries: u32,
    /// 命令上下文定时任务周期（ms）
    pub tick_period_ms: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            period_ms: 500,
            min_reconnect_interval_ms: 2_000,
            backoff_threshold: 5,
            backoff_cap_ms: 60_000,
            max_restore_retries: 3,
            tick_period_ms: 100,
        }
    }
}

/// 类型化设备属性
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProperties {
    pub device: DeviceSection,
    pub remotes: RemoteSection,
    pub axis: AxisSection,
    pub safety: SafetySettings,
    pub monitor: MonitorSection,
}

impl DeviceProperties {
    /// 校验所有属性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remotes.primary.trim().is_empty() {
            return Err(ConfigError::invalid("remotes.primary", "must not be empty"));
        }
        if self.remotes.encoder.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(ConfigError::invalid("remotes.encoder", "must not be empty"));
        }
        for (key, value) in [
            ("remotes.command_timeout_ms", self.remotes.command_timeout_ms),
            ("remotes.ping_timeout_ms", self.remotes.ping_timeout_ms),
            ("remotes.reconnect_timeout_ms", self.remotes.reconnect_timeout_ms),
            ("monitor.period_ms", self.monitor.period_ms),
            ("monitor.tick_period_ms", self.monitor.tick_period_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(key, "must be greater than zero"));
            }
        }
        self.axis.scale()?;
        self.axis.unit()?;
        if !(self.axis.encoder_scale.is_finite() && self.axis.encoder_scale != 0.0) {
            return Err(ConfigError::invalid("axis.encoder_scale", "must be finite and non-zero"));
        }
        self.safety.validate()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.remotes.command_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.remotes.ping_timeout_ms)
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.remotes.reconnect_timeout_ms)
    }

    pub fn monitor_period(&self) -> Duration {
        Duration::from_millis(self.monitor.period_ms)
    }

    pub fn min_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.min_reconnect_interval_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.monitor.backoff_cap_ms)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.monitor.tick_period_ms)
    }

    /// 序列化为 TOML 文本
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage_protocol::LimitPolarity;
    use std::io::Write;

    const SAMPLE: &str = r#"
[device]
class = "MotionController"

[remotes]
primary = "lab/stage/motion"
encoder = "lab/stage/encoder"
command_timeout_ms = 600

[axis]
steps_per_mm = 400
default_unit = "mm"

[safety]
limit_polarity = "active_low"
brake_present = true

[monitor]
max_restore_retries = 5
"#;

    #[test]
    fn test_empty_store_uses_defaults() {
        let store = PropertyStore::empty();
        let properties = store.device_properties().unwrap();
        assert_eq!(properties, DeviceProperties::default());
        assert_eq!(properties.command_timeout(), Duration::from_millis(800));
        assert_eq!(properties.ping_timeout(), Duration::from_millis(300));
        assert_eq!(properties.monitor_period(), Duration::from_millis(500));
        assert_eq!(properties.min_reconnect_interval(), Duration::from_secs(2));
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_typed_accessors() {
        let store: PropertyStore = SAMPLE.parse().unwrap();
        assert_eq!(store.get_str("device.class").unwrap(), Some("MotionController"));
        assert_eq!(store.get_f64("axis.steps_per_mm").unwrap(), Some(400.0));
        assert_eq!(store.get_u64("remotes.command_timeout_ms").unwrap(), Some(600));
        assert_eq!(store.get_bool("safety.brake_present").unwrap(), Some(true));
        assert_eq!(store.get_str("device.missing").unwrap(), None);
        assert!(matches!(
            store.get_bool("device.class"),
            Err(ConfigError::WrongType { .. })
        ));
        assert!(store.contains("monitor.max_restore_retries"));
        assert!(store.keys().contains(&"remotes.encoder".to_string()));
    }

    #[test]
    fn test_device_properties_from_sample() {
        let store: PropertyStore = SAMPLE.parse().unwrap();
        let properties = store.device_properties().unwrap();
        assert_eq!(properties.device.class, "MotionController");
        assert_eq!(properties.remotes.encoder.as_deref(), Some("lab/stage/encoder"));
        assert_eq!(properties.axis.unit().unwrap(), Unit::Millimeter);
        assert_eq!(properties.axis.scale().unwrap().steps_per_mm(), 400.0);
        assert_eq!(properties.safety.limit_polarity, LimitPolarity::ActiveLow);
        assert_eq!(properties.monitor.max_restore_retries, 5);
        // 未设置的键保持默认值
        assert_eq!(properties.monitor.period_ms, 500);
    }

    #[test]
    fn test_invalid_properties_rejected() {
        let store: PropertyStore = "[axis]\ndefault_unit = \"inch\"\n".parse().unwrap();
        assert!(matches!(store.device_properties(), Err(ConfigError::Protocol(_))));

        let store: PropertyStore = "[axis]\nsteps_per_mm = -1.0\n".parse().unwrap();
        assert!(store.device_properties().is_err());

        let store: PropertyStore = "[remotes]\nping_timeout_ms = 0\n".parse().unwrap();
        assert!(matches!(
            store.device_properties(),
            Err(ConfigError::InvalidValue { .. })
        ));

        assert!(matches!(
            "[device".parse::<PropertyStore>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let store = PropertyStore::load(file.path()).unwrap();
        assert_eq!(store.path(), Some(file.path()));
        assert_eq!(store.device_properties().unwrap().device.class, "MotionController");

        let missing = PropertyStore::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_toml_roundtrip() {
        let properties = DeviceProperties::default();
        let text = properties.to_toml().unwrap();
        let store: PropertyStore = text.parse().unwrap();
        assert_eq!(store.device_properties().unwrap(), properties);
    }
}
