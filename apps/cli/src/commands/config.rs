//! 配置管理命令
//!
//! 用于管理 CLI 配置（属性文件路径、锁定持有者等）

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use stage_sdk::{DeviceProperties, PropertyStore};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件路径
fn config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;

    path.push("stage");
    Ok(path)
}

pub fn config_file() -> Result<PathBuf> {
    let mut path = config_dir()?;
    fs::create_dir_all(&path).context("创建配置目录失败")?;

    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// 设备属性文件（TOML）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PathBuf>,

    /// 锁定/解锁时使用的持有者名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// 默认日志过滤规则
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl CliConfig {
    /// 从默认位置加载配置，文件不存在时返回默认值
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("读取配置文件失败")?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self).context("序列化配置失败")?;
        let content = format!("# Stage CLI Configuration\n\n{body}");
        fs::write(path, content).context("写入配置文件失败")?;
        Ok(())
    }

    /// 锁定持有者，未配置时回退到当前用户名
    pub fn owner(&self) -> String {
        self.owner
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "stage-cli".to_string())
    }

    /// 读取设备属性
    ///
    /// `override_path` 优先于配置中的路径；两者都没有时使用默认属性。
    pub fn device_properties(&self, override_path: Option<&Path>) -> Result<DeviceProperties> {
        match override_path.or(self.properties.as_deref()) {
            Some(path) => {
                let store = PropertyStore::load(path)
                    .with_context(|| format!("加载属性文件失败: {}", path.display()))?;
                Ok(store.device_properties()?)
            },
            None => Ok(DeviceProperties::default()),
        }
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 设备属性文件路径
        #[arg(short, long)]
        properties: Option<PathBuf>,

        /// 锁定持有者名称
        #[arg(short, long)]
        owner: Option<String>,

        /// 默认日志过滤规则（如 info, stage_driver=debug）
        #[arg(short, long)]
        log_filter: Option<String>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置和属性文件
    Check,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Set {
                properties,
                owner,
                log_filter,
            } => Self::set_(properties, owner, log_filter),

            ConfigCommand::Get { key } => Self::get_(&key),

            ConfigCommand::Check => Self::check_(),
        }
    }

    fn set_(
        properties: Option<PathBuf>,
        owner: Option<String>,
        log_filter: Option<String>,
    ) -> Result<()> {
        let mut config = CliConfig::load()?;
        apply_set(&mut config, properties, owner, log_filter);
        config.save()?;
        Ok(())
    }

    fn get_(key: &str) -> Result<()> {
        let config = CliConfig::load()?;
        println!("{}", describe(&config, key));
        Ok(())
    }

    fn check_() -> Result<()> {
        let config = CliConfig::load()?;
        let path = config_file()?;

        println!("配置文件: {}", path.display());
        println!("{}", describe(&config, "all"));

        let properties = config.device_properties(None)?;
        properties.validate()?;
        println!(
            "✅ 属性有效: {} ({}), primary = {}",
            properties.device.name, properties.device.class, properties.remotes.primary
        );

        Ok(())
    }
}

fn apply_set(
    config: &mut CliConfig,
    properties: Option<PathBuf>,
    owner: Option<String>,
    log_filter: Option<String>,
) {
    if let Some(path) = properties {
        println!("✅ 设置属性文件: {}", path.display());
        config.properties = Some(path);
    }

    if let Some(owner) = owner {
        println!("✅ 设置锁定持有者: {}", owner);
        config.owner = Some(owner);
    }

    if let Some(filter) = log_filter {
        println!("✅ 设置日志过滤: {}", filter);
        config.log_filter = Some(filter);
    }
}

fn describe(config: &CliConfig, key: &str) -> String {
    fn show<T: std::fmt::Display>(value: Option<T>) -> String {
        value.map(|v| v.to_string()).unwrap_or_else(|| "(未设置)".to_string())
    }

    let properties = show(config.properties.as_ref().map(|p| p.display()));
    match key {
        "properties" => properties,
        "owner" => show(config.owner.as_ref()),
        "log_filter" => show(config.log_filter.as_ref()),
        _ => format!(
            "Stage CLI 配置:\n  属性文件: {}\n  持有者: {}\n  日志过滤: {}",
            properties,
            show(config.owner.as_ref()),
            show(config.log_filter.as_ref())
        ),
    }
}
