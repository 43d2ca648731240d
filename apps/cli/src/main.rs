//! # Stage CLI
//!
//! Command-line interface for supervised motion stages.
//!
//! ## 双模式架构
//!
//! ### One-shot 模式（推荐用于脚本）
//!
//! ```bash
//! # 配置默认属性文件
//! stage-cli config set --properties /etc/stage/slit-x.toml
//!
//! # 执行操作（内部：启动设备 -> 等待就绪 -> 移动 -> 关闭）
//! stage-cli move --relative 1.5 --unit mm
//! stage-cli exec readLimitPositions
//! ```
//!
//! ### REPL 模式（推荐用于调试）
//!
//! ```bash
//! $ stage-cli shell
//! stage> setPower on
//! stage> moveRelative 250
//! stage> readStatus
//! stage> exit
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use stage_sdk::DeviceProperties;
use std::path::PathBuf;
use std::time::Duration;

mod commands;
mod modes;

use commands::{CliConfig, ConfigCommand, MoveCommand, StopCommand};
use modes::oneshot::OneShotMode;
use modes::repl::run_repl;

/// Stage CLI - 运动台命令行工具
#[derive(Parser, Debug)]
#[command(name = "stage-cli")]
#[command(about = "Command-line interface for supervised motion stages", long_about = None)]
#[command(version)]
struct Cli {
    /// 设备属性文件（覆盖配置）
    #[arg(short, long)]
    properties: Option<PathBuf>,

    /// 日志过滤规则（RUST_LOG 优先）
    #[arg(long)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 查询设备状态
    Status {
        /// 输出 JSON
        #[arg(long)]
        json: bool,
    },

    /// 移动到目标位置
    Move {
        #[command(flatten)]
        args: MoveCommand,
    },

    /// 停止运动
    Stop {
        #[command(flatten)]
        args: StopCommand,
    },

    /// 清除故障并复位
    Reset,

    /// 按名称执行设备操作（如 setUnit mm）
    Exec {
        /// 操作名称
        operation: String,

        /// 操作参数
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// 监控设备状态
    Monitor {
        /// 刷新间隔（ms）
        #[arg(short, long, default_value_t = 500)]
        interval: u64,
    },

    /// 启动交互式 Shell（REPL 模式）
    Shell,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load()?;

    let filter = cli
        .log_filter
        .as_deref()
        .or(config.log_filter.as_deref())
        .unwrap_or(stage_sdk::logging::DEFAULT_FILTER);
    stage_sdk::init_logger(filter)?;

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),
        command => {
            let properties = config.device_properties(cli.properties.as_deref())?;
            run_device(command, properties, &config)
        },
    }
}

/// 启动设备并执行一条非配置命令
fn run_device(command: Commands, properties: DeviceProperties, config: &CliConfig) -> Result<()> {
    let mode = OneShotMode::new(properties)?;

    let result = match command {
        Commands::Config(cmd) => cmd.execute(),
        Commands::Status { json } => mode.status(json),
        Commands::Move { args } => mode.move_to(args),
        Commands::Stop { args } => mode.stop(args),
        Commands::Reset => mode.reset(),
        Commands::Exec { operation, args } => {
            let code = mode.exec(&operation, &args);
            mode.close();
            std::process::exit(code);
        },
        Commands::Monitor { interval } => mode.monitor(Duration::from_millis(interval.max(10))),
        Commands::Shell => run_repl(mode.device(), &config.owner()),
    };

    mode.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_move_with_negative_distance() {
        let cli = Cli::try_parse_from(["stage-cli", "move", "--relative", "-2.5", "--unit", "mm"])
            .unwrap();
        match cli.command {
            Commands::Move { args } => {
                assert_eq!(args.relative, Some(-2.5));
                assert_eq!(args.unit.as_deref(), Some("mm"));
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_move_rejects_both_targets() {
        assert!(
            Cli::try_parse_from(["stage-cli", "move", "--relative", "1", "--absolute", "2"])
                .is_err()
        );
    }

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from([
            "stage-cli",
            "--properties",
            "slit.toml",
            "exec",
            "setMoveParameters",
            "100",
            "200",
            "300",
        ])
        .unwrap();
        assert_eq!(cli.properties, Some(PathBuf::from("slit.toml")));
        match cli.command {
            Commands::Exec { operation, args } => {
                assert_eq!(operation, "setMoveParameters");
                assert_eq!(args, ["100", "200", "300"]);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
