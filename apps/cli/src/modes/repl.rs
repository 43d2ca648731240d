//! REPL 模式
//!
//! 专用输入线程持有 rustyline 编辑器（保留历史），
//! 通过 channel 把输入行交给主线程执行，主线程只负责调度设备操作。

use anyhow::Result;
use crossbeam_channel::{Receiver, bounded};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use stage_sdk::{CommandResult, Operation, StageDevice, StageError};
use std::thread;

const HISTORY_FILE: &str = ".stage_history";

/// Ctrl+C 在输入线程中被转换成这个标记
const INTERRUPT: &str = "\u{3}";

/// REPL 输入（专用输入线程）
pub struct ReplInput {
    command_rx: Receiver<String>,
    _input_thread: thread::JoinHandle<Result<()>>,
}

impl ReplInput {
    /// 创建专用输入线程
    pub fn new(prompt: String) -> Result<Self> {
        let (command_tx, command_rx) = bounded::<String>(10);

        let input_thread = thread::Builder::new().name("stage-repl-input".into()).spawn(
            move || -> Result<()> {
                let mut rl = Editor::<(), DefaultHistory>::new()
                    .map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;
                rl.load_history(HISTORY_FILE).ok(); // 首次运行没有历史文件

                loop {
                    match rl.readline(&prompt) {
                        Ok(line) => {
                            let line = line.trim().to_string();
                            if line.is_empty() {
                                continue;
                            }
                            let _ = rl.add_history_entry(line.clone());

                            let exit = is_exit(&line);
                            if command_tx.send(line).is_err() || exit {
                                break;
                            }
                        },
                        Err(ReadlineError::Interrupted) => {
                            println!("^C");
                            if command_tx.send(INTERRUPT.to_string()).is_err() {
                                break;
                            }
                        },
                        Err(ReadlineError::Eof) => break,
                        Err(err) => {
                            eprintln!("Error: {:?}", err);
                            break;
                        },
                    }
                }

                rl.save_history(HISTORY_FILE).ok();
                Ok(())
            },
        )?;

        Ok(Self {
            command_rx,
            _input_thread: input_thread,
        })
    }

    /// 阻塞等待下一行输入，输入线程退出后返回 None
    pub fn recv_command(&self) -> Option<String> {
        self.command_rx.recv().ok()
    }
}

fn is_exit(line: &str) -> bool {
    matches!(line, "exit" | "quit")
}

/// 解析后的一行输入
#[derive(Debug, PartialEq)]
pub enum ReplLine<'a> {
    Exit,
    Help,
    Interrupt,
    Events,
    Metrics,
    Operations,
    Operation { name: &'a str, args: Vec<&'a str> },
}

/// 解析输入行
pub fn parse_line(line: &str) -> Option<ReplLine<'_>> {
    if line == INTERRUPT {
        return Some(ReplLine::Interrupt);
    }

    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    let parsed = match name {
        "exit" | "quit" => ReplLine::Exit,
        "help" => ReplLine::Help,
        "events" => ReplLine::Events,
        "metrics" => ReplLine::Metrics,
        "ops" => ReplLine::Operations,
        _ => ReplLine::Operation {
            name,
            args: parts.collect(),
        },
    };
    Some(parsed)
}

/// 执行一条设备操作
///
/// `lock`/`unlock` 省略持有者时使用配置中的持有者。
pub fn run_operation(device: &StageDevice, owner: &str, name: &str, args: &[&str]) -> CommandResult {
    let operation = match name.parse::<Operation>() {
        Ok(operation) => operation,
        Err(err) => return StageError::from(err).into(),
    };
    if matches!(operation, Operation::Lock | Operation::Unlock) && args.is_empty() {
        device.execute_op(operation, &[owner])
    } else {
        device.execute_op(operation, args)
    }
}

/// 运行 REPL
pub fn run_repl(device: &StageDevice, owner: &str) -> Result<()> {
    println!("Stage CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
    println!("设备: {} ({})", device.name(), device.status_text());
    println!("输入 'help' 查看帮助，'exit' 退出");
    println!();

    let input = ReplInput::new(format!("{}> ", device.name()))?;

    while let Some(line) = input.recv_command() {
        let Some(parsed) = parse_line(&line) else {
            continue;
        };

        match parsed {
            ReplLine::Exit => {
                println!("👋 再见！");
                break;
            },
            ReplLine::Help => print_help(),
            ReplLine::Interrupt => {
                eprintln!("🛑 Ctrl+C: 停止运动");
                if let Err(err) = device.stop() {
                    eprintln!("❌ {}", err);
                }
            },
            ReplLine::Events => {
                for entry in device.events() {
                    println!("{}", entry);
                }
            },
            ReplLine::Metrics => println!("{:#?}", device.metrics()),
            ReplLine::Operations => {
                let names: Vec<&str> =
                    device.allowed_operations().iter().map(|op| op.name()).collect();
                println!("{} 允许: {}", device.state(), names.join(" "));
            },
            ReplLine::Operation { name, args } => {
                let result = run_operation(device, owner, name, &args);
                if result.is_ok() {
                    println!("✅ {}", result);
                } else {
                    eprintln!("❌ {}", result);
                }
            },
        }
    }

    Ok(())
}

fn print_help() {
    println!("设备操作（名称不区分大小写）:");
    for op in Operation::ALL {
        println!("  {:<24} {:?}", op.name(), op.category());
    }
    println!();
    println!("内置命令:");
    println!("  ops                      当前状态下允许的操作");
    println!("  events                   事件日志");
    println!("  metrics                  监控计数");
    println!("  help                     显示帮助");
    println!("  exit / quit              退出");
    println!();
    println!("快捷键:");
    println!("  Ctrl+C                   停止运动");
    println!("  Ctrl+D                   退出");
}
