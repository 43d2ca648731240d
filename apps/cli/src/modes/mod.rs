//! 运行模式
//!
//! 支持两种模式：
//! - One-shot 模式：每次命令独立启动设备
//! - REPL 模式：交互式 Shell，设备在会话内常驻

pub mod oneshot;
pub mod repl;
