//! 命令定义和实现

pub mod config;
pub mod r#move;
pub mod stop;

pub use config::{CliConfig, ConfigCommand};
pub use r#move::MoveCommand;
pub use stop::StopCommand;
