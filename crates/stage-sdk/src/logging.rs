//! 日志初始化
//!
//! 库内部只使用 `tracing` 宏记录日志，是否输出由应用决定。
//! 应用启动时调用一次 [`init_logger`]：
//!
//! ```rust,no_run
//! stage_sdk::init_logger("info").expect("logger");
//! ```

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 默认过滤规则
pub const DEFAULT_FILTER: &str = "info";

/// 日志初始化错误
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
}

/// 选择过滤规则：`RUST_LOG` 非空时优先，否则使用默认值
pub fn resolve_filter(env: Option<&str>, default_filter: &str) -> String {
    match env.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => default_filter.to_string(),
    }
}

/// 初始化全局日志
///
/// - 过滤规则优先取 `RUST_LOG`，未设置时使用 `default_filter`
/// - `log` crate 的记录同样转发到 tracing
///
/// # 错误
/// 过滤规则无法解析，或全局日志已经初始化过。
pub fn init_logger(default_filter: &str) -> Result<(), LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = resolve_filter(env.as_deref(), default_filter);
    let env_filter = EnvFilter::try_new(&filter).map_err(|e| LoggingError::InvalidFilter {
        filter: filter.clone(),
        reason: e.to_string(),
    })?;

    tracing_log::LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_filter() {
        assert_eq!(resolve_filter(None, "info"), "info");
        assert_eq!(resolve_filter(Some("  "), "info"), "info");
        assert_eq!(
            resolve_filter(Some("stage_driver=debug"), "info"),
            "stage_driver=debug"
        );
    }

    #[test]
    fn test_second_init_fails() {
        // 同一进程内只能初始化一次
        if init_logger(DEFAULT_FILTER).is_ok() {
            assert!(matches!(
                init_logger(DEFAULT_FILTER),
                Err(LoggingError::AlreadyInitialized(_))
            ));
        }
    }
}
