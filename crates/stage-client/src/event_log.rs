//! 设备事件日志
//!
//! 内存中保留最近的操作、状态转换与故障记录，供 `exportLogs` 导出。
//! 超出容量时丢弃最旧的记录。

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// 默认容量
pub const DEFAULT_CAPACITY: usize = 1024;

/// 事件级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
        })
    }
}

/// 单条事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEntry {
    /// Unix 时间戳（毫秒）
    pub timestamp_ms: u64,
    pub level: EventLevel,
    pub message: String,
}

impl fmt::Display for EventEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:03} {:<5} {}",
            self.timestamp_ms / 1000,
            self.timestamp_ms % 1000,
            self.level,
            self.message
        )
    }
}

/// 有界事件日志
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<VecDeque<EventEntry>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// 追加一条事件
    pub fn record(&self, level: EventLevel, message: impl Into<String>) {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(EventEntry {
            timestamp_ms,
            level,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(EventLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(EventLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(EventLevel::Error, message);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前所有事件（按时间顺序）
    pub fn entries(&self) -> Vec<EventEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// 以文本形式导出，返回写入的条数
    pub fn export<P: AsRef<Path>>(&self, path: P) -> io::Result<usize> {
        let entries = self.entries();
        let mut writer = BufWriter::new(File::create(path)?);
        for entry in &entries {
            writeln!(writer, "{entry}")?;
        }
        writer.flush()?;
        Ok(entries.len())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_capacity() {
        let log = EventLog::new(3);
        for i in 0..5 {
            log.info(format!("event {i}"));
        }
        let messages: Vec<_> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_entry_format() {
        let entry = EventEntry {
            timestamp_ms: 1_700_000_000_042,
            level: EventLevel::Warn,
            message: "restore retry".to_string(),
        };
        assert_eq!(entry.to_string(), "1700000000.042 WARN  restore retry");
    }

    #[test]
    fn test_export() {
        let log = EventLog::default();
        log.info("moveRelative ok");
        log.error("Fault latched");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.log");
        assert_eq!(log.export(&path).unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO  moveRelative ok"));
        assert!(lines[1].contains("ERROR Fault latched"));
    }
}
