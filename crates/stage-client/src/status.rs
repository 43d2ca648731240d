//! 状态快照与查询结果

use serde::Serialize;
use stage_driver::{FaultRecord, MetricsSnapshot};
use std::fmt;

/// 锁定状态
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LockStatus {
    pub locked: bool,
    pub owner: Option<String>,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.owner, self.locked) {
            (Some(owner), true) => write!(f, "locked by {owner}"),
            _ => f.write_str("unlocked"),
        }
    }
}

/// 限位位置（当前单位）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitPositions {
    pub negative: f64,
    pub positive: f64,
}

impl fmt::Display for LimitPositions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.negative, self.positive)
    }
}

/// 单个远程的自检结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteCheck {
    pub remote: String,
    pub ok: bool,
    pub firmware: String,
    pub firmware_supported: bool,
    pub detail: String,
}

/// 自检报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfCheckReport {
    pub remotes: Vec<RemoteCheck>,
}

impl SelfCheckReport {
    /// 所有远程自检通过且固件版本满足要求
    pub fn passed(&self) -> bool {
        self.remotes
            .iter()
            .all(|check| check.ok && check.firmware_supported)
    }
}

impl fmt::Display for SelfCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.passed() { "PASSED" } else { "FAILED" })?;
        for check in &self.remotes {
            write!(
                f,
                "; {}: {} (firmware {}{})",
                check.remote,
                check.detail,
                check.firmware,
                if check.firmware_supported { "" } else { ", unsupported" }
            )?;
        }
        Ok(())
    }
}

/// 设备状态快照（`readStatus` 的 JSON 内容）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub device: String,
    pub class: String,
    pub state: String,
    pub status: String,
    pub healthy: bool,
    pub reachable: bool,
    pub pending_restore: bool,
    pub restore_retries: u32,
    pub fault: FaultRecord,
    pub lock: LockStatus,
    pub power: bool,
    pub brake_engaged: bool,
    pub position: Option<f64>,
    pub unit: String,
    pub simulated: bool,
    pub metrics: MetricsSnapshot,
}

impl StatusSnapshot {
    /// 序列化为 JSON
    pub fn to_json(&self) -> String {
        // 只包含基本类型，序列化不会失败
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_status_display() {
        assert_eq!(LockStatus::default().to_string(), "unlocked");
        let locked = LockStatus {
            locked: true,
            owner: Some("maintenance".to_string()),
        };
        assert_eq!(locked.to_string(), "locked by maintenance");
    }

    #[test]
    fn test_self_check_report() {
        let mut report = SelfCheckReport {
            remotes: vec![RemoteCheck {
                remote: "stage/motion".to_string(),
                ok: true,
                firmware: "2.4.1".to_string(),
                firmware_supported: true,
                detail: "all checks passed".to_string(),
            }],
        };
        assert!(report.passed());
        assert!(report.to_string().starts_with("PASSED"));

        report.remotes[0].firmware_supported = false;
        assert!(!report.passed());
        assert!(report.to_string().contains("unsupported"));
    }
}
