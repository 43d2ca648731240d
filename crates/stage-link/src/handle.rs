//! 可替换的连接句柄
//!
//! `ProxyHandle` 是"是否有可用链路"的基本单位，由命令路径与后台监控线程共享。
//!
//! # 同步机制
//!
//! - `get()`: `ArcSwapOption::load_full`，无锁、不阻塞
//! - `reset()` / `rebuild()`: 由同一把互斥锁串行化
//!
//! 新连接在完成存活探测之后才会发布，发布是一次原子指针替换，
//! 并发读取方只会看到旧连接或新连接。旧连接由仍持有它的一方负责释放。

use crate::{LinkError, RemoteConnector, RemoteDeviceProxy};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// 已发布的连接
///
/// 持有远程连接以及配置的单次调用超时。
pub struct Link {
    proxy: Arc<dyn RemoteDeviceProxy>,
    timeout: Duration,
    generation: u64,
}

impl Link {
    /// 远程名称
    pub fn remote(&self) -> &str {
        self.proxy.name()
    }

    /// 单次调用超时
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 连接代数（每次成功 rebuild 加 1，从 1 开始）
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 存活探测
    pub fn ping(&self, timeout: Duration) -> Result<(), LinkError> {
        self.proxy.ping(timeout)
    }

    /// 以 JSON 值调用远程命令
    pub fn invoke(&self, command: &str, args: Value) -> Result<Value, LinkError> {
        self.proxy.invoke(command, args, self.timeout)
    }

    /// 以强类型参数/返回值调用远程命令
    pub fn call<A, T>(&self, command: &str, args: A) -> Result<T, LinkError>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        let args = serde_json::to_value(args).map_err(|e| LinkError::MalformedReply {
            remote: self.remote().to_string(),
            command: command.to_string(),
            detail: format!("cannot encode arguments: {e}"),
        })?;
        let reply = self.invoke(command, args)?;
        serde_json::from_value(reply).map_err(|e| LinkError::MalformedReply {
            remote: self.remote().to_string(),
            command: command.to_string(),
            detail: e.to_string(),
        })
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("remote", &self.remote())
            .field("timeout", &self.timeout)
            .field("generation", &self.generation)
            .finish()
    }
}

/// `rebuild` 成功的结果
#[derive(Debug, Clone)]
pub struct Rebuilt {
    /// 新发布的连接
    pub link: Arc<Link>,
    /// 是否为重连（此前至少成功连接过一次）
    pub reconnect: bool,
}

/// 连接句柄
pub struct ProxyHandle {
    remote: String,
    call_timeout: Duration,
    current: ArcSwapOption<Link>,
    swap_lock: Mutex<()>,
    generation: AtomicU64,
}

impl ProxyHandle {
    /// 创建空句柄
    ///
    /// # 参数
    /// - `remote`: 远程名称
    /// - `call_timeout`: 发布后连接的单次调用超时
    pub fn new(remote: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            remote: remote.into(),
            call_timeout,
            current: ArcSwapOption::empty(),
            swap_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// 远程名称
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// 当前连接（可能为空），不阻塞
    pub fn get(&self) -> Option<Arc<Link>> {
        self.current.load_full()
    }

    /// 当前是否持有连接
    pub fn is_connected(&self) -> bool {
        self.current.load().is_some()
    }

    /// 是否曾经成功连接过
    pub fn ever_connected(&self) -> bool {
        self.generation.load(Ordering::Acquire) > 0
    }

    /// `link` 是否仍是当前发布的连接
    pub fn is_current(&self, link: &Link) -> bool {
        self.current
            .load()
            .as_ref()
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), link))
    }

    /// 清空句柄，返回被移除的连接
    pub fn reset(&self) -> Option<Arc<Link>> {
        let _guard = self.swap_lock.lock();
        let previous = self.current.swap(None);
        if previous.is_some() {
            debug!("Handle for {} reset", self.remote);
        }
        previous
    }

    /// 仅当 `link` 仍是当前连接时清空
    ///
    /// 命令路径在一个旧连接上失败时使用，避免误清掉监控线程刚发布的新连接。
    pub fn reset_if_current(&self, link: &Link) -> bool {
        let _guard = self.swap_lock.lock();
        if self.is_current(link) {
            self.current.store(None);
            debug!("Handle for {} reset after failure", self.remote);
            true
        } else {
            false
        }
    }

    /// 重新建立连接
    ///
    /// 连接并进行一次有超时的存活探测，成功后原子发布。
    ///
    /// # 错误
    /// 连接或探测失败时返回 `LinkError`，此时原有句柄保持不变。
    pub fn rebuild(
        &self,
        connector: &dyn RemoteConnector,
        timeout: Duration,
    ) -> Result<Rebuilt, LinkError> {
        let _guard = self.swap_lock.lock();

        let proxy = connector.connect(&self.remote, timeout)?;
        proxy.set_timeout(self.call_timeout);
        proxy.ping(timeout)?;

        let previous = self.generation.fetch_add(1, Ordering::AcqRel);
        let link = Arc::new(Link {
            proxy,
            timeout: self.call_timeout,
            generation: previous + 1,
        });
        self.current.store(Some(link.clone()));

        info!(
            "Connected to {} (generation {}, call timeout {:?})",
            self.remote,
            previous + 1,
            self.call_timeout
        );

        Ok(Rebuilt {
            link,
            reconnect: previous > 0,
        })
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("remote", &self.remote)
            .field("connected", &self.is_connected())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimConnector;
    use rand::Rng;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn test_empty_handle() {
        let handle = ProxyHandle::new("stage/motion", Duration::from_millis(800));
        assert!(handle.get().is_none());
        assert!(!handle.is_connected());
        assert!(!handle.ever_connected());
        assert!(handle.reset().is_none());
    }

    #[test]
    fn test_rebuild_publishes_link() {
        let connector = SimConnector::new();
        let handle = ProxyHandle::new("stage/motion", Duration::from_millis(800));

        let rebuilt = handle.rebuild(&connector, TIMEOUT).unwrap();
        assert!(!rebuilt.reconnect);
        assert_eq!(rebuilt.link.generation(), 1);
        assert_eq!(rebuilt.link.timeout(), Duration::from_millis(800));

        let link = handle.get().unwrap();
        assert!(handle.is_current(&link));
        assert_eq!(link.remote(), "stage/motion");

        // 第二次 rebuild 视为重连
        let rebuilt = handle.rebuild(&connector, TIMEOUT).unwrap();
        assert!(rebuilt.reconnect);
        assert!(!handle.is_current(&link));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_handle() {
        let connector = SimConnector::new();
        let handle = ProxyHandle::new("stage/motion", Duration::from_millis(800));
        let first = handle.rebuild(&connector, TIMEOUT).unwrap().link;

        connector.stage("stage/motion").set_reachable(false);
        let err = handle.rebuild(&connector, TIMEOUT).unwrap_err();
        assert!(err.is_connection_failure());

        // 原有句柄保持不变
        let current = handle.get().unwrap();
        assert!(Arc::ptr_eq(&first, &current));
    }

    #[test]
    fn test_reset_if_current_ignores_stale_link() {
        let connector = SimConnector::new();
        let handle = ProxyHandle::new("stage/motion", Duration::from_millis(800));
        let old = handle.rebuild(&connector, TIMEOUT).unwrap().link;
        let new = handle.rebuild(&connector, TIMEOUT).unwrap().link;

        assert!(!handle.reset_if_current(&old));
        assert!(handle.is_current(&new));

        assert!(handle.reset_if_current(&new));
        assert!(handle.get().is_none());
    }

    #[test]
    fn test_concurrent_readers_see_whole_links() {
        let connector = Arc::new(SimConnector::new());
        let handle = Arc::new(ProxyHandle::new("stage/motion", Duration::from_millis(800)));

        let writer = {
            let handle = handle.clone();
            let connector = connector.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..200 {
                    if rng.gen_bool(0.3) {
                        handle.reset();
                    } else {
                        handle.rebuild(connector.as_ref(), TIMEOUT).unwrap();
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || {
                    for _ in 0..2000 {
                        if let Some(link) = handle.get() {
                            // 读取到的连接必须完整可用
                            assert!(link.generation() >= 1);
                            assert_eq!(link.remote(), "stage/motion");
                            link.ping(TIMEOUT).unwrap();
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
