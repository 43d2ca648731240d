//! 命令上下文定时线程
//!
//! 周期性地执行待恢复/自动初始化与硬件轮询，
//! 两者都在命令锁内运行，与外部命令串行。

use crate::device_core::{DeviceCore, PollOutcome};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use stage_driver::DriverError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) struct Ticker {
    shutdown: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    pub(crate) fn start(core: Arc<DeviceCore>, period: Duration) -> Result<Self, DriverError> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("stage-ticker".to_string())
            .spawn(move || {
                info!("Ticker for {} started (period {:?})", core.name, period);
                loop {
                    match shutdown_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {},
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    core.tick();
                    match core.poll() {
                        PollOutcome::FaultLatched => warn!("{} latched a fault", core.name),
                        PollOutcome::MotionComplete => debug!("{} motion complete", core.name),
                        _ => {},
                    }
                }
                info!("Ticker for {} stopped", core.name);
            })
            .map_err(|e| DriverError::Thread(format!("failed to spawn ticker: {e}")))?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("Ticker thread panicked");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
