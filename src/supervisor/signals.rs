//! Termination signal sources handed to [`Supervisor::supervise`].
//!
//! [`Supervisor::supervise`]: super::Supervisor::supervise

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::process::ProcessSignal;

/// Stream of shutdown requests.
#[async_trait]
pub trait SignalSource: Send {
    /// Next request, `None` once the source is closed for good.
    async fn recv(&mut self) -> Option<ProcessSignal>;
}

/// SIGINT and SIGTERM of the launcher process itself (Ctrl+C on Windows).
/// Handlers are registered once, when this value is created.
pub struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl OsSignals {
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(windows)]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }
}

#[async_trait]
impl SignalSource for OsSignals {
    #[cfg(unix)]
    async fn recv(&mut self) -> Option<ProcessSignal> {
        tokio::select! {
            v = self.interrupt.recv() => v.map(|_| ProcessSignal::Interrupt),
            v = self.terminate.recv() => v.map(|_| ProcessSignal::Terminate),
        }
    }

    #[cfg(windows)]
    async fn recv(&mut self) -> Option<ProcessSignal> {
        self.ctrl_c.recv().await.map(|_| ProcessSignal::Interrupt)
    }
}

/// Channel-driven source, for embedding the supervisor or driving it in tests.
#[async_trait]
impl SignalSource for mpsc::Receiver<ProcessSignal> {
    async fn recv(&mut self) -> Option<ProcessSignal> {
        mpsc::Receiver::recv(self).await
    }
}
