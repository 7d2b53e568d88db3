use std::fmt;
use thiserror::Error;

/// Termination signals the launcher reacts to and forwards to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    Interrupt,
    Terminate,
}

impl ProcessSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }

    #[cfg(unix)]
    pub fn as_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
        }
    }
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to send {signal} to process {pid}: {reason}")]
    SignalFailed {
        pid: u32,
        signal: ProcessSignal,
        reason: String,
    },
}

/// Deliver `signal` to `pid` verbatim, so the server can tell an interrupt
/// from a terminate request.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: ProcessSignal) -> Result<(), ProcessError> {
    use nix::sys::signal;
    use nix::unistd::Pid;

    tracing::debug!("Sending {} to pid {}", signal, pid);
    signal::kill(Pid::from_raw(pid as i32), signal.as_nix()).map_err(|e| {
        ProcessError::SignalFailed {
            pid,
            signal,
            reason: e.to_string(),
        }
    })
}
