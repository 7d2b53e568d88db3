//! Process supervisor - owns the one MCP server child for its whole life
//!
//! - spawns it with all three standard streams piped
//! - relays launcher stdin → child stdin and child stdout/stderr → launcher
//!   stdout/stderr, unmodified
//! - forwards SIGINT/SIGTERM verbatim, then force-kills once if the child is
//!   still alive after the grace period
//! - reports the exit so the launcher can mirror the child's exit status

pub mod process;
pub mod relay;
pub mod signals;
pub mod state_machine;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::LauncherError;
use crate::runner::hide_console_window;
use process::ProcessSignal;
use relay::{relay, InputSource, OutputSink};
use signals::SignalSource;
use state_machine::{State, StateMachine};

/// Wait between forwarding a termination signal and the forced kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(5000);

/// How long output relays may keep draining after the child exited. A
/// grandchild that inherited the pipes would otherwise hold them open forever.
const STREAM_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Merged over the inherited environment.
    pub env: Vec<(String, String)>,
}

/// How the server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` when the process died from a signal.
    pub code: Option<i32>,
    /// Terminating signal number (unix only).
    pub signal: Option<i32>,
    /// Signal the launcher forwarded before the exit, if any.
    pub requested: Option<ProcessSignal>,
    pub force_killed: bool,
}

impl ExitOutcome {
    /// Status for the launcher's own exit.
    ///
    /// The child's exit code wins when it reported one. A signal death the
    /// launcher asked for (including the forced kill) is a clean shutdown.
    /// An unrequested signal death follows the shell convention `128 + n`.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.requested, self.signal) {
            (Some(code), _, _) => code,
            (None, Some(_), _) => 0,
            (None, None, Some(sig)) => 128 + sig,
            (None, None, None) => 1,
        }
    }
}

/// The supervised process: pid, lifecycle state, last forwarded signal.
/// Only [`Supervisor`] touches it.
struct ProcessHandle {
    child: Option<Child>,
    pid: Option<u32>,
    machine: StateMachine,
    last_signal: Option<ProcessSignal>,
}

pub struct Supervisor {
    grace_period: Duration,
    handle: ProcessHandle,
    kill_deadline: Option<Instant>,
    force_kills: u32,
    stdin_source: Option<InputSource>,
    stdout_sink: Option<OutputSink>,
    stderr_sink: Option<OutputSink>,
    output_relays: Vec<JoinHandle<()>>,
    input_relay: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            handle: ProcessHandle {
                child: None,
                pid: None,
                machine: StateMachine::new(),
                last_signal: None,
            },
            kill_deadline: None,
            force_kills: 0,
            stdin_source: None,
            stdout_sink: None,
            stderr_sink: None,
            output_relays: Vec::new(),
            input_relay: None,
        }
    }

    /// Replace the launcher's own stdout/stderr as relay targets.
    pub fn with_output(mut self, stdout: OutputSink, stderr: OutputSink) -> Self {
        self.stdout_sink = Some(stdout);
        self.stderr_sink = Some(stderr);
        self
    }

    /// Replace the launcher's own stdin as the child's input.
    pub fn with_input(mut self, stdin: InputSource) -> Self {
        self.stdin_source = Some(stdin);
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn state(&self) -> State {
        self.handle.machine.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid
    }

    pub fn last_signal(&self) -> Option<ProcessSignal> {
        self.handle.last_signal
    }

    /// Number of forced kills issued so far (0 or 1).
    pub fn force_kills(&self) -> u32 {
        self.force_kills
    }

    /// Spawn the server and wire its streams. Returns the pid.
    pub fn start(&mut self, command: &ServerCommand) -> Result<u32, LauncherError> {
        if !self.handle.machine.can_transition(&State::Running) {
            return Err(LauncherError::AlreadyStarted);
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        hide_console_window(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| LauncherError::SpawnError {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);

        // ── stdout / stderr → launcher ──
        if let Some(out) = child.stdout.take() {
            let sink = self
                .stdout_sink
                .take()
                .unwrap_or_else(|| Box::new(tokio::io::stdout()) as OutputSink);
            self.output_relays.push(tokio::spawn(relay("stdout", out, sink)));
        }
        if let Some(err) = child.stderr.take() {
            let sink = self
                .stderr_sink
                .take()
                .unwrap_or_else(|| Box::new(tokio::io::stderr()) as OutputSink);
            self.output_relays.push(tokio::spawn(relay("stderr", err, sink)));
        }

        // ── launcher → stdin ──
        if let Some(child_stdin) = child.stdin.take() {
            let source = self
                .stdin_source
                .take()
                .unwrap_or_else(|| Box::new(tokio::io::stdin()) as InputSource);
            self.input_relay = Some(tokio::spawn(relay("stdin", source, child_stdin)));
        }

        self.handle
            .machine
            .transition(State::Running)
            .map_err(|_| LauncherError::AlreadyStarted)?;
        self.handle.child = Some(child);
        self.handle.pid = Some(pid);
        tracing::info!("Server started with PID {}: {} {:?}", pid, command.program, command.args);
        Ok(pid)
    }

    /// Forward `signal` and arm the kill deadline. Only the first request of
    /// a shutdown starts an episode; later ones are ignored. Returns whether
    /// this call started the episode.
    pub fn terminate(&mut self, signal: ProcessSignal) -> bool {
        match self.handle.machine.state {
            State::Running => {}
            State::Terminating => {
                tracing::info!("{} received, shutdown already in progress", signal);
                return false;
            }
            other => {
                tracing::debug!("{} ignored in state {:?}", signal, other);
                return false;
            }
        }

        tracing::info!(
            "{} received, stopping server (pid {:?}, grace {:?})",
            signal,
            self.handle.pid,
            self.grace_period
        );
        self.deliver(signal);
        if let Err(e) = self.handle.machine.transition(State::Terminating) {
            tracing::error!("{}", e);
            return false;
        }
        self.handle.last_signal = Some(signal);
        self.kill_deadline = Some(Instant::now() + self.grace_period);
        true
    }

    #[cfg(unix)]
    fn deliver(&mut self, signal: ProcessSignal) {
        if let Some(pid) = self.handle.pid {
            if let Err(e) = process::send_signal(pid, signal) {
                tracing::warn!("{}", e);
            }
        }
    }

    /// No per-process signal delivery here; ending the process is the only
    /// request we can make.
    #[cfg(not(unix))]
    fn deliver(&mut self, signal: ProcessSignal) {
        if let Some(child) = self.handle.child.as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to stop server on {}: {}", signal, e);
            }
        }
    }

    fn force_kill(&mut self) {
        self.kill_deadline = None;
        if self.handle.machine.is_exited() {
            return;
        }
        tracing::warn!(
            "Server did not exit within {:?}, killing pid {:?}",
            self.grace_period,
            self.handle.pid
        );
        if let Some(child) = self.handle.child.as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::error!("Force kill failed: {}", e);
            }
        }
        self.force_kills += 1;
    }

    /// Block until the server exits, handling termination requests from
    /// `signals` on the way.
    pub async fn supervise<S>(&mut self, signals: &mut S) -> Result<ExitOutcome, LauncherError>
    where
        S: SignalSource + ?Sized,
    {
        if self.handle.child.is_none() {
            return Err(LauncherError::NotRunning);
        }

        let mut signals_open = true;
        let status = loop {
            let deadline = self.kill_deadline;
            let Some(child) = self.handle.child.as_mut() else {
                return Err(LauncherError::NotRunning);
            };

            // exit wins a tie with the kill deadline
            tokio::select! {
                biased;
                status = child.wait() => break status?,
                sig = signals.recv(), if signals_open => match sig {
                    Some(sig) => {
                        self.terminate(sig);
                    }
                    None => signals_open = false,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.force_kill();
                }
            }
        };

        // Exit observed: the deadline must not fire any more.
        self.kill_deadline = None;
        let code = status.code();
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal: Option<i32> = None;

        if let Err(e) = self.handle.machine.transition(State::Exited(code)) {
            tracing::error!("{}", e);
        }
        self.handle.child = None;
        tracing::info!("Server exited with {}", status);

        self.drain_relays().await;

        Ok(ExitOutcome {
            code,
            signal,
            requested: self.handle.last_signal,
            force_killed: self.force_kills > 0,
        })
    }

    /// [`start`](Self::start) then [`supervise`](Self::supervise).
    pub async fn run<S>(
        &mut self,
        command: &ServerCommand,
        signals: &mut S,
    ) -> Result<ExitOutcome, LauncherError>
    where
        S: SignalSource + ?Sized,
    {
        self.start(command)?;
        self.supervise(signals).await
    }

    async fn drain_relays(&mut self) {
        for mut task in self.output_relays.drain(..) {
            if tokio::time::timeout(STREAM_DRAIN_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!("Output still open {:?} after exit, detaching", STREAM_DRAIN_TIMEOUT);
                task.abort();
            }
        }
        if let Some(task) = self.input_relay.take() {
            task.abort();
        }
    }
}
