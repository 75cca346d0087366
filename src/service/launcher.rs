use super::LogHandle;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::process::{Child, Command};

#[cfg(unix)]
use nix::sys::signal::{self, killpg, Signal};

/// Lifecycle of a spawned process.
///
/// ```text
/// NotStarted ──► Running ──► Exited(code)
///                   │
///                   └──────► Killed
/// ```
///
/// Transitions are monotonic: a terminal state is never left again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "code")]
pub enum ProcessState {
    NotStarted,
    Running,
    /// Exited on its own. `None` when it was ended by a signal we did not send.
    Exited(Option<i32>),
    /// Ended by the supervisor.
    Killed,
}

impl ProcessState {
    pub fn is_valid_transition(&self, to: ProcessState) -> bool {
        use ProcessState::*;
        match (self, to) {
            (NotStarted, Running) => true,
            (Running, Exited(_)) | (Running, Killed) => true,
            (s1, s2) if *s1 == s2 => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Killed)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::NotStarted => write!(f, "not started"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited(Some(code)) => write!(f, "exited({})", code),
            ProcessState::Exited(None) => write!(f, "exited(signal)"),
            ProcessState::Killed => write!(f, "killed"),
        }
    }
}

/// A fully rendered command line, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    /// Shell-quoted rendering, as written to the service log.
    pub fn render(&self) -> String {
        use shell_escape::escape;
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| escape(part.as_str().into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Point-in-time view of a [`ProcessHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub service_id: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub state: ProcessState,
    pub command: String,
}

/// One spawned process, owned by whoever tracks it.
///
/// Spawned with kill-on-drop: dropping a handle that is still running kills
/// the process.
#[derive(Debug)]
pub struct ProcessHandle {
    service_id: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    command: String,
    state: ProcessState,
    child: Child,
}

impl ProcessHandle {
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            service_id: self.service_id.clone(),
            pid: self.pid,
            started_at: self.started_at,
            state: self.state,
            command: self.command.clone(),
        }
    }

    fn transition(&mut self, to: ProcessState) {
        if self.state.is_valid_transition(to) {
            self.state = to;
        } else {
            tracing::debug!(
                "Ignoring process state change {} -> {} for '{}'",
                self.state,
                to,
                self.service_id
            );
        }
    }

    /// Non-blocking exit check. Reaps the process if it has exited.
    pub fn poll(&mut self) -> Result<ProcessState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if let Some(status) = self.child.try_wait()? {
            self.transition(ProcessState::Exited(status.code()));
        }
        Ok(self.state)
    }

    /// Wait for the process to exit on its own.
    pub async fn wait(&mut self) -> Result<ProcessState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        let status = self.child.wait().await?;
        self.transition(ProcessState::Exited(status.code()));
        Ok(self.state)
    }

    /// SIGKILL the process group and reap the process.
    pub async fn kill(&mut self) -> Result<ProcessState> {
        if self.poll()?.is_terminal() {
            return Ok(self.state);
        }

        self.signal_group(GroupSignal::Kill);
        self.child.wait().await?;
        self.transition(ProcessState::Killed);
        Ok(self.state)
    }

    /// SIGTERM the process group, then SIGKILL it if it is still alive after `grace`.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ProcessState> {
        if self.poll()?.is_terminal() {
            return Ok(self.state);
        }

        self.signal_group(GroupSignal::Terminate);
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(_)) => {
                tracing::debug!("Process of '{}' exited gracefully", self.service_id);
            }
            Ok(Err(e)) => {
                tracing::warn!("Error waiting for process of '{}': {}", self.service_id, e);
                self.signal_group(GroupSignal::Kill);
                self.child.wait().await?;
            }
            Err(_) => {
                tracing::warn!(
                    "Process of '{}' did not exit after SIGTERM (grace period: {:?}), sending SIGKILL",
                    self.service_id,
                    grace
                );
                self.signal_group(GroupSignal::Kill);
                self.child.wait().await?;
            }
        }
        self.transition(ProcessState::Killed);
        Ok(self.state)
    }

    #[cfg(unix)]
    fn signal_group(&mut self, which: GroupSignal) {
        let sig = match which {
            GroupSignal::Terminate => Signal::SIGTERM,
            GroupSignal::Kill => Signal::SIGKILL,
        };
        let Some(raw_pid) = self.pid else {
            return;
        };
        match crate::error::validate_pid(raw_pid, &self.service_id) {
            // The child leads its own process group, so its PID is the PGID.
            Ok(pid) => {
                if let Err(e) = killpg(pid, sig).or_else(|_| signal::kill(pid, sig)) {
                    tracing::debug!(
                        "Failed to send {} to '{}' (PID {}): {}",
                        sig,
                        self.service_id,
                        raw_pid,
                        e
                    );
                }
            }
            Err(e) => tracing::error!("{}", e),
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _which: GroupSignal) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("Failed to kill '{}': {}", self.service_id, e);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Spawns service processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        ProcessLauncher
    }

    /// Start `command` for `service_id` with stdout and stderr both appended to `log`.
    ///
    /// The child gets its own process group, so a terminal signal delivered to
    /// the supervisor does not reach it; forwarding shutdown is the supervisor's
    /// job. Spawn failures are returned as [`Error::Launch`] and never retried.
    pub fn launch(
        &self,
        service_id: &str,
        command: &LaunchCommand,
        log: &LogHandle,
    ) -> Result<ProcessHandle> {
        let (stdout, stderr) = log.stdio()?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| {
            tracing::error!(
                "Failed to spawn process for '{}': {} (command: {})",
                service_id,
                source,
                command.render()
            );
            Error::Launch {
                service: service_id.to_string(),
                source,
            }
        })?;

        let mut handle = ProcessHandle {
            service_id: service_id.to_string(),
            pid: child.id(),
            started_at: Utc::now(),
            command: command.render(),
            state: ProcessState::NotStarted,
            child,
        };
        handle.transition(ProcessState::Running);

        tracing::debug!(
            "Spawned '{}' (PID {:?}): {}",
            service_id,
            handle.pid,
            handle.command
        );
        Ok(handle)
    }
}
