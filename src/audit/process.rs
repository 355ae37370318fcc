//! Supervised audit processes.
//!
//! [`AuditLauncher`] starts one isolated process per attempt and hands back an
//! [`AuditSession`] that owns it. The engine drives the session through its
//! lifecycle; sessions only need to know how to collect a report, report
//! whether the process is alive, and terminate it.
//!
//! On unix every audit runs as the leader of its own process group, so helper
//! processes it starts (the browser) are signalled together with it.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;

use super::error::AuditError;

/// How a session's process ended when termination was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Process had already exited
    AlreadyExited,
    /// Process exited after the graceful signal
    Graceful,
    /// Process had to be killed
    Forced,
    /// Neither signal could be delivered
    Failed(String),
}

/// Starts audit processes.
#[async_trait]
pub trait AuditLauncher: Send + Sync {
    /// Spawn an isolated audit process for `url`.
    async fn launch(&self, url: &str) -> Result<Box<dyn AuditSession>, AuditError>;
}

/// One running audit process.
#[async_trait]
pub trait AuditSession: Send {
    /// OS process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Wait for the raw report. `deadline` is the instant the caller stops waiting.
    async fn collect(&mut self, deadline: Instant) -> Result<String, AuditError>;

    /// Whether the process is still alive.
    fn is_running(&mut self) -> bool;

    /// Ask the process to exit, escalating to a kill after `grace`.
    async fn terminate(&mut self, grace: Duration) -> Termination;
}

/// Launches the Lighthouse CLI (or any tool with the same contract).
///
/// The command line is `program args... <url>`; the JSON report is read from
/// stdout. Non-zero exit becomes [`AuditError::Process`] carrying stderr.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Lighthouse with headless Chrome and JSON on stdout.
    pub fn lighthouse() -> Self {
        Self::new(
            "lighthouse",
            vec![
                "--output=json".to_string(),
                "--output-path=stdout".to_string(),
                "--quiet".to_string(),
                "--chrome-flags=--headless=new --no-sandbox".to_string(),
            ],
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}


#[async_trait]
impl AuditLauncher for CommandLauncher {
    async fn launch(&self, url: &str) -> Result<Box<dyn AuditSession>, AuditError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|e| AuditError::Launch(format!("{}: {}", self.program, e)))?;

        log::debug!("Launched {} for {} (pid {:?})", self.program, url, child.id());
        let pgid = child.id().map(|pid| pid as i32);
        Ok(Box::new(ChildSession { child, pgid }))
    }
}

/// Session backed by a tokio child process leading its own process group.
///
/// Dropping the session kills the whole group on any path that skips explicit
/// termination.
#[derive(Debug)]
pub struct ChildSession {
    child: Child,
    /// Process group id; cleared once the group is known to be gone
    pgid: Option<i32>,
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut stream) = stream
        && let Err(e) = stream.read_to_string(&mut buf).await
    {
        log::debug!("Failed to read audit output: {}", e);
    }
    buf
}

fn spawn_reader<R: AsyncRead + Unpin + Send + 'static>(stream: Option<R>) -> JoinHandle<String> {
    tokio::spawn(read_all(stream))
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    status.signal().map(|sig| match Signal::try_from(sig) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("signal {}", sig),
    })
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> Option<String> {
    None
}

fn describe_exit(status: ExitStatus, stderr: &str) -> String {
    let code = match (status.code(), signal_name(status)) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(signal)) => format!("process crashed ({})", signal),
        (None, None) => "process crashed".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        code
    } else {
        format!("{}: {}", code, stderr)
    }
}

impl ChildSession {
    /// Signal every process in the group. Returns false if nothing received it.
    #[cfg(unix)]
    fn signal_group(&mut self, signal: Signal) -> bool {
        let Some(pgid) = self.pgid else {
            return false;
        };
        match killpg(Pid::from_raw(pgid), signal) {
            Ok(()) => true,
            Err(nix::errno::Errno::ESRCH) => {
                self.pgid = None;
                false
            }
            Err(e) => {
                log::warn!("Failed to send {} to audit process group {}: {}", signal.as_str(), pgid, e);
                false
            }
        }
    }

    /// Kill whatever the exited leader left behind in its group.
    fn reap_group(&mut self) {
        #[cfg(unix)]
        {
            if self.signal_group(Signal::SIGKILL) {
                log::debug!("Killed leftover processes in audit group {:?}", self.pgid);
            }
        }
        self.pgid = None;
    }
}

#[async_trait]
impl AuditSession for ChildSession {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn collect(&mut self, deadline: Instant) -> Result<String, AuditError> {
        let started = Instant::now();
        let out = spawn_reader(self.child.stdout.take());
        let err = spawn_reader(self.child.stderr.take());

        // Helpers that inherited the pipes can hold them open after the leader
        // exits, so wait on the leader and reap the group before draining.
        let status = match tokio::time::timeout_at(deadline, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                out.abort();
                err.abort();
                return Err(AuditError::Timeout(deadline.saturating_duration_since(started)));
            }
        };
        self.reap_group();

        let drain = |reader: JoinHandle<String>| async move {
            match tokio::time::timeout_at(deadline, reader).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            }
        };
        let (out, err) = tokio::join!(drain(out), drain(err));

        let status = status.map_err(|e| AuditError::Process(format!("failed to wait for audit process: {}", e)))?;
        if !status.success() {
            return Err(AuditError::Process(describe_exit(status, &err)));
        }

        Ok(out)
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self, grace: Duration) -> Termination {
        if !self.is_running() {
            self.reap_group();
            return Termination::AlreadyExited;
        }

        #[cfg(unix)]
        {
            if self.signal_group(Signal::SIGTERM) {
                if let Ok(Ok(_)) = tokio::time::timeout(grace, self.child.wait()).await {
                    self.reap_group();
                    return Termination::Graceful;
                }
                log::warn!("Audit process group {:?} ignored SIGTERM for {:?}, killing", self.pgid, grace);
            }
            self.signal_group(Signal::SIGKILL);
        }

        #[cfg(not(unix))]
        let _ = grace;

        let killed = self.child.kill().await;
        self.reap_group();
        match killed {
            Ok(()) => Termination::Forced,
            Err(e) => {
                if self.is_running() {
                    Termination::Failed(e.to_string())
                } else {
                    Termination::Forced
                }
            }
        }
    }
}

impl Drop for ChildSession {
    fn drop(&mut self) {
        // kill_on_drop only reaches the leader
        #[cfg(unix)]
        {
            if self.pgid.is_some() {
                self.signal_group(Signal::SIGKILL);
            }
        }
    }
}
