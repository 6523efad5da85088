use std::fmt;
use std::io::{self, ErrorKind};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use anyhow::Context;
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::shutdown::Shutdown;

/// Exit status reported when the program could not be executed at all.
pub const EXEC_FAILED_CODE: i32 = 127;

/// Program name plus argument vector, as handed to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

/// How a supervised child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> anyhow::Result<Self> {
        if let Some(code) = status.code() {
            Ok(Self::Exited(code))
        } else if let Some(sig) = status.signal() {
            Ok(Self::Signaled(sig))
        } else {
            anyhow::bail!("child ended with unrecognized status {:?}", status)
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {}", code),
            Self::Signaled(sig) => write!(f, "killed by signal {}", sig),
        }
    }
}

/// Runs one command to completion. Implementations must never run two at once.
#[async_trait]
pub trait Launcher: Send {
    async fn launch(&mut self, command: &CommandLine, shutdown: &Shutdown) -> anyhow::Result<ExitOutcome>;
}

/// Spawns real child processes with the daemon's own environment.
#[derive(Debug, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&mut self, command: &CommandLine, shutdown: &Shutdown) -> anyhow::Result<ExitOutcome> {
        let mut child = match tokio::process::Command::new(&command.program)
            .args(&command.args)
            .spawn()
        {
            Ok(child) => child,
            Err(e) if is_exec_failure(&e) => {
                tracing::error!(program = %command.program, "exec failed: {}", e);
                return Ok(ExitOutcome::Exited(EXEC_FAILED_CODE));
            }
            Err(e) => return Err(e).with_context(|| format!("spawn {} failed", command.program)),
        };

        let pid = child.id();
        let status = tokio::select! {
            status = child.wait() => status,
            _ = shutdown.requested() => {
                // Under a minimal init only we get the signal, not our process group.
                if let Some(pid) = pid {
                    forward_signal(pid, Signal::SIGTERM);
                }
                child.wait().await
            }
        }
        .with_context(|| format!("waiting on {} failed", command.program))?;

        ExitOutcome::from_status(status)
    }
}

/// Spawn errors meaning the program itself cannot be run, as opposed to the
/// daemon being out of resources.
fn is_exec_failure(e: &io::Error) -> bool {
    if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) {
        return true;
    }
    matches!(
        e.raw_os_error().map(Errno::from_raw),
        Some(Errno::ENOEXEC | Errno::EACCES | Errno::ENOENT)
    )
}

fn forward_signal(pid: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        tracing::warn!(pid, "pid out of range, cannot forward {:?}", signal);
        return;
    };
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) => tracing::info!(pid, "Forwarded {:?} to child", signal),
        Err(e) => tracing::warn!(pid, "kill({}, {:?}) failed: {}", pid, signal, e),
    }
}
