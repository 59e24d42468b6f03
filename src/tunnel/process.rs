use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::TunnelPlan;
use crate::error::{CliError, Result};

/// How the child's standard streams are connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// stdin, stdout and stderr shared with the CLI
    Terminal,
    /// stdout and stderr shared, stdin detached, own process group so
    /// terminal Ctrl+C only reaches the foreground program
    Background,
}

/// A running tunnel child process.
///
/// The child is killed if this handle is dropped while it still runs.
pub struct TunnelProcess {
    child: Child,
    program: String,
}

const SPAWN_ATTEMPTS: u32 = 5;

/// Spawn `command`, retrying while its executable is busy (`ETXTBSY`).
///
/// A file that was just written can still be open for writing in a process
/// forked by another thread; exec fails until that fork has exec'd too.
pub(crate) fn spawn_command(command: &mut Command) -> io::Result<Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Err(err) if is_text_busy(&err) && attempt < SPAWN_ATTEMPTS => {
                debug!(attempt, %err, "Executable busy, retrying spawn");
                std::thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_err: &io::Error) -> bool {
    false
}

impl TunnelProcess {
    pub fn spawn(binary: &Path, plan: &TunnelPlan, attach: Attach) -> Result<Self> {
        let program = binary
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| binary.display().to_string());

        let stdin = match attach {
            Attach::Terminal => Stdio::inherit(),
            Attach::Background => Stdio::null(),
        };

        let mut command = Command::new(binary);
        command
            .args(plan.args())
            .stdin(stdin)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        if attach == Attach::Background {
            command.process_group(0);
        }

        let child = spawn_command(&mut command).map_err(|source| CliError::Spawn {
            program: program.clone(),
            source,
        })?;

        debug!(pid = ?child.id(), binary = %binary.display(), "Spawned tunnel process");

        Ok(Self { child, program })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wait for the child to exit on its own.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        debug!(%status, "Tunnel process exited");
        Ok(status)
    }

    /// Ask the child to terminate (SIGTERM).
    #[cfg(unix)]
    pub fn terminate(&self) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };

        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err);
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    /// Terminate the child, force-killing it if it is still running after `grace`.
    ///
    /// Returns the exit status when the child stopped within the grace period,
    /// `None` when it had to be killed.
    pub async fn shutdown(&mut self, grace: Duration) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(Some(status));
        }

        self.terminate()?;

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(%status, "Tunnel process stopped after SIGTERM");
                Ok(Some(status))
            }
            Err(_) => {
                warn!(
                    "{} still running after {:?}, killing it",
                    self.program, grace
                );
                self.child.kill().await?;
                Ok(None)
            }
        }
    }
}
