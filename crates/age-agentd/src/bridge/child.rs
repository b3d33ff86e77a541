//! Supervised plugin subprocess.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::{BRIDGE_TARGET, BridgeError, BridgeTimeouts};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How the plugin came to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PluginExit {
    pub(crate) status: ExitStatus,
    pub(crate) escalated: Option<Signal>,
}

/// A running plugin. The child is killed and reaped when dropped unreaped.
#[derive(Debug)]
pub(crate) struct PluginProcess {
    child: Child,
    path: PathBuf,
    reaped: bool,
}

impl PluginProcess {
    /// Spawns `path` with no arguments, piped stdin/stdout, and inherited
    /// stderr.
    pub(crate) fn spawn(path: &Path) -> Result<(Self, ChildStdin, ChildStdout), BridgeError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let mut process = Self {
            child,
            path: path.to_path_buf(),
            reaped: false,
        };
        let Some(stdin) = stdin else {
            process.abort();
            return Err(BridgeError::MissingPipe { stream: "stdin" });
        };
        let Some(stdout) = stdout else {
            process.abort();
            return Err(BridgeError::MissingPipe { stream: "stdout" });
        };
        debug!(
            target: BRIDGE_TARGET,
            path = %process.path.display(),
            pid = process.child.id(),
            "spawned plugin process"
        );
        Ok((process, stdin, stdout))
    }

    pub(crate) fn id(&self) -> u32 {
        self.child.id()
    }

    /// Waits for the plugin to exit, escalating from SIGTERM to SIGKILL when
    /// it outlives the configured grace periods.
    pub(crate) fn wait_with_escalation(
        &mut self,
        timeouts: &BridgeTimeouts,
    ) -> Result<PluginExit, BridgeError> {
        if let Some(status) = self.wait_for(timeouts.grace)? {
            return Ok(PluginExit {
                status,
                escalated: None,
            });
        }

        warn!(
            target: BRIDGE_TARGET,
            pid = self.child.id(),
            grace_ms = duration_millis(timeouts.grace),
            "plugin outlived its session, sending SIGTERM"
        );
        self.terminate();
        if let Some(status) = self.wait_for(timeouts.terminate)? {
            return Ok(PluginExit {
                status,
                escalated: Some(Signal::SIGTERM),
            });
        }

        warn!(
            target: BRIDGE_TARGET,
            pid = self.child.id(),
            "plugin ignored SIGTERM, killing process"
        );
        drop(self.child.kill());
        let status = self.child.wait().map_err(BridgeError::Wait)?;
        self.reaped = true;
        Ok(PluginExit {
            status,
            escalated: Some(Signal::SIGKILL),
        })
    }

    /// Reaps the plugin if it has already exited.
    pub(crate) fn try_exit(&mut self) -> Result<Option<ExitStatus>, BridgeError> {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    if !self.reaped {
                        self.reaped = true;
                        debug!(
                            target: BRIDGE_TARGET,
                            pid = self.child.id(),
                            ?status,
                            "plugin process exited"
                        );
                    }
                    return Ok(Some(status));
                }
                Ok(None) => return Ok(None),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(BridgeError::Wait(error)),
            }
        }
    }

    fn wait_for(&mut self, timeout: Duration) -> Result<Option<ExitStatus>, BridgeError> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.try_exit()? {
                return Ok(Some(status));
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn terminate(&mut self) {
        let delivered = i32::try_from(self.child.id())
            .ok()
            .map(|pid| signal::kill(Pid::from_raw(pid), Signal::SIGTERM));
        if !matches!(delivered, Some(Ok(()))) {
            drop(self.child.kill());
        }
    }

    fn abort(&mut self) {
        if self.reaped {
            return;
        }
        drop(self.child.kill());
        drop(self.child.wait());
        self.reaped = true;
    }
}

impl Drop for PluginProcess {
    fn drop(&mut self) {
        self.abort();
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
