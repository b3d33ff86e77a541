use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Advisory lock held for as long as the server runs.
///
/// The lock file records the owning pid. It is removed when the guard drops.
#[derive(Debug)]
pub(super) struct ServerGuard {
    path: PathBuf,
    _lock: File,
}

impl ServerGuard {
    pub(super) fn acquire(path: &Path) -> Result<Self, LaunchError> {
        let lock = acquire_lock(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: PROCESS_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to remove lock file"
            );
        }
    }
}

fn acquire_lock(path: &Path) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true).mode(0o600);
    match options.open(path) {
        Ok(mut file) => {
            let pid = std::process::id();
            writeln!(file, "{pid}")
                .and_then(|()| file.sync_all())
                .map_err(|source| LaunchError::LockWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
            info!(
                target: PROCESS_TARGET,
                pid,
                file = %path.display(),
                "acquired server lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(path),
        Err(source) => Err(LaunchError::LockCreate {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(path: &Path) -> Result<File, LaunchError> {
    if let Some(pid) = read_pid(path)
        && pid != 0
    {
        if check_process(pid)? {
            info!(
                target: PROCESS_TARGET,
                pid,
                "refusing to start: existing server alive"
            );
            return Err(LaunchError::AlreadyRunning { pid });
        }
        warn!(
            target: PROCESS_TARGET,
            pid,
            "previous server not detected; removing stale lock"
        );
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(LaunchError::Cleanup {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    acquire_lock(path)
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn check_process(pid: u32) -> Result<bool, LaunchError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(LaunchError::CheckProcess { pid, source }),
    }
}
