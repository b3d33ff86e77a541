use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix appended to the socket path to name the server's lock file.
const LOCK_SUFFIX: &str = ".lock";

/// Filesystem location of the agent's Unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SocketPath(Utf8PathBuf);

impl SocketPath {
    /// Borrows the path as UTF-8 text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Borrows the path as a standard library path.
    #[must_use]
    pub fn as_std_path(&self) -> &Path {
        self.0.as_std_path()
    }

    /// Path of the advisory lock file guarding this socket.
    #[must_use]
    pub fn lock_path(&self) -> Utf8PathBuf {
        let mut lock = self.0.clone().into_string();
        lock.push_str(LOCK_SUFFIX);
        Utf8PathBuf::from(lock)
    }
}

impl fmt::Display for SocketPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unix://{}", self.0)
    }
}

impl From<Utf8PathBuf> for SocketPath {
    fn from(path: Utf8PathBuf) -> Self {
        Self(path)
    }
}

impl From<&str> for SocketPath {
    fn from(path: &str) -> Self {
        Self(Utf8PathBuf::from(path))
    }
}

impl TryFrom<PathBuf> for SocketPath {
    type Error = SocketPathError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        if path.as_os_str().is_empty() {
            return Err(SocketPathError::Empty);
        }
        Utf8PathBuf::from_path_buf(path)
            .map(Self)
            .map_err(|path| SocketPathError::NotUtf8 { path })
    }
}

impl FromStr for SocketPath {
    type Err = SocketPathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err(SocketPathError::Empty);
        }
        Ok(Self::from(input))
    }
}

/// Errors raised when a socket path cannot be used.
#[derive(Debug, Error)]
pub enum SocketPathError {
    /// The path was empty.
    #[error("socket path must not be empty")]
    Empty,
    /// The path contained bytes that are not valid UTF-8.
    #[error("socket path '{}' is not valid UTF-8", path.display())]
    NotUtf8 {
        /// Offending path.
        path: PathBuf,
    },
}
