//! Error types for socket listener operations.

use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The socket could not be created at the requested path.
    #[error("failed to bind unix listener at {path}: {source}")]
    Bind {
        /// Socket path.
        path: String,
        /// Underlying bind failure.
        #[source]
        source: io::Error,
    },
    /// Another server is accepting on the path.
    #[error("existing unix socket {path} is already in use")]
    InUse {
        /// Socket path.
        path: String,
    },
    /// The path exists but is not a socket.
    #[error("unix socket path {path} is not a socket")]
    NotSocket {
        /// Offending path.
        path: String,
    },
    /// The existing path could not be inspected.
    #[error("failed to read metadata for unix socket {path}: {source}")]
    Metadata {
        /// Socket path.
        path: String,
        /// Underlying metadata failure.
        #[source]
        source: io::Error,
    },
    /// Probing an existing socket failed for a reason other than refusal.
    #[error("failed to connect to existing unix socket {path}: {source}")]
    Probe {
        /// Socket path.
        path: String,
        /// Underlying connect failure.
        #[source]
        source: io::Error,
    },
    /// A stale socket file could not be removed.
    #[error("failed to remove stale unix socket {path}: {source}")]
    Cleanup {
        /// Socket path.
        path: String,
        /// Underlying removal failure.
        #[source]
        source: io::Error,
    },
    /// The socket file mode could not be restricted to the owner.
    #[error("failed to restrict permissions on unix socket {path}: {source}")]
    Permissions {
        /// Socket path.
        path: String,
        /// Underlying chmod failure.
        #[source]
        source: io::Error,
    },
    /// The listener could not be switched to non-blocking mode.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying fcntl failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be spawned.
    #[error("failed to spawn listener thread: {source}")]
    Spawn {
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Classified failure from a single `accept` call.
#[derive(Debug, Error)]
pub enum AcceptFailure {
    /// A per-connection problem; the loop backs off and keeps accepting.
    #[error("transient accept failure: {0}")]
    Transient(#[source] io::Error),
    /// The listening socket itself is unusable; the loop stops.
    #[error("listener closed: {0}")]
    Closed(#[source] io::Error),
}

impl AcceptFailure {
    /// Sorts an accept error into the transient or terminal bucket.
    #[must_use]
    pub fn classify(error: io::Error) -> Self {
        let closed = error.raw_os_error().is_some_and(|code| {
            [Errno::EBADF, Errno::EINVAL, Errno::ENOTSOCK]
                .into_iter()
                .any(|errno| errno as i32 == code)
        });
        if closed {
            Self::Closed(error)
        } else {
            Self::Transient(error)
        }
    }
}
