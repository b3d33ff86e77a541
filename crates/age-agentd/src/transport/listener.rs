//! Listener implementation for the agent socket.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use age_agent_config::SocketPath;

use super::{AcceptFailure, ConnectionHandler, LISTENER_TARGET, ListenerError};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const DRAIN_POLL: Duration = Duration::from_millis(25);
const SOCKET_MODE: u32 = 0o600;

/// Listener bound to the agent socket path.
#[derive(Debug)]
pub struct SocketListener {
    socket: SocketPath,
    listener: UnixListener,
}

impl SocketListener {
    /// Binds the socket, replacing a stale socket file left by a dead server.
    ///
    /// # Errors
    ///
    /// Fails when the path is occupied by a non-socket or a live listener,
    /// when a stale socket cannot be removed, or when the socket cannot be
    /// created or restricted to mode `0600`.
    pub fn bind(socket: &SocketPath) -> Result<Self, ListenerError> {
        let listener = bind_unix(socket.as_std_path())?;
        Ok(Self {
            socket: socket.clone(),
            listener,
        })
    }

    /// Starts the accept loop on a background thread.
    ///
    /// # Errors
    ///
    /// Fails when the listener cannot be made non-blocking or the thread
    /// cannot be spawned. The socket file is removed in both cases.
    pub fn start(self, handler: Arc<dyn ConnectionHandler>) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.listener.set_nonblocking(true) {
            cleanup_unix_socket(&self.socket);
            return Err(ListenerError::NonBlocking { source });
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(0));
        let loop_state = AcceptLoop {
            shutdown: Arc::clone(&shutdown),
            active: Arc::clone(&active),
            handler,
        };
        let socket = self.socket.clone();
        let handle = thread::Builder::new()
            .name("agent-accept".to_owned())
            .spawn(move || loop_state.run(&self))
            .map_err(|source| {
                cleanup_unix_socket(&socket);
                ListenerError::Spawn { source }
            })?;
        Ok(ListenerHandle {
            shutdown,
            active,
            handle: Some(handle),
        })
    }
}

/// Handle to the background accept thread.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stops accepting new connections. Sessions already running continue.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Number of connection handlers that have not returned yet.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits up to `timeout` for running handlers to return.
    ///
    /// Returns the number still running when the wait ended.
    pub fn drain(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = self.active_connections();
            if remaining == 0 || Instant::now() >= deadline {
                return remaining;
            }
            thread::sleep(DRAIN_POLL);
        }
    }

    /// Waits for the accept thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the thread panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        self.handle.take().map_or(Ok(()), |handle| {
            handle.join().map_err(|_| ListenerError::ThreadPanic)
        })
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

struct AcceptLoop {
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    handler: Arc<dyn ConnectionHandler>,
}

impl AcceptLoop {
    fn run(&self, listener: &SocketListener) {
        info!(
            target: LISTENER_TARGET,
            socket = %listener.socket,
            "socket listener active"
        );
        let mut last_error = None::<io::ErrorKind>;
        while !self.shutdown.load(Ordering::SeqCst) {
            match accept_connection(&listener.listener) {
                Ok(Some(stream)) => {
                    last_error = None;
                    self.dispatch(stream);
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(AcceptFailure::Closed(error)) => {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %error,
                        "listening socket closed, stopping accept loop"
                    );
                    break;
                }
                Err(AcceptFailure::Transient(error)) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(
                            target: LISTENER_TARGET,
                            error = %error,
                            "socket accept error"
                        );
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }

        cleanup_unix_socket(&listener.socket);
        info!(target: LISTENER_TARGET, socket = %listener.socket, "socket listener stopped");
    }

    fn dispatch(&self, stream: UnixStream) {
        let guard = ActiveGuard::enter(&self.active);
        let handler = Arc::clone(&self.handler);
        let spawned = thread::Builder::new()
            .name("agent-connection".to_owned())
            .spawn(move || {
                let _guard = guard;
                handler.handle(stream);
            });
        if let Err(error) = spawned {
            warn!(
                target: LISTENER_TARGET,
                error = %error,
                "failed to spawn connection thread"
            );
        }
    }
}

/// Counts a connection as active until dropped, including on panic.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn accept_connection(listener: &UnixListener) -> Result<Option<UnixStream>, AcceptFailure> {
    match listener.accept() {
        Ok((stream, _)) => {
            stream
                .set_nonblocking(false)
                .map_err(AcceptFailure::Transient)?;
            debug!(target: LISTENER_TARGET, "accepted connection");
            Ok(Some(stream))
        }
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(None)
        }
        Err(error) => Err(AcceptFailure::classify(error)),
    }
}

fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    let display = || path.display().to_string();
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::Metadata {
            path: display(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::NotSocket { path: display() });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => return Err(ListenerError::InUse { path: display() }),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                debug!(target: LISTENER_TARGET, path = %path.display(), "removing stale socket");
                fs::remove_file(path).map_err(|source| ListenerError::Cleanup {
                    path: display(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(ListenerError::Probe {
                    path: display(),
                    source,
                });
            }
        }
    }

    let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        path: display(),
        source,
    })?;
    if let Err(source) = fs::set_permissions(path, Permissions::from_mode(SOCKET_MODE)) {
        drop(listener);
        drop(fs::remove_file(path));
        return Err(ListenerError::Permissions {
            path: display(),
            source,
        });
    }
    Ok(listener)
}

fn cleanup_unix_socket(socket: &SocketPath) {
    if let Err(error) = fs::remove_file(socket.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %socket.as_str(),
            "failed to remove unix socket file"
        );
    }
}
