//! Connection handling abstraction for the agent listener.

use std::os::unix::net::UnixStream;

/// Handles accepted socket connections.
///
/// Each call runs on a dedicated thread and owns the stream for the lifetime
/// of the session.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: UnixStream);
}
