//! Unix socket listener for agent connections.
//!
//! The listener binds the configured socket path, accepts connections on a
//! background thread, and hands each stream to a [`ConnectionHandler`] on a
//! thread of its own.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::{AcceptFailure, ListenerError};
pub use self::handler::ConnectionHandler;
pub use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, HoldingHandler};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
