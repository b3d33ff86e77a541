//! Server side of the age plugin agent.
//!
//! The agent keeps hardware-backed `age` plugins alive across many short
//! client invocations. Clients connect to a Unix domain socket, name the
//! plugin they want, and once the server has located `age-plugin-<name>` on
//! its search path the connection is bridged byte-for-byte to a freshly
//! spawned plugin process.
//!
//! The pieces, from the socket inwards:
//!
//! 1. [`transport`] binds the socket, runs the accept loop, and hands every
//!    accepted stream to a [`transport::ConnectionHandler`] on its own thread.
//! 2. [`AgentConnectionHandler`] runs the accepting side of the handshake via
//!    [`accept_handshake`], consulting the [`PluginResolver`].
//! 3. On success the [`ProcessBridge`] spawns the plugin and relays bytes
//!    between the connection and the plugin's stdin/stdout until either side
//!    closes, then reaps the process.
//!
//! [`run_server`] wires these together with telemetry, a lock file guarding
//! the socket, and signal-driven shutdown.

mod bridge;
mod connection;
mod handshake;
mod process;
mod resolver;
mod telemetry;
pub mod transport;

pub use bridge::{BridgeError, BridgeSummary, BridgeTimeouts, ProcessBridge};
pub use connection::AgentConnectionHandler;
pub use handshake::{HandshakeError, accept_handshake};
pub use process::{
    ChannelShutdownSignal, LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal,
    run_server, run_server_with,
};
pub use resolver::{PluginResolver, ResolveError};
pub use telemetry::TelemetryError;

#[cfg(test)]
mod tests;
