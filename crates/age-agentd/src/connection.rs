//! Per-connection session driver: handshake, then bridge.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::{debug, info, warn};

use age_agent_protocol::{HANDSHAKE_TIMEOUT, HandshakeOutcome};

use crate::bridge::ProcessBridge;
use crate::handshake::accept_handshake;
use crate::resolver::PluginResolver;
use crate::transport::ConnectionHandler;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Connection handler that authorizes a plugin and bridges to it.
#[derive(Debug, Clone)]
pub struct AgentConnectionHandler {
    resolver: PluginResolver,
    bridge: ProcessBridge,
    handshake_timeout: Duration,
}

impl AgentConnectionHandler {
    /// Builds a handler resolving plugins with `resolver`.
    #[must_use]
    pub fn new(resolver: PluginResolver) -> Self {
        Self {
            resolver,
            bridge: ProcessBridge::default(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    /// Replaces the process bridge.
    #[must_use]
    pub const fn with_bridge(mut self, bridge: ProcessBridge) -> Self {
        self.bridge = bridge;
        self
    }

    /// Replaces the handshake read deadline.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl ConnectionHandler for AgentConnectionHandler {
    fn handle(&self, mut stream: UnixStream) {
        let plugin = match accept_handshake(&mut stream, &self.resolver, self.handshake_timeout) {
            Ok(HandshakeOutcome::Authorized(plugin)) => plugin,
            Ok(HandshakeOutcome::Rejected(reason)) => {
                info!(target: SESSION_TARGET, reason = %reason, "rejected connection");
                drop(stream.shutdown(Shutdown::Both));
                return;
            }
            Err(error) => {
                warn!(target: SESSION_TARGET, error = %error, "handshake failed");
                drop(stream.shutdown(Shutdown::Both));
                return;
            }
        };

        info!(
            target: SESSION_TARGET,
            plugin = %plugin.display(),
            "starting plugin session"
        );
        match self.bridge.run(stream, &plugin) {
            Ok(summary) => debug!(
                target: SESSION_TARGET,
                plugin = %plugin.display(),
                inbound_bytes = summary.inbound_bytes,
                outbound_bytes = summary.outbound_bytes,
                "plugin session finished"
            ),
            Err(error) => warn!(
                target: SESSION_TARGET,
                plugin = %plugin.display(),
                error = %error,
                "plugin session failed"
            ),
        }
    }
}
