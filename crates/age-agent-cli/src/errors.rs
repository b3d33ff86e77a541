//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use age_agent_protocol::PluginNameError;
use age_agentd::LaunchError;

use crate::handshake::ClientHandshakeError;
use crate::relay::RelayError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<OrthoError>),
    #[error("agent server failed: {0}")]
    Server(#[from] LaunchError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Failures of the proxy client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The requested name was refused before dialing.
    #[error("invalid plugin name: {0}")]
    InvalidName(#[source] PluginNameError),
    /// The agent socket could not be reached.
    #[error("failed to connect to server at {socket}: {source}")]
    Connect {
        /// Socket path that was dialed.
        socket: String,
        /// Underlying connect failure.
        #[source]
        source: io::Error,
    },
    /// The handshake did not end in acceptance.
    #[error(transparent)]
    Handshake(#[from] ClientHandshakeError),
    /// Relaying after the handshake failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
}
