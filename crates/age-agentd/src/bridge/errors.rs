//! Errors raised while bridging a connection to a plugin process.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use age_agent_protocol::Direction;

/// Failures of a single bridged session.
///
/// None of these are fatal to the server; the connection handler logs them
/// and moves on.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The plugin binary could not be started.
    #[error("failed to spawn plugin {}: {source}", path.display())]
    Spawn {
        /// Resolved plugin path.
        path: PathBuf,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// A piped stdio handle was not available after spawning.
    #[error("plugin {stream} pipe was not captured")]
    MissingPipe {
        /// Which handle was missing.
        stream: &'static str,
    },
    /// The connection could not be duplicated for the relay threads.
    #[error("failed to prepare connection for relaying: {0}")]
    Connection(#[source] io::Error),
    /// A relay thread could not be started.
    #[error("failed to start relay: {0}")]
    RelayStart(#[source] io::Error),
    /// Waiting on the plugin process failed.
    #[error("failed to wait for plugin process: {0}")]
    Wait(#[source] io::Error),
    /// The plugin exited unsuccessfully or was killed.
    #[error("plugin exited unsuccessfully: {status}")]
    PluginExit {
        /// Exit status as reported by the operating system.
        status: ExitStatus,
    },
    /// Copying bytes in one direction failed.
    #[error("{direction} relay failed: {source}")]
    Relay {
        /// Direction that failed.
        direction: Direction,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
}
