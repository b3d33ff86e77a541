//! Server launch sequencing.

use std::sync::Arc;

use tracing::{info, warn};

use age_agent_config::Config;

use crate::connection::AgentConnectionHandler;
use crate::resolver::PluginResolver;
use crate::telemetry;
use crate::transport::SocketListener;

use super::errors::LaunchError;
use super::guard::ServerGuard;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{PROCESS_TARGET, SHUTDOWN_TIMEOUT};

/// Runs the agent server until a termination signal arrives.
///
/// Plugins are resolved against the `PATH` captured at startup.
///
/// # Errors
///
/// Returns a [`LaunchError`] when telemetry, the lock file, the socket, or
/// the signal handlers cannot be set up.
pub fn run_server(config: &Config) -> Result<(), LaunchError> {
    telemetry::initialise(config)?;
    let shutdown = SystemShutdownSignal::install()?;
    let handler = AgentConnectionHandler::new(PluginResolver::from_env());
    run_server_with(config, handler, &shutdown)
}

/// Runs the agent server with injected collaborators.
///
/// Holds `<socket>.lock` for the lifetime of the server, accepts connections
/// until `shutdown` returns, then stops accepting and gives running sessions
/// a bounded time to finish before removing the socket and lock files.
///
/// # Errors
///
/// Returns a [`LaunchError`] when the lock cannot be taken, the socket cannot
/// be bound, or waiting for shutdown fails.
pub fn run_server_with<S>(
    config: &Config,
    handler: AgentConnectionHandler,
    shutdown: &S,
) -> Result<(), LaunchError>
where
    S: ShutdownSignal + ?Sized,
{
    info!(
        target: PROCESS_TARGET,
        socket = %config.socket(),
        "starting agent server"
    );
    let guard = ServerGuard::acquire(config.lock_path().as_std_path())?;
    let listener = SocketListener::bind(config.socket())?;
    let listener_handle = listener.start(Arc::new(handler))?;
    info!(target: PROCESS_TARGET, pid = std::process::id(), "agent server ready");

    let waited = shutdown.wait();
    listener_handle.shutdown();
    let remaining = listener_handle.drain(SHUTDOWN_TIMEOUT);
    if remaining > 0 {
        warn!(
            target: PROCESS_TARGET,
            remaining,
            "sessions still running at shutdown"
        );
    }
    listener_handle.join()?;
    drop(guard);
    waited?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
