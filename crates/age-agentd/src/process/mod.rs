//! Server lifecycle: lock file, listener startup, and signal-driven shutdown.

use std::time::Duration;

mod errors;
mod guard;
mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use launch::{run_server, run_server_with};
pub use shutdown::{ChannelShutdownSignal, ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Longest wait for in-flight sessions once shutdown has been requested.
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
