//! Bridges an authorized connection to a freshly spawned plugin process.
//!
//! Bytes read from the connection are written to the plugin's stdin
//! ("inbound") and bytes the plugin writes to stdout are sent back over the
//! connection ("outbound"). When the first direction finishes the bridge
//! closes the endpoints the other direction depends on. A client that only
//! half-closed is still owed a reply, so the plugin may take as long as it
//! needs (a hardware token waiting for a touch). Once the session is over
//! for both sides the plugin gets a grace period to exit, and the bridge
//! escalates to signals if it does not.

mod child;
mod errors;

use std::net::Shutdown;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::debug;

use age_agent_protocol::{Direction, RelayOutcome, RelayPair, is_teardown_error};

use self::child::PluginProcess;
pub use self::errors::BridgeError;

const BRIDGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bridge");
const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time limits applied once a session starts winding down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTimeouts {
    /// Wait for a voluntary exit once the session is over: the plugin's
    /// output has ended, the client has hung up, or a relay failed.
    pub grace: Duration,
    /// Wait after SIGTERM before sending SIGKILL.
    pub terminate: Duration,
    /// Wait for relay threads to flush after the plugin has exited.
    pub drain: Duration,
}

impl BridgeTimeouts {
    /// Default exit grace period.
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);
    /// Default SIGTERM to SIGKILL interval.
    pub const DEFAULT_TERMINATE: Duration = Duration::from_secs(2);
    /// Default post-exit drain period.
    pub const DEFAULT_DRAIN: Duration = Duration::from_secs(2);
}

impl Default for BridgeTimeouts {
    fn default() -> Self {
        Self {
            grace: Self::DEFAULT_GRACE,
            terminate: Self::DEFAULT_TERMINATE,
            drain: Self::DEFAULT_DRAIN,
        }
    }
}

/// Outcome of a session that completed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSummary {
    /// Plugin exit status.
    pub status: ExitStatus,
    /// Bytes relayed from the connection to the plugin.
    pub inbound_bytes: u64,
    /// Bytes relayed from the plugin to the connection.
    pub outbound_bytes: u64,
}

/// Spawns plugins and relays connections to them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBridge {
    timeouts: BridgeTimeouts,
}

impl ProcessBridge {
    /// Builds a bridge with custom wind-down limits.
    #[must_use]
    pub const fn new(timeouts: BridgeTimeouts) -> Self {
        Self { timeouts }
    }

    /// Runs one session: spawn `plugin`, relay until either side closes,
    /// and reap the process.
    ///
    /// The connection is fully shut down before this returns.
    ///
    /// # Errors
    ///
    /// Reports at most one failure, preferring a spawn or exit failure of the
    /// plugin over an inbound relay error over an outbound relay error.
    /// Errors the wind-down itself provoked on the second direction are not
    /// reported.
    pub fn run(&self, connection: UnixStream, plugin: &Path) -> Result<BridgeSummary, BridgeError> {
        let (mut process, stdin, stdout) = PluginProcess::spawn(plugin).inspect_err(|_| {
            shutdown_quietly(&connection, Shutdown::Both);
        })?;
        let pid = process.id();

        let relays = clone_connection(&connection).and_then(|(reader, writer)| {
            RelayPair::start((reader, stdin), (stdout, writer)).map_err(BridgeError::RelayStart)
        });
        let mut relays = match relays {
            Ok(relays) => relays,
            Err(error) => {
                shutdown_quietly(&connection, Shutdown::Both);
                return Err(error);
            }
        };

        let mut tally = RelayTally::default();
        if let Some(first) = relays.next_outcome() {
            debug!(
                target: BRIDGE_TARGET,
                pid,
                direction = %first.direction,
                clean = first.is_clean(),
                "first relay direction finished"
            );
            let awaiting_reply = first.direction == Direction::Inbound && first.is_clean();
            wind_down(&connection, &first);
            tally.record(first, false);
            if awaiting_reply
                && let Err(error) = await_reply(&mut process, &mut relays, &mut tally, &connection)
            {
                shutdown_quietly(&connection, Shutdown::Both);
                return Err(error);
            }
        }

        let exit = process.wait_with_escalation(&self.timeouts);

        while let Some(outcome) = relays.next_outcome_within(self.timeouts.drain) {
            tally.record(outcome, true);
        }
        shutdown_quietly(&connection, Shutdown::Both);
        if relays.pending() > 0 {
            while let Some(outcome) = relays.next_outcome_within(self.timeouts.drain) {
                tally.record(outcome, true);
            }
        }
        if relays.pending() > 0 {
            debug!(
                target: BRIDGE_TARGET,
                pid,
                pending = relays.pending(),
                "abandoning relay still blocked on plugin output"
            );
        }

        let exit = exit?;
        if let Some(signal) = exit.escalated {
            debug!(target: BRIDGE_TARGET, pid, ?signal, "plugin stopped by signal escalation");
        }
        if !exit.status.success() {
            return Err(BridgeError::PluginExit {
                status: exit.status,
            });
        }
        tally.finish(exit.status)
    }
}

/// Waits without a time limit for the plugin to answer a client that has
/// finished sending.
///
/// Returns when the plugin exits, its output ends, or the client hangs up
/// completely. The last two tear the connection down.
fn await_reply(
    process: &mut PluginProcess,
    relays: &mut RelayPair,
    tally: &mut RelayTally,
    connection: &UnixStream,
) -> Result<(), BridgeError> {
    loop {
        if process.try_exit()?.is_some() {
            return Ok(());
        }
        if let Some(outcome) = relays.next_outcome_within(REPLY_POLL_INTERVAL) {
            wind_down(connection, &outcome);
            tally.record(outcome, true);
            return Ok(());
        }
        if peer_hung_up(connection) {
            debug!(
                target: BRIDGE_TARGET,
                pid = process.id(),
                "client hung up before the plugin replied"
            );
            shutdown_quietly(connection, Shutdown::Both);
            return Ok(());
        }
    }
}

/// Reports whether the client closed its end entirely.
///
/// A half-closed peer leaves the socket readable with `POLLRDHUP` only;
/// `POLLHUP` appears once both directions are gone.
fn peer_hung_up(connection: &UnixStream) -> bool {
    let mut fds = [PollFd::new(connection.as_fd(), PollFlags::empty())];
    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(ready) if ready > 0 => fds
            .first()
            .and_then(|fd| fd.revents())
            .is_some_and(|events| events.intersects(PollFlags::POLLHUP | PollFlags::POLLERR)),
        _ => false,
    }
}

fn clone_connection(connection: &UnixStream) -> Result<(UnixStream, UnixStream), BridgeError> {
    let reader = connection.try_clone().map_err(BridgeError::Connection)?;
    let writer = connection.try_clone().map_err(BridgeError::Connection)?;
    Ok((reader, writer))
}

/// Closes what the still-running direction depends on.
///
/// A clean end of client input only stops further reads, so the plugin's
/// reply can still stream back. Anything else tears the connection down.
fn wind_down(connection: &UnixStream, first: &RelayOutcome) {
    let how = match (first.direction, first.is_clean()) {
        (Direction::Inbound, true) => Shutdown::Read,
        _ => Shutdown::Both,
    };
    shutdown_quietly(connection, how);
}

fn shutdown_quietly(connection: &UnixStream, how: Shutdown) {
    if let Err(error) = connection.shutdown(how)
        && error.kind() != std::io::ErrorKind::NotConnected
    {
        debug!(target: BRIDGE_TARGET, error = %error, "failed to shut down connection");
    }
}

#[derive(Debug, Default)]
struct RelayTally {
    inbound_bytes: u64,
    outbound_bytes: u64,
    inbound_error: Option<std::io::Error>,
    outbound_error: Option<std::io::Error>,
}

impl RelayTally {
    fn record(&mut self, outcome: RelayOutcome, after_wind_down: bool) {
        let RelayOutcome { direction, result } = outcome;
        let (bytes, error) = match direction {
            Direction::Inbound => (&mut self.inbound_bytes, &mut self.inbound_error),
            Direction::Outbound => (&mut self.outbound_bytes, &mut self.outbound_error),
        };
        match result {
            Ok(copied) => *bytes = copied,
            Err(failure) if after_wind_down && is_teardown_error(&failure) => {}
            Err(failure) => *error = Some(failure),
        }
    }

    fn finish(self, status: ExitStatus) -> Result<BridgeSummary, BridgeError> {
        if let Some(source) = self.inbound_error {
            return Err(BridgeError::Relay {
                direction: Direction::Inbound,
                source,
            });
        }
        if let Some(source) = self.outbound_error {
            return Err(BridgeError::Relay {
                direction: Direction::Outbound,
                source,
            });
        }
        Ok(BridgeSummary {
            status,
            inbound_bytes: self.inbound_bytes,
            outbound_bytes: self.outbound_bytes,
        })
    }
}
