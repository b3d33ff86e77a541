//! Paired byte relays.
//!
//! A [`RelayPair`] runs two copy loops on their own threads, one per
//! direction, and reports each loop's result on a bounded channel. The pair
//! does not close anything itself: the owner watches the outcomes and closes
//! the shared endpoints (typically by shutting the socket down) so that the
//! sibling loop observes end-of-stream or an error and finishes too.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

const RELAY_BUFFER_BYTES: usize = 8 * 1024;

/// Direction of a relay loop relative to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes read from the connection and written to the local endpoint.
    Inbound,
    /// Bytes read from the local endpoint and written to the connection.
    Outbound,
}

impl Direction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Final result of one relay loop.
#[derive(Debug)]
pub struct RelayOutcome {
    /// Loop that finished.
    pub direction: Direction,
    /// Bytes copied, or the error that stopped the loop.
    pub result: io::Result<u64>,
}

impl RelayOutcome {
    /// Returns `true` when the loop stopped at end-of-stream.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.result.is_ok()
    }

    /// Borrows the error that stopped the loop, if any.
    #[must_use]
    pub fn error(&self) -> Option<&io::Error> {
        self.result.as_ref().err()
    }
}

/// Two concurrently running relay loops sharing one completion channel.
#[derive(Debug)]
pub struct RelayPair {
    outcomes: Receiver<RelayOutcome>,
    pending: usize,
}

impl RelayPair {
    /// Starts both loops.
    ///
    /// Each loop copies until its reader reports end-of-stream or either side
    /// fails, flushing after every chunk so interactive traffic is never held
    /// back. The writer is dropped when the loop ends, which closes pipe
    /// endpoints such as a child's stdin.
    ///
    /// # Errors
    ///
    /// Returns an error when a relay thread cannot be spawned.
    pub fn start<IR, IW, OR, OW>(inbound: (IR, IW), outbound: (OR, OW)) -> io::Result<Self>
    where
        IR: Read + Send + 'static,
        IW: Write + Send + 'static,
        OR: Read + Send + 'static,
        OW: Write + Send + 'static,
    {
        let (sender, outcomes) = mpsc::sync_channel(2);
        let (inbound_reader, inbound_writer) = inbound;
        let (outbound_reader, outbound_writer) = outbound;
        spawn_loop(
            Direction::Inbound,
            inbound_reader,
            inbound_writer,
            sender.clone(),
        )?;
        spawn_loop(
            Direction::Outbound,
            outbound_reader,
            outbound_writer,
            sender,
        )?;
        Ok(Self {
            outcomes,
            pending: 2,
        })
    }

    /// Blocks until the next loop finishes.
    ///
    /// Returns `None` once both outcomes have been delivered.
    pub fn next_outcome(&mut self) -> Option<RelayOutcome> {
        if self.pending == 0 {
            return None;
        }
        let outcome = self.outcomes.recv().ok()?;
        self.pending -= 1;
        Some(outcome)
    }

    /// Waits up to `timeout` for the next loop to finish.
    ///
    /// Returns `None` when the timeout expires or no loop is outstanding.
    pub fn next_outcome_within(&mut self, timeout: Duration) -> Option<RelayOutcome> {
        if self.pending == 0 {
            return None;
        }
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => {
                self.pending -= 1;
                Some(outcome)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of loops that have not reported yet.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }
}

fn spawn_loop<R, W>(
    direction: Direction,
    reader: R,
    writer: W,
    sender: SyncSender<RelayOutcome>,
) -> io::Result<()>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    thread::Builder::new()
        .name(format!("relay-{direction}"))
        .spawn(move || {
            let result = pump(reader, writer);
            // The owner may have stopped listening after the first outcome.
            drop(sender.send(RelayOutcome { direction, result }));
        })
        .map(|_| ())
}

fn pump<R: Read, W: Write>(mut reader: R, mut writer: W) -> io::Result<u64> {
    let mut buffer = [0_u8; RELAY_BUFFER_BYTES];
    let mut total = 0_u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        writer.write_all(chunk)?;
        writer.flush()?;
        total = total.saturating_add(u64::try_from(read).unwrap_or(u64::MAX));
    }
}

/// Returns `true` for errors a loop sees when its peer endpoint was closed
/// underneath it rather than failing on its own.
#[must_use]
pub fn is_teardown_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}
