//! Client side byte relay between local stdio and the agent connection.

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use thiserror::Error;

use age_agent_protocol::{Direction, RelayOutcome, RelayPair};

/// Failures while relaying an accepted session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The connection could not be duplicated for the relay threads.
    #[error("failed to prepare connection for relaying: {0}")]
    Connection(#[source] io::Error),
    /// A relay thread could not be started.
    #[error("failed to start relay: {0}")]
    Start(#[source] io::Error),
    /// Copying bytes in one direction failed.
    #[error("{direction} relay failed: {source}")]
    Copy {
        /// Direction that failed; inbound is server to local output.
        direction: Direction,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
}

/// Relays `input` to the connection and the connection to `output`.
///
/// End of `input` half-closes the connection so the server sees end of
/// stream while its reply keeps flowing back. The session ends when the
/// server closes the connection or either direction fails. A direction still
/// blocked on reading `input` is abandoned at that point, since reads from a
/// process's stdin cannot be interrupted.
///
/// # Errors
///
/// Returns the first failure encountered.
pub fn relay_session<I, O>(connection: UnixStream, input: I, output: O) -> Result<(), RelayError>
where
    I: Read + Send + 'static,
    O: Write + Send + 'static,
{
    let reader = connection.try_clone().map_err(RelayError::Connection)?;
    let writer = connection.try_clone().map_err(RelayError::Connection)?;
    let mut relays = RelayPair::start((reader, output), (input, writer)).map_err(|source| {
        drop(connection.shutdown(Shutdown::Both));
        RelayError::Start(source)
    })?;

    while let Some(outcome) = relays.next_outcome() {
        let RelayOutcome { direction, result } = outcome;
        match (direction, result) {
            (Direction::Outbound, Ok(_)) => {
                drop(connection.shutdown(Shutdown::Write));
            }
            (Direction::Inbound, Ok(_)) => {
                drop(connection.shutdown(Shutdown::Both));
                return Ok(());
            }
            (direction, Err(source)) => {
                drop(connection.shutdown(Shutdown::Both));
                return Err(RelayError::Copy { direction, source });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use rstest::rstest;

    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl SharedOutput {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().map(|bytes| bytes.clone()).unwrap_or_default()
        }
    }

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| io::Error::other("poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Input that never produces data, like an idle terminal.
    struct BlockedInput;

    impl Read for BlockedInput {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_secs(3600));
            Ok(0)
        }
    }

    fn echo_peer(peer: UnixStream) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut reader = peer.try_clone().expect("clone peer");
            let mut writer = peer;
            io::copy(&mut reader, &mut writer).expect("echo");
            writer.shutdown(Shutdown::Both).expect("close peer");
        })
    }

    #[rstest]
    fn end_of_input_half_closes_and_collects_reply() {
        let (local, peer) = UnixStream::pair().expect("socket pair");
        let echo = echo_peer(peer);
        let output = SharedOutput::default();

        relay_session(local, Cursor::new(b"hello\n".to_vec()), output.clone())
            .expect("relay succeeds");

        echo.join().expect("echo thread");
        assert_eq!(output.contents(), b"hello\n");
    }

    #[rstest]
    fn server_close_ends_session_without_waiting_for_input() {
        let (local, peer) = UnixStream::pair().expect("socket pair");
        let server = thread::spawn(move || {
            let mut peer = peer;
            peer.write_all(b"bye\n").expect("write reply");
            peer.shutdown(Shutdown::Both).expect("close peer");
        });
        let output = SharedOutput::default();

        relay_session(local, BlockedInput, output.clone()).expect("relay succeeds");

        server.join().expect("server thread");
        assert_eq!(output.contents(), b"bye\n");
    }

    #[rstest]
    fn output_failure_is_reported() {
        let (local, peer) = UnixStream::pair().expect("socket pair");
        let server = thread::spawn(move || {
            let mut peer = peer;
            peer.write_all(b"data").expect("write reply");
            peer
        });

        struct FailingOutput;
        impl Write for FailingOutput {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let error = relay_session(local, BlockedInput, FailingOutput).expect_err("relay fails");
        drop(server.join().expect("server thread"));
        assert!(matches!(
            error,
            RelayError::Copy {
                direction: Direction::Inbound,
                ..
            }
        ));
    }
}
