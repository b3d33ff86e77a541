//! Accepting side of the connection handshake.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use age_agent_protocol::{
    FrameError, HandshakeOutcome, HandshakeStream, PluginName, RejectReason, Response, read_frame,
    write_frame,
};

use crate::resolver::PluginResolver;

const HANDSHAKE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handshake");

/// Failures that end a handshake without a decision being sent.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The read deadline could not be applied or cleared.
    #[error("failed to set handshake deadline: {0}")]
    Deadline(#[source] io::Error),
    /// The client did not send its request line in time.
    #[error("timed out waiting for plugin name")]
    TimedOut,
    /// The client disconnected before sending a full request line.
    #[error("connection closed during handshake")]
    Closed,
    /// Reading the request line failed.
    #[error("failed to read plugin name: {0}")]
    Read(#[source] io::Error),
    /// The decision line could not be written.
    #[error("failed to send handshake response: {0}")]
    Write(#[source] io::Error),
}

/// Runs the accepting side of the handshake on `stream`.
///
/// Reads one request line that must arrive in full within `timeout`,
/// validates and resolves the plugin name, and answers with exactly one `OK`
/// or `ERROR` line. The read deadline is cleared before returning [`HandshakeOutcome::Authorized`] so
/// the relay that follows may idle indefinitely.
///
/// # Errors
///
/// Returns a [`HandshakeError`] when no decision could be reached or
/// delivered. No response line is written for timeouts or early closes.
pub fn accept_handshake<S>(
    stream: &mut S,
    resolver: &PluginResolver,
    timeout: Duration,
) -> Result<HandshakeOutcome, HandshakeError>
where
    S: HandshakeStream + ?Sized,
{
    let decision = match read_frame(stream, timeout) {
        Ok(line) => decide(line.trim(), resolver),
        Err(FrameError::TimedOut) => return Err(HandshakeError::TimedOut),
        Err(FrameError::Closed) => return Err(HandshakeError::Closed),
        Err(FrameError::Io(error)) => return Err(HandshakeError::Read(error)),
        Err(error @ (FrameError::TooLong { .. } | FrameError::NotUtf8)) => {
            Err(RejectReason::Protocol {
                detail: error.to_string(),
            })
        }
    };

    match decision {
        Ok(path) => {
            write_frame(stream, &Response::Accepted.encode()).map_err(HandshakeError::Write)?;
            stream
                .set_handshake_deadline(None)
                .map_err(HandshakeError::Deadline)?;
            Ok(HandshakeOutcome::Authorized(path))
        }
        Err(reason) => {
            write_frame(stream, &Response::from(&reason).encode())
                .map_err(HandshakeError::Write)?;
            Ok(HandshakeOutcome::Rejected(reason))
        }
    }
}

fn decide(
    requested: &str,
    resolver: &PluginResolver,
) -> Result<std::path::PathBuf, RejectReason> {
    let name = PluginName::parse(requested).map_err(|error| {
        debug!(
            target: HANDSHAKE_TARGET,
            requested,
            error = %error,
            "rejected plugin name"
        );
        RejectReason::InvalidName {
            name: requested.to_owned(),
        }
    })?;
    resolver
        .resolve(&name)
        .map_err(|error| error.reject_reason(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs::{self, Permissions};
    use std::io::{Cursor, Read, Write};
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Instant;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    /// In-memory stream recording every deadline change.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        deadlines: RefCell<Vec<Option<Duration>>>,
    }

    impl ScriptedStream {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
                deadlines: RefCell::new(Vec::new()),
            }
        }

        fn written(&self) -> String {
            String::from_utf8(self.output.clone()).expect("utf8 output")
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl HandshakeStream for ScriptedStream {
        fn set_handshake_deadline(&self, deadline: Option<Duration>) -> io::Result<()> {
            self.deadlines.borrow_mut().push(deadline);
            Ok(())
        }
    }

    struct PluginDir {
        dir: TempDir,
        resolver: PluginResolver,
    }

    #[fixture]
    fn plugin_dir() -> PluginDir {
        let dir = tempfile::tempdir().expect("plugin dir");
        let plugin = dir.path().join("age-plugin-yubikey");
        fs::write(&plugin, "#!/bin/sh\nexec cat\n").expect("write plugin");
        fs::set_permissions(&plugin, Permissions::from_mode(0o755)).expect("chmod plugin");
        let locked = dir.path().join("age-plugin-locked");
        fs::write(&locked, "#!/bin/sh\n").expect("write locked plugin");
        fs::set_permissions(&locked, Permissions::from_mode(0o644)).expect("chmod locked");
        let resolver = PluginResolver::new(dir.path().as_os_str());
        PluginDir { dir, resolver }
    }

    #[rstest]
    fn authorizes_resolvable_plugin_and_clears_deadline(plugin_dir: PluginDir) {
        let mut stream = ScriptedStream::new(b"yubikey\nrelay");
        let outcome = accept_handshake(&mut stream, &plugin_dir.resolver, Duration::from_secs(1))
            .expect("handshake completes");

        assert_eq!(
            outcome,
            HandshakeOutcome::Authorized(plugin_dir.dir.path().join("age-plugin-yubikey"))
        );
        assert_eq!(stream.written(), "OK\n");
        let deadlines = stream.deadlines.borrow();
        assert_eq!(deadlines.last(), Some(&None));
        assert!(
            deadlines
                .iter()
                .rev()
                .skip(1)
                .all(|deadline| deadline.is_some_and(|left| left <= Duration::from_secs(1))),
            "reads must stay within the handshake deadline: {deadlines:?}"
        );
        let mut rest = String::new();
        stream.input.read_to_string(&mut rest).expect("remaining bytes");
        assert_eq!(rest, "relay", "relay bytes must not be consumed");
    }

    #[rstest]
    fn trims_surrounding_whitespace(plugin_dir: PluginDir) {
        let mut stream = ScriptedStream::new(b"  yubikey \r\n");
        let outcome = accept_handshake(&mut stream, &plugin_dir.resolver, Duration::from_secs(1))
            .expect("handshake completes");
        assert!(matches!(outcome, HandshakeOutcome::Authorized(_)));
    }

    #[rstest]
    #[case::traversal(b"../passwd\n".as_slice(), "ERROR invalid plugin name: ../passwd\n")]
    #[case::empty(b"\n".as_slice(), "ERROR invalid plugin name: \n")]
    #[case::missing(b"nonexistent\n".as_slice(), "ERROR plugin not found: nonexistent\n")]
    fn rejects_with_single_error_line(
        plugin_dir: PluginDir,
        #[case] request: &[u8],
        #[case] expected: &str,
    ) {
        let mut stream = ScriptedStream::new(request);
        let outcome = accept_handshake(&mut stream, &plugin_dir.resolver, Duration::from_secs(1))
            .expect("handshake completes");

        assert!(matches!(outcome, HandshakeOutcome::Rejected(_)));
        assert_eq!(stream.written(), expected);
    }

    #[rstest]
    fn reports_non_executable_path(plugin_dir: PluginDir) {
        let mut stream = ScriptedStream::new(b"locked\n");
        let outcome = accept_handshake(&mut stream, &plugin_dir.resolver, Duration::from_secs(1))
            .expect("handshake completes");

        let path = plugin_dir.dir.path().join("age-plugin-locked");
        assert_eq!(
            outcome,
            HandshakeOutcome::Rejected(RejectReason::NotExecutable { path: path.clone() })
        );
        assert_eq!(
            stream.written(),
            format!("ERROR plugin not executable: {}\n", path.display())
        );
    }

    #[rstest]
    fn answers_oversized_frame_with_protocol_error(plugin_dir: PluginDir) {
        let mut stream = ScriptedStream::new(&vec![b'a'; 2048]);
        let outcome = accept_handshake(&mut stream, &plugin_dir.resolver, Duration::from_secs(1))
            .expect("handshake completes");

        assert!(matches!(
            outcome,
            HandshakeOutcome::Rejected(RejectReason::Protocol { .. })
        ));
        assert!(stream.written().starts_with("ERROR protocol error: "));
    }

    #[rstest]
    fn early_close_sends_nothing(plugin_dir: PluginDir) {
        let mut stream = ScriptedStream::new(b"yubi");
        let error = accept_handshake(&mut stream, &plugin_dir.resolver, Duration::from_secs(1))
            .expect_err("handshake should fail");

        assert!(matches!(error, HandshakeError::Closed));
        assert!(stream.output.is_empty());
    }

    #[rstest]
    fn trickling_client_cannot_extend_deadline(plugin_dir: PluginDir) {
        let (mut server, mut client) = UnixStream::pair().expect("socket pair");
        let trickle = thread::spawn(move || {
            for byte in b"aaaaaaaaaaaaaaaaaaaa\n" {
                if client.write_all(&[*byte]).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(60));
            }
        });

        let started = Instant::now();
        let error = accept_handshake(&mut server, &plugin_dir.resolver, Duration::from_millis(100))
            .expect_err("handshake should time out");

        assert!(matches!(error, HandshakeError::TimedOut));
        assert!(
            started.elapsed() < Duration::from_millis(700),
            "handshake took {:?}",
            started.elapsed()
        );
        drop(server);
        trickle.join().expect("trickle thread");
    }

    #[rstest]
    fn silent_client_times_out(plugin_dir: PluginDir) {
        let (mut server, _client) = UnixStream::pair().expect("socket pair");
        let error = accept_handshake(&mut server, &plugin_dir.resolver, Duration::from_millis(50))
            .expect_err("handshake should time out");
        assert!(matches!(error, HandshakeError::TimedOut));
    }
}
