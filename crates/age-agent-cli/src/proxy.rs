//! Proxy mode: stand in for a plugin binary by relaying to the agent.

use std::io::{Read, Write};

use age_agent_config::SocketPath;
use age_agent_protocol::{HANDSHAKE_TIMEOUT, PluginName};

use crate::errors::ClientError;
use crate::handshake::initiate_handshake;
use crate::relay::relay_session;
use crate::transport::connect;

/// Relays `input` and `output` to plugin `name` through the agent at
/// `socket`.
///
/// The name is validated before the socket is dialed, so a malformed name
/// never produces network traffic.
///
/// # Errors
///
/// Returns a [`ClientError`] for an invalid name, an unreachable server, a
/// rejected handshake, or a relay failure.
pub fn run_proxy<I, O>(socket: &SocketPath, name: &str, input: I, output: O) -> Result<(), ClientError>
where
    I: Read + Send + 'static,
    O: Write + Send + 'static,
{
    let name = PluginName::parse(name).map_err(ClientError::InvalidName)?;
    let mut stream = connect(socket)?;
    initiate_handshake(&mut stream, &name, HANDSHAKE_TIMEOUT)?;
    relay_session(stream, input, output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::os::unix::net::UnixListener;

    use rstest::rstest;

    #[rstest]
    fn overlong_name_is_rejected_without_dialing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&path).expect("bind listener");
        listener.set_nonblocking(true).expect("non-blocking listener");
        let socket = SocketPath::try_from(path).expect("utf8 path");

        let error = run_proxy(&socket, &"a".repeat(65), Cursor::new(Vec::new()), io::sink())
            .expect_err("name should be rejected");

        assert!(matches!(error, ClientError::InvalidName(_)));
        assert!(
            error.to_string().starts_with("invalid plugin name: "),
            "unexpected message: {error}"
        );
        let accepted = listener.accept();
        assert!(
            matches!(&accepted, Err(error) if error.kind() == io::ErrorKind::WouldBlock),
            "no connection should have been made"
        );
    }

    #[rstest]
    #[case("../passwd")]
    #[case("")]
    fn malformed_names_are_rejected_locally(#[case] name: &str) {
        let socket = SocketPath::from("/nonexistent/agent.sock");
        let error = run_proxy(&socket, name, Cursor::new(Vec::new()), io::sink())
            .expect_err("name should be rejected");
        assert!(matches!(error, ClientError::InvalidName(_)));
    }
}
