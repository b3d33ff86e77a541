//! Initiating side of the connection handshake.

use std::io;
use std::time::Duration;

use thiserror::Error;

use age_agent_protocol::{
    FrameError, HandshakeStream, PluginName, Response, ResponseParseError, read_frame, write_frame,
};

/// Reasons the server did not accept the requested plugin.
#[derive(Debug, Error)]
pub enum ClientHandshakeError {
    /// The read deadline could not be applied or cleared.
    #[error("failed to set handshake deadline: {0}")]
    Deadline(#[source] io::Error),
    /// The plugin name could not be sent.
    #[error("failed to send plugin name: {0}")]
    Send(#[source] io::Error),
    /// No complete response line arrived.
    #[error("failed to read handshake response: {0}")]
    Receive(#[source] FrameError),
    /// The server refused the request.
    #[error("server error: {0}")]
    ServerRejected(String),
    /// The server answered with something other than `OK` or `ERROR`.
    #[error(transparent)]
    UnexpectedResponse(#[from] ResponseParseError),
}

/// Requests `name` from the server and waits for its decision.
///
/// The name must already be validated; invalid names never reach the wire.
/// The complete response line must arrive within `timeout`.
/// On success the read deadline has been cleared and the stream is ready to
/// relay plugin traffic.
///
/// # Errors
///
/// Returns a [`ClientHandshakeError`] when the exchange fails or the server
/// rejects the request.
pub fn initiate_handshake<S>(
    stream: &mut S,
    name: &PluginName,
    timeout: Duration,
) -> Result<(), ClientHandshakeError>
where
    S: HandshakeStream + ?Sized,
{
    write_frame(stream, name.as_str()).map_err(ClientHandshakeError::Send)?;
    let line = read_frame(stream, timeout).map_err(ClientHandshakeError::Receive)?;
    match Response::parse(&line)? {
        Response::Accepted => stream
            .set_handshake_deadline(None)
            .map_err(ClientHandshakeError::Deadline),
        Response::Rejected(message) => Err(ClientHandshakeError::ServerRejected(message)),
    }
}
