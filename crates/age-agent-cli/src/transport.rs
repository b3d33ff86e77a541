//! Socket transport helpers for the proxy client.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use socket2::{Domain, SockAddr, Socket, Type};

use age_agent_config::SocketPath;

use crate::errors::ClientError;

pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Dials the agent socket, giving up after [`CONNECTION_TIMEOUT`].
pub(crate) fn connect(socket: &SocketPath) -> Result<UnixStream, ClientError> {
    connect_unix(socket).map_err(|source| ClientError::Connect {
        socket: socket.as_str().to_owned(),
        source,
    })
}

fn connect_unix(socket: &SocketPath) -> io::Result<UnixStream> {
    let stream = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(socket.as_std_path())?;
    stream.connect_timeout(&address, CONNECTION_TIMEOUT)?;
    Ok(UnixStream::from(OwnedFd::from(stream)))
}
