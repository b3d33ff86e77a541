//! Handshake vocabulary shared by the initiating and accepting sides.

use std::fmt;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Maximum wait for the frame read at each handshake step.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPTED: &str = "OK";
const REJECTED_PREFIX: &str = "ERROR ";

/// Streams that can carry a handshake.
///
/// The handshake bounds its reads with a deadline and lifts it once the
/// exchange concludes, because the relay that follows may legitimately sit
/// idle while a human touches a hardware token.
pub trait HandshakeStream: Read + Write {
    /// Applies (`Some`) or clears (`None`) the read deadline.
    ///
    /// # Errors
    ///
    /// Propagates failures from the underlying socket option call.
    fn set_handshake_deadline(&self, deadline: Option<Duration>) -> io::Result<()>;
}

impl HandshakeStream for UnixStream {
    fn set_handshake_deadline(&self, deadline: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(deadline)
    }
}

/// Server decision sent as the single handshake response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `OK`: the relay starts immediately after this line.
    Accepted,
    /// `ERROR <message>`: the server closes the connection after this line.
    Rejected(String),
}

impl Response {
    /// Encodes the response line without its trailing newline.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Accepted => ACCEPTED.to_owned(),
            Self::Rejected(message) => format!("{REJECTED_PREFIX}{message}"),
        }
    }

    /// Decodes a response line. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseParseError::Unexpected`] for anything other than
    /// `OK` or `ERROR <message>`.
    pub fn parse(line: &str) -> Result<Self, ResponseParseError> {
        let trimmed = line.trim();
        if trimmed == ACCEPTED {
            return Ok(Self::Accepted);
        }
        trimmed
            .strip_prefix(REJECTED_PREFIX)
            .map(|message| Self::Rejected(message.to_owned()))
            .ok_or_else(|| ResponseParseError::Unexpected(trimmed.to_owned()))
    }
}

impl From<&RejectReason> for Response {
    fn from(reason: &RejectReason) -> Self {
        Self::Rejected(reason.to_string())
    }
}

/// Errors raised when decoding a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseParseError {
    /// The line was neither an acceptance nor a rejection.
    #[error("unexpected handshake response: {0}")]
    Unexpected(String),
}

/// Why the accepting side refused a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The requested name failed validation.
    InvalidName {
        /// Name as received, trimmed.
        name: String,
    },
    /// No plugin binary with that name exists on the search path.
    NotFound {
        /// Requested plugin name.
        name: String,
    },
    /// A matching file exists but lacks execute permission.
    NotExecutable {
        /// Path of the non-executable candidate.
        path: PathBuf,
    },
    /// The request frame itself was malformed.
    Protocol {
        /// Description of the framing problem.
        detail: String,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName { name } => write!(formatter, "invalid plugin name: {name}"),
            Self::NotFound { name } => write!(formatter, "plugin not found: {name}"),
            Self::NotExecutable { path } => {
                write!(formatter, "plugin not executable: {}", path.display())
            }
            Self::Protocol { detail } => write!(formatter, "protocol error: {detail}"),
        }
    }
}

/// Result of the accepting side of the handshake.
///
/// Produced once per connection. Only [`HandshakeOutcome::Authorized`]
/// permits the connection to move on to relaying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The plugin resolved; `OK` has been sent.
    Authorized(PathBuf),
    /// The request was refused; `ERROR` has been sent.
    Rejected(RejectReason),
}
