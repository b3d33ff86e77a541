//! Wire-level building blocks shared by the agent server and its clients.
//!
//! Every connection to the agent socket starts with a single line-oriented
//! exchange:
//!
//! ```text
//! client -> server   <plugin-name>\n
//! server -> client   OK\n | ERROR <message>\n
//! ```
//!
//! After `OK` the stream carries raw, unframed plugin traffic in both
//! directions. This crate owns the pieces both sides must agree on: plugin
//! name validation ([`PluginName`]), newline-terminated frame IO
//! ([`frame`]), the handshake response codec ([`Response`]), and the paired
//! byte relay ([`RelayPair`]) used once the handshake has succeeded.

pub mod frame;
pub mod handshake;
pub mod name;
pub mod relay;

pub use self::frame::{FrameError, MAX_FRAME_BYTES, read_frame, write_frame};
pub use self::handshake::{
    HANDSHAKE_TIMEOUT, HandshakeOutcome, HandshakeStream, RejectReason, Response,
    ResponseParseError,
};
pub use self::name::{MAX_PLUGIN_NAME_LENGTH, PLUGIN_BINARY_PREFIX, PluginName, PluginNameError};
pub use self::relay::{Direction, RelayOutcome, RelayPair, is_teardown_error};
