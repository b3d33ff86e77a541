//! Newline-terminated handshake frames.
//!
//! Frames are read one byte at a time. The handshake shares its stream with
//! the raw relay that follows it, so a buffered reader could swallow plugin
//! bytes that arrive directly behind the frame.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::handshake::HandshakeStream;

/// Upper bound on a single handshake frame, newline included.
pub const MAX_FRAME_BYTES: usize = 1024;

/// Errors raised while reading a handshake frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream before sending a complete frame.
    #[error("connection closed before a complete line was received")]
    Closed,
    /// The frame exceeded [`MAX_FRAME_BYTES`].
    #[error("line exceeds maximum size of {limit} bytes")]
    TooLong {
        /// Configured limit in bytes.
        limit: usize,
    },
    /// The frame was not valid UTF-8.
    #[error("line is not valid UTF-8")]
    NotUtf8,
    /// No complete frame arrived before the read deadline.
    #[error("timed out waiting for a complete line")]
    TimedOut,
    /// The underlying stream failed.
    #[error("failed to read line: {0}")]
    Io(#[source] io::Error),
}

/// Reads one newline-terminated frame and returns it without the newline.
///
/// The whole frame must arrive within `timeout` of the call. Before every
/// read the stream's deadline is narrowed to the time that is left, so a
/// peer trickling bytes cannot stretch the wait.
///
/// # Errors
///
/// Returns a [`FrameError`] when the stream closes, the deadline expires, or
/// the frame is oversized or not UTF-8.
pub fn read_frame<S>(stream: &mut S, timeout: Duration) -> Result<String, FrameError>
where
    S: HandshakeStream + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut byte = [0_u8; 1];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(FrameError::TimedOut);
        }
        stream
            .set_handshake_deadline(Some(remaining))
            .map_err(FrameError::Io)?;
        match stream.read(&mut byte) {
            Ok(0) => return Err(FrameError::Closed),
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return Err(FrameError::TimedOut);
            }
            Err(error) => return Err(FrameError::Io(error)),
        }
        let [value] = byte;
        if value == b'\n' {
            return String::from_utf8(line).map_err(|_| FrameError::NotUtf8);
        }
        line.push(value);
        if line.len() >= MAX_FRAME_BYTES {
            return Err(FrameError::TooLong {
                limit: MAX_FRAME_BYTES,
            });
        }
    }
}

/// Writes `line` followed by a newline and flushes the stream.
///
/// # Errors
///
/// Propagates IO failures from the underlying writer.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, line: &str) -> io::Result<()> {
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(b'\n');
    writer.write_all(&frame)?;
    writer.flush()
}
