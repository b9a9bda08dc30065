//! In-band cancellation marker.
//!
//! A cancel is signalled by writing 7 magic bytes and a command byte into
//! the live stream. The receiving side feeds every chunk it reads through a
//! [`MarkerScanner`], which checks whether the stream now ends with a marker.
//! The scanner keeps the last bytes of previous chunks, so a marker split
//! across two reads is still detected.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;
use crate::bytes::region_matches;
use crate::types::CancelCommand;

/// Magic prefix of the cancellation marker ("LSCANCL").
pub const CANCEL_MAGIC: [u8; 7] = *b"LSCANCL";

/// Magic plus the command byte.
pub const CANCEL_MARKER_LEN: usize = CANCEL_MAGIC.len() + 1;

/// Encodes the marker for `command`.
pub fn cancel_marker(command: CancelCommand) -> [u8; CANCEL_MARKER_LEN] {
    let mut marker = [0u8; CANCEL_MARKER_LEN];
    marker[..CANCEL_MAGIC.len()].copy_from_slice(&CANCEL_MAGIC);
    marker[CANCEL_MAGIC.len()] = command.as_byte();
    marker
}

/// Decodes a full marker. An unknown command byte after a valid magic is
/// read as a plain stop.
pub fn parse_marker(bytes: &[u8; CANCEL_MARKER_LEN]) -> Option<CancelCommand> {
    if !region_matches(bytes, 0, &CANCEL_MAGIC) {
        return None;
    }
    Some(CancelCommand::try_from(bytes[CANCEL_MAGIC.len()]).unwrap_or(CancelCommand::Stop))
}

/// Writes the marker and flushes so the peer sees it immediately.
pub async fn write_cancel_marker<W: AsyncWrite + Unpin>(
    writer: &mut W,
    command: CancelCommand,
) -> Result<(), ProtocolError> {
    writer.write_all(&cancel_marker(command)).await?;
    writer.flush().await?;
    Ok(())
}

/// Tests the tail of a byte stream for the cancellation marker.
#[derive(Debug, Default)]
pub struct MarkerScanner {
    /// Last bytes seen, right-aligned; only the final `filled` are valid.
    tail: [u8; CANCEL_MARKER_LEN],
    filled: usize,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk read from the stream.
    ///
    /// Returns the cancel command if the stream (as seen so far) ends with a
    /// marker.
    pub fn scan(&mut self, chunk: &[u8]) -> Option<CancelCommand> {
        if chunk.len() >= CANCEL_MARKER_LEN {
            let start = chunk.len() - CANCEL_MARKER_LEN;
            self.tail.copy_from_slice(&chunk[start..]);
            self.filled = CANCEL_MARKER_LEN;
        } else {
            let take = chunk.len();
            let keep = (CANCEL_MARKER_LEN - take).min(self.filled);
            let mut next = [0u8; CANCEL_MARKER_LEN];
            let start = CANCEL_MARKER_LEN - take - keep;
            next[start..start + keep].copy_from_slice(&self.tail[CANCEL_MARKER_LEN - keep..]);
            next[CANCEL_MARKER_LEN - take..].copy_from_slice(chunk);
            self.tail = next;
            self.filled = keep + take;
        }

        if self.filled < CANCEL_MARKER_LEN {
            return None;
        }
        parse_marker(&self.tail)
    }
}
