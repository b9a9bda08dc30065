//! Payload pumps.
//!
//! Both directions run a filling half and a draining half over one
//! [`BufferPool`], joined in a single task: the upload fills slots from the
//! source and drains them into the socket, the download fills from the
//! socket and drains into the sink.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use lanshare_buffer_pool::{BufferPool, SlotState};
use lanshare_crypto::PayloadCipher;
use lanshare_protocol::{CANCEL_MARKER_LEN, MarkerScanner};

use crate::TransferError;

/// Streams `remaining` bytes from `source` to `writer`.
///
/// `on_progress` is called with the running byte count after each chunk
/// reaches the socket.
pub(crate) async fn upload<S, W>(
    source: &mut S,
    writer: &mut W,
    pool: &BufferPool,
    remaining: u64,
    mut cipher: Option<PayloadCipher>,
    mut on_progress: impl FnMut(u64),
) -> Result<(), TransferError>
where
    S: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let fill = async {
        let mut read = 0u64;
        while read < remaining {
            let mut lease = pool.acquire_for_fill().await;
            let want = (remaining - read).min(lease.capacity() as u64) as usize;
            let n = source.read(&mut lease.space()[..want]).await?;
            if n == 0 {
                pool.release(lease, SlotState::Free, 0);
                return Err(TransferError::SourceExhausted {
                    read,
                    expected: remaining,
                });
            }
            if let Some(cipher) = cipher.as_mut() {
                cipher.apply(&mut lease.space()[..n]);
            }
            read += n as u64;
            pool.release(lease, SlotState::Full, n);
        }
        Ok::<(), TransferError>(())
    };

    let drain = async {
        let mut sent = 0u64;
        while sent < remaining {
            let lease = pool.acquire_for_drain().await;
            writer.write_all(lease.data()).await?;
            sent += lease.len() as u64;
            trace!(slot = lease.id(), bytes = sent, "chunk sent");
            pool.release(lease, SlotState::Free, 0);
            on_progress(sent);
        }
        writer.flush().await?;
        Ok::<(), TransferError>(())
    };

    tokio::try_join!(fill, drain)?;
    Ok(())
}

/// Receives `remaining` payload bytes from `reader` into `sink`.
///
/// Every raw read is checked for a trailing cancel marker before any of it
/// is counted as payload. Reads use the whole slot, so a marker sent right
/// after the last payload byte is still noticed when it lands in the same
/// read.
///
/// Until the payload is complete, the last `CANCEL_MARKER_LEN - 1` bytes of
/// each read are held back and carried into the next slot. A marker split
/// across reads therefore never reaches the sink.
pub(crate) async fn download<R, W>(
    reader: &mut R,
    sink: &mut W,
    pool: &BufferPool,
    remaining: u64,
    mut cipher: Option<PayloadCipher>,
    mut on_progress: impl FnMut(u64),
) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let fill = async {
        let mut scanner = MarkerScanner::new();
        let mut held = [0u8; CANCEL_MARKER_LEN - 1];
        let mut held_len = 0;
        let mut released = 0u64;
        while released < remaining {
            let mut lease = pool.acquire_for_fill().await;
            let hold_max = (CANCEL_MARKER_LEN - 1).min(lease.capacity().saturating_sub(1));
            let space = lease.space();
            space[..held_len].copy_from_slice(&held[..held_len]);

            let n = reader.read(&mut space[held_len..]).await?;
            if n == 0 {
                pool.release(lease, SlotState::Free, 0);
                debug!(received = released, expected = remaining, "peer closed mid-payload");
                return Err(TransferError::PeerClosed);
            }
            if let Some(command) = scanner.scan(&space[held_len..held_len + n]) {
                pool.release(lease, SlotState::Free, 0);
                return Err(TransferError::Cancelled {
                    command,
                    was_local: false,
                });
            }

            let outstanding = remaining - released;
            let payload = outstanding.min((held_len + n) as u64) as usize;
            let keep = if payload as u64 == outstanding {
                0
            } else {
                hold_max.min(payload)
            };
            let ready = payload - keep;
            held[..keep].copy_from_slice(&space[ready..payload]);
            held_len = keep;

            if ready == 0 {
                pool.release(lease, SlotState::Free, 0);
                continue;
            }
            if let Some(cipher) = cipher.as_mut() {
                cipher.apply(&mut space[..ready]);
            }
            released += ready as u64;
            pool.release(lease, SlotState::Full, ready);
        }
        Ok::<(), TransferError>(())
    };

    let drain = async {
        let mut written = 0u64;
        while written < remaining {
            let lease = pool.acquire_for_drain().await;
            sink.write_all(lease.data()).await?;
            written += lease.len() as u64;
            trace!(slot = lease.id(), bytes = written, "chunk written");
            pool.release(lease, SlotState::Free, 0);
            on_progress(written);
        }
        sink.flush().await?;
        Ok::<(), TransferError>(())
    };

    tokio::try_join!(fill, drain)?;
    Ok(())
}

/// Reads from `reader` until the peer sends a cancel marker or closes.
///
/// Used while the local side is busy writing (or waiting), so anything the
/// peer says can only be a cancel.
pub(crate) async fn watch_for_marker<R>(reader: &mut R) -> TransferError
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut scanner = MarkerScanner::new();
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => return TransferError::PeerClosed,
            Ok(n) => {
                if let Some(command) = scanner.scan(&buf[..n]) {
                    return TransferError::Cancelled {
                        command,
                        was_local: false,
                    };
                }
            }
            Err(e) => return e.into(),
        }
    }
}
