//! Key exchange for encrypted payloads.
//!
//! Runs right after an accepting decision when the dialer set the
//! encrypted flag:
//!
//! ```text
//! Listener -> Dialer: [256 bytes: listener public key]
//! Dialer -> Listener: [256 bytes: dialer public key] [16 bytes: IV]
//! ```
//!
//! Either side may cancel mid-exchange by writing a cancel marker and
//! closing, so key material is read through a [`MarkerScanner`].
//!
//! Key generation and agreement are CPU-bound and run on the blocking pool.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use lanshare_crypto::{IV_LEN, KeyPair, PUBLIC_KEY_LEN, PayloadCipher, PublicKey, derive_key};
use lanshare_protocol::MarkerScanner;

use crate::TransferError;

/// Listener half: sends our key first, then reads the dialer's key and IV.
pub(crate) async fn listener_exchange<R, W>(
    reader: &mut R,
    writer: &mut W,
) -> Result<PayloadCipher, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let keys = tokio::task::spawn_blocking(KeyPair::generate).await??;
    writer.write_all(&keys.public_key().to_bytes()).await?;
    writer.flush().await?;

    let mut material = [0u8; PUBLIC_KEY_LEN + IV_LEN];
    read_key_material(reader, &mut material).await?;
    let (peer, iv) = material.split_at(PUBLIC_KEY_LEN);

    let mut peer_key = [0u8; PUBLIC_KEY_LEN];
    peer_key.copy_from_slice(peer);
    let mut nonce = [0u8; IV_LEN];
    nonce.copy_from_slice(iv);
    agree(keys, &peer_key, nonce).await
}

/// Dialer half: reads the listener's key, answers with ours and a fresh IV.
pub(crate) async fn dialer_exchange<R, W>(
    reader: &mut R,
    writer: &mut W,
) -> Result<PayloadCipher, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut peer = [0u8; PUBLIC_KEY_LEN];
    read_key_material(reader, &mut peer).await?;

    let keys = tokio::task::spawn_blocking(KeyPair::generate).await??;
    let iv = lanshare_crypto::generate_iv();
    writer.write_all(&keys.public_key().to_bytes()).await?;
    writer.write_all(&iv).await?;
    writer.flush().await?;

    agree(keys, &peer, iv).await
}

/// Fills `buf` from the peer.
///
/// A stream that ends early with a cancel marker is a remote cancel; any
/// other early end is [`TransferError::PeerClosed`].
async fn read_key_material<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut scanner = MarkerScanner::new();
    let mut seen = None;
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(match seen {
                Some(command) => TransferError::Cancelled {
                    command,
                    was_local: false,
                },
                None => TransferError::PeerClosed,
            });
        }
        seen = scanner.scan(&buf[filled..filled + n]);
        filled += n;
    }
    Ok(())
}

async fn agree(
    keys: KeyPair,
    peer: &[u8; PUBLIC_KEY_LEN],
    iv: [u8; IV_LEN],
) -> Result<PayloadCipher, TransferError> {
    let peer = PublicKey::from_bytes(peer)?;
    let key = tokio::task::spawn_blocking(move || derive_key(&keys.agree(&peer))).await??;
    Ok(PayloadCipher::new(&key, &iv))
}
