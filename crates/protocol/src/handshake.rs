//! Version exchange, authentication challenge, probe reply and decision.
//!
//! The challenge only proves the dialer speaks this protocol; it does not
//! identify the peer.

use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;
use crate::bytes::truncate_utf8;
use crate::marker::{CANCEL_MAGIC, CANCEL_MARKER_LEN, parse_marker};
use crate::types::{CancelCommand, Platform};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Oldest dialer version a listener still accepts.
pub const MIN_PROTOCOL_VERSION: u8 = 1;

/// Length of the authentication challenge and its response.
pub const CHALLENGE_LEN: usize = 32;

/// Byte XOR-ed over the challenge digest.
const RESPONSE_PAD: u8 = 0x55;

/// Decision byte: transfer accepted.
pub const DECISION_ACCEPT: u8 = 0x01;

/// Decision byte: transfer rejected.
pub const DECISION_REJECT: u8 = 0x00;

pub type Challenge = [u8; CHALLENGE_LEN];

pub fn is_supported_version(version: u8) -> bool {
    (MIN_PROTOCOL_VERSION..=PROTOCOL_VERSION).contains(&version)
}

pub async fn write_version<W: AsyncWrite + Unpin>(
    writer: &mut W,
    version: u8,
) -> Result<(), ProtocolError> {
    writer.write_u8(version).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_version<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u8, ProtocolError> {
    Ok(reader.read_u8().await?)
}

/// Generates a fresh random challenge.
pub fn generate_challenge() -> Challenge {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::thread_rng().fill(&mut challenge);
    challenge
}

/// Computes the expected answer: `SHA-256(challenge) XOR 0x55..`.
pub fn challenge_response(challenge: &Challenge) -> Challenge {
    let digest = Sha256::digest(challenge);
    let mut response = [0u8; CHALLENGE_LEN];
    for (out, byte) in response.iter_mut().zip(digest.iter()) {
        *out = byte ^ RESPONSE_PAD;
    }
    response
}

/// Checks a dialer's answer in constant time.
pub fn verify_challenge_response(challenge: &Challenge, response: &Challenge) -> bool {
    let expected = challenge_response(challenge);
    let mut diff = 0u8;
    for (a, b) in expected.iter().zip(response.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

/// Writes a challenge or a challenge response (both 32 bytes).
pub async fn write_challenge<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &Challenge,
) -> Result<(), ProtocolError> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a challenge or a challenge response (both 32 bytes).
pub async fn read_challenge<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Challenge, ProtocolError> {
    let mut buf = [0u8; CHALLENGE_LEN];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// The listener's answer to a `Connect` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    pub platform: Platform,
    pub display_name: String,
}

/// Writes the probe reply. Names longer than 255 bytes are truncated.
pub async fn write_connect_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reply: &ConnectReply,
) -> Result<(), ProtocolError> {
    let name = truncate_utf8(&reply.display_name, u8::MAX as usize);
    writer.write_u8(reply.platform.as_byte()).await?;
    writer.write_u8(name.len() as u8).await?;
    writer.write_all(name.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_connect_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ConnectReply, ProtocolError> {
    let platform = Platform::from(reader.read_u8().await?);
    let len = reader.read_u8().await? as usize;
    let mut name = vec![0u8; len];
    reader.read_exact(&mut name).await?;
    Ok(ConnectReply {
        platform,
        display_name: String::from_utf8(name)
            .map_err(|_| ProtocolError::InvalidUtf8("display name"))?,
    })
}

/// The listener's accept/reject answer to a transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub accepted: bool,
    /// Bytes the listener already holds; the dialer resumes from here.
    pub existing_len: u64,
}

impl Decision {
    pub fn accept(existing_len: u64) -> Self {
        Self {
            accepted: true,
            existing_len,
        }
    }

    pub fn reject() -> Self {
        Self {
            accepted: false,
            existing_len: 0,
        }
    }
}

/// What the dialer can receive while waiting for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReply {
    Decision(Decision),
    /// The listener cancelled before deciding.
    Cancelled(CancelCommand),
}

pub async fn write_decision<W: AsyncWrite + Unpin>(
    writer: &mut W,
    decision: Decision,
) -> Result<(), ProtocolError> {
    let byte = if decision.accepted {
        DECISION_ACCEPT
    } else {
        DECISION_REJECT
    };
    writer.write_u8(byte).await?;
    writer.write_u64(decision.existing_len).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the decision, or a cancellation marker sent in its place.
///
/// The first marker byte never collides with a decision byte, so one byte
/// is enough to tell them apart.
pub async fn read_decision<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<DecisionReply, ProtocolError> {
    let first = reader.read_u8().await?;
    match first {
        DECISION_ACCEPT => Ok(DecisionReply::Decision(Decision::accept(
            reader.read_u64().await?,
        ))),
        DECISION_REJECT => {
            // The length is still on the wire; a reject carries no resume offset.
            reader.read_u64().await?;
            Ok(DecisionReply::Decision(Decision::reject()))
        }
        b if b == CANCEL_MAGIC[0] => {
            let mut marker = [0u8; CANCEL_MARKER_LEN];
            marker[0] = first;
            reader.read_exact(&mut marker[1..]).await?;
            parse_marker(&marker)
                .map(DecisionReply::Cancelled)
                .ok_or(ProtocolError::InvalidDecision(first))
        }
        other => Err(ProtocolError::InvalidDecision(other)),
    }
}
