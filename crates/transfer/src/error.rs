//! Error types for the transfer engine.

use lanshare_crypto::CryptoError;
use lanshare_protocol::{CancelCommand, ProtocolError};

use crate::config::ClosedPredicate;
use crate::types::StopReason;

/// Errors produced while running a transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("key exchange failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("cancelled ({command}, local: {was_local})")]
    Cancelled {
        command: CancelCommand,
        was_local: bool,
    },

    #[error("transfer accepted without a sink")]
    NoSink,

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("source ended after {read} of {expected} bytes")]
    SourceExhausted { read: u64, expected: u64 },

    #[error("transfer rejected")]
    Rejected,

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TransferError {
    /// Maps the error to the reason carried by the terminal `Stopped` event.
    ///
    /// `is_closed` decides which I/O errors mean the peer went away.
    pub fn stop_reason(&self, is_closed: ClosedPredicate) -> StopReason {
        match self {
            TransferError::Io(e) | TransferError::Protocol(ProtocolError::Io(e)) => {
                if is_closed(e) {
                    StopReason::SocketClosed
                } else {
                    StopReason::Unknown(e.to_string())
                }
            }
            TransferError::Protocol(ProtocolError::AuthFailed) => StopReason::AuthChallengeFailure,
            TransferError::Protocol(
                ProtocolError::UnsupportedVersion(_)
                | ProtocolError::UnknownCommand(_)
                | ProtocolError::UnsupportedIpVersion(_)
                | ProtocolError::InvalidDecision(_)
                | ProtocolError::InvalidUtf8(_),
            ) => StopReason::UnknownProtocol,
            TransferError::Cancelled { command, was_local } => StopReason::UserCancelled {
                command: *command,
                was_local: *was_local,
            },
            TransferError::NoSink => StopReason::UnableToOpenSink,
            TransferError::PeerClosed => StopReason::SocketClosed,
            TransferError::Rejected => StopReason::Rejected,
            other => StopReason::Unknown(other.to_string()),
        }
    }
}
