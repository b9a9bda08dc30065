use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

use lanshare_protocol::{CancelCommand, Platform, TransferId};

/// Readable payload with a known length that can seek back to its start.
pub trait ByteSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> ByteSource for T {}

/// Writable destination, opened by the caller in overwrite or append mode.
pub trait ByteSink: AsyncWrite + Send + Unpin {}

impl<T: AsyncWrite + Send + Unpin + ?Sized> ByteSink for T {}

pub type BoxSource = Box<dyn ByteSource>;
pub type BoxSink = Box<dyn ByteSink>;

/// One send attempt, held by the dialer.
pub struct TransferRequest {
    /// Name shown to the recipient; truncated to 255 bytes on the wire.
    pub sender_name: String,
    pub file_name: String,
    /// Declared payload length; authoritative for completion.
    pub payload_len: u64,
    /// Positioned at offset 0; the dialer seeks to the resume offset.
    pub source: BoxSource,
}

impl TransferRequest {
    pub fn new(
        sender_name: impl Into<String>,
        file_name: impl Into<String>,
        payload_len: u64,
        source: BoxSource,
    ) -> Self {
        Self {
            sender_name: sender_name.into(),
            file_name: file_name.into(),
            payload_len,
            source,
        }
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("sender_name", &self.sender_name)
            .field("file_name", &self.file_name)
            .field("payload_len", &self.payload_len)
            .finish_non_exhaustive()
    }
}

/// The listener-side answer to a [`ServerEvent::Requested`].
pub struct TransferResponse {
    pub id: TransferId,
    pub accepted: bool,
    /// Bytes already at the destination; payload resumes after them.
    pub existing_len: u64,
    /// Present only when accepting.
    pub sink: Option<BoxSink>,
}

impl TransferResponse {
    pub fn accept(id: TransferId, existing_len: u64, sink: BoxSink) -> Self {
        Self {
            id,
            accepted: true,
            existing_len,
            sink: Some(sink),
        }
    }

    pub fn reject(id: TransferId) -> Self {
        Self {
            id,
            accepted: false,
            existing_len: 0,
            sink: None,
        }
    }
}

impl fmt::Debug for TransferResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferResponse")
            .field("id", &self.id)
            .field("accepted", &self.accepted)
            .field("existing_len", &self.existing_len)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// What a dialer asked to send, as seen by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingTransfer {
    pub sender_name: String,
    pub file_name: String,
    pub payload_len: u64,
    pub sender_ip: Ipv4Addr,
    /// Port the sender's own listener uses.
    pub sender_port: u16,
    pub platform: Platform,
    pub encrypted: bool,
}

/// Answer to a reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    pub display_name: String,
    pub platform: Platform,
}

/// Why a transfer ended without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    AuthChallengeFailure,
    UnknownProtocol,
    UnableToOpenSink,
    SocketClosed,
    UserCancelled {
        command: CancelCommand,
        /// `true` when this endpoint issued the cancel.
        was_local: bool,
    },
    Rejected,
    Unknown(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::AuthChallengeFailure => f.write_str("authentication challenge failed"),
            StopReason::UnknownProtocol => f.write_str("unknown protocol"),
            StopReason::UnableToOpenSink => f.write_str("unable to open destination"),
            StopReason::SocketClosed => f.write_str("connection closed"),
            StopReason::UserCancelled {
                command,
                was_local: true,
            } => write!(f, "cancelled here ({command})"),
            StopReason::UserCancelled {
                command,
                was_local: false,
            } => write!(f, "cancelled by peer ({command})"),
            StopReason::Rejected => f.write_str("rejected"),
            StopReason::Unknown(detail) => write!(f, "failed: {detail}"),
        }
    }
}

/// Events emitted by the listener.
#[derive(Debug)]
pub enum ServerEvent {
    ListenerStarted {
        addr: SocketAddr,
    },
    /// The accept loop ended; `error` is set when it never started.
    ListenerStopped {
        error: Option<String>,
    },
    /// A dialer is waiting for a decision; answer with `decide`.
    Requested {
        id: TransferId,
        transfer: IncomingTransfer,
    },
    /// `bytes` includes the resume offset.
    Progress {
        id: TransferId,
        bytes: u64,
        total: u64,
    },
    Complete {
        id: TransferId,
    },
    Stopped {
        id: TransferId,
        reason: StopReason,
    },
}

impl ServerEvent {
    /// The transfer this event belongs to, if any.
    pub fn transfer_id(&self) -> Option<TransferId> {
        match self {
            ServerEvent::ListenerStarted { .. } | ServerEvent::ListenerStopped { .. } => None,
            ServerEvent::Requested { id, .. }
            | ServerEvent::Progress { id, .. }
            | ServerEvent::Complete { id }
            | ServerEvent::Stopped { id, .. } => Some(*id),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerEvent::Complete { .. } | ServerEvent::Stopped { .. }
        )
    }
}

/// Events emitted by the dialer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connecting {
        id: TransferId,
        peer: SocketAddr,
    },
    AwaitingAcceptance {
        id: TransferId,
    },
    ResponseReceived {
        id: TransferId,
        accepted: bool,
        existing_len: u64,
    },
    /// `bytes` includes the resume offset.
    Progress {
        id: TransferId,
        bytes: u64,
        total: u64,
    },
    Complete {
        id: TransferId,
    },
    Stopped {
        id: TransferId,
        reason: StopReason,
    },
}

impl ClientEvent {
    pub fn transfer_id(&self) -> TransferId {
        match self {
            ClientEvent::Connecting { id, .. }
            | ClientEvent::AwaitingAcceptance { id }
            | ClientEvent::ResponseReceived { id, .. }
            | ClientEvent::Progress { id, .. }
            | ClientEvent::Complete { id }
            | ClientEvent::Stopped { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientEvent::Complete { .. } | ClientEvent::Stopped { .. }
        )
    }
}
