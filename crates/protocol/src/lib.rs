//! Binary wire protocol for LanShare file transfers.
//!
//! Shared by the listener and the dialer. Every multi-byte field is
//! big-endian.
//!
//! # Wire format
//!
//! ```text
//! VERSION   (Dialer -> Listener):  [1 byte]
//! CHALLENGE (Listener -> Dialer):  [32 random bytes]
//! RESPONSE  (Dialer -> Listener):  [32 bytes: SHA-256(challenge) XOR 0x55]
//! FIXED HEADER (Dialer -> Listener, 56 bytes):
//!   [1 command] [1 ip version][16 ip] [2 port] [1 platform]
//!   [1 sender_name_len] [2 file_name_len] [8 payload_len] [24 reserved]
//!
//! CONNECT PROBE (Listener -> Dialer):
//!   [1 platform] [1 name_len] [name_len bytes: display name]
//!
//! FILE TRANSFER:
//!   DYNAMIC HEADER (Dialer -> Listener): [sender name] [file name]
//!   DECISION (Listener -> Dialer):       [1 accepted] [8 existing_len]
//!   PAYLOAD (Dialer -> Listener):        [payload_len - existing_len bytes]
//!
//! CANCEL MARKER (either direction, in-band): [7 bytes "LSCANCL"] [1 command]
//! ```
//!
//! See [`header`], [`handshake`] and [`marker`] for the individual pieces.

pub mod bytes;
pub mod error;
pub mod handshake;
pub mod header;
pub mod marker;
pub mod types;

pub use error::ProtocolError;
pub use handshake::{ConnectReply, Decision, DecisionReply, PROTOCOL_VERSION};
pub use header::{DynamicHeader, FIXED_HEADER_LEN, FixedHeader};
pub use marker::{CANCEL_MAGIC, CANCEL_MARKER_LEN, MarkerScanner};
pub use types::{CancelCommand, Command, Platform, TransferId, TransferIdAllocator};

/// Well-known TCP port for transfer connections.
pub const DEFAULT_TRANSFER_PORT: u16 = 43_210;
