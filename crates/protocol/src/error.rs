//! Error types for the wire codec.

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("authentication challenge failed")]
    AuthFailed,

    #[error("unknown command byte {0:#04x}")]
    UnknownCommand(u8),

    #[error("unsupported IP version byte {0:#04x}")]
    UnsupportedIpVersion(u8),

    #[error("invalid decision byte {0:#04x}")]
    InvalidDecision(u8),

    #[error("{field} too long: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}
