use std::fmt;

use crate::ProtocolError;

/// Per-connection transfer identifier.
///
/// Each endpoint numbers its own connections; ids are not unique across
/// peers and wrap from `u16::MAX` back to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u16);

impl TransferId {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    /// Returns the id following this one, wrapping at `u16::MAX`.
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out monotonically increasing transfer ids for one endpoint.
///
/// Owned by a single task (the accept loop or the client); not shared.
#[derive(Debug, Default)]
pub struct TransferIdAllocator {
    next: TransferId,
}

impl TransferIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts numbering at `first`.
    pub fn starting_at(first: TransferId) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> TransferId {
        let id = self.next;
        self.next = id.next();
        id
    }
}

/// Command byte of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reachability probe: the listener answers with its name and platform.
    Connect,
    /// A file transfer request follows.
    FileTransfer,
}

impl Command {
    pub const fn as_byte(self) -> u8 {
        match self {
            Command::Connect => 0x01,
            Command::FileTransfer => 0x02,
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Command::Connect),
            0x02 => Ok(Command::FileTransfer),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// Platform byte advertised by each peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Unknown,
    Android,
    Ios,
    Linux,
    Macos,
    Windows,
}

impl Platform {
    pub const fn as_byte(self) -> u8 {
        match self {
            Platform::Unknown => 0,
            Platform::Android => 1,
            Platform::Ios => 2,
            Platform::Linux => 3,
            Platform::Macos => 4,
            Platform::Windows => 5,
        }
    }
}

/// Unrecognized values decode as [`Platform::Unknown`] so newer peers can
/// still talk to us.
impl From<u8> for Platform {
    fn from(byte: u8) -> Self {
        match byte {
            1 => Platform::Android,
            2 => Platform::Ios,
            3 => Platform::Linux,
            4 => Platform::Macos,
            5 => Platform::Windows,
            _ => Platform::Unknown,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Unknown => "unknown",
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
        };
        f.write_str(name)
    }
}

/// What the receiving side should do with the partial file after a cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCommand {
    /// Stop the transfer and keep what was written.
    Stop,
    /// Stop the transfer; the caller deletes the partial file.
    StopAndDelete,
}

impl CancelCommand {
    pub const fn as_byte(self) -> u8 {
        match self {
            CancelCommand::Stop => 0x01,
            CancelCommand::StopAndDelete => 0x02,
        }
    }
}

impl TryFrom<u8> for CancelCommand {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(CancelCommand::Stop),
            0x02 => Ok(CancelCommand::StopAndDelete),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for CancelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCommand::Stop => f.write_str("stop"),
            CancelCommand::StopAndDelete => f.write_str("stop-and-delete"),
        }
    }
}
