//! Fixed and dynamic transfer headers.
//!
//! ```text
//! offset  len  field
//!      0    1  command
//!      1    1  ip version (0x00 = IPv4)
//!      2   16  ip address (IPv4: 4 bytes + 12 zero bytes)
//!     18    2  sender port
//!     20    1  sender platform
//!     21    1  sender name length
//!     22    2  file name length
//!     24    8  payload length
//!     32   24  reserved (byte 32: feature flags)
//! ```

use std::net::Ipv4Addr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;
use crate::bytes::{u16_from_bytes, u16_to_bytes, u64_from_bytes, u64_to_bytes};
use crate::types::{Command, Platform};

/// Encoded size of [`FixedHeader`].
pub const FIXED_HEADER_LEN: usize = 56;

/// Size of the reserved block at the end of the fixed header.
pub const RESERVED_LEN: usize = 24;

/// IP version byte for IPv4 addresses.
pub const IP_VERSION_V4: u8 = 0x00;

/// Width of the address field; IPv4 uses the first 4 bytes.
pub const IP_FIELD_LEN: usize = 16;

/// Flag bit (reserved byte 0): the payload is AES-CTR encrypted.
pub const FLAG_ENCRYPTED: u8 = 0x01;

/// Maximum sender name length (1-byte length field).
pub const MAX_SENDER_NAME_LEN: usize = u8::MAX as usize;

/// Maximum file name length (2-byte length field).
pub const MAX_FILE_NAME_LEN: usize = u16::MAX as usize;

const OFF_COMMAND: usize = 0;
const OFF_IP_VERSION: usize = 1;
const OFF_IP: usize = 2;
const OFF_PORT: usize = 18;
const OFF_PLATFORM: usize = 20;
const OFF_NAME_LEN: usize = 21;
const OFF_FILE_NAME_LEN: usize = 22;
const OFF_PAYLOAD_LEN: usize = 24;
const OFF_RESERVED: usize = 32;

/// The statically sized part of a transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedHeader {
    pub command: Command,
    pub sender_ip: Ipv4Addr,
    pub sender_port: u16,
    pub platform: Platform,
    pub sender_name_len: u8,
    pub file_name_len: u16,
    pub payload_len: u64,
    /// Feature flags carried in the first reserved byte.
    pub flags: u8,
}

impl FixedHeader {
    /// Builds the header for a reachability probe (no dynamic header).
    pub fn connect(sender_ip: Ipv4Addr, sender_port: u16, platform: Platform) -> Self {
        Self {
            command: Command::Connect,
            sender_ip,
            sender_port,
            platform,
            sender_name_len: 0,
            file_name_len: 0,
            payload_len: 0,
            flags: 0,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn encode(&self) -> [u8; FIXED_HEADER_LEN] {
        let mut buf = [0u8; FIXED_HEADER_LEN];
        buf[OFF_COMMAND] = self.command.as_byte();
        buf[OFF_IP_VERSION] = IP_VERSION_V4;
        buf[OFF_IP..OFF_IP + 4].copy_from_slice(&self.sender_ip.octets());
        buf[OFF_PORT..OFF_PORT + 2].copy_from_slice(&u16_to_bytes(self.sender_port));
        buf[OFF_PLATFORM] = self.platform.as_byte();
        buf[OFF_NAME_LEN] = self.sender_name_len;
        buf[OFF_FILE_NAME_LEN..OFF_FILE_NAME_LEN + 2]
            .copy_from_slice(&u16_to_bytes(self.file_name_len));
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 8].copy_from_slice(&u64_to_bytes(self.payload_len));
        buf[OFF_RESERVED] = self.flags;
        buf
    }

    pub fn decode(buf: &[u8; FIXED_HEADER_LEN]) -> Result<Self, ProtocolError> {
        let command = Command::try_from(buf[OFF_COMMAND])?;

        let ip_version = buf[OFF_IP_VERSION];
        if ip_version != IP_VERSION_V4 {
            return Err(ProtocolError::UnsupportedIpVersion(ip_version));
        }
        let ip = &buf[OFF_IP..OFF_IP + IP_FIELD_LEN];
        let sender_ip = Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3]);

        Ok(Self {
            command,
            sender_ip,
            sender_port: u16_from_bytes(buf, OFF_PORT),
            platform: Platform::from(buf[OFF_PLATFORM]),
            sender_name_len: buf[OFF_NAME_LEN],
            file_name_len: u16_from_bytes(buf, OFF_FILE_NAME_LEN),
            payload_len: u64_from_bytes(buf, OFF_PAYLOAD_LEN),
            flags: buf[OFF_RESERVED],
        })
    }
}

/// Writes the fixed header to the stream.
pub async fn write_fixed_header<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &FixedHeader,
) -> Result<(), ProtocolError> {
    writer.write_all(&header.encode()).await?;
    Ok(())
}

/// Reads and decodes the fixed header.
pub async fn read_fixed_header<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<FixedHeader, ProtocolError> {
    let mut buf = [0u8; FIXED_HEADER_LEN];
    reader.read_exact(&mut buf).await?;
    FixedHeader::decode(&buf)
}

/// Variable-length part of a file transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicHeader {
    pub sender_name: String,
    pub file_name: String,
}

impl DynamicHeader {
    /// Returns the encoded `(sender_name_len, file_name_len)` pair.
    pub fn lengths(&self) -> Result<(u8, u16), ProtocolError> {
        let name_len = self.sender_name.len();
        if name_len > MAX_SENDER_NAME_LEN {
            return Err(ProtocolError::FieldTooLong {
                field: "sender name",
                len: name_len,
                max: MAX_SENDER_NAME_LEN,
            });
        }
        let file_len = self.file_name.len();
        if file_len > MAX_FILE_NAME_LEN {
            return Err(ProtocolError::FieldTooLong {
                field: "file name",
                len: file_len,
                max: MAX_FILE_NAME_LEN,
            });
        }
        Ok((name_len as u8, file_len as u16))
    }
}

/// Writes the dynamic header. Lengths must already be in the fixed header.
pub async fn write_dynamic_header<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &DynamicHeader,
) -> Result<(), ProtocolError> {
    header.lengths()?;
    writer.write_all(header.sender_name.as_bytes()).await?;
    writer.write_all(header.file_name.as_bytes()).await?;
    Ok(())
}

/// Reads the dynamic header using the lengths declared in `fixed`.
pub async fn read_dynamic_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    fixed: &FixedHeader,
) -> Result<DynamicHeader, ProtocolError> {
    let mut name = vec![0u8; fixed.sender_name_len as usize];
    reader.read_exact(&mut name).await?;
    let mut file = vec![0u8; fixed.file_name_len as usize];
    reader.read_exact(&mut file).await?;

    Ok(DynamicHeader {
        sender_name: String::from_utf8(name)
            .map_err(|_| ProtocolError::InvalidUtf8("sender name"))?,
        file_name: String::from_utf8(file).map_err(|_| ProtocolError::InvalidUtf8("file name"))?,
    })
}
