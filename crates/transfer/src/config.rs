use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use lanshare_buffer_pool::{DEFAULT_BUFFER_SIZE, DEFAULT_SLOT_COUNT};
use lanshare_protocol::DEFAULT_TRANSFER_PORT;

use crate::{CONNECT_TIMEOUT, HANDSHAKE_TIMEOUT, PROBE_TIMEOUT};

/// Decides whether an I/O error means the connection is gone.
pub type ClosedPredicate = fn(&io::Error) -> bool;

/// Default [`ClosedPredicate`].
pub fn is_connection_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    pub bind_ip: IpAddr,
    pub buffer_size: usize,
    pub pool_slots: usize,
    pub handshake_timeout: Duration,
    pub closed_predicate: ClosedPredicate,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TRANSFER_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            buffer_size: DEFAULT_BUFFER_SIZE,
            pool_slots: DEFAULT_SLOT_COUNT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            closed_predicate: is_connection_closed,
        }
    }
}

/// Dialer configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Port of our own listener, advertised in the fixed header.
    pub port: u16,
    pub buffer_size: usize,
    pub pool_slots: usize,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub probe_timeout: Duration,
    /// Request AES-CTR payload encryption.
    pub encrypt: bool,
    pub closed_predicate: ClosedPredicate,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TRANSFER_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            pool_slots: DEFAULT_SLOT_COUNT,
            connect_timeout: CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
            encrypt: false,
            closed_predicate: is_connection_closed,
        }
    }
}
