//! LanShare transfer engine.
//!
//! [`TransferServer`] accepts connections and runs one listener state
//! machine per socket; [`TransferClient`] dials a peer and runs one dialer
//! state machine per send. Both report through an event channel taken with
//! `take_events`, and every transfer id that reports anything ends with
//! exactly one `Complete` or `Stopped` event.
//!
//! Payload bytes flow through a [`BufferPool`](lanshare_buffer_pool::BufferPool)
//! so that disk and socket I/O overlap. Either side can cancel at any time by
//! writing the in-band cancel marker; see [`lanshare_protocol::marker`].

mod cancel;
mod client;
mod config;
mod error;
mod pump;
mod secure;
mod server;
mod types;

#[cfg(test)]
mod e2e;

pub use cancel::CancelBus;
pub use client::TransferClient;
pub use config::{ClientConfig, ClosedPredicate, ServerConfig, is_connection_closed};
pub use error::TransferError;
pub use server::TransferServer;
pub use types::{
    BoxSink, BoxSource, ByteSink, ByteSource, ClientEvent, IncomingTransfer, RemoteDevice,
    ServerEvent, StopReason, TransferRequest, TransferResponse,
};

pub use lanshare_protocol::{CancelCommand, DEFAULT_TRANSFER_PORT, Platform, TransferId};

use std::future::Future;
use std::time::Duration;

/// Timeout for the TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the version/challenge/header exchange and the key exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a whole reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `fut`, failing with [`TransferError::Timeout`] after `limit`.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = Result<T, TransferError>>,
) -> Result<T, TransferError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TransferError::Timeout(what))?
}
