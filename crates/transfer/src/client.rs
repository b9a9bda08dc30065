//! Transfer dialer.
//!
//! Each [`TransferClient::send`] spawns one state machine:
//!
//! ```text
//! Connecting -> Handshaking -> AwaitingAcceptance -> Streaming -> Complete | Stopped
//! ```
//!
//! While streaming, the upload races a reader that watches for the
//! recipient's cancel marker; whichever finishes first ends the transfer.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use lanshare_buffer_pool::BufferPool;
use lanshare_device::DeviceInfo;
use lanshare_protocol::bytes::truncate_utf8;
use lanshare_protocol::handshake::{self, DecisionReply, PROTOCOL_VERSION};
use lanshare_protocol::header::{
    FLAG_ENCRYPTED, MAX_SENDER_NAME_LEN, write_dynamic_header, write_fixed_header,
};
use lanshare_protocol::marker::write_cancel_marker;
use lanshare_protocol::{
    CancelCommand, Command, DynamicHeader, FixedHeader, TransferId, TransferIdAllocator,
};

use crate::cancel::{CancelBus, CancelListener};
use crate::pump::{upload, watch_for_marker};
use crate::types::{ClientEvent, RemoteDevice, StopReason, TransferRequest};
use crate::{ClientConfig, TransferError, secure, with_timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Handshaking,
    AwaitingAcceptance,
    Streaming,
}

/// The transfer dialer.
pub struct TransferClient {
    config: ClientConfig,
    device: Arc<dyn DeviceInfo>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
    ids: TransferIdAllocator,
    cancels: CancelBus,
}

impl TransferClient {
    pub fn new(config: ClientConfig, device: Arc<dyn DeviceInfo>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            device,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            ids: TransferIdAllocator::new(),
            cancels: CancelBus::new(),
        }
    }

    /// Takes the event receiver. Returns `None` after the first call.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Starts sending `request` to `destination` in a background task.
    ///
    /// Progress and the outcome arrive as [`ClientEvent`]s tagged with the
    /// returned id. Must be called from within a Tokio runtime.
    pub fn send(&mut self, request: TransferRequest, destination: SocketAddr) -> TransferId {
        let id = self.ids.allocate();
        let cancel = self.cancels.listen(id);
        let dialer = Dialer {
            id,
            config: self.config.clone(),
            device: Arc::clone(&self.device),
            events: self.events_tx.clone(),
        };
        tokio::spawn(dialer.run(request, destination, cancel));
        id
    }

    /// Asks `destination` for its name and platform.
    ///
    /// The whole exchange is bounded by the probe timeout.
    pub async fn probe(&self, destination: SocketAddr) -> Result<RemoteDevice, TransferError> {
        let header = FixedHeader::connect(
            self.device.local_ipv4(),
            self.config.port,
            self.device.platform(),
        );
        let result = with_timeout(self.config.probe_timeout, "probe", async {
            let stream = TcpStream::connect(destination).await?;
            let (mut reader, mut writer) = stream.into_split();
            authenticate(&mut reader, &mut writer).await?;
            write_fixed_header(&mut writer, &header).await?;
            writer.flush().await?;
            let reply = handshake::read_connect_reply(&mut reader).await?;
            Ok(RemoteDevice {
                display_name: reply.display_name,
                platform: reply.platform,
            })
        })
        .await;

        match &result {
            Ok(remote) => info!(
                peer = %destination,
                name = %remote.display_name,
                platform = %remote.platform,
                "probe answered"
            ),
            Err(e) => warn!(peer = %destination, error = %e, "probe failed"),
        }
        result
    }

    /// Interrupts transfer `id`; the recipient is told with the in-band
    /// marker.
    pub fn cancel(&self, id: TransferId, command: CancelCommand) -> bool {
        self.cancels.cancel(id, command)
    }

    /// A handle that can cancel this client's transfers from elsewhere.
    pub fn cancel_handle(&self) -> CancelBus {
        self.cancels.clone()
    }
}

/// Version, challenge answer. Shared by sends and probes.
async fn authenticate<R, W>(reader: &mut R, writer: &mut W) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    handshake::write_version(writer, PROTOCOL_VERSION).await?;
    let challenge = handshake::read_challenge(reader).await?;
    handshake::write_challenge(writer, &handshake::challenge_response(&challenge)).await?;
    Ok(())
}

struct Dialer {
    id: TransferId,
    config: ClientConfig,
    device: Arc<dyn DeviceInfo>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Dialer {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    async fn run(self, request: TransferRequest, destination: SocketAddr, mut cancel: CancelListener) {
        let id = self.id;
        info!(
            %id,
            peer = %destination,
            file = %request.file_name,
            bytes = request.payload_len,
            "sending"
        );
        self.emit(ClientEvent::Connecting {
            id,
            peer: destination,
        });

        let connected = tokio::select! {
            biased;
            command = cancel.wait() => Err(TransferError::Cancelled { command, was_local: true }),
            result = with_timeout(self.config.connect_timeout, "connect", async {
                Ok(TcpStream::connect(destination).await?)
            }) => result,
        };

        let outcome = match connected {
            Err(e) => Err(e),
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%id, error = %e, "failed to set TCP_NODELAY");
                }
                let (mut reader, mut writer) = stream.into_split();
                let mut stage = Stage::Handshaking;

                let outcome = tokio::select! {
                    biased;
                    command = cancel.wait() => Err(TransferError::Cancelled { command, was_local: true }),
                    result = self.drive(request, &mut reader, &mut writer, &mut stage) => result,
                };

                if let Err(TransferError::Cancelled {
                    command,
                    was_local: true,
                }) = &outcome
                    && stage != Stage::Handshaking
                    && let Err(e) = write_cancel_marker(&mut writer, *command).await
                {
                    debug!(%id, error = %e, "failed to send cancel marker");
                }
                let _ = writer.shutdown().await;
                outcome
            }
        };

        match outcome {
            Ok(()) => {
                info!(%id, peer = %destination, "transfer complete");
                self.emit(ClientEvent::Complete { id });
            }
            Err(e) => {
                let reason = e.stop_reason(self.config.closed_predicate);
                match reason {
                    StopReason::Rejected | StopReason::UserCancelled { .. } => {
                        info!(%id, peer = %destination, %reason, "transfer stopped");
                    }
                    _ => warn!(%id, peer = %destination, %reason, error = %e, "transfer stopped"),
                }
                self.emit(ClientEvent::Stopped { id, reason });
            }
        }
    }

    async fn drive(
        &self,
        request: TransferRequest,
        reader: &mut OwnedReadHalf,
        writer: &mut OwnedWriteHalf,
        stage: &mut Stage,
    ) -> Result<(), TransferError> {
        let id = self.id;
        let TransferRequest {
            sender_name,
            file_name,
            payload_len,
            mut source,
        } = request;

        let dynamic = DynamicHeader {
            sender_name: truncate_utf8(&sender_name, MAX_SENDER_NAME_LEN).to_string(),
            file_name,
        };
        let (sender_name_len, file_name_len) = dynamic.lengths()?;
        let header = FixedHeader {
            command: Command::FileTransfer,
            sender_ip: self.device.local_ipv4(),
            sender_port: self.config.port,
            platform: self.device.platform(),
            sender_name_len,
            file_name_len,
            payload_len,
            flags: if self.config.encrypt { FLAG_ENCRYPTED } else { 0 },
        };

        with_timeout(self.config.handshake_timeout, "handshake", async {
            authenticate(reader, writer).await?;
            write_fixed_header(writer, &header).await?;
            write_dynamic_header(writer, &dynamic).await?;
            writer.flush().await?;
            Ok(())
        })
        .await?;

        *stage = Stage::AwaitingAcceptance;
        self.emit(ClientEvent::AwaitingAcceptance { id });

        let decision = match handshake::read_decision(reader).await? {
            DecisionReply::Decision(decision) => decision,
            DecisionReply::Cancelled(command) => {
                return Err(TransferError::Cancelled {
                    command,
                    was_local: false,
                });
            }
        };
        self.emit(ClientEvent::ResponseReceived {
            id,
            accepted: decision.accepted,
            existing_len: decision.existing_len,
        });
        if !decision.accepted {
            return Err(TransferError::Rejected);
        }

        *stage = Stage::Streaming;
        let existing = decision.existing_len.min(payload_len);
        source.seek(SeekFrom::Start(existing)).await?;
        debug!(%id, existing, "transfer accepted");

        let cipher = if self.config.encrypt {
            Some(
                with_timeout(
                    self.config.handshake_timeout,
                    "key exchange",
                    secure::dialer_exchange(reader, writer),
                )
                .await?,
            )
        } else {
            None
        };

        let pool = BufferPool::new(self.config.pool_slots, self.config.buffer_size);
        let events = self.events.clone();
        let pump = upload(
            &mut source,
            writer,
            &pool,
            payload_len - existing,
            cipher,
            |sent| {
                let _ = events.send(ClientEvent::Progress {
                    id,
                    bytes: existing + sent,
                    total: payload_len,
                });
            },
        );

        // Pump first: the listener closes as soon as the last byte lands.
        tokio::select! {
            biased;
            result = pump => result,
            err = watch_for_marker(reader) => Err(err),
        }
    }
}
