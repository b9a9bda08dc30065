//! Transfer listener.
//!
//! Binds the transfer port and runs one state machine per accepted socket:
//!
//! ```text
//! Handshaking -> AwaitingDecision -> Streaming -> Complete | Stopped
//! ```
//!
//! The accept loop owns the id counter, a dispatcher task owns the pending
//! decisions, and cancel requests reach handlers over a broadcast channel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lanshare_buffer_pool::BufferPool;
use lanshare_device::DeviceInfo;
use lanshare_protocol::handshake::{self, ConnectReply, Decision};
use lanshare_protocol::header::{read_dynamic_header, read_fixed_header};
use lanshare_protocol::marker::write_cancel_marker;
use lanshare_protocol::{CancelCommand, Command, ProtocolError, TransferId, TransferIdAllocator};

use crate::cancel::{CancelBus, CancelListener};
use crate::pump::{download, watch_for_marker};
use crate::types::{IncomingTransfer, ServerEvent, StopReason, TransferResponse};
use crate::{ServerConfig, TransferError, secure, with_timeout};

enum DecisionMsg {
    Register {
        id: TransferId,
        reply: oneshot::Sender<TransferResponse>,
    },
    Decide(TransferResponse),
    Forget(TransferId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Handshaking,
    AwaitingDecision,
    Decided,
}

enum Served {
    Probe,
    Complete,
}

/// The transfer listener.
pub struct TransferServer {
    config: ServerConfig,
    device: Arc<dyn DeviceInfo>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ServerEvent>>>,
    decisions_tx: mpsc::UnboundedSender<DecisionMsg>,
    decisions_rx: Mutex<Option<mpsc::UnboundedReceiver<DecisionMsg>>>,
    cancels: CancelBus,
    shutdown: CancellationToken,
}

impl TransferServer {
    pub fn new(config: ServerConfig, device: Arc<dyn DeviceInfo>) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (decisions_tx, decisions_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            device,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            decisions_tx,
            decisions_rx: Mutex::new(Some(decisions_rx)),
            cancels: CancelBus::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Takes the event receiver. Returns `None` after the first call.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Binds the configured address and starts accepting in the background.
    ///
    /// Emits `ListenerStarted`, or only `ListenerStopped` carrying the error
    /// when binding fails.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, TransferError> {
        let addr = SocketAddr::new(self.config.bind_ip, self.config.port);
        let bound = async {
            let listener = TcpListener::bind(addr).await?;
            let local_addr = listener.local_addr()?;
            Ok::<_, std::io::Error>((listener, local_addr))
        }
        .await;
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                error!(%addr, error = %e, "failed to bind transfer listener");
                self.emit(ServerEvent::ListenerStopped {
                    error: Some(e.to_string()),
                });
                return Err(e.into());
            }
        };

        if let Some(rx) = self.decisions_rx.lock().await.take() {
            tokio::spawn(run_decision_dispatcher(rx));
        }

        info!(%local_addr, "transfer listener started");
        self.emit(ServerEvent::ListenerStarted { addr: local_addr });

        let server = Arc::clone(self);
        tokio::spawn(async move { server.accept_loop(listener).await });
        Ok(local_addr)
    }

    /// Answers a pending `Requested` event. Unknown or expired ids are
    /// ignored.
    pub fn decide(&self, response: TransferResponse) {
        if self
            .decisions_tx
            .send(DecisionMsg::Decide(response))
            .is_err()
        {
            debug!("decision dispatcher is gone");
        }
    }

    /// Interrupts transfer `id`. The peer is told with the in-band marker;
    /// deleting a partial file is up to the caller once `Stopped` arrives.
    pub fn cancel(&self, id: TransferId, command: CancelCommand) -> bool {
        self.cancels.cancel(id, command)
    }

    /// Stops accepting new connections. Running transfers continue.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn emit(&self, event: ServerEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut ids = TransferIdAllocator::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let id = ids.allocate();
                            let cancel = self.cancels.listen(id);
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                server.handle_connection(stream, peer, id, cancel).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                        }
                    }
                }
            }
        }
        info!("transfer listener stopped");
        self.emit(ServerEvent::ListenerStopped { error: None });
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        id: TransferId,
        mut cancel: CancelListener,
    ) {
        debug!(%id, %peer, "connection accepted");
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%id, error = %e, "failed to set TCP_NODELAY");
        }
        let (mut reader, mut writer) = stream.into_split();
        let mut stage = Stage::Handshaking;

        let outcome = tokio::select! {
            biased;
            command = cancel.wait() => Err(TransferError::Cancelled { command, was_local: true }),
            result = self.serve(id, peer, &mut reader, &mut writer, &mut stage) => result,
        };

        if stage == Stage::AwaitingDecision {
            let _ = self.decisions_tx.send(DecisionMsg::Forget(id));
        }
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

        match outcome {
            Ok(Served::Probe) => debug!(%id, %peer, "probe answered"),
            Ok(Served::Complete) => {
                info!(%id, %peer, "transfer complete");
                self.emit(ServerEvent::Complete { id });
            }
            Err(e) => {
                let reason = e.stop_reason(self.config.closed_predicate);
                match reason {
                    StopReason::Rejected | StopReason::UserCancelled { .. } => {
                        info!(%id, %peer, %reason, "transfer stopped");
                    }
                    _ => warn!(%id, %peer, %reason, error = %e, "transfer stopped"),
                }
                self.emit(ServerEvent::Stopped { id, reason });
            }
        }
    }

    async fn serve(
        &self,
        id: TransferId,
        peer: SocketAddr,
        reader: &mut OwnedReadHalf,
        writer: &mut OwnedWriteHalf,
        stage: &mut Stage,
    ) -> Result<Served, TransferError> {
        let header = with_timeout(self.config.handshake_timeout, "handshake", async {
            let version = handshake::read_version(reader).await?;
            if !handshake::is_supported_version(version) {
                return Err(ProtocolError::UnsupportedVersion(version).into());
            }
            let challenge = handshake::generate_challenge();
            handshake::write_challenge(writer, &challenge).await?;
            let response = handshake::read_challenge(reader).await?;
            if !handshake::verify_challenge_response(&challenge, &response) {
                return Err(ProtocolError::AuthFailed.into());
            }
            Ok(read_fixed_header(reader).await?)
        })
        .await?;

        if header.command == Command::Connect {
            let reply = ConnectReply {
                platform: self.device.platform(),
                display_name: self.device.display_name(),
            };
            handshake::write_connect_reply(writer, &reply).await?;
            return Ok(Served::Probe);
        }

        let dynamic = with_timeout(self.config.handshake_timeout, "handshake", async {
            Ok(read_dynamic_header(reader, &header).await?)
        })
        .await?;

        let payload_len = header.payload_len;
        let transfer = IncomingTransfer {
            sender_name: dynamic.sender_name,
            file_name: dynamic.file_name,
            payload_len,
            sender_ip: header.sender_ip,
            sender_port: header.sender_port,
            platform: header.platform,
            encrypted: header.is_encrypted(),
        };
        info!(
            %id,
            %peer,
            sender = %transfer.sender_name,
            file = %transfer.file_name,
            bytes = payload_len,
            encrypted = transfer.encrypted,
            "transfer requested"
        );

        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.decisions_tx.send(DecisionMsg::Register {
            id,
            reply: reply_tx,
        });
        *stage = Stage::AwaitingDecision;
        self.emit(ServerEvent::Requested { id, transfer });

        let response = tokio::select! {
            response = reply_rx => response.ok(),
            err = watch_for_marker(reader) => return Err(err),
        };
        *stage = Stage::Decided;

        let (accepted, existing_len, sink) = match response {
            Some(response) => (response.accepted, response.existing_len, response.sink),
            None => (false, 0, None),
        };
        let mut sink = match (accepted, sink) {
            (true, Some(sink)) => sink,
            (accepted, _) => {
                handshake::write_decision(writer, Decision::reject()).await?;
                return Err(if accepted {
                    TransferError::NoSink
                } else {
                    TransferError::Rejected
                });
            }
        };

        let existing = existing_len.min(payload_len);
        handshake::write_decision(writer, Decision::accept(existing)).await?;
        debug!(%id, existing, "transfer accepted");

        let cipher = if header.is_encrypted() {
            Some(
                with_timeout(
                    self.config.handshake_timeout,
                    "key exchange",
                    secure::listener_exchange(reader, writer),
                )
                .await?,
            )
        } else {
            None
        };

        let pool = BufferPool::new(self.config.pool_slots, self.config.buffer_size);
        let events = self.events_tx.clone();
        download(
            reader,
            &mut sink,
            &pool,
            payload_len - existing,
            cipher,
            |written| {
                let _ = events.send(ServerEvent::Progress {
                    id,
                    bytes: existing + written,
                    total: payload_len,
                });
            },
        )
        .await?;
        Ok(Served::Complete)
    }
}

async fn run_decision_dispatcher(mut rx: mpsc::UnboundedReceiver<DecisionMsg>) {
    let mut pending: HashMap<TransferId, oneshot::Sender<TransferResponse>> = HashMap::new();
    while let Some(msg) = rx.recv().await {
        match msg {
            DecisionMsg::Register { id, reply } => {
                pending.insert(id, reply);
            }
            DecisionMsg::Decide(response) => {
                let id = response.id;
                match pending.remove(&id) {
                    Some(reply) => {
                        if reply.send(response).is_err() {
                            debug!(%id, "transfer ended before its decision arrived");
                        }
                    }
                    None => debug!(%id, "decision for unknown transfer ignored"),
                }
            }
            DecisionMsg::Forget(id) => {
                pending.remove(&id);
            }
        }
    }
}
