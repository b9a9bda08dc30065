//! Listener and dialer talking over loopback TCP.

use std::collections::HashMap;
use std::io::{self, Cursor, SeekFrom};
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};

use lanshare_device::{DeviceInfo, FixedDevice};
use lanshare_protocol::handshake::PROTOCOL_VERSION;

use crate::*;

const WAIT: Duration = Duration::from_secs(30);

fn device(name: &str) -> Arc<dyn DeviceInfo> {
    Arc::new(FixedDevice::new(name, Platform::Linux, Ipv4Addr::LOCALHOST))
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

fn request(file_name: &str, data: Vec<u8>) -> TransferRequest {
    TransferRequest::new(
        "Sender",
        file_name,
        data.len() as u64,
        Box::new(Cursor::new(data)),
    )
}

/// In-memory sink whose contents stay readable after the engine drops it.
#[derive(Clone, Default)]
struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl AsyncWrite for MemorySink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Yields its data up to `stall_at`, then never produces another byte.
struct StalledSource {
    data: Vec<u8>,
    pos: usize,
    stall_at: usize,
}

impl AsyncRead for StalledSource {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let end = this.stall_at.min(this.data.len());
        if this.pos >= end {
            return Poll::Pending;
        }
        let n = (end - this.pos).min(buf.remaining());
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for StalledSource {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match position {
            SeekFrom::Start(pos) => {
                self.get_mut().pos = pos as usize;
                Ok(())
            }
            _ => Err(io::Error::new(io::ErrorKind::Unsupported, "start only")),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos as u64))
    }
}

fn stalled_request(len: usize, stall_at: usize) -> TransferRequest {
    TransferRequest::new(
        "Sender",
        "stalled.bin",
        len as u64,
        Box::new(StalledSource {
            data: pattern(len),
            pos: 0,
            stall_at,
        }),
    )
}

struct Listener {
    server: Arc<TransferServer>,
    addr: SocketAddr,
    events: UnboundedReceiver<ServerEvent>,
}

async fn start_server() -> Listener {
    let config = ServerConfig {
        port: 0,
        bind_ip: Ipv4Addr::LOCALHOST.into(),
        ..ServerConfig::default()
    };
    let server = TransferServer::new(config, device("Receiver"));
    let mut events = server.take_events().await.unwrap();
    let addr = server.start().await.unwrap();
    match next(&mut events).await {
        ServerEvent::ListenerStarted { addr: started } => assert_eq!(started, addr),
        other => panic!("expected ListenerStarted, got {other:?}"),
    }
    Listener {
        server,
        addr,
        events,
    }
}

async fn new_client(config: ClientConfig) -> (TransferClient, UnboundedReceiver<ClientEvent>) {
    let client = TransferClient::new(config, device("Sender Box"));
    let events = client.take_events().await.unwrap();
    (client, events)
}

async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn client_until_terminal(rx: &mut UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next(rx).await;
        let done = event.is_terminal();
        seen.push(event);
        if done {
            return seen;
        }
    }
}

async fn server_until_terminal(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next(rx).await;
        let done = event.is_terminal();
        seen.push(event);
        if done {
            return seen;
        }
    }
}

async fn expect_requested(rx: &mut UnboundedReceiver<ServerEvent>) -> (TransferId, IncomingTransfer) {
    match next(rx).await {
        ServerEvent::Requested { id, transfer } => (id, transfer),
        other => panic!("expected Requested, got {other:?}"),
    }
}

fn server_progress(events: &[ServerEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Progress { bytes, .. } => Some(*bytes),
            _ => None,
        })
        .collect()
}

fn client_progress(events: &[ClientEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Progress { bytes, .. } => Some(*bytes),
            _ => None,
        })
        .collect()
}

fn strictly_increasing(values: &[u64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

#[tokio::test]
async fn sends_ten_mebibytes() {
    const LEN: usize = 10 * 1024 * 1024;
    let data = pattern(LEN);
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;

    let id = client.send(request("big.bin", data.clone()), listener.addr);

    let (sid, transfer) = expect_requested(&mut listener.events).await;
    assert_eq!(transfer.sender_name, "Sender");
    assert_eq!(transfer.file_name, "big.bin");
    assert_eq!(transfer.payload_len, LEN as u64);
    assert_eq!(transfer.platform, Platform::Linux);
    assert_eq!(transfer.sender_ip, Ipv4Addr::LOCALHOST);
    assert!(!transfer.encrypted);

    let sink = MemorySink::default();
    listener
        .server
        .decide(TransferResponse::accept(sid, 0, Box::new(sink.clone())));

    let server_events = server_until_terminal(&mut listener.events).await;
    let progress = server_progress(&server_events);
    assert!(strictly_increasing(&progress));
    assert_eq!(progress.last(), Some(&(LEN as u64)));
    assert!(matches!(server_events.last(), Some(ServerEvent::Complete { id }) if *id == sid));
    assert_eq!(sink.contents(), data);

    let client_events = client_until_terminal(&mut client_events).await;
    assert_eq!(
        &client_events[..3],
        &[
            ClientEvent::Connecting {
                id,
                peer: listener.addr
            },
            ClientEvent::AwaitingAcceptance { id },
            ClientEvent::ResponseReceived {
                id,
                accepted: true,
                existing_len: 0
            },
        ]
    );
    let progress = client_progress(&client_events);
    assert!(strictly_increasing(&progress));
    assert_eq!(progress.last(), Some(&(LEN as u64)));
    assert_eq!(client_events.last(), Some(&ClientEvent::Complete { id }));
}

#[tokio::test]
async fn rejected_transfer() {
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(request("nope.bin", pattern(1000)), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    listener.server.decide(TransferResponse::reject(sid));

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(
        server_events.as_slice(),
        [ServerEvent::Stopped {
            reason: StopReason::Rejected,
            ..
        }]
    ));

    let client_events = client_until_terminal(&mut client_events).await;
    let responses: Vec<_> = client_events
        .iter()
        .filter(|e| matches!(e, ClientEvent::ResponseReceived { .. }))
        .collect();
    assert_eq!(
        responses,
        vec![&ClientEvent::ResponseReceived {
            id,
            accepted: false,
            existing_len: 0
        }]
    );
    assert!(client_progress(&client_events).is_empty());
    assert_eq!(
        client_events.last(),
        Some(&ClientEvent::Stopped {
            id,
            reason: StopReason::Rejected
        })
    );
}

#[tokio::test]
async fn recipient_cancels_mid_send() {
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(stalled_request(1024 * 1024, 256 * 1024), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    let sink = MemorySink::default();
    listener
        .server
        .decide(TransferResponse::accept(sid, 0, Box::new(sink.clone())));

    match next(&mut listener.events).await {
        ServerEvent::Progress { id, .. } => assert_eq!(id, sid),
        other => panic!("expected Progress, got {other:?}"),
    }
    assert!(listener.server.cancel(sid, CancelCommand::Stop));

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(
        server_events.last(),
        Some(ServerEvent::Stopped {
            reason: StopReason::UserCancelled {
                command: CancelCommand::Stop,
                was_local: true
            },
            ..
        })
    ));

    let terminal = client_until_terminal(&mut client_events).await;
    assert_eq!(
        terminal.last(),
        Some(&ClientEvent::Stopped {
            id,
            reason: StopReason::UserCancelled {
                command: CancelCommand::Stop,
                was_local: false
            }
        })
    );

    sleep(Duration::from_millis(100)).await;
    assert!(client_events.try_recv().is_err());
    assert!(sink.contents().len() <= 256 * 1024);
}

#[tokio::test]
async fn sender_cancels_mid_send() {
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(stalled_request(1024 * 1024, 128 * 1024), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    listener
        .server
        .decide(TransferResponse::accept(sid, 0, Box::new(MemorySink::default())));

    loop {
        if let ClientEvent::Progress { .. } = next(&mut client_events).await {
            break;
        }
    }
    assert!(client.cancel(id, CancelCommand::StopAndDelete));

    let client_events = client_until_terminal(&mut client_events).await;
    assert_eq!(
        client_events.last(),
        Some(&ClientEvent::Stopped {
            id,
            reason: StopReason::UserCancelled {
                command: CancelCommand::StopAndDelete,
                was_local: true
            }
        })
    );

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(
        server_events.last(),
        Some(ServerEvent::Stopped {
            reason: StopReason::UserCancelled {
                command: CancelCommand::StopAndDelete,
                was_local: false
            },
            ..
        })
    ));
}

#[tokio::test]
async fn dialer_cancels_while_awaiting_decision() {
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(request("wait.bin", pattern(100)), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    loop {
        if let ClientEvent::AwaitingAcceptance { .. } = next(&mut client_events).await {
            break;
        }
    }
    client.cancel(id, CancelCommand::Stop);

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(
        server_events.last(),
        Some(ServerEvent::Stopped {
            reason: StopReason::UserCancelled {
                was_local: false,
                ..
            },
            ..
        })
    ));
    let client_events = client_until_terminal(&mut client_events).await;
    assert!(matches!(
        client_events.last(),
        Some(ClientEvent::Stopped {
            reason: StopReason::UserCancelled {
                was_local: true,
                ..
            },
            ..
        })
    ));

    // Too late: the decision is dropped.
    listener.server.decide(TransferResponse::reject(sid));
    sleep(Duration::from_millis(50)).await;
    assert!(listener.events.try_recv().is_err());
}

#[tokio::test]
async fn listener_cancels_while_awaiting_decision() {
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(request("wait.bin", pattern(100)), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    listener.server.cancel(sid, CancelCommand::StopAndDelete);

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(
        server_events.last(),
        Some(ServerEvent::Stopped {
            reason: StopReason::UserCancelled {
                was_local: true,
                ..
            },
            ..
        })
    ));

    let client_events = client_until_terminal(&mut client_events).await;
    assert!(
        !client_events
            .iter()
            .any(|e| matches!(e, ClientEvent::ResponseReceived { .. }))
    );
    assert_eq!(
        client_events.last(),
        Some(&ClientEvent::Stopped {
            id,
            reason: StopReason::UserCancelled {
                command: CancelCommand::StopAndDelete,
                was_local: false
            }
        })
    );
}

#[tokio::test]
async fn unsupported_version_is_refused() {
    let mut listener = start_server().await;
    let mut raw = TcpStream::connect(listener.addr).await.unwrap();
    raw.write_all(&[PROTOCOL_VERSION + 1]).await.unwrap();

    match next(&mut listener.events).await {
        ServerEvent::Stopped { reason, .. } => assert_eq!(reason, StopReason::UnknownProtocol),
        other => panic!("expected Stopped, got {other:?}"),
    }
    // No challenge was sent.
    let mut buf = [0u8; 32];
    assert!(matches!(raw.read(&mut buf).await, Ok(0)));
}

#[tokio::test]
async fn wrong_challenge_response_is_refused() {
    let mut listener = start_server().await;
    let mut raw = TcpStream::connect(listener.addr).await.unwrap();
    raw.write_all(&[PROTOCOL_VERSION]).await.unwrap();
    let mut challenge = [0u8; 32];
    raw.read_exact(&mut challenge).await.unwrap();
    raw.write_all(&challenge).await.unwrap();

    match next(&mut listener.events).await {
        ServerEvent::Stopped { reason, .. } => {
            assert_eq!(reason, StopReason::AuthChallengeFailure)
        }
        other => panic!("expected Stopped, got {other:?}"),
    }
}

#[tokio::test]
async fn resumes_by_appending() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.bin");
    let data = pattern(8192);
    tokio::fs::write(&path, &data[..4096]).await.unwrap();

    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(request("partial.bin", data.clone()), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    let file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .await
        .unwrap();
    listener
        .server
        .decide(TransferResponse::accept(sid, 4096, Box::new(file)));

    let server_events = server_until_terminal(&mut listener.events).await;
    let progress = server_progress(&server_events);
    assert!(progress.iter().all(|b| *b > 4096));
    assert_eq!(progress.last(), Some(&8192));
    assert!(matches!(server_events.last(), Some(ServerEvent::Complete { .. })));

    let client_events = client_until_terminal(&mut client_events).await;
    assert!(client_events.contains(&ClientEvent::ResponseReceived {
        id,
        accepted: true,
        existing_len: 4096
    }));
    assert_eq!(client_progress(&client_events).last(), Some(&8192));

    // Had the source not been seeked, the first half would appear twice.
    assert_eq!(tokio::fs::read(&path).await.unwrap(), data);
}

#[tokio::test]
async fn existing_length_is_clamped_to_payload() {
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(request("done.bin", pattern(100)), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    let sink = MemorySink::default();
    listener
        .server
        .decide(TransferResponse::accept(sid, 10_000, Box::new(sink.clone())));

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(server_events.as_slice(), [ServerEvent::Complete { .. }]));

    let client_events = client_until_terminal(&mut client_events).await;
    assert!(client_events.contains(&ClientEvent::ResponseReceived {
        id,
        accepted: true,
        existing_len: 100
    }));
    assert_eq!(client_events.last(), Some(&ClientEvent::Complete { id }));
    assert!(sink.contents().is_empty());
}

#[tokio::test]
async fn accept_without_sink_reports_unable_to_open() {
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(request("x.bin", pattern(10)), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    listener.server.decide(TransferResponse {
        id: sid,
        accepted: true,
        existing_len: 0,
        sink: None,
    });

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(
        server_events.last(),
        Some(ServerEvent::Stopped {
            reason: StopReason::UnableToOpenSink,
            ..
        })
    ));

    let client_events = client_until_terminal(&mut client_events).await;
    assert!(client_progress(&client_events).is_empty());
    assert_eq!(
        client_events.last(),
        Some(&ClientEvent::Stopped {
            id,
            reason: StopReason::Rejected
        })
    );
}

#[tokio::test]
async fn encrypted_transfer() {
    let data = pattern(300 * 1024 + 123);
    let mut listener = start_server().await;
    let config = ClientConfig {
        encrypt: true,
        ..ClientConfig::default()
    };
    let (mut client, mut client_events) = new_client(config).await;
    let id = client.send(request("secret.bin", data.clone()), listener.addr);

    let (sid, transfer) = expect_requested(&mut listener.events).await;
    assert!(transfer.encrypted);
    let sink = MemorySink::default();
    listener
        .server
        .decide(TransferResponse::accept(sid, 0, Box::new(sink.clone())));

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(server_events.last(), Some(ServerEvent::Complete { .. })));
    assert_eq!(sink.contents(), data);

    let client_events = client_until_terminal(&mut client_events).await;
    assert_eq!(client_events.last(), Some(&ClientEvent::Complete { id }));
}

#[tokio::test]
async fn listener_cancels_during_key_exchange() {
    let mut listener = start_server().await;
    let config = ClientConfig {
        encrypt: true,
        ..ClientConfig::default()
    };
    let (mut client, mut client_events) = new_client(config).await;
    let id = client.send(stalled_request(64 * 1024, 0), listener.addr);

    let (sid, _) = expect_requested(&mut listener.events).await;
    listener
        .server
        .decide(TransferResponse::accept(sid, 0, Box::new(MemorySink::default())));

    loop {
        match next(&mut client_events).await {
            ClientEvent::ResponseReceived { accepted: true, .. } => break,
            ClientEvent::Connecting { .. } | ClientEvent::AwaitingAcceptance { .. } => {}
            other => panic!("expected ResponseReceived, got {other:?}"),
        }
    }
    assert!(listener.server.cancel(sid, CancelCommand::Stop));

    let server_events = server_until_terminal(&mut listener.events).await;
    assert!(matches!(
        server_events.last(),
        Some(ServerEvent::Stopped {
            reason: StopReason::UserCancelled {
                command: CancelCommand::Stop,
                was_local: true
            },
            ..
        })
    ));

    let terminal = client_until_terminal(&mut client_events).await;
    assert_eq!(
        terminal.last(),
        Some(&ClientEvent::Stopped {
            id,
            reason: StopReason::UserCancelled {
                command: CancelCommand::Stop,
                was_local: false
            }
        })
    );
}

#[tokio::test]
async fn concurrent_transfers_are_independent() {
    let mut listener = start_server().await;
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;

    let files: HashMap<String, Vec<u8>> = [("a.bin", 70_000), ("b.bin", 1), ("c.bin", 333_333)]
        .into_iter()
        .map(|(name, len)| (name.to_string(), pattern(len)))
        .collect();
    for (name, data) in &files {
        client.send(request(name, data.clone()), listener.addr);
    }

    let mut sinks: HashMap<String, MemorySink> = HashMap::new();
    let mut completed = 0;
    while completed < files.len() {
        match next(&mut listener.events).await {
            ServerEvent::Requested { id, transfer } => {
                let sink = MemorySink::default();
                sinks.insert(transfer.file_name, sink.clone());
                listener
                    .server
                    .decide(TransferResponse::accept(id, 0, Box::new(sink)));
            }
            ServerEvent::Complete { .. } => completed += 1,
            ServerEvent::Stopped { reason, .. } => panic!("transfer stopped: {reason}"),
            _ => {}
        }
    }

    for (name, data) in &files {
        assert_eq!(&sinks[name].contents(), data, "{name}");
    }

    let mut client_complete = 0;
    while client_complete < files.len() {
        if let ClientEvent::Complete { .. } = next(&mut client_events).await {
            client_complete += 1;
        }
    }
}

#[tokio::test]
async fn probe_reports_name_and_platform() {
    let mut listener = start_server().await;
    let (client, _events) = new_client(ClientConfig::default()).await;

    let remote = client.probe(listener.addr).await.unwrap();
    assert_eq!(
        remote,
        RemoteDevice {
            display_name: "Receiver".into(),
            platform: Platform::Linux,
        }
    );

    sleep(Duration::from_millis(100)).await;
    assert!(listener.events.try_recv().is_err());
}

#[tokio::test]
async fn probe_times_out_on_silent_peer() {
    let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = silent.local_addr().unwrap();
    let hold = tokio::spawn(async move {
        let (stream, _) = silent.accept().await.unwrap();
        sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let config = ClientConfig {
        probe_timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    };
    let (client, _events) = new_client(config).await;
    let err = client.probe(addr).await.unwrap_err();
    assert!(matches!(err, TransferError::Timeout("probe")));
    hold.abort();
}

#[tokio::test]
async fn connection_refused_stops_the_send() {
    // Grab a free port, then close it again.
    let addr = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let (mut client, mut client_events) = new_client(ClientConfig::default()).await;
    let id = client.send(request("x.bin", pattern(10)), addr);

    let events = client_until_terminal(&mut client_events).await;
    assert_eq!(events[0], ClientEvent::Connecting { id, peer: addr });
    assert!(matches!(
        events.last(),
        Some(ClientEvent::Stopped { id: stopped, .. }) if *stopped == id
    ));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ClientEvent::AwaitingAcceptance { .. }))
    );
}

#[tokio::test]
async fn bind_failure_emits_only_listener_stopped() {
    let first = start_server().await;

    let config = ServerConfig {
        port: first.addr.port(),
        bind_ip: Ipv4Addr::LOCALHOST.into(),
        ..ServerConfig::default()
    };
    let second = TransferServer::new(config, device("Second"));
    let mut events = second.take_events().await.unwrap();
    assert!(second.start().await.is_err());

    match next(&mut events).await {
        ServerEvent::ListenerStopped { error } => assert!(error.is_some()),
        other => panic!("expected ListenerStopped, got {other:?}"),
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn shutdown_stops_the_listener() {
    let mut listener = start_server().await;
    listener.server.shutdown();
    match next(&mut listener.events).await {
        ServerEvent::ListenerStopped { error } => assert!(error.is_none()),
        other => panic!("expected ListenerStopped, got {other:?}"),
    }
    assert!(listener.server.take_events().await.is_none());
}
