//! The three subcommands, wired to the transfer engine.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use lanshare_device::{DeviceInfo, HostDevice};
use lanshare_transfer::{
    CancelCommand, ClientEvent, IncomingTransfer, ServerEvent, StopReason, TransferClient,
    TransferId, TransferRequest, TransferResponse, TransferServer,
};

use crate::config::Config;
use crate::files;
use crate::speed::{SpeedMeter, format_bytes};

/// Runs the listener until Ctrl-C, saving accepted files into `dir`.
///
/// Requests are confirmed on stdin one at a time, in arrival order, while
/// events for running transfers keep being handled.
pub async fn serve(config: &Config, dir: PathBuf, auto_accept: bool) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let device = Arc::new(HostDevice::with_name(config.name.clone()));
    let server = TransferServer::new(config.server_config(), device);
    let mut events = server
        .take_events()
        .await
        .context("server events already taken")?;
    let addr = server.start().await?;
    println!("listening on {addr}, saving to {}", dir.display());

    let mut answers = spawn_stdin_lines();
    let mut prompts = Prompts::default();
    let mut saving: HashMap<TransferId, PathBuf> = HashMap::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                server.shutdown();
                break;
            }
            answer = answers.recv(), if !prompts.is_empty() => {
                let Some(answer) = answer else {
                    bail!("stdin closed while a transfer was waiting for confirmation");
                };
                if let Some((id, transfer)) = prompts.answer() {
                    let response = if is_yes(&answer) {
                        accept_into(&dir, id, &transfer, &mut saving).await
                    } else {
                        TransferResponse::reject(id)
                    };
                    server.decide(response);
                }
                prompts.show_current()?;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ServerEvent::Requested { id, transfer } if auto_accept => {
                        let response = accept_into(&dir, id, &transfer, &mut saving).await;
                        server.decide(response);
                    }
                    ServerEvent::Requested { id, transfer } => {
                        if prompts.push(id, transfer) {
                            prompts.show_current()?;
                        }
                    }
                    ServerEvent::Progress { id, bytes, total } => {
                        tracing::debug!(%id, bytes, total, "received");
                    }
                    ServerEvent::Complete { id } => {
                        if let Some(path) = saving.remove(&id) {
                            println!("[{id}] saved {}", path.display());
                        }
                    }
                    ServerEvent::Stopped { id, reason } => {
                        let path = saving.remove(&id);
                        println!("[{id}] stopped: {reason}");
                        if prompts.forget(id) {
                            println!();
                            prompts.show_current()?;
                        }
                        if let (
                            Some(path),
                            StopReason::UserCancelled {
                                command: CancelCommand::StopAndDelete,
                                ..
                            },
                        ) = (path, &reason)
                        {
                            match tokio::fs::remove_file(&path).await {
                                Ok(()) => println!("[{id}] deleted {}", path.display()),
                                Err(e) => {
                                    tracing::warn!(%id, path = %path.display(), error = %e, "failed to delete partial file")
                                }
                            }
                        }
                    }
                    ServerEvent::ListenerStarted { .. } => {}
                    ServerEvent::ListenerStopped { error } => {
                        if let Some(error) = error {
                            bail!("listener stopped: {error}");
                        }
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Forwards stdin lines from a background task.
fn spawn_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Requests waiting for a yes/no, oldest first. Only the oldest is shown.
#[derive(Default)]
struct Prompts {
    queue: VecDeque<(TransferId, IncomingTransfer)>,
}

impl Prompts {
    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues a request; `true` if it is now the one being asked about.
    fn push(&mut self, id: TransferId, transfer: IncomingTransfer) -> bool {
        self.queue.push_back((id, transfer));
        self.queue.len() == 1
    }

    /// Takes the request the current answer belongs to.
    fn answer(&mut self) -> Option<(TransferId, IncomingTransfer)> {
        self.queue.pop_front()
    }

    /// Drops a request whose sender gave up; `true` if it was being shown.
    fn forget(&mut self, id: TransferId) -> bool {
        match self.queue.iter().position(|(queued, _)| *queued == id) {
            Some(0) => {
                self.queue.pop_front();
                true
            }
            Some(index) => {
                self.queue.remove(index);
                false
            }
            None => false,
        }
    }

    fn show_current(&self) -> anyhow::Result<()> {
        let Some((_, transfer)) = self.queue.front() else {
            return Ok(());
        };
        print!(
            "accept '{}' ({}) from {} [{} {}]? [y/N] ",
            transfer.file_name,
            format_bytes(transfer.payload_len),
            transfer.sender_name,
            transfer.sender_ip,
            transfer.platform,
        );
        std::io::stdout().flush()?;
        Ok(())
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn accept_into(
    dir: &Path,
    id: TransferId,
    transfer: &IncomingTransfer,
    saving: &mut HashMap<TransferId, PathBuf>,
) -> TransferResponse {
    let name = match files::safe_file_name(&transfer.file_name) {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(%id, error = %e, "refusing file name");
            return TransferResponse::reject(id);
        }
    };
    let path = dir.join(name);
    match files::open_for_resume(&path, transfer.payload_len).await {
        Ok((file, existing)) => {
            if existing > 0 {
                println!(
                    "[{id}] resuming {} at {}",
                    path.display(),
                    format_bytes(existing)
                );
            }
            saving.insert(id, path);
            TransferResponse::accept(id, existing, Box::new(file))
        }
        Err(e) => {
            tracing::warn!(%id, path = %path.display(), error = %e, "failed to open file");
            TransferResponse {
                id,
                accepted: true,
                existing_len: 0,
                sink: None,
            }
        }
    }
}

/// Sends one file and waits for the outcome. Ctrl-C cancels with `Stop`.
pub async fn send(config: &Config, addr: &str, file: PathBuf, encrypt: bool) -> anyhow::Result<()> {
    let destination = resolve(addr, config.port).await?;
    let source = tokio::fs::File::open(&file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;
    let payload_len = source.metadata().await?.len();
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?
        .to_string();

    let device = Arc::new(HostDevice::with_name(config.name.clone()));
    let mut client = TransferClient::new(config.client_config(encrypt), device.clone());
    let mut events = client
        .take_events()
        .await
        .context("client events already taken")?;

    let request = TransferRequest::new(
        device.display_name(),
        file_name.clone(),
        payload_len,
        Box::new(source),
    );
    let id = client.send(request, destination);

    let mut meter = SpeedMeter::default();
    let mut interrupted = false;
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::info!(%id, "SIGINT received, cancelling");
                client.cancel(id, CancelCommand::Stop);
                continue;
            }
            event = events.recv() => event,
        };
        let Some(event) = event else {
            bail!("transfer engine stopped without a result");
        };

        match event {
            ClientEvent::Connecting { .. } => {}
            ClientEvent::AwaitingAcceptance { .. } => {
                println!("waiting for {destination} to accept {file_name}");
            }
            ClientEvent::ResponseReceived {
                accepted: true,
                existing_len,
                ..
            } if existing_len > 0 => {
                println!("resuming at {}", format_bytes(existing_len));
                meter.record(existing_len);
            }
            ClientEvent::ResponseReceived { .. } => {}
            ClientEvent::Progress { bytes, total, .. } => {
                meter.record(bytes);
                let eta = meter
                    .eta(total)
                    .map(|d| format!(", {}s left", d.as_secs()))
                    .unwrap_or_default();
                print!(
                    "\r{} / {} ({}/s{eta})   ",
                    format_bytes(bytes),
                    format_bytes(total),
                    format_bytes(meter.bytes_per_second() as u64),
                );
                std::io::stdout().flush()?;
            }
            ClientEvent::Complete { .. } => {
                println!("\nsent {file_name}");
                return Ok(());
            }
            ClientEvent::Stopped { reason, .. } => {
                println!();
                bail!("transfer stopped: {reason}");
            }
        }
    }
}

/// Prints the remote device's name and platform.
pub async fn probe(config: &Config, addr: &str) -> anyhow::Result<()> {
    let destination = resolve(addr, config.port).await?;
    let device = Arc::new(HostDevice::with_name(config.name.clone()));
    let client = TransferClient::new(config.client_config(false), device);
    let remote = client.probe(destination).await?;
    println!("{} ({}) at {destination}", remote.display_name, remote.platform);
    Ok(())
}

/// Accepts `ip:port`, a bare IP, or a hostname with or without a port.
async fn resolve(addr: &str, default_port: u16) -> anyhow::Result<SocketAddr> {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return Ok(socket);
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    let query = if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{addr}:{default_port}")
    };
    let mut found = tokio::net::lookup_host(&query)
        .await
        .with_context(|| format!("resolving {addr}"))?;
    let first = found.next();
    first.with_context(|| format!("no address found for {addr}"))
}
