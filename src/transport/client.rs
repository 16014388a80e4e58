//! Client-side transport: supervised connect loop
//!
//! The client dials the server endpoint and keeps retrying at the configured
//! interval for as long as the node lives. Reconnection is this module's
//! concern alone; the node only observes `Connected`/`Disconnected` events
//! and emits frames while connected.

use crate::transport::error::{TransportError, TransportResult};
use crate::transport::frame::{Endpoint, Frame};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Connection lifecycle and inbound traffic, as seen by a client node
#[derive(Debug)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Frame(Frame),
}

/// Emitting half handed to the node; the connect loop runs in the background.
#[derive(Clone)]
pub struct TransportClient {
    outbox: UnboundedSender<Frame>,
}

impl TransportClient {
    /// Start the connect loop. The loop ends when the shutdown channel fires
    /// or the client handle is dropped.
    pub fn spawn(
        endpoint: Endpoint,
        retry: Duration,
        shutdown: broadcast::Sender<()>,
        silent: bool,
    ) -> (Self, UnboundedReceiver<ClientEvent>) {
        let (outbox_tx, outbox_rx) = unbounded_channel();
        let (event_tx, event_rx) = unbounded_channel();

        tokio::spawn(run_client(
            endpoint,
            retry,
            shutdown.subscribe(),
            outbox_rx,
            event_tx,
            silent,
        ));

        (Self { outbox: outbox_tx }, event_rx)
    }

    /// Queue a frame for the server. Best-effort: frames in flight when the
    /// connection drops are not redelivered.
    pub fn emit(&self, frame: Frame) -> TransportResult<()> {
        self.outbox
            .send(frame)
            .map_err(|_| TransportError::ChannelClosed)
    }
}

async fn run_client(
    endpoint: Endpoint,
    retry: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut outbox_rx: UnboundedReceiver<Frame>,
    event_tx: UnboundedSender<ClientEvent>,
    silent: bool,
) {
    loop {
        let dialed = tokio::select! {
            dialed = dial(&endpoint) => dialed,
            _ = shutdown_rx.recv() => return,
        };

        match dialed {
            Ok(stream) => {
                if !silent {
                    log::info!("Connected to {} server", endpoint);
                }
                let _ = event_tx.send(ClientEvent::Connected);
                let stop = match stream {
                    #[cfg(unix)]
                    ClientStream::Unix(s) => {
                        drive(s, &mut outbox_rx, &event_tx, &mut shutdown_rx).await
                    }
                    ClientStream::Tcp(s) => {
                        drive(s, &mut outbox_rx, &event_tx, &mut shutdown_rx).await
                    }
                };
                if !silent {
                    log::info!("Not connected to {} server", endpoint);
                }
                let _ = event_tx.send(ClientEvent::Disconnected);
                if stop {
                    return;
                }
            }
            Err(e) => {
                log::debug!("Dial {} failed: {}", endpoint, e);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(retry) => {}
            _ = shutdown_rx.recv() => return,
        }
    }
}

enum ClientStream {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

async fn dial(endpoint: &Endpoint) -> TransportResult<ClientStream> {
    match endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixStream::connect(path)
            .await
            .map(ClientStream::Unix)
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            }),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(TransportError::Connect {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "local sockets unavailable on this platform",
            ),
        }),
        Endpoint::Tcp(host, port) => TcpStream::connect((host.as_str(), *port))
            .await
            .map(ClientStream::Tcp)
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            }),
    }
}

/// Pump one established connection. Returns true when the loop should stop
/// for good (shutdown or node gone) rather than reconnect.
async fn drive<S>(
    stream: S,
    outbox_rx: &mut UnboundedReceiver<Frame>,
    event_tx: &UnboundedSender<ClientEvent>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            frame = outbox_rx.recv() => match frame {
                Some(frame) => {
                    let line = match frame.encode() {
                        Ok(line) => line,
                        Err(e) => {
                            log::warn!("Skipping unencodable frame: {}", e);
                            continue;
                        }
                    };
                    if write_half.write_all(line.as_bytes()).await.is_err() {
                        return false;
                    }
                }
                None => return true,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match Frame::decode(&line) {
                        Ok(frame) => {
                            let _ = event_tx.send(ClientEvent::Frame(frame));
                        }
                        Err(e) => log::warn!("Discarding malformed frame: {}", e),
                    }
                }
                Ok(None) | Err(_) => return false,
            },
            _ = shutdown_rx.recv() => return true,
        }
    }
}
