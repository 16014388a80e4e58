//! Server-side transport: accept loop, peer registry, broadcast
//!
//! The server owns one listener and a registry of connected peers. Inbound
//! frames and connection lifecycle changes surface as `ServerEvent`s on an
//! unbounded channel; the node serializes them against its pool state.

use crate::transport::error::{TransportError, TransportResult};
use crate::transport::frame::{Endpoint, Frame};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Connection lifecycle and inbound traffic, as seen by the server hub
#[derive(Debug)]
pub enum ServerEvent {
    PeerConnected(u64),
    PeerDisconnected(u64),
    Frame { peer: u64, frame: Frame },
}

type PeerMap = Arc<Mutex<HashMap<u64, UnboundedSender<Frame>>>>;

/// Listening half of the mesh hub
pub struct TransportServer {
    endpoint: Endpoint,
    peers: PeerMap,
}

impl TransportServer {
    /// Bind the endpoint and start accepting peers. Accepting stops when the
    /// shutdown channel fires.
    pub async fn bind(
        endpoint: Endpoint,
        shutdown: broadcast::Sender<()>,
        silent: bool,
    ) -> TransportResult<(Self, UnboundedReceiver<ServerEvent>)> {
        let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = unbounded_channel();

        match &endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                // A previous instance may have left its socket behind
                let _ = std::fs::remove_file(path);
                let listener = UnixListener::bind(path).map_err(|source| TransportError::Bind {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
                tokio::spawn(accept_unix(
                    listener,
                    peers.clone(),
                    event_tx,
                    shutdown,
                    silent,
                ));
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(TransportError::Bind {
                    endpoint: endpoint.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "local sockets unavailable on this platform",
                    ),
                });
            }
            Endpoint::Tcp(host, port) => {
                let listener = TcpListener::bind((host.as_str(), *port)).await.map_err(
                    |source| TransportError::Bind {
                        endpoint: endpoint.to_string(),
                        source,
                    },
                )?;
                tokio::spawn(accept_tcp(
                    listener,
                    peers.clone(),
                    event_tx,
                    shutdown,
                    silent,
                ));
            }
        }

        Ok((Self { endpoint, peers }, event_rx))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Send a frame to every connected peer, dropping any that have gone away.
    pub fn broadcast(&self, frame: &Frame) {
        let mut peers = self.peers.lock().unwrap();
        peers.retain(|peer_id, sender| {
            if sender.send(frame.clone()).is_err() {
                log::debug!("Dropping departed peer {}", peer_id);
                false
            } else {
                true
            }
        });
    }
}

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

#[cfg(unix)]
async fn accept_unix(
    listener: UnixListener,
    peers: PeerMap,
    event_tx: UnboundedSender<ServerEvent>,
    shutdown: broadcast::Sender<()>,
    silent: bool,
) {
    let mut shutdown_rx = shutdown.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => spawn_peer(stream, &peers, &event_tx, &shutdown, silent),
                Err(e) => {
                    log::warn!("Accept failed: {}", e);
                    break;
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }
}

async fn accept_tcp(
    listener: TcpListener,
    peers: PeerMap,
    event_tx: UnboundedSender<ServerEvent>,
    shutdown: broadcast::Sender<()>,
    silent: bool,
) {
    let mut shutdown_rx = shutdown.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => spawn_peer(stream, &peers, &event_tx, &shutdown, silent),
                Err(e) => {
                    log::warn!("Accept failed: {}", e);
                    break;
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }
}

fn spawn_peer<S>(
    stream: S,
    peers: &PeerMap,
    event_tx: &UnboundedSender<ServerEvent>,
    shutdown: &broadcast::Sender<()>,
    silent: bool,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let peer_id = NEXT_PEER_ID.fetch_add(1, Ordering::SeqCst);
    let (read_half, mut write_half) = tokio::io::split(stream);
    let (frame_tx, mut frame_rx) = unbounded_channel::<Frame>();

    peers.lock().unwrap().insert(peer_id, frame_tx);
    if !silent {
        log::info!("Peer {} connected", peer_id);
    }
    let _ = event_tx.send(ServerEvent::PeerConnected(peer_id));

    // Writer: drains the peer's outbound queue until the registry entry is
    // dropped or the socket fails.
    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let line = match frame.encode() {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Skipping unencodable frame for peer {}: {}", peer_id, e);
                    continue;
                }
            };
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    // Reader: inbound frames until EOF, error or shutdown. Dropping the
    // registry entry ends the writer, which closes the socket for the peer.
    let peers = peers.clone();
    let event_tx = event_tx.clone();
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match Frame::decode(&line) {
                            Ok(frame) => {
                                let _ = event_tx.send(ServerEvent::Frame {
                                    peer: peer_id,
                                    frame,
                                });
                            }
                            Err(e) => {
                                log::warn!("Discarding malformed frame from peer {}: {}", peer_id, e)
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
        peers.lock().unwrap().remove(&peer_id);
        if !silent {
            log::info!("Peer {} disconnected", peer_id);
        }
        let _ = event_tx.send(ServerEvent::PeerDisconnected(peer_id));
    });
}
