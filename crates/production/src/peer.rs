//! Framed TCP peer transport.
//!
//! Connections open with a `Version`/`VerAck` exchange carrying the
//! protocol magic and the peer's chain height; a mismatch closes the
//! socket. After the handshake each side runs a reader task (frames in)
//! and a writer task (frames out). Outbound sends are non-blocking: a
//! slow peer loses messages rather than stalling consensus.

use crate::metrics::metrics;
use sba_messages::{decode_frame, encode_frame, CodecError, Frame, Topic, Version};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Outbound queue depth per peer.
const OUTBOUND_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Incompatible peer (magic or version mismatch)")]
    Incompatible,
    #[error("Connection closed")]
    Closed,
    #[error("Unexpected handshake message")]
    BadHandshake,
}

/// A connected, handshaken peer.
pub struct Peer {
    pub addr: SocketAddr,
    /// Chain height the peer announced in its Version.
    pub height: u64,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl Peer {
    /// Queue an encoded frame for sending. Drops (and reports false) when
    /// the peer's outbound queue is full.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        match self.outbound.try_send(bytes) {
            Ok(()) => {
                metrics().messages_sent.inc();
                true
            }
            Err(_) => {
                trace!(addr = %self.addr, "peer outbound full, dropping frame");
                false
            }
        }
    }
}

async fn read_one_frame(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
) -> Result<Frame, PeerError> {
    loop {
        if let Some((frame, used)) = decode_frame(buf)? {
            buf.drain(..used);
            return Ok(frame);
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(PeerError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Perform the symmetric handshake on a fresh connection, then start the
/// reader/writer tasks. Inbound frames flow to `frame_tx` tagged with the
/// peer address.
pub async fn handshake(
    mut stream: TcpStream,
    magic: [u8; 4],
    our_height: u64,
    frame_tx: mpsc::Sender<(SocketAddr, Frame)>,
) -> Result<Peer, PeerError> {
    let addr = stream.peer_addr()?;
    let mut buf = Vec::with_capacity(4096);

    // Both sides open with a Version.
    let version = Version::new(magic, our_height);
    stream
        .write_all(&encode_frame(Topic::Version, &version.encode()))
        .await?;

    let frame = read_one_frame(&mut stream, &mut buf).await?;
    if frame.topic != Topic::Version {
        return Err(PeerError::BadHandshake);
    }
    let mut reader = sba_messages::Reader::new(&frame.payload);
    let peer_version = Version::decode(&mut reader)?;
    if !peer_version.compatible_with(magic) {
        warn!(addr = %addr, "closing connection: incompatible peer");
        return Err(PeerError::Incompatible);
    }

    // Acknowledge and await the acknowledgement.
    stream
        .write_all(&encode_frame(Topic::VerAck, &[]))
        .await?;
    let frame = read_one_frame(&mut stream, &mut buf).await?;
    if frame.topic != Topic::VerAck {
        return Err(PeerError::BadHandshake);
    }

    debug!(addr = %addr, height = peer_version.height, "peer handshake complete");
    metrics().peers_connected.inc();

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    tokio::spawn(reader_task(addr, read_half, buf, frame_tx));
    tokio::spawn(writer_task(addr, write_half, outbound_rx));

    Ok(Peer {
        addr,
        height: peer_version.height,
        outbound: outbound_tx,
    })
}

async fn reader_task(
    addr: SocketAddr,
    mut read_half: OwnedReadHalf,
    mut buf: Vec<u8>,
    frame_tx: mpsc::Sender<(SocketAddr, Frame)>,
) {
    loop {
        // Decode whatever is already buffered before reading more.
        match decode_frame(&buf) {
            Ok(Some((frame, used))) => {
                buf.drain(..used);
                metrics().messages_received.inc();
                if frame_tx.send((addr, frame)).await.is_err() {
                    return;
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(addr = %addr, error = %e, "peer sent malformed frame, closing");
                metrics().invalid_messages.inc();
                break;
            }
        }
        let mut chunk = [0u8; 4096];
        match read_half.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                debug!(addr = %addr, error = %e, "peer read error");
                break;
            }
        }
    }
    metrics().peers_connected.dec();
    debug!(addr = %addr, "peer disconnected");
}

async fn writer_task(
    addr: SocketAddr,
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(bytes) = outbound_rx.recv().await {
        if let Err(e) = write_half.write_all(&bytes).await {
            debug!(addr = %addr, error = %e, "peer write error");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const MAGIC: [u8; 4] = [1, 2, 3, 4];

    async fn pair(
        magic_a: [u8; 4],
        magic_b: [u8; 4],
    ) -> (
        Result<Peer, PeerError>,
        Result<Peer, PeerError>,
        mpsc::Receiver<(SocketAddr, Frame)>,
        mpsc::Receiver<(SocketAddr, Frame)>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx_a, rx_a) = mpsc::channel(16);
        let (tx_b, rx_b) = mpsc::channel(16);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handshake(stream, magic_a, 7, tx_a).await
        });
        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            handshake(stream, magic_b, 3, tx_b).await
        });

        let server_peer = server.await.unwrap();
        let client_peer = client.await.unwrap();
        (server_peer, client_peer, rx_a, rx_b)
    }

    #[tokio::test]
    async fn handshake_and_frame_exchange() {
        let (server_peer, client_peer, mut rx_a, _rx_b) = pair(MAGIC, MAGIC).await;
        let server_peer = server_peer.unwrap();
        let client_peer = client_peer.unwrap();

        // Heights exchanged during handshake.
        assert_eq!(server_peer.height, 3);
        assert_eq!(client_peer.height, 7);

        // A frame flows from client to server.
        assert!(client_peer.send(encode_frame(Topic::GetBlocks, &9u64.to_le_bytes())));
        let (_, frame) = rx_a.recv().await.unwrap();
        assert_eq!(frame.topic, Topic::GetBlocks);
        assert_eq!(frame.payload, 9u64.to_le_bytes());
    }

    #[tokio::test]
    async fn magic_mismatch_closes_connection() {
        let (server_peer, client_peer, _rx_a, _rx_b) = pair(MAGIC, [9, 9, 9, 9]).await;
        assert!(matches!(server_peer, Err(PeerError::Incompatible)));
        // The client side fails with either incompatibility or a closed
        // socket, depending on timing.
        assert!(client_peer.is_err());
    }
}
