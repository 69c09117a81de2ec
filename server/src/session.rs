//! Per-connection client session
//!
//! Each accepted TCP connection gets a reader loop and a writer task. The
//! reader pulls framed messages (4-byte header, then `data_len` bytes of
//! body) and hands them to the engine in arrival order; the writer drains
//! the client's outbound queue so no registry lock is ever held across a
//! socket write. A malformed frame is fatal to the session, as is EOF, and
//! both end in the same membership cleanup.

use crate::engine::Engine;
use log::{debug, warn};
use shared::{FrameHeader, Message, HEADER_LEN, MAX_FRAME_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

pub async fn run_session(
    stream: TcpStream,
    addr: SocketAddr,
    client_id: u8,
    engine: Arc<Engine>,
    outbound: UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, write_half) = stream.into_split();
    tokio::spawn(write_loop(write_half, outbound));

    let mut reader = BufReader::new(read_half);
    let mut header_buf = [0u8; HEADER_LEN];
    let mut body = vec![0u8; 512];

    loop {
        tokio::select! {
            result = reader.read_exact(&mut header_buf) => {
                if result.is_err() {
                    debug!("Client {} ({}) connection closed", client_id, addr);
                    break;
                }
                let Ok(header) = FrameHeader::parse(&header_buf) else {
                    break;
                };
                let len = header.data_len as usize;
                if HEADER_LEN + len > MAX_FRAME_LEN {
                    warn!(
                        "Client {} sent oversized frame ({} byte body), closing",
                        client_id, len
                    );
                    break;
                }
                if body.len() < len {
                    body.resize(len, 0);
                }
                if reader.read_exact(&mut body[..len]).await.is_err() {
                    debug!("Client {} disconnected mid-frame", client_id);
                    break;
                }

                match Message::decode(header.kind, &body[..len]) {
                    Ok(msg) => {
                        if !engine.handle_message(client_id, msg).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Client {} sent malformed frame, closing: {}", client_id, e);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("Client {} session stopping for shutdown", client_id);
                break;
            }
        }
    }

    engine.handle_disconnect(client_id).await;
}

/// Drains the outbound queue onto the socket. Exits when the client entry
/// (which owns the sending side) is removed, or on the first write error.
async fn write_loop(writer: OwnedWriteHalf, mut outbound: UnboundedReceiver<Vec<u8>>) {
    let mut writer = BufWriter::new(writer);
    while let Some(frame) = outbound.recv().await {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
}
