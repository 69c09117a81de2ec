//! Transport dispatcher
//!
//! Two listeners share one port number: a TCP listener for the control
//! stream and a UDP socket for strokes. The accept loop allocates a client
//! slot (refusing the connection when full) and hands the stream to a
//! session; the datagram loop authorizes each stroke through the engine and
//! forwards the raw bytes to the peers it names. Forwarding happens after
//! the engine returns, so no registry lock is held across `send_to`.

use crate::engine::Engine;
use crate::session;
use log::{debug, error, info, warn};
use shared::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, watch};

pub async fn run_tcp_listener(
    listener: TcpListener,
    engine: Arc<Engine>,
    shutdown: watch::Receiver<bool>,
) {
    let mut shutdown_rx = shutdown.clone();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        match engine.register_client(addr, tx).await {
                            Some(client_id) => {
                                let engine = Arc::clone(&engine);
                                let shutdown = shutdown.clone();
                                tokio::spawn(async move {
                                    session::run_session(stream, addr, client_id, engine, rx, shutdown)
                                        .await;
                                });
                            }
                            None => {
                                warn!("Client limit reached, refusing {}", addr);
                                drop(stream);
                            }
                        }
                    }
                    Err(e) => error!("Accept failed: {}", e),
                }
            }
            _ = shutdown_rx.changed() => {
                info!("Control listener stopping");
                break;
            }
        }
    }
}

pub async fn run_udp(socket: Arc<UdpSocket>, engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = [0u8; 2048];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => {
                        let frame = &buf[..len];
                        let Ok((header, msg)) = Message::decode_frame(frame) else {
                            debug!("Dropping malformed datagram from {}", from);
                            continue;
                        };
                        let Message::PaintData { x, y, action, r, g, b } = msg else {
                            debug!(
                                "Dropping unexpected type {} datagram from {}",
                                header.kind, from
                            );
                            continue;
                        };

                        let targets = engine
                            .handle_paint_datagram(from, header.client_id, x, y, action, (r, g, b))
                            .await;
                        for target in targets {
                            if let Err(e) = socket.send_to(frame, target).await {
                                warn!("Stroke forward to {} failed: {}", target, e);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Datagram receive failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("Datagram loop stopping");
                break;
            }
        }
    }
}
