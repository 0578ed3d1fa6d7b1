//! The thin TCP layer.
//!
//! One listener per configured address; each connection gets its own task
//! that reads NUL-delimited frames, hands them to the dispatcher and writes
//! back the NUL-terminated response. The interesting work all happens behind
//! the dispatcher; this here is plumbing.

use bytes::{BufMut, BytesMut};
use protocol::FRAME_DELIMITER;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};

/// Binds one listener per configured address.
pub fn bind(config: &Config) -> Result<Vec<TcpListener>> {
    let mut listeners = Vec::new();

    for address in &config.network.listen {
        let ip: IpAddr = address
            .parse()
            .map_err(|_| Error::Internal(format!("'{address}' is not a valid listen address")))?;
        let addr = SocketAddr::new(ip, config.network.port);

        let socket = if addr.is_ipv6() {
            TcpSocket::new_v6()?
        } else {
            TcpSocket::new_v4()?
        };
        if config.network.reuse_address {
            socket.set_reuseaddr(true)?;
        }
        socket.bind(addr)?;
        listeners.push(socket.listen(1024)?);

        tracing::info!(%addr, "Listening.");
    }

    Ok(listeners)
}

/// Spawns one accept loop per listener.
pub fn serve(
    listeners: Vec<TcpListener>,
    dispatcher: Arc<Dispatcher>,
    config: Arc<Config>,
) -> Vec<JoinHandle<()>> {
    listeners
        .into_iter()
        .map(|listener| {
            let dispatcher = Arc::clone(&dispatcher);
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, peer)) => {
                            if config.network.send_keepalive {
                                let keepalive = socket2::TcpKeepalive::new();
                                let sock = socket2::SockRef::from(&stream);
                                if let Err(error) = sock.set_tcp_keepalive(&keepalive) {
                                    tracing::warn!(?error, "Failed to enable keepalive.");
                                }
                            }

                            let dispatcher = Arc::clone(&dispatcher);
                            tokio::spawn(async move {
                                handle_connection(stream, peer, dispatcher).await;
                            });
                        }
                        Err(error) => {
                            tracing::error!(?error, "Accept failed.");
                        }
                    }
                }
            })
        })
        .collect()
}

/// Serves one connection until the peer goes away: read a frame, dispatch,
/// write the response frame.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, dispatcher: Arc<Dispatcher>) {
    let host = peer.ip().to_string();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        match reader.read_until(FRAME_DELIMITER, &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                // A frame without its delimiter means the peer closed
                // mid-message; drop it.
                if buffer.last() != Some(&FRAME_DELIMITER) {
                    break;
                }
                buffer.pop();

                let request = String::from_utf8_lossy(&buffer);
                let response = dispatcher.dispatch(&host, &request).await;

                let mut frame = BytesMut::with_capacity(response.len() + 1);
                frame.put_slice(response.as_bytes());
                frame.put_u8(FRAME_DELIMITER);
                if write_half.write_all(&frame).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                tracing::warn!(?error, host, "Connection lost.");
                break;
            }
        }
    }
}
