use std::net::SocketAddr;

use session::SessionId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::channels::{wait_for_shutdown, Gateway, Link};
use crate::telnet::{Line, LineBuffer};

/// Run the line-mode TCP server. Each LF-terminated line is one command;
/// each outbound frame is written followed by CRLF.
pub async fn run_tcp_server(
    addr: String,
    gateway: Gateway,
    shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("TCP server listening on {}", listener.local_addr()?);
    serve(listener, gateway, shutdown).await
}

pub async fn serve(
    listener: TcpListener,
    gateway: Gateway,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    loop {
        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = wait_for_shutdown(&mut shutdown) => {
                tracing::info!("TCP server shutting down");
                return Ok(());
            }
        };

        let session_id = match gateway.admit(peer_addr.ip()) {
            Ok(id) => id,
            Err(rejection) => {
                tracing::warn!(%peer_addr, %rejection, "Connection rejected");
                continue;
            }
        };
        tracing::info!(?session_id, %peer_addr, "New connection");

        let gateway = gateway.clone();
        tokio::spawn(async move {
            handle_session(stream, session_id, peer_addr, &gateway).await;
            gateway.release(peer_addr.ip());
        });
    }
}

async fn handle_session(
    stream: TcpStream,
    session_id: SessionId,
    peer_addr: SocketAddr,
    gateway: &Gateway,
) {
    let Some(Link {
        outbound: mut outbound_rx,
        inbound: inbound_tx,
    }) = gateway.open(session_id, Some(peer_addr))
    else {
        tracing::warn!(?session_id, "No acceptor for connection");
        return;
    };

    let (mut reader, mut writer) = stream.into_split();

    let writer_handle = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            let msg = format!("{}\r\n", text);
            if writer.write_all(msg.as_bytes()).await.is_err() {
                return;
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut line_buffer = LineBuffer::new(gateway.max_input_length());
    let mut buf = [0u8; 4096];

    'read: loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            },
            _ = inbound_tx.closed() => break,
        };
        for line in line_buffer.feed(&buf[..n]) {
            match line {
                Line::Text(text) => {
                    if inbound_tx.send(text).is_err() {
                        break 'read;
                    }
                }
                Line::Oversized(len) => {
                    tracing::debug!(?session_id, len, "Oversized line dropped");
                }
            }
        }
    }

    drop(inbound_tx);
    if tokio::time::timeout(std::time::Duration::from_secs(1), writer_handle)
        .await
        .is_err()
    {
        tracing::debug!(?session_id, "Writer did not finish in time");
    }
    tracing::info!(?session_id, "Session ended");
}
