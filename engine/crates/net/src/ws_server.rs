use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use session::SessionId;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::channels::{wait_for_shutdown, Gateway, Link};

/// Run the standalone WebSocket server until `shutdown` flips to true.
///
/// Each accepted socket is handshaken on its own task and then handed to the
/// game through [`Gateway::open`]. Every inbound text frame is one command line.
pub async fn run_ws_server(
    addr: String,
    gateway: Gateway,
    shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("WebSocket server listening on {}", listener.local_addr()?);
    serve(listener, gateway, shutdown).await
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: TcpListener,
    gateway: Gateway,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    loop {
        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = wait_for_shutdown(&mut shutdown) => {
                tracing::info!("WebSocket server shutting down");
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
        tracing::info!(?session_id, %peer_addr, "New WebSocket connection");

        let gateway = gateway.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws_stream) => {
                    handle_ws_session(ws_stream, session_id, peer_addr, &gateway).await;
                }
                Err(e) => {
                    tracing::warn!(?session_id, "WebSocket handshake failed: {}", e);
                }
            }
            gateway.release(peer_addr.ip());
        });
    }
}

async fn handle_ws_session(
    ws_stream: WebSocketStream<TcpStream>,
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

    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    // Writer task: session frames out as WS text; close when the session is done.
    let writer_handle = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if ws_writer.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = ws_writer.send(Message::Close(None)).await;
    });

    loop {
        let frame = tokio::select! {
            frame = ws_reader.next() => frame,
            _ = inbound_tx.closed() => break,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                let text = text.as_str();
                if !gateway.accepts_frame(text) {
                    tracing::debug!(?session_id, len = text.len(), "Oversized frame dropped");
                    continue;
                }
                if inbound_tx.send(text.to_string()).is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {} // Binary, ping, pong
            Some(Err(e)) => {
                tracing::debug!(?session_id, "WebSocket read error: {}", e);
                break;
            }
        }
    }

    // Dropping the inbound sender tells the session its peer is gone.
    drop(inbound_tx);
    // Give the writer a moment to flush whatever the session sent last.
    if tokio::time::timeout(std::time::Duration::from_secs(1), writer_handle)
        .await
        .is_err()
    {
        tracing::debug!(?session_id, "Writer did not finish in time");
    }
    tracing::info!(?session_id, "WebSocket session ended");
}
