use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use session::SessionId;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::{ServeDir, ServeFile};

use crate::channels::{wait_for_shutdown, Gateway, Link};

/// Run the HTTP server: `/ws` upgrades to the game protocol, everything else
/// is served from `static_dir` when given (SPA fallback to index.html).
pub async fn run_web_server(
    addr: String,
    gateway: Gateway,
    static_dir: Option<PathBuf>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Web server listening on {}", listener.local_addr()?);
    serve(listener, gateway, static_dir, shutdown).await
}

pub async fn serve(
    listener: TcpListener,
    gateway: Gateway,
    static_dir: Option<PathBuf>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let app = router(gateway, static_dir);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        wait_for_shutdown(&mut shutdown).await;
        tracing::info!("Web server shutting down gracefully");
    })
    .await
}

fn router(gateway: Gateway, static_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .with_state(gateway);

    if let Some(dir) = static_dir {
        let index_path = dir.join("index.html");
        let serve_dir = ServeDir::new(&dir).not_found_service(ServeFile::new(index_path));
        app = app.fallback_service(serve_dir);
        tracing::info!(dir = %dir.display(), "Serving static files");
    }
    app
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(gateway): State<Gateway>,
) -> Response {
    let session_id = match gateway.admit(peer_addr.ip()) {
        Ok(id) => id,
        Err(rejection) => {
            tracing::warn!(%peer_addr, %rejection, "Connection rejected");
            return (StatusCode::SERVICE_UNAVAILABLE, rejection.to_string()).into_response();
        }
    };
    ws.on_upgrade(move |socket| async move {
        handle_ws_connection(socket, session_id, peer_addr, &gateway).await;
        gateway.release(peer_addr.ip());
    })
}

async fn handle_ws_connection(
    socket: WebSocket,
    session_id: SessionId,
    peer_addr: SocketAddr,
    gateway: &Gateway,
) {
    tracing::info!(?session_id, %peer_addr, "New WebSocket connection (axum)");
    let Some(Link {
        outbound: mut outbound_rx,
        inbound: inbound_tx,
    }) = gateway.open(session_id, Some(peer_addr))
    else {
        tracing::warn!(?session_id, "No acceptor for connection");
        return;
    };

    let (mut ws_writer, mut ws_reader) = socket.split();

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
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(?session_id, "WebSocket read error: {}", e);
                break;
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
    tracing::info!(?session_id, "WebSocket session ended (axum)");
}
