use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use session::SessionId;
use tokio::sync::{mpsc, watch};

use crate::rate_limiter::{ConnectionLimiter, RateLimitConfig, RateLimitRejection};

/// Outbound text frames (session task -> socket writer).
pub type OutboundTx = mpsc::UnboundedSender<String>;
pub type OutboundRx = mpsc::UnboundedReceiver<String>;

/// Inbound text frames (socket reader -> session task). Closing means the peer is gone.
pub type InboundTx = mpsc::UnboundedSender<String>;
pub type InboundRx = mpsc::UnboundedReceiver<String>;

/// A handshaken connection, ready to be driven by a session task.
#[derive(Debug)]
pub struct Connection {
    pub session_id: SessionId,
    pub peer: Option<SocketAddr>,
    pub outbound: OutboundTx,
    pub inbound: InboundRx,
}

/// Transport-side halves of a [`Connection`].
#[derive(Debug)]
pub struct Link {
    pub outbound: OutboundRx,
    pub inbound: InboundTx,
}

pub type AcceptTx = mpsc::UnboundedSender<Connection>;
pub type AcceptRx = mpsc::UnboundedReceiver<Connection>;

/// Resolve once shutdown is signalled or the signalling side is gone.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Shared front door for every transport: id allocation, connection limits,
/// frame size limit, and hand-off of finished handshakes to the game.
#[derive(Debug, Clone)]
pub struct Gateway {
    accept_tx: AcceptTx,
    limiter: Arc<Mutex<ConnectionLimiter>>,
    next_id: Arc<AtomicU64>,
    max_input_length: usize,
}

impl Gateway {
    pub fn new(accept_tx: AcceptTx, config: RateLimitConfig) -> Self {
        let max_input_length = config.max_input_length;
        Self {
            accept_tx,
            limiter: ConnectionLimiter::new(config),
            next_id: Arc::new(AtomicU64::new(1)),
            max_input_length,
        }
    }

    /// Reserve a connection slot for `ip` and allocate a session id.
    pub fn admit(&self, ip: IpAddr) -> Result<SessionId, RateLimitRejection> {
        self.limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_admit(ip)?;
        Ok(SessionId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    /// Give back the slot taken by [`Gateway::admit`].
    pub fn release(&self, ip: IpAddr) {
        self.limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .release(ip);
    }

    pub fn active_connections(&self) -> usize {
        self.limiter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .total_connections()
    }

    /// Create the frame channels for a handshaken connection and pass the
    /// session side to the acceptor. `None` if the acceptor has shut down.
    pub fn open(&self, session_id: SessionId, peer: Option<SocketAddr>) -> Option<Link> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let conn = Connection {
            session_id,
            peer,
            outbound: outbound_tx,
            inbound: inbound_rx,
        };
        self.accept_tx.send(conn).ok()?;
        Some(Link {
            outbound: outbound_rx,
            inbound: inbound_tx,
        })
    }

    /// Oversized frames are dropped at the transport.
    pub fn accepts_frame(&self, frame: &str) -> bool {
        frame.len() <= self.max_input_length
    }

    pub fn max_input_length(&self) -> usize {
        self.max_input_length
    }
}
