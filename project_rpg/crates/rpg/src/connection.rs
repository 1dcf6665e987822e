//! One task per connection: reads commands, delivers broadcasts, drives the
//! movement tick, and cleans up the registries when the peer goes away.

use std::sync::Arc;
use std::time::Instant;

use net::{wait_for_shutdown, AcceptRx, CommandThrottle, Connection, OutboundTx};
use observability::SessionMetrics;
use session::{PlayerRegistry, SessionEvent, SessionHandle, SessionId, SessionRegistry};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::router::GameSession;
use crate::services::GameServices;
use crate::wire::ServerMessage;

/// Spawn a session task for every connection the transports hand over.
pub async fn run_acceptor(
    mut accept_rx: AcceptRx,
    services: GameServices,
    shutdown: watch::Receiver<bool>,
) {
    let mut stop = shutdown.clone();
    loop {
        tokio::select! {
            conn = accept_rx.recv() => {
                let Some(conn) = conn else { break };
                tokio::spawn(run_session(conn, services.clone(), shutdown.clone()));
            }
            _ = wait_for_shutdown(&mut stop) => break,
        }
    }
    tracing::debug!("acceptor stopped");
}

/// Keeps this session listed in both registries for as long as it lives.
struct Registration {
    id: SessionId,
    players: Arc<PlayerRegistry>,
    sessions: Arc<SessionRegistry>,
}

impl Registration {
    fn new(id: SessionId, services: &GameServices, mailbox: mpsc::UnboundedSender<SessionEvent>) -> Self {
        services.sessions.register(id, SessionHandle::new(mailbox));
        Self {
            id,
            players: Arc::clone(&services.players),
            sessions: Arc::clone(&services.sessions),
        }
    }

    fn release(&self) {
        self.sessions.remove(self.id);
        self.players.remove(self.id);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

fn send_all(outbound: &OutboundTx, frames: Vec<ServerMessage>, metrics: &mut SessionMetrics) -> bool {
    for frame in frames {
        if outbound.send(frame.to_string()).is_err() {
            return false;
        }
        metrics.frames_out += 1;
    }
    true
}

/// Forward a frame broadcast by another session.
fn deliver(outbound: &OutboundTx, frame: &str, metrics: &mut SessionMetrics) -> bool {
    if outbound.send(frame.to_string()).is_err() {
        return false;
    }
    metrics.frames_out += 1;
    true
}

pub async fn run_session(conn: Connection, services: GameServices, mut shutdown: watch::Receiver<bool>) {
    let Connection {
        session_id,
        peer,
        outbound,
        mut inbound,
    } = conn;
    let started = Instant::now();

    let (mailbox_tx, mut mailbox) = mpsc::unbounded_channel();
    let registration = Registration::new(session_id, &services, mailbox_tx);
    let mut game = GameSession::new(session_id, services.clone());
    let mut throttle = CommandThrottle::new(services.config.max_commands_per_second);
    let mut metrics = SessionMetrics::new(session_id.0);

    let mut ticker = tokio::time::interval(services.config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(?session_id, ?peer, "session started");
    let mut open = send_all(&outbound, game.welcome(), &mut metrics);

    while open {
        tokio::select! {
            line = inbound.recv() => {
                let Some(line) = line else { break };
                let line = line.trim_end_matches(['\r', '\n']);
                if line.is_empty() {
                    continue;
                }
                if !throttle.try_consume() {
                    metrics.throttled += 1;
                    tracing::debug!(?session_id, retry_after = ?throttle.retry_after(), "command throttled");
                    open = send_all(&outbound, vec![ServerMessage::error("too many commands")], &mut metrics);
                    continue;
                }
                let t = Instant::now();
                let replies = game.handle_line(line);
                metrics.record_command(t.elapsed());
                open = send_all(&outbound, replies, &mut metrics);
            }
            Some(event) = mailbox.recv() => match event {
                SessionEvent::Deliver(frame) => open = deliver(&outbound, &frame, &mut metrics),
            },
            tick = ticker.tick() => {
                let replies = game.on_tick(tick.into_std());
                open = send_all(&outbound, replies, &mut metrics);
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                let _ = send_all(
                    &outbound,
                    vec![ServerMessage::Status("Server shutting down".to_string())],
                    &mut metrics,
                );
                break;
            }
        }
    }

    game.terminate();
    registration.release();
    metrics.steps = game.steps();
    metrics.log(started.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentTables;
    use crate::services::SessionConfig;
    use std::time::Duration;
    use tokio::time::timeout;

    struct Client {
        tx: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl Client {
        fn send(&self, line: &str) {
            self.tx.send(line.to_string()).unwrap();
        }

        async fn expect(&mut self, prefix: &str) -> String {
            loop {
                let frame = timeout(Duration::from_secs(2), self.rx.recv())
                    .await
                    .expect("timed out")
                    .expect("session closed");
                if frame.starts_with(prefix) {
                    return frame;
                }
            }
        }

        async fn create(&mut self, name: &str) {
            self.send(&format!("SET_NAME:{}", name));
            self.send("SELECT_CLASS:ROGUE");
            for _ in 0..3 {
                self.send("UPGRADE_STAT:speed");
            }
            self.expect("SERVER:AREAS:").await;
        }
    }

    fn spawn_client(id: u64, services: &GameServices, shutdown: &watch::Receiver<bool>) -> (Client, tokio::task::JoinHandle<()>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let conn = Connection {
            session_id: SessionId(id),
            peer: None,
            outbound: out_tx,
            inbound: in_rx,
        };
        let task = tokio::spawn(run_session(conn, services.clone(), shutdown.clone()));
        (Client { tx: in_tx, rx: out_rx }, task)
    }

    fn services(max_commands_per_second: u32) -> GameServices {
        GameServices::new(
            ContentTables::builtin().unwrap(),
            SessionConfig {
                max_commands_per_second,
                ..Default::default()
            },
        )
    }

    #[test]
    fn frames_to_a_closed_peer_are_not_counted() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let mut metrics = SessionMetrics::new(1);
        assert!(deliver(&out_tx, "SERVER:CHAT:Bo:hi", &mut metrics));
        assert_eq!(metrics.frames_out, 1);

        drop(out_rx);
        assert!(!deliver(&out_tx, "SERVER:CHAT:Bo:again", &mut metrics));
        assert!(!send_all(&out_tx, vec![ServerMessage::Echo("PING".to_string())], &mut metrics));
        assert_eq!(metrics.frames_out, 1);
    }

    #[tokio::test]
    async fn welcome_then_creation() {
        let svc = services(100);
        let (_stop, shutdown) = watch::channel(false);
        let (mut a, _task) = spawn_client(1, &svc, &shutdown);
        assert_eq!(a.expect("SERVER:").await, "SERVER:PROMPT:Enter your name");
        a.create("Ayla").await;
        assert_eq!(svc.players.get(SessionId(1)).unwrap().name, "Ayla");
    }

    #[tokio::test]
    async fn chat_fans_out_to_everyone_else() {
        let svc = services(100);
        let (_stop, shutdown) = watch::channel(false);
        let (mut a, _ta) = spawn_client(1, &svc, &shutdown);
        let (mut b, _tb) = spawn_client(2, &svc, &shutdown);
        let (mut c, _tc) = spawn_client(3, &svc, &shutdown);
        a.create("Ayla").await;
        b.create("Bo").await;
        c.create("Cy").await;

        a.send("SEND_CHAT:hello");
        assert_eq!(b.expect("SERVER:CHAT:").await, "SERVER:CHAT:Ayla:hello");
        assert_eq!(c.expect("SERVER:CHAT:").await, "SERVER:CHAT:Ayla:hello");

        // The sender gets nothing back; the next frame it sees is the echo.
        a.send("PING");
        assert_eq!(a.expect("SERVER:").await, "SERVER:ECHO:PING");
    }

    #[tokio::test]
    async fn disconnect_clears_registries() {
        let svc = services(100);
        let (_stop, shutdown) = watch::channel(false);
        let (mut a, task) = spawn_client(1, &svc, &shutdown);
        a.create("Ayla").await;
        assert!(svc.sessions.contains(SessionId(1)));

        drop(a);
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(svc.sessions.is_empty());
        assert!(svc.players.is_empty());
    }

    #[tokio::test]
    async fn command_flood_is_throttled() {
        let svc = services(2);
        let (_stop, shutdown) = watch::channel(false);
        let (mut a, _task) = spawn_client(1, &svc, &shutdown);
        for _ in 0..5 {
            a.send("PING");
        }
        assert_eq!(a.expect("SERVER:ERROR:").await, "SERVER:ERROR:too many commands");
    }

    #[tokio::test]
    async fn shutdown_ends_sessions() {
        let svc = services(100);
        let (stop, shutdown) = watch::channel(false);
        let (mut a, task) = spawn_client(1, &svc, &shutdown);
        a.expect("SERVER:PROMPT:").await;

        stop.send(true).unwrap();
        assert_eq!(a.expect("SERVER:STATUS:").await, "SERVER:STATUS:Server shutting down");
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(svc.sessions.is_empty());
    }

    #[tokio::test]
    async fn acceptor_spawns_sessions() {
        let svc = services(100);
        let (stop, shutdown) = watch::channel(false);
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let acceptor = tokio::spawn(run_acceptor(accept_rx, svc.clone(), shutdown));

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (_in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        accept_tx
            .send(Connection {
                session_id: SessionId(9),
                peer: None,
                outbound: out_tx,
                inbound: in_rx,
            })
            .unwrap();
        let first = timeout(Duration::from_secs(2), out_rx.recv()).await.unwrap();
        assert_eq!(first.as_deref(), Some("SERVER:PROMPT:Enter your name"));

        stop.send(true).unwrap();
        timeout(Duration::from_secs(2), acceptor).await.unwrap().unwrap();
    }
}
