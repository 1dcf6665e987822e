use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::{PlayerBroadcastData, SessionEvent, SessionId};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoning is ignored: every write replaces a complete entry.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Presence directory: identity -> public projection.
///
/// Every access holds the lock for one map operation only. Multi-entry reads
/// copy a snapshot and filter after the lock is released.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: Mutex<BTreeMap<SessionId, PlayerBroadcastData>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the whole record for `data.id`.
    pub fn upsert(&self, data: PlayerBroadcastData) {
        lock(&self.players).insert(data.id, data);
    }

    /// Remove an entry. Removing a missing id is a no-op.
    pub fn remove(&self, id: SessionId) -> Option<PlayerBroadcastData> {
        lock(&self.players).remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<PlayerBroadcastData> {
        lock(&self.players).get(&id).cloned()
    }

    /// Copy of every entry, sorted by session id.
    pub fn snapshot(&self) -> Vec<PlayerBroadcastData> {
        lock(&self.players).values().cloned().collect()
    }

    /// Players currently in `area`, excluding `exclude`.
    pub fn in_area(&self, area: &str, exclude: SessionId) -> Vec<PlayerBroadcastData> {
        let snapshot = self.snapshot();
        snapshot
            .into_iter()
            .filter(|p| p.id != exclude && p.area == area)
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.players).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Liveness-checked handle to a session's mailbox.
///
/// Holding a handle does not keep the session alive; once the session task
/// ends its receiver is dropped and the handle reports itself dead.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    mailbox: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(mailbox: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { mailbox }
    }

    pub fn is_live(&self) -> bool {
        !self.mailbox.is_closed()
    }

    /// Queue an event on the target's own task. Returns false if the target is gone.
    pub fn dispatch(&self, event: SessionEvent) -> bool {
        self.mailbox.send(event).is_ok()
    }
}

/// Session directory: identity -> handle able to receive broadcasts.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<BTreeMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: SessionId, handle: SessionHandle) {
        lock(&self.sessions).insert(id, handle);
    }

    /// Idempotent: returns false when the id was already gone.
    pub fn remove(&self, id: SessionId) -> bool {
        lock(&self.sessions).remove(&id).is_some()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        lock(&self.sessions).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<(SessionId, SessionHandle)> {
        lock(&self.sessions)
            .iter()
            .map(|(id, h)| (*id, h.clone()))
            .collect()
    }

    /// Deliver `frame` to every live session except `sender`.
    ///
    /// Handles are copied out first so no lock is held while dispatching.
    /// Stale handles are skipped. Returns the number of sessions reached.
    pub fn broadcast(&self, sender: SessionId, frame: Arc<str>) -> usize {
        let targets = self.snapshot();
        let mut delivered = 0;
        for (id, handle) in targets {
            if id == sender || !handle.is_live() {
                continue;
            }
            if handle.dispatch(SessionEvent::Deliver(Arc::clone(&frame))) {
                delivered += 1;
            } else {
                tracing::debug!(session_id = ?id, "broadcast target gone");
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlayerClass;

    fn player(id: u64, area: &str) -> PlayerBroadcastData {
        PlayerBroadcastData {
            id: SessionId(id),
            name: format!("p{}", id),
            class: PlayerClass::Fighter,
            area: area.to_string(),
            x: 0,
            y: 0,
        }
    }

    #[test]
    fn upsert_replaces_whole_record() {
        let reg = PlayerRegistry::new();
        reg.upsert(player(1, "TOWN"));
        let mut moved = player(1, "FOREST");
        moved.x = 4;
        moved.y = 2;
        reg.upsert(moved.clone());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(SessionId(1)), Some(moved));
    }

    #[test]
    fn player_remove_is_idempotent() {
        let reg = PlayerRegistry::new();
        reg.upsert(player(1, "TOWN"));
        assert!(reg.remove(SessionId(1)).is_some());
        assert!(reg.remove(SessionId(1)).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn in_area_filters_and_excludes_self() {
        let reg = PlayerRegistry::new();
        reg.upsert(player(1, "FOREST"));
        reg.upsert(player(2, "FOREST"));
        reg.upsert(player(3, "TOWN"));
        let seen: Vec<_> = reg
            .in_area("FOREST", SessionId(1))
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(seen, vec![SessionId(2)]);
    }

    #[test]
    fn session_remove_is_idempotent() {
        let reg = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        reg.register(SessionId(1), SessionHandle::new(tx));
        assert!(reg.contains(SessionId(1)));
        assert!(reg.remove(SessionId(1)));
        assert!(!reg.remove(SessionId(1)));
        assert!(reg.is_empty());
    }

    #[test]
    fn broadcast_skips_sender_and_reaches_others_once() {
        let reg = SessionRegistry::new();
        let mut receivers = Vec::new();
        for id in 1..=3 {
            let (tx, rx) = mpsc::unbounded_channel();
            reg.register(SessionId(id), SessionHandle::new(tx));
            receivers.push((SessionId(id), rx));
        }

        let delivered = reg.broadcast(SessionId(2), Arc::from("SERVER:CHAT:p2:hi"));
        assert_eq!(delivered, 2);

        for (id, mut rx) in receivers {
            let mut got = Vec::new();
            while let Ok(SessionEvent::Deliver(frame)) = rx.try_recv() {
                got.push(frame);
            }
            if id == SessionId(2) {
                assert!(got.is_empty());
            } else {
                assert_eq!(got.len(), 1);
                assert_eq!(&*got[0], "SERVER:CHAT:p2:hi");
            }
        }
    }

    #[test]
    fn broadcast_skips_stale_handles() {
        let reg = SessionRegistry::new();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        reg.register(SessionId(1), SessionHandle::new(live_tx));
        reg.register(SessionId(2), SessionHandle::new(dead_tx));
        drop(dead_rx);

        let delivered = reg.broadcast(SessionId(99), Arc::from("x"));
        assert_eq!(delivered, 1);
        assert!(live_rx.try_recv().is_ok());
        // The stale entry stays until its owner removes it.
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn frame_is_shared_not_copied() {
        let reg = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        reg.register(SessionId(1), SessionHandle::new(tx_a));
        reg.register(SessionId(2), SessionHandle::new(tx_b));

        let frame: Arc<str> = Arc::from("hello");
        reg.broadcast(SessionId(0), Arc::clone(&frame));

        let SessionEvent::Deliver(a) = rx_a.try_recv().unwrap();
        let SessionEvent::Deliver(b) = rx_b.try_recv().unwrap();
        assert!(Arc::ptr_eq(&a, &frame));
        assert!(Arc::ptr_eq(&b, &frame));
    }
}
