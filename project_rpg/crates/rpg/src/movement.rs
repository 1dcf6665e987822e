//! Path following. Driven by the session task's tick interval.

use std::sync::Arc;
use std::time::Instant;

use crate::router::GameSession;
use crate::wire::{ServerMessage, StatsView};

impl GameSession {
    /// Advance at most one step along the current path.
    ///
    /// Steps are spaced by `step_delay`; combat freezes the path in place.
    /// Stepping onto a zone transition moves the player to its target area.
    pub fn on_tick(&mut self, now: Instant) -> Vec<ServerMessage> {
        if !self.player.is_traveling() || self.player.in_combat() {
            return Vec::new();
        }
        if let Some(last) = self.player.last_move {
            if now.saturating_duration_since(last) < self.services.config.step_delay {
                return Vec::new();
            }
        }
        let Some(next) = self.player.path.pop_front() else {
            return Vec::new();
        };

        self.player.pos = next;
        self.player.last_move = Some(now);
        self.steps += 1;
        self.sync_presence();

        let content = Arc::clone(&self.services.content);
        let transition = content
            .area(&self.player.area)
            .and_then(|a| a.transition_at(next));
        match transition {
            Some(target) => {
                self.player.path.clear();
                tracing::debug!(session_id = ?self.id(), %target, "walked into transition");
                self.go_to(target)
            }
            None => vec![ServerMessage::Stats(StatsView::from(&self.player))],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use space::GridPos;

    use crate::router::tests::{ready, services, tags};

    #[test]
    fn idle_player_does_not_move() {
        let svc = services();
        let mut s = ready(1, "Bo", &svc);
        assert!(s.on_tick(std::time::Instant::now()).is_empty());
        assert_eq!(s.steps(), 0);
    }

    #[test]
    fn steps_are_spaced_by_delay() {
        let svc = services();
        let mut s = ready(1, "Bo", &svc);
        s.handle_line("MOVE_TO:8,5");
        let t0 = std::time::Instant::now();

        let first = s.on_tick(t0);
        assert_eq!(tags(&first), vec!["STATS"]);
        assert_eq!(s.player().pos, GridPos::new(6, 5));

        assert!(s.on_tick(t0 + Duration::from_millis(150)).is_empty());
        assert_eq!(s.player().pos, GridPos::new(6, 5));

        s.on_tick(t0 + Duration::from_millis(200));
        assert_eq!(s.player().pos, GridPos::new(7, 5));
        s.on_tick(t0 + Duration::from_millis(400));
        assert_eq!(s.player().pos, GridPos::new(8, 5));
        assert!(!s.player().is_traveling());
        assert!(s.on_tick(t0 + Duration::from_millis(600)).is_empty());
        assert_eq!(s.steps(), 3);

        let presence = svc.players.get(s.id()).unwrap();
        assert_eq!((presence.x, presence.y), (8, 5));
    }

    #[test]
    fn combat_freezes_path() {
        let svc = services();
        let mut s = ready(1, "Bo", &svc);
        s.handle_line("GO_TO:FOREST");
        s.handle_line("MOVE_TO:5,5");
        assert!(s.player().is_traveling());
        let id = s.player().monsters[0].id;
        s.handle_line(&format!("MONSTER_SELECTED:{}", id));
        // Starting a fight drops the path.
        assert!(!s.player().is_traveling());

        s.player.path.push_back(GridPos::new(2, 5));
        assert!(s.on_tick(std::time::Instant::now()).is_empty());
        assert_eq!(s.player().pos, GridPos::new(1, 5));
    }

    #[test]
    fn walking_onto_gate_changes_area() {
        let svc = services();
        let mut s = ready(1, "Bo", &svc);
        s.handle_line("MOVE_TO:11,5");
        let t0 = std::time::Instant::now();
        let mut last = Vec::new();
        for i in 0..6 {
            last = s.on_tick(t0 + Duration::from_millis(200 * i));
        }
        assert_eq!(last[0].to_string(), "SERVER:AREA_CHANGED:FOREST");
        assert_eq!(s.player().area, "FOREST");
        assert_eq!(s.player().pos, GridPos::new(1, 5));
        assert!(!s.player().is_traveling());
        assert_eq!(svc.players.get(s.id()).unwrap().area, "FOREST");
    }
}
