use std::sync::Arc;
use std::time::Duration;

use session::{PlayerRegistry, SessionRegistry};

use crate::content::ContentTables;
use crate::monster::MonsterIdAllocator;

/// Per-session timing and limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Movement scheduler cadence.
    pub tick_interval: Duration,
    /// Minimum time between two path steps.
    pub step_delay: Duration,
    pub max_commands_per_second: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            step_delay: Duration::from_millis(200),
            max_commands_per_second: 20,
        }
    }
}

/// Everything a session shares with the rest of the server.
///
/// Cloning is cheap; all clones point at the same registries.
#[derive(Debug, Clone)]
pub struct GameServices {
    pub players: Arc<PlayerRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub content: Arc<ContentTables>,
    pub monster_ids: Arc<MonsterIdAllocator>,
    pub config: SessionConfig,
}

impl GameServices {
    pub fn new(content: ContentTables, config: SessionConfig) -> Self {
        Self {
            players: Arc::new(PlayerRegistry::new()),
            sessions: Arc::new(SessionRegistry::new()),
            content: Arc::new(content),
            monster_ids: Arc::new(MonsterIdAllocator::new()),
            config,
        }
    }
}
