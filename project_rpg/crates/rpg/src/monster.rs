use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::Serialize;
use space::GridPos;

use crate::content::{AreaDef, ContentTables};

/// Process-wide monster id source. Ids only ever increase.
#[derive(Debug)]
pub struct MonsterIdAllocator {
    next: AtomicU64,
}

impl MonsterIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MonsterIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A monster standing in the player's current area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveMonster {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub asset: String,
    pub x: i32,
    pub y: i32,
}

impl LiveMonster {
    pub fn pos(&self) -> GridPos {
        GridPos::new(self.x, self.y)
    }
}

/// Roll a fresh population for `area`, one monster per free cell at most.
pub fn populate(
    area: &AreaDef,
    content: &ContentTables,
    ids: &MonsterIdAllocator,
    rng: &mut impl Rng,
) -> Vec<LiveMonster> {
    if area.monster_pool.is_empty() {
        return Vec::new();
    }
    let mut free = area.spawn_cells();
    let mut monsters = Vec::with_capacity(area.monster_count);
    while monsters.len() < area.monster_count && !free.is_empty() {
        let cell = free.swap_remove(rng.gen_range(0..free.len()));
        let key = &area.monster_pool[rng.gen_range(0..area.monster_pool.len())];
        let Some(template) = content.monster(key) else {
            tracing::warn!(area = %area.name, monster = %key, "unknown monster template");
            continue;
        };
        monsters.push(LiveMonster {
            id: ids.next_id(),
            kind: template.id.clone(),
            asset: template.asset.clone(),
            x: cell.x,
            y: cell.y,
        });
    }
    monsters
}
