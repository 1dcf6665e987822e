use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use space::{AreaGrid, GridPos};

use crate::error::ContentError;

pub const TOWN: &str = "TOWN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonsterTemplate {
    /// Template key, e.g. `GOBLIN`. Sent to clients as the monster `type`.
    pub id: String,
    pub asset: String,
    pub health: i32,
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    pub xp: u32,
}

/// What happens when a player uses an interactable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractAction {
    Npc { dialogue: String },
    ZoneTransition { target: String },
}

impl InteractAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Npc { .. } => "NPC",
            Self::ZoneTransition { .. } => "ZONE_TRANSITION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Interactable {
    pub id: String,
    pub name: String,
    pub x: i32,
    pub y: i32,
    #[serde(flatten)]
    pub action: InteractAction,
}

impl Interactable {
    pub fn pos(&self) -> GridPos {
        GridPos::new(self.x, self.y)
    }
}

/// A named zone. `grid` is absent for areas players cannot walk around in.
#[derive(Debug, Clone)]
pub struct AreaDef {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub grid: Option<AreaGrid>,
    pub spawn: GridPos,
    pub monster_pool: Vec<String>,
    pub monster_count: usize,
    pub interactables: Vec<Interactable>,
}

impl AreaDef {
    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.width && (pos.y as usize) < self.height
    }

    /// Row-major `0`/`1` string of exactly `width * height` digits.
    pub fn map_data(&self) -> String {
        match &self.grid {
            Some(grid) => grid.to_digits(),
            None => "0".repeat(self.width * self.height),
        }
    }

    pub fn interactable_at(&self, pos: GridPos) -> Option<&Interactable> {
        self.interactables.iter().find(|i| i.pos() == pos)
    }

    /// Target area of a zone transition placed on `pos`.
    pub fn transition_at(&self, pos: GridPos) -> Option<&str> {
        self.interactable_at(pos).and_then(|i| match &i.action {
            InteractAction::ZoneTransition { target } => Some(target.as_str()),
            InteractAction::Npc { .. } => None,
        })
    }

    /// Cells a monster may be placed on.
    pub fn spawn_cells(&self) -> Vec<GridPos> {
        let cells = match &self.grid {
            Some(grid) => grid.walkable_cells(),
            None => (0..self.height as i32)
                .flat_map(|y| (0..self.width as i32).map(move |x| GridPos::new(x, y)))
                .collect(),
        };
        cells
            .into_iter()
            .filter(|c| *c != self.spawn && self.interactable_at(*c).is_none())
            .collect()
    }
}

/// On-disk shape of an area in `areas.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AreaFile {
    name: String,
    #[serde(default)]
    width: usize,
    #[serde(default)]
    height: usize,
    #[serde(default)]
    grid: Option<AreaGrid>,
    spawn: GridPos,
    #[serde(default)]
    monsters: Vec<String>,
    #[serde(default)]
    monster_count: usize,
    #[serde(default)]
    interactables: Vec<Interactable>,
}

impl From<AreaFile> for AreaDef {
    fn from(f: AreaFile) -> Self {
        let (width, height) = match &f.grid {
            Some(grid) => (grid.width(), grid.height()),
            None => (f.width, f.height),
        };
        AreaDef {
            name: f.name,
            width,
            height,
            grid: f.grid,
            spawn: f.spawn,
            monster_pool: f.monsters,
            monster_count: f.monster_count,
            interactables: f.interactables,
        }
    }
}

/// Read-only game content shared by every session.
#[derive(Debug, Clone)]
pub struct ContentTables {
    areas: BTreeMap<String, AreaDef>,
    /// Area names in listing order.
    order: Vec<String>,
    monsters: BTreeMap<String, MonsterTemplate>,
}

impl ContentTables {
    /// Built-in world: TOWN, FOREST, CAVE and MOUNTAIN.
    pub fn builtin() -> Result<Self, ContentError> {
        let mut tables = Self {
            areas: BTreeMap::new(),
            order: Vec::new(),
            monsters: BTreeMap::new(),
        };
        for m in builtin_monsters() {
            tables.monsters.insert(m.id.clone(), m);
        }
        for area in builtin_areas()? {
            tables.insert_area(area);
        }
        tables.validate()?;
        Ok(tables)
    }

    /// Built-in content overridden by `monsters.json` and `areas.json` in `path`.
    /// Entries replace built-ins with the same id or name; new areas are listed last.
    pub fn load_dir(path: &Path) -> Result<Self, ContentError> {
        if !path.is_dir() {
            return Err(ContentError::Load(format!(
                "not a directory: {}",
                path.display()
            )));
        }
        let mut tables = Self::builtin()?;

        if let Some(monsters) = read_array::<MonsterTemplate>(&path.join("monsters.json"))? {
            for m in monsters {
                tables.monsters.insert(m.id.clone(), m);
            }
        }
        if let Some(areas) = read_array::<AreaFile>(&path.join("areas.json"))? {
            for area in areas {
                tables.insert_area(area.into());
            }
        }

        tables.validate()?;
        tracing::info!(
            areas = tables.areas.len(),
            monsters = tables.monsters.len(),
            dir = %path.display(),
            "Content loaded"
        );
        Ok(tables)
    }

    fn insert_area(&mut self, area: AreaDef) {
        if !self.areas.contains_key(&area.name) {
            self.order.push(area.name.clone());
        }
        self.areas.insert(area.name.clone(), area);
    }

    fn validate(&self) -> Result<(), ContentError> {
        if !self.areas.contains_key(TOWN) {
            return Err(ContentError::MissingArea(TOWN.to_string()));
        }
        for area in self.areas.values() {
            let invalid = |reason: String| ContentError::InvalidArea {
                area: area.name.clone(),
                reason,
            };
            if area.width == 0 || area.height == 0 {
                return Err(invalid("zero-sized area".to_string()));
            }
            if !area.in_bounds(area.spawn) {
                return Err(invalid(format!("spawn {:?} out of bounds", area.spawn)));
            }
            if let Some(grid) = &area.grid {
                if !grid.is_walkable(area.spawn) {
                    return Err(invalid(format!("spawn {:?} is not walkable", area.spawn)));
                }
            }
            if area.monster_count > 0 && area.monster_pool.is_empty() {
                return Err(invalid("monster count without a monster pool".to_string()));
            }
            for key in &area.monster_pool {
                if !self.monsters.contains_key(key) {
                    return Err(ContentError::UnknownMonster {
                        area: area.name.clone(),
                        monster: key.clone(),
                    });
                }
            }
            for i in &area.interactables {
                if !area.in_bounds(i.pos()) {
                    return Err(invalid(format!("interactable '{}' out of bounds", i.id)));
                }
                if let InteractAction::ZoneTransition { target } = &i.action {
                    if !self.areas.contains_key(target) {
                        return Err(invalid(format!(
                            "interactable '{}' leads to unknown area '{}'",
                            i.id, target
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn area(&self, name: &str) -> Option<&AreaDef> {
        self.areas.get(name)
    }

    /// The respawn area. Always present once constructed.
    pub fn town(&self) -> &AreaDef {
        &self.areas[TOWN]
    }

    pub fn monster(&self, id: &str) -> Option<&MonsterTemplate> {
        self.monsters.get(id)
    }

    pub fn area_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>, ContentError> {
    if !path.is_file() {
        return Ok(None);
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    let content = std::fs::read_to_string(path)
        .map_err(|e| ContentError::Load(format!("{}: {}", file_name, e)))?;
    let items = serde_json::from_str(&content)
        .map_err(|e| ContentError::Load(format!("{}: {}", file_name, e)))?;
    Ok(Some(items))
}

fn monster(id: &str, health: i32, attack: i32, defense: i32, speed: i32, xp: u32) -> MonsterTemplate {
    MonsterTemplate {
        id: id.to_string(),
        asset: id.to_lowercase(),
        health,
        attack,
        defense,
        speed,
        xp,
    }
}

fn builtin_monsters() -> Vec<MonsterTemplate> {
    vec![
        monster("GOBLIN", 30, 8, 2, 6, 25),
        monster("WOLF", 25, 9, 1, 9, 20),
        monster("BAT", 15, 6, 0, 12, 10),
        monster("SKELETON", 45, 11, 4, 4, 40),
        monster("TROLL", 90, 16, 7, 3, 100),
    ]
}

fn npc(id: &str, name: &str, x: i32, y: i32, dialogue: &str) -> Interactable {
    Interactable {
        id: id.to_string(),
        name: name.to_string(),
        x,
        y,
        action: InteractAction::Npc {
            dialogue: dialogue.to_string(),
        },
    }
}

fn gate(id: &str, name: &str, x: i32, y: i32, target: &str) -> Interactable {
    Interactable {
        id: id.to_string(),
        name: name.to_string(),
        x,
        y,
        action: InteractAction::ZoneTransition {
            target: target.to_string(),
        },
    }
}

fn gridded(
    name: &str,
    rows: &[&str],
    spawn: GridPos,
    pool: &[&str],
    monster_count: usize,
    interactables: Vec<Interactable>,
) -> Result<AreaDef, ContentError> {
    let grid = AreaGrid::from_rows(rows).map_err(|source| ContentError::InvalidArea {
        area: name.to_string(),
        reason: source.to_string(),
    })?;
    Ok(AreaDef {
        name: name.to_string(),
        width: grid.width(),
        height: grid.height(),
        grid: Some(grid),
        spawn,
        monster_pool: pool.iter().map(|s| s.to_string()).collect(),
        monster_count,
        interactables,
    })
}

fn builtin_areas() -> Result<Vec<AreaDef>, ContentError> {
    let town = gridded(
        TOWN,
        &[
            "111111111111",
            "100000000001",
            "101100001101",
            "100000000001",
            "100000000001",
            "100000000000",
            "100000000001",
            "101100001101",
            "100000000001",
            "111111111111",
        ],
        GridPos::new(5, 5),
        &[],
        0,
        vec![
            npc("elder", "Village Elder", 3, 3, "The forest east of town grows darker every day."),
            npc("smith", "Blacksmith", 8, 3, "Keep your guard up out there."),
            gate("forest_gate", "Forest Gate", 11, 5, "FOREST"),
        ],
    )?;

    let forest = gridded(
        "FOREST",
        &[
            "000000000000",
            "011000001100",
            "010000000000",
            "000001100000",
            "000001100000",
            "000000000000",
            "001100000110",
            "000000000010",
            "011000110000",
            "000000000000",
        ],
        GridPos::new(1, 5),
        &["GOBLIN", "WOLF"],
        4,
        vec![
            gate("town_gate", "Town Gate", 0, 5, TOWN),
            gate("cave_entrance", "Cave Entrance", 11, 2, "CAVE"),
            npc("hermit", "Old Hermit", 9, 8, "Bats hate the light. Trolls hate everything."),
        ],
    )?;

    let cave = gridded(
        "CAVE",
        &[
            "1111111111",
            "0000001001",
            "1011001001",
            "1000000001",
            "1001110001",
            "1000010001",
            "1100000011",
            "1111111111",
        ],
        GridPos::new(1, 1),
        &["BAT", "SKELETON"],
        3,
        vec![
            gate("cave_exit", "Cave Exit", 0, 1, "FOREST"),
            gate("mountain_path", "Mountain Path", 8, 5, "MOUNTAIN"),
        ],
    )?;

    let mountain = AreaDef {
        name: "MOUNTAIN".to_string(),
        width: 10,
        height: 8,
        grid: None,
        spawn: GridPos::new(0, 0),
        monster_pool: vec!["TROLL".to_string()],
        monster_count: 2,
        interactables: Vec::new(),
    };

    Ok(vec![town, forest, cave, mountain])
}
