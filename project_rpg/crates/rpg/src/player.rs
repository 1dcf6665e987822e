use std::collections::VecDeque;
use std::time::Instant;

use session::{PlayerBroadcastData, PlayerClass, SessionId, SessionState};
use space::GridPos;

use crate::combat::CombatOpponent;
use crate::monster::LiveMonster;

pub const STARTING_SKILL_POINTS: u32 = 3;
pub const SKILL_POINTS_PER_LEVEL: u32 = 3;
pub const STARTING_XP_TO_NEXT: u32 = 100;
pub const NAME_LEN: std::ops::RangeInclusive<usize> = 2..=20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub health: i32,
    pub max_health: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    pub level: u32,
    pub xp: u32,
    pub xp_to_next: u32,
}

impl Stats {
    /// Level 1 block for `class`. `Unselected` gets all zeros.
    pub fn for_class(class: PlayerClass) -> Self {
        let (hp, mana, attack, defense, speed) = match class {
            PlayerClass::Fighter => (120, 30, 12, 8, 5),
            PlayerClass::Wizard => (80, 100, 6, 4, 6),
            PlayerClass::Rogue => (90, 50, 10, 5, 10),
            PlayerClass::Unselected => (0, 0, 0, 0, 0),
        };
        Self {
            health: hp,
            max_health: hp,
            mana,
            max_mana: mana,
            attack,
            defense,
            speed,
            level: 1,
            xp: 0,
            xp_to_next: STARTING_XP_TO_NEXT,
        }
    }

    pub fn restore(&mut self) {
        self.health = self.max_health;
        self.mana = self.max_mana;
    }
}

/// Stat names accepted by `UPGRADE_STAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Health,
    Mana,
    Attack,
    Defense,
    Speed,
}

impl StatKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "health" => Some(Self::Health),
            "mana" => Some(Self::Mana),
            "attack" => Some(Self::Attack),
            "defense" => Some(Self::Defense),
            "speed" => Some(Self::Speed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Mana => "mana",
            Self::Attack => "attack",
            Self::Defense => "defense",
            Self::Speed => "speed",
        }
    }

    fn apply(self, stats: &mut Stats) {
        match self {
            Self::Health => {
                stats.max_health += 10;
                stats.health += 10;
            }
            Self::Mana => {
                stats.max_mana += 10;
                stats.mana += 10;
            }
            Self::Attack => stats.attack += 2,
            Self::Defense => stats.defense += 2,
            Self::Speed => stats.speed += 1,
        }
    }
}

/// Spells known to wizards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spell {
    Fireball,
    Lightning,
    Freeze,
}

impl Spell {
    pub const WIZARD: [Spell; 3] = [Spell::Fireball, Spell::Lightning, Spell::Freeze];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Fireball" => Some(Self::Fireball),
            "Lightning" => Some(Self::Lightning),
            "Freeze" => Some(Self::Freeze),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Fireball => "Fireball",
            Self::Lightning => "Lightning",
            Self::Freeze => "Freeze",
        }
    }

    pub fn mana_cost(self) -> i32 {
        match self {
            Self::Fireball => 20,
            Self::Lightning => 15,
            Self::Freeze => 10,
        }
    }

    /// Damage before variance. Spells ignore defense.
    pub fn base_damage(self, stats: &Stats) -> f64 {
        let attack = stats.attack as f64;
        let max_mana = stats.max_mana as f64;
        match self {
            Self::Fireball => attack + max_mana / 8.0,
            Self::Lightning => attack + max_mana / 10.0,
            Self::Freeze => attack / 2.0 + max_mana / 12.0,
        }
    }

    /// Inclusive multiplier range applied to the base damage.
    pub fn variance(self) -> (f64, f64) {
        match self {
            Self::Fireball => (0.8, 1.2),
            Self::Lightning => (0.7, 1.3),
            Self::Freeze => (0.9, 1.1),
        }
    }
}

/// Snapshot after one level gained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    pub level: u32,
    pub skill_points: u32,
    pub xp_to_next: u32,
}

/// Why an `UPGRADE_STAT` was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeRefusal {
    NoClass,
    NoPoints,
}

/// Per-connection game state. Owned by exactly one session task.
#[derive(Debug)]
pub struct PlayerState {
    pub id: SessionId,
    pub name: Option<String>,
    pub class: PlayerClass,
    pub stats: Stats,
    pub skill_points: u32,
    pub spells: Vec<Spell>,
    pub area: String,
    pub pos: GridPos,
    pub path: VecDeque<GridPos>,
    pub last_move: Option<Instant>,
    pub monsters: Vec<LiveMonster>,
    pub opponent: Option<CombatOpponent>,
    pub defending: bool,
    /// Set once the starting skill points have all been spent.
    pub points_spent: bool,
}

impl PlayerState {
    pub fn new(id: SessionId, area: &str, pos: GridPos) -> Self {
        Self {
            id,
            name: None,
            class: PlayerClass::Unselected,
            stats: Stats::for_class(PlayerClass::Unselected),
            skill_points: 0,
            spells: Vec::new(),
            area: area.to_string(),
            pos,
            path: VecDeque::new(),
            last_move: None,
            monsters: Vec::new(),
            opponent: None,
            defending: false,
            points_spent: false,
        }
    }

    /// Creation phase derived from which steps are done.
    pub fn phase(&self) -> SessionState {
        if self.name.is_none() {
            SessionState::AwaitingName
        } else if !self.class.is_selected() {
            SessionState::AwaitingClass
        } else {
            SessionState::Active
        }
    }

    /// Name, class and starting points all done.
    pub fn is_initialized(&self) -> bool {
        self.name.is_some() && self.class.is_selected() && self.points_spent
    }

    pub fn in_combat(&self) -> bool {
        self.opponent.is_some()
    }

    pub fn is_traveling(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Player{}", self.id),
        }
    }

    pub fn select_class(&mut self, class: PlayerClass) {
        self.class = class;
        self.stats = Stats::for_class(class);
        self.skill_points = STARTING_SKILL_POINTS;
        self.spells = match class {
            PlayerClass::Wizard => Spell::WIZARD.to_vec(),
            _ => Vec::new(),
        };
    }

    /// Spend one point on `stat`. Returns true the first time the starting
    /// points are used up.
    pub fn upgrade(&mut self, stat: StatKind) -> Result<bool, UpgradeRefusal> {
        if !self.class.is_selected() {
            return Err(UpgradeRefusal::NoClass);
        }
        if self.skill_points == 0 {
            return Err(UpgradeRefusal::NoPoints);
        }
        stat.apply(&mut self.stats);
        self.skill_points -= 1;
        if self.skill_points == 0 && !self.points_spent {
            self.points_spent = true;
            return Ok(true);
        }
        Ok(false)
    }

    /// Add xp and level up as many times as it covers.
    pub fn grant_xp(&mut self, amount: u32) -> Vec<LevelUp> {
        self.stats.xp = self.stats.xp.saturating_add(amount);
        let mut gained = Vec::new();
        while self.stats.xp >= self.stats.xp_to_next {
            let s = &mut self.stats;
            s.xp -= s.xp_to_next;
            s.level = s.level.saturating_add(1);
            // Saturates at u32::MAX; xp is capped there too, so the loop ends.
            s.xp_to_next = (u64::from(s.xp_to_next) * 3 / 2).min(u64::from(u32::MAX)) as u32;
            s.max_health += 10;
            s.max_mana += 5;
            s.attack += 2;
            s.defense += 1;
            s.speed += 1;
            s.restore();
            self.skill_points += SKILL_POINTS_PER_LEVEL;
            gained.push(LevelUp {
                level: s.level,
                skill_points: self.skill_points,
                xp_to_next: s.xp_to_next,
            });
        }
        gained
    }

    /// Move into `area` at `pos`, dropping path, monsters and any fight.
    pub fn enter_area(&mut self, area: &str, pos: GridPos) {
        self.area = area.to_string();
        self.pos = pos;
        self.path.clear();
        self.last_move = None;
        self.monsters.clear();
        self.opponent = None;
        self.defending = false;
    }

    /// Forced return to town after a defeat.
    pub fn respawn(&mut self, town: &str, pos: GridPos) {
        self.enter_area(town, pos);
        self.stats.health = self.stats.max_health / 2;
        self.stats.mana = self.stats.max_mana;
    }

    pub fn broadcast_data(&self) -> PlayerBroadcastData {
        PlayerBroadcastData {
            id: self.id,
            name: self.display_name(),
            class: self.class,
            area: self.area.clone(),
            x: self.pos.x,
            y: self.pos.y,
        }
    }
}
