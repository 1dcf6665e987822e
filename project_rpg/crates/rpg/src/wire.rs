use std::fmt;

use serde::Serialize;
use session::{PlayerBroadcastData, PlayerClass};

use crate::combat::{CombatOpponent, CombatUpdate};
use crate::content::Interactable;
use crate::monster::LiveMonster;
use crate::player::{LevelUp, PlayerState};

/// Full stat block sent as `STATS`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub name: String,
    pub class: PlayerClass,
    pub level: u32,
    pub xp: u32,
    pub xp_to_next: u32,
    pub health: i32,
    pub max_health: i32,
    pub mana: i32,
    pub max_mana: i32,
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    pub skill_points: u32,
    pub area: String,
    pub x: i32,
    pub y: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spells: Option<Vec<&'static str>>,
}

impl From<&PlayerState> for StatsView {
    fn from(p: &PlayerState) -> Self {
        let s = &p.stats;
        Self {
            name: p.display_name(),
            class: p.class,
            level: s.level,
            xp: s.xp,
            xp_to_next: s.xp_to_next,
            health: s.health,
            max_health: s.max_health,
            mana: s.mana,
            max_mana: s.max_mana,
            attack: s.attack,
            defense: s.defense,
            speed: s.speed,
            skill_points: p.skill_points,
            area: p.area.clone(),
            x: p.pos.x,
            y: p.pos.y,
            spells: if p.spells.is_empty() {
                None
            } else {
                Some(p.spells.iter().map(|s| s.name()).collect())
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InteractableView {
    pub id: String,
    pub name: String,
    pub kind: &'static str,
    pub x: i32,
    pub y: i32,
}

impl From<&Interactable> for InteractableView {
    fn from(i: &Interactable) -> Self {
        Self {
            id: i.id.clone(),
            name: i.name.clone(),
            kind: i.action.kind(),
            x: i.x,
            y: i.y,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NpcView {
    pub id: String,
    pub name: String,
    pub dialogue: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
    pub id: u64,
    pub name: String,
    pub class: PlayerClass,
    pub x: i32,
    pub y: i32,
}

impl From<PlayerBroadcastData> for PlayerView {
    fn from(p: PlayerBroadcastData) -> Self {
        Self {
            id: p.id.0,
            name: p.name,
            class: p.class,
            x: p.x,
            y: p.y,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VictoryView {
    pub monster: String,
    pub xp: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpView {
    pub level: u32,
    pub skill_points: u32,
    pub xp_to_next: u32,
}

impl From<LevelUp> for LevelUpView {
    fn from(l: LevelUp) -> Self {
        Self {
            level: l.level,
            skill_points: l.skill_points,
            xp_to_next: l.xp_to_next,
        }
    }
}

/// One outbound frame. Rendered as `SERVER:<TAG>:<payload>`.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Prompt(String),
    NameSet(String),
    ClassSet(PlayerClass),
    Stats(StatsView),
    StatUpgraded(&'static str),
    CharacterComplete(String),
    /// Comma-joined area names.
    Areas(String),
    AreaChanged(String),
    MapData(String),
    Monsters(Vec<LiveMonster>),
    Interactables(Vec<InteractableView>),
    NpcInteract(NpcView),
    PlayersInArea(Vec<PlayerView>),
    Chat { sender: String, text: String },
    CombatStart(CombatOpponent),
    CombatLog(String),
    CombatUpdate(CombatUpdate),
    CombatTurn(&'static str),
    CombatVictory(VictoryView),
    CombatDefeat(String),
    CombatFled(String),
    LevelUp(LevelUpView),
    Status(String),
    Error(String),
    Echo(String),
}

impl ServerMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "PROMPT",
            Self::NameSet(_) => "NAME_SET",
            Self::ClassSet(_) => "CLASS_SET",
            Self::Stats(_) => "STATS",
            Self::StatUpgraded(_) => "STAT_UPGRADED",
            Self::CharacterComplete(_) => "CHARACTER_COMPLETE",
            Self::Areas(_) => "AREAS",
            Self::AreaChanged(_) => "AREA_CHANGED",
            Self::MapData(_) => "MAP_DATA",
            Self::Monsters(_) => "MONSTERS",
            Self::Interactables(_) => "INTERACTABLES",
            Self::NpcInteract(_) => "NPC_INTERACT",
            Self::PlayersInArea(_) => "PLAYERS_IN_AREA",
            Self::Chat { .. } => "CHAT",
            Self::CombatStart(_) => "COMBAT_START",
            Self::CombatLog(_) => "COMBAT_LOG",
            Self::CombatUpdate(_) => "COMBAT_UPDATE",
            Self::CombatTurn(_) => "COMBAT_TURN",
            Self::CombatVictory(_) => "COMBAT_VICTORY",
            Self::CombatDefeat(_) => "COMBAT_DEFEAT",
            Self::CombatFled(_) => "COMBAT_FLED",
            Self::LevelUp(_) => "LEVEL_UP",
            Self::Status(_) => "STATUS",
            Self::Error(_) => "ERROR",
            Self::Echo(_) => "ECHO",
        }
    }

    pub fn error(msg: impl fmt::Display) -> Self {
        Self::Error(msg.to_string())
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SERVER:{}:", self.tag())?;
        match self {
            Self::Prompt(s)
            | Self::NameSet(s)
            | Self::CharacterComplete(s)
            | Self::Areas(s)
            | Self::AreaChanged(s)
            | Self::MapData(s)
            | Self::CombatLog(s)
            | Self::CombatDefeat(s)
            | Self::CombatFled(s)
            | Self::Status(s)
            | Self::Error(s)
            | Self::Echo(s) => f.write_str(s),
            Self::ClassSet(class) => f.write_str(class.as_str()),
            Self::StatUpgraded(s) | Self::CombatTurn(s) => f.write_str(s),
            Self::Chat { sender, text } => write!(f, "{}:{}", sender, text),
            Self::Stats(v) => json(f, v),
            Self::Monsters(v) => json(f, v),
            Self::Interactables(v) => json(f, v),
            Self::NpcInteract(v) => json(f, v),
            Self::PlayersInArea(v) => json(f, v),
            Self::CombatStart(v) => json(f, v),
            Self::CombatUpdate(v) => json(f, v),
            Self::CombatVictory(v) => json(f, v),
            Self::LevelUp(v) => json(f, v),
        }
    }
}

fn json<T: Serialize>(f: &mut fmt::Formatter<'_>, value: &T) -> fmt::Result {
    let s = serde_json::to_string(value).map_err(|_| fmt::Error)?;
    f.write_str(&s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Spell;
    use session::SessionId;
    use space::GridPos;

    #[test]
    fn plain_payloads() {
        assert_eq!(
            ServerMessage::Prompt("Enter your name".to_string()).to_string(),
            "SERVER:PROMPT:Enter your name"
        );
        assert_eq!(
            ServerMessage::ClassSet(PlayerClass::Rogue).to_string(),
            "SERVER:CLASS_SET:ROGUE"
        );
        assert_eq!(
            ServerMessage::Chat {
                sender: "Ayla".to_string(),
                text: "hi: there".to_string()
            }
            .to_string(),
            "SERVER:CHAT:Ayla:hi: there"
        );
        assert_eq!(ServerMessage::error("bad").to_string(), "SERVER:ERROR:bad");
    }

    #[test]
    fn stats_field_order_with_spells() {
        let mut p = PlayerState::new(SessionId(3), "TOWN", GridPos::new(5, 5));
        p.name = Some("Mira".to_string());
        p.select_class(PlayerClass::Wizard);
        let frame = ServerMessage::Stats(StatsView::from(&p)).to_string();
        assert_eq!(
            frame,
            concat!(
                r#"SERVER:STATS:{"name":"Mira","class":"WIZARD","level":1,"xp":0,"xpToNext":100,"#,
                r#""health":80,"maxHealth":80,"mana":100,"maxMana":100,"attack":6,"defense":4,"#,
                r#""speed":6,"skillPoints":3,"area":"TOWN","x":5,"y":5,"#,
                r#""spells":["Fireball","Lightning","Freeze"]}"#
            )
        );
        assert_eq!(p.spells, Spell::WIZARD.to_vec());
    }

    #[test]
    fn stats_without_spells_omits_field() {
        let mut p = PlayerState::new(SessionId(3), "TOWN", GridPos::new(5, 5));
        p.select_class(PlayerClass::Fighter);
        let frame = ServerMessage::Stats(StatsView::from(&p)).to_string();
        assert!(frame.ends_with(r#""area":"TOWN","x":5,"y":5}"#), "{}", frame);
        assert!(frame.contains(r#""name":"Player3""#));
    }

    #[test]
    fn json_payload_shapes() {
        let update = CombatUpdate {
            player_health: 50,
            player_max_health: 80,
            player_mana: 20,
            player_max_mana: 100,
            monster_health: 3,
            monster_max_health: 30,
        };
        assert_eq!(
            ServerMessage::CombatUpdate(update).to_string(),
            r#"SERVER:COMBAT_UPDATE:{"playerHealth":50,"playerMaxHealth":80,"playerMana":20,"playerMaxMana":100,"monsterHealth":3,"monsterMaxHealth":30}"#
        );
        assert_eq!(
            ServerMessage::LevelUp(LevelUpView {
                level: 2,
                skill_points: 3,
                xp_to_next: 150
            })
            .to_string(),
            r#"SERVER:LEVEL_UP:{"level":2,"skillPoints":3,"xpToNext":150}"#
        );
        assert_eq!(
            ServerMessage::CombatVictory(VictoryView {
                monster: "WOLF".to_string(),
                xp: 20
            })
            .to_string(),
            r#"SERVER:COMBAT_VICTORY:{"monster":"WOLF","xp":20}"#
        );
        assert_eq!(
            ServerMessage::PlayersInArea(vec![PlayerView {
                id: 2,
                name: "Bo".to_string(),
                class: PlayerClass::Fighter,
                x: 1,
                y: 2
            }])
            .to_string(),
            r#"SERVER:PLAYERS_IN_AREA:[{"id":2,"name":"Bo","class":"FIGHTER","x":1,"y":2}]"#
        );
        assert_eq!(
            ServerMessage::Monsters(Vec::new()).to_string(),
            "SERVER:MONSTERS:[]"
        );
    }

    #[test]
    fn json_escapes_text() {
        let frame = ServerMessage::NpcInteract(NpcView {
            id: "elder".to_string(),
            name: "Elder \"Old\"".to_string(),
            dialogue: "line".to_string(),
        })
        .to_string();
        assert_eq!(
            frame,
            r#"SERVER:NPC_INTERACT:{"id":"elder","name":"Elder \"Old\"","dialogue":"line"}"#
        );
    }
}
