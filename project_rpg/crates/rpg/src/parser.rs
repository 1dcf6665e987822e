use session::PlayerClass;
use space::GridPos;
use thiserror::Error;

use crate::combat::CombatAction;
use crate::player::{Spell, StatKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetName(String),
    SelectClass(PlayerClass),
    UpgradeStat(StatKind),
    GoTo(String),
    MoveTo(GridPos),
    InteractAt(GridPos),
    SendChat(String),
    MonsterSelected(u64),
    Combat(CombatAction),
    GiveXp(u32),
    RequestPlayers,
    /// Anything unrecognized, echoed back verbatim.
    Unknown(String),
}

/// Malformed arguments. The message is sent back as the `ERROR` payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{0} requires an argument")]
    MissingArgument(&'static str),
    #[error("invalid class: {0}")]
    UnknownClass(String),
    #[error("invalid stat: {0}")]
    UnknownStat(String),
    #[error("invalid coordinates: {0}")]
    BadCoordinates(String),
    #[error("invalid number: {0}")]
    BadNumber(String),
    #[error("unknown combat action: {0}")]
    UnknownCombatAction(String),
    #[error("unknown spell: {0}")]
    UnknownSpell(String),
}

/// Parse one inbound frame of the form `VERB` or `VERB:ARG`.
///
/// Verbs are case-sensitive. Only the first `:` separates verb and argument.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let (verb, arg) = match line.split_once(':') {
        Some((verb, arg)) => (verb, Some(arg)),
        None => (line, None),
    };

    let require = |name: &'static str| arg.ok_or(ParseError::MissingArgument(name));

    let cmd = match verb {
        "SET_NAME" => Command::SetName(require("SET_NAME")?.to_string()),
        "SELECT_CLASS" => {
            let name = require("SELECT_CLASS")?;
            let class =
                PlayerClass::parse(name).ok_or_else(|| ParseError::UnknownClass(name.to_string()))?;
            Command::SelectClass(class)
        }
        "UPGRADE_STAT" => {
            let name = require("UPGRADE_STAT")?;
            let stat = StatKind::parse(name).ok_or_else(|| ParseError::UnknownStat(name.to_string()))?;
            Command::UpgradeStat(stat)
        }
        "GO_TO" => Command::GoTo(require("GO_TO")?.to_string()),
        "MOVE_TO" => Command::MoveTo(parse_coords(require("MOVE_TO")?)?),
        "INTERACT_AT" => Command::InteractAt(parse_coords(require("INTERACT_AT")?)?),
        "SEND_CHAT" => Command::SendChat(require("SEND_CHAT")?.to_string()),
        "MONSTER_SELECTED" => {
            let raw = require("MONSTER_SELECTED")?;
            let id = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::BadNumber(raw.to_string()))?;
            Command::MonsterSelected(id)
        }
        "COMBAT_ACTION" => Command::Combat(parse_combat(require("COMBAT_ACTION")?)?),
        "GIVE_XP" => {
            let raw = require("GIVE_XP")?;
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => Command::GiveXp(n),
                _ => return Err(ParseError::BadNumber(raw.to_string())),
            }
        }
        "REQUEST_PLAYERS" => Command::RequestPlayers,
        _ => Command::Unknown(line.to_string()),
    };
    Ok(cmd)
}

fn parse_coords(raw: &str) -> Result<GridPos, ParseError> {
    let bad = || ParseError::BadCoordinates(raw.to_string());
    let (x, y) = raw.split_once(',').ok_or_else(bad)?;
    let x = x.trim().parse::<i32>().map_err(|_| bad())?;
    let y = y.trim().parse::<i32>().map_err(|_| bad())?;
    Ok(GridPos::new(x, y))
}

fn parse_combat(raw: &str) -> Result<CombatAction, ParseError> {
    let (kind, param) = match raw.split_once(':') {
        Some((kind, param)) => (kind, Some(param)),
        None => (raw, None),
    };
    match kind {
        "ATTACK" => Ok(CombatAction::Attack),
        "DEFEND" => Ok(CombatAction::Defend),
        "FLEE" => Ok(CombatAction::Flee),
        "SPELL" => {
            let name = param.ok_or(ParseError::MissingArgument("SPELL"))?;
            Spell::parse(name)
                .map(CombatAction::Spell)
                .ok_or_else(|| ParseError::UnknownSpell(name.to_string()))
        }
        other => Err(ParseError::UnknownCombatAction(other.to_string())),
    }
}
