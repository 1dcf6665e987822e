pub mod registry;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use registry::{PlayerRegistry, SessionHandle, SessionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one connection.
///
/// `Active` covers both traveling and combat; those are flags on the player
/// rather than separate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    AwaitingName,
    AwaitingClass,
    Active,
    Terminated,
}

/// Character class. `Unselected` until `SELECT_CLASS` succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerClass {
    #[default]
    Unselected,
    Fighter,
    Wizard,
    Rogue,
}

impl PlayerClass {
    /// Parse a selectable class name. `Unselected` is never returned.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "FIGHTER" => Some(Self::Fighter),
            "WIZARD" => Some(Self::Wizard),
            "ROGUE" => Some(Self::Rogue),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unselected => "NONE",
            Self::Fighter => "FIGHTER",
            Self::Wizard => "WIZARD",
            Self::Rogue => "ROGUE",
        }
    }

    pub fn is_selected(self) -> bool {
        self != Self::Unselected
    }
}

impl fmt::Display for PlayerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PlayerClass {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Public projection of a player, kept in the [`PlayerRegistry`].
///
/// Always replaced as a whole record so readers never see a half-updated entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerBroadcastData {
    pub id: SessionId,
    pub name: String,
    pub class: PlayerClass,
    pub area: String,
    pub x: i32,
    pub y: i32,
}

/// Work dispatched onto another session's own task.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A fully rendered outbound frame, shared by every recipient of a fan-out.
    Deliver(Arc<str>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_parse_is_case_sensitive() {
        assert_eq!(PlayerClass::parse("FIGHTER"), Some(PlayerClass::Fighter));
        assert_eq!(PlayerClass::parse("WIZARD"), Some(PlayerClass::Wizard));
        assert_eq!(PlayerClass::parse("ROGUE"), Some(PlayerClass::Rogue));
        assert_eq!(PlayerClass::parse("wizard"), None);
        assert_eq!(PlayerClass::parse("NONE"), None);
        assert_eq!(PlayerClass::parse(""), None);
    }

    #[test]
    fn class_default_is_unselected() {
        assert_eq!(PlayerClass::default(), PlayerClass::Unselected);
        assert!(!PlayerClass::default().is_selected());
        assert!(PlayerClass::Rogue.is_selected());
    }

    #[test]
    fn broadcast_data_field_order() {
        let data = PlayerBroadcastData {
            id: SessionId(7),
            name: "Ayla".to_string(),
            class: PlayerClass::Wizard,
            area: "FOREST".to_string(),
            x: 3,
            y: 4,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"name":"Ayla","class":"WIZARD","area":"FOREST","x":3,"y":4}"#
        );
    }
}
