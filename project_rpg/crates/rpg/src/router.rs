use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use session::{PlayerClass, SessionId, SessionState};
use space::{find_path, GridPos};

use crate::combat::{self, CombatAction, CombatOpponent, CombatOutcome};
use crate::content::{AreaDef, InteractAction, TOWN};
use crate::monster::populate;
use crate::parser::{parse_command, Command};
use crate::player::{PlayerState, StatKind, UpgradeRefusal, NAME_LEN};
use crate::services::GameServices;
use crate::wire::{
    InteractableView, LevelUpView, NpcView, PlayerView, ServerMessage, StatsView, VictoryView,
};

pub const CHAT_LEN: std::ops::RangeInclusive<usize> = 1..=100;

const NOT_READY: &str = "character not complete";
const IN_COMBAT: &str = "cannot do that while in combat";

/// Command router and state machine for one connection.
///
/// Owns the player's state outright. Every mutation goes through
/// [`GameSession::handle_line`] or the movement tick, both called from the
/// session's own task.
pub struct GameSession {
    pub(crate) player: PlayerState,
    pub(crate) services: GameServices,
    pub(crate) rng: StdRng,
    pub(crate) steps: u64,
    greeted: bool,
    terminated: bool,
}

impl GameSession {
    pub fn new(id: SessionId, services: GameServices) -> Self {
        Self::with_rng(id, services, StdRng::from_entropy())
    }

    /// Deterministic variant for tests and replays.
    pub fn with_rng(id: SessionId, services: GameServices, rng: StdRng) -> Self {
        let town = services.content.town();
        let player = PlayerState::new(id, &town.name, town.spawn);
        Self {
            player,
            services,
            rng,
            steps: 0,
            greeted: false,
            terminated: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.player.id
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn state(&self) -> SessionState {
        if self.terminated {
            SessionState::Terminated
        } else if !self.greeted {
            SessionState::Handshaking
        } else {
            self.player.phase()
        }
    }

    /// First frames sent once the connection is up. Ends the handshake.
    pub fn welcome(&mut self) -> Vec<ServerMessage> {
        self.greeted = true;
        vec![ServerMessage::Prompt("Enter your name".to_string())]
    }

    pub fn handle_line(&mut self, line: &str) -> Vec<ServerMessage> {
        // Any inbound line means the transport is up.
        self.greeted = true;
        match parse_command(line) {
            Ok(cmd) => self.dispatch(cmd),
            Err(e) => {
                tracing::debug!(session_id = ?self.id(), %e, "rejected command");
                vec![ServerMessage::error(e)]
            }
        }
    }

    /// Drop this player from presence. Safe to call more than once.
    pub fn terminate(&mut self) {
        self.services.players.remove(self.id());
        self.terminated = true;
    }

    pub(crate) fn dispatch(&mut self, cmd: Command) -> Vec<ServerMessage> {
        match cmd {
            Command::SetName(name) => self.set_name(name),
            Command::SelectClass(class) => self.select_class(class),
            Command::UpgradeStat(stat) => self.upgrade_stat(stat),
            Command::GoTo(area) => self.go_to(&area),
            Command::MoveTo(target) => self.move_to(target),
            Command::InteractAt(target) => self.interact_at(target),
            Command::SendChat(text) => self.send_chat(text),
            Command::MonsterSelected(id) => self.monster_selected(id),
            Command::Combat(action) => self.combat(action),
            Command::GiveXp(amount) => self.give_xp(amount),
            Command::RequestPlayers => self.request_players(),
            Command::Unknown(line) => vec![ServerMessage::Echo(line)],
        }
    }

    /// Replace this player's presence record, once it has a name.
    pub(crate) fn sync_presence(&self) {
        if self.player.name.is_some() && !self.terminated {
            self.services.players.upsert(self.player.broadcast_data());
        }
    }

    fn ready_for_action(&self) -> Result<(), Vec<ServerMessage>> {
        if !self.player.is_initialized() {
            return Err(reject(NOT_READY));
        }
        if self.player.in_combat() {
            return Err(reject(IN_COMBAT));
        }
        Ok(())
    }

    fn stats(&self) -> ServerMessage {
        ServerMessage::Stats(StatsView::from(&self.player))
    }

    fn set_name(&mut self, name: String) -> Vec<ServerMessage> {
        if self.player.name.is_some() {
            return reject("name already set");
        }
        if !NAME_LEN.contains(&name.chars().count()) {
            return reject("name must be 2-20 characters");
        }
        self.player.name = Some(name.clone());
        self.sync_presence();
        tracing::info!(session_id = ?self.id(), %name, "name set");
        vec![
            ServerMessage::NameSet(name),
            ServerMessage::Prompt("Choose your class: FIGHTER, WIZARD, ROGUE".to_string()),
        ]
    }

    fn select_class(&mut self, class: PlayerClass) -> Vec<ServerMessage> {
        if self.player.class.is_selected() {
            return reject("class already selected");
        }
        self.player.select_class(class);
        self.sync_presence();
        tracing::info!(session_id = ?self.id(), %class, "class selected");
        vec![
            ServerMessage::ClassSet(class),
            self.stats(),
            ServerMessage::Prompt(format!(
                "You have {} skill points. Upgrade: health, mana, attack, defense, speed",
                self.player.skill_points
            )),
        ]
    }

    fn upgrade_stat(&mut self, stat: StatKind) -> Vec<ServerMessage> {
        let completed = match self.player.upgrade(stat) {
            Ok(completed) => completed,
            Err(UpgradeRefusal::NoClass) => return reject("select a class first"),
            Err(UpgradeRefusal::NoPoints) => return reject("no skill points available"),
        };
        let mut out = vec![ServerMessage::StatUpgraded(stat.as_str()), self.stats()];
        if completed {
            out.push(ServerMessage::CharacterComplete(format!(
                "{} is ready for adventure",
                self.player.display_name()
            )));
            out.push(ServerMessage::Areas(self.area_list()));
        }
        out
    }

    fn area_list(&self) -> String {
        self.services
            .content
            .area_names()
            .collect::<Vec<_>>()
            .join(",")
    }

    pub(crate) fn go_to(&mut self, name: &str) -> Vec<ServerMessage> {
        if let Err(out) = self.ready_for_action() {
            return out;
        }
        let content = Arc::clone(&self.services.content);
        let Some(area) = content.area(name) else {
            return reject(format!("unknown area: {}", name));
        };

        self.player.enter_area(&area.name, area.spawn);
        if area.name == TOWN {
            self.player.stats.restore();
        } else {
            self.player.monsters = populate(area, &content, &self.services.monster_ids, &mut self.rng);
        }
        self.sync_presence();
        tracing::debug!(
            session_id = ?self.id(),
            area = %area.name,
            monsters = self.player.monsters.len(),
            "area changed"
        );
        self.area_frames(area)
    }

    fn area_frames(&self, area: &AreaDef) -> Vec<ServerMessage> {
        vec![
            ServerMessage::AreaChanged(area.name.clone()),
            ServerMessage::MapData(area.map_data()),
            ServerMessage::Monsters(self.player.monsters.clone()),
            ServerMessage::Interactables(area.interactables.iter().map(InteractableView::from).collect()),
            self.stats(),
        ]
    }

    fn move_to(&mut self, target: GridPos) -> Vec<ServerMessage> {
        if let Err(out) = self.ready_for_action() {
            return out;
        }
        let content = Arc::clone(&self.services.content);
        let Some(grid) = content.area(&self.player.area).and_then(|a| a.grid.as_ref()) else {
            return reject("this area has no map");
        };
        match grid.check(target) {
            Err(_) => return reject("target out of bounds"),
            Ok(false) => return reject("target is not walkable"),
            Ok(true) => {}
        }
        if target == self.player.pos {
            return Vec::new();
        }
        let path = find_path(grid, self.player.pos, target);
        if path.is_empty() {
            return reject("no path to target");
        }
        self.player.path = path.into();
        // No previous step: the next tick moves right away.
        self.player.last_move = None;
        Vec::new()
    }

    fn interact_at(&mut self, target: GridPos) -> Vec<ServerMessage> {
        if let Err(out) = self.ready_for_action() {
            return out;
        }
        let content = Arc::clone(&self.services.content);
        let Some(item) = content
            .area(&self.player.area)
            .and_then(|a| a.interactable_at(target))
        else {
            return reject("nothing to interact with there");
        };
        if item.pos().manhattan(self.player.pos) > 1 {
            return reject("too far away");
        }
        self.player.path.clear();
        match &item.action {
            InteractAction::Npc { dialogue } => vec![ServerMessage::NpcInteract(NpcView {
                id: item.id.clone(),
                name: item.name.clone(),
                dialogue: dialogue.clone(),
            })],
            InteractAction::ZoneTransition { target } => self.go_to(target),
        }
    }

    fn send_chat(&mut self, text: String) -> Vec<ServerMessage> {
        if !self.player.is_initialized() {
            return reject(NOT_READY);
        }
        if !CHAT_LEN.contains(&text.chars().count()) {
            return reject("chat message must be 1-100 characters");
        }
        let frame = ServerMessage::Chat {
            sender: self.player.display_name(),
            text,
        };
        let frame: Arc<str> = Arc::from(frame.to_string());
        let delivered = self.services.sessions.broadcast(self.id(), frame);
        tracing::debug!(session_id = ?self.id(), delivered, "chat");
        Vec::new()
    }

    fn monster_selected(&mut self, id: u64) -> Vec<ServerMessage> {
        if let Err(out) = self.ready_for_action() {
            return out;
        }
        if self.player.area == TOWN {
            return reject("there are no monsters in town");
        }
        let Some(idx) = self.player.monsters.iter().position(|m| m.id == id) else {
            return reject(format!("monster {} not found", id));
        };
        let content = Arc::clone(&self.services.content);
        let Some(template) = content.monster(&self.player.monsters[idx].kind) else {
            return reject("unknown monster");
        };
        let monster = self.player.monsters.remove(idx);
        let opponent = CombatOpponent::from_template(monster.id, template);

        self.player.path.clear();
        self.player.defending = false;
        self.player.opponent = Some(opponent.clone());
        tracing::debug!(session_id = ?self.id(), monster = %opponent.kind, id, "combat started");

        let log = format!("A {} attacks!", opponent.kind);
        vec![
            ServerMessage::CombatStart(opponent),
            ServerMessage::CombatLog(log),
            ServerMessage::CombatTurn("PLAYER"),
        ]
    }

    fn combat(&mut self, action: CombatAction) -> Vec<ServerMessage> {
        let report = match combat::resolve(&mut self.player, action, &mut self.rng) {
            Ok(report) => report,
            Err(e) => return vec![ServerMessage::error(e)],
        };

        let mut out: Vec<ServerMessage> =
            report.log.into_iter().map(ServerMessage::CombatLog).collect();
        out.push(ServerMessage::CombatUpdate(report.update));

        match report.outcome {
            CombatOutcome::Continue => out.push(ServerMessage::CombatTurn("PLAYER")),
            CombatOutcome::Victory {
                monster,
                xp,
                level_ups,
            } => {
                out.push(ServerMessage::CombatVictory(VictoryView { monster, xp }));
                out.extend(level_ups.into_iter().map(|l| ServerMessage::LevelUp(LevelUpView::from(l))));
                if self.player.monsters.is_empty() {
                    self.repopulate();
                }
                out.push(ServerMessage::Monsters(self.player.monsters.clone()));
                out.push(self.stats());
            }
            CombatOutcome::Defeat { monster } => {
                let content = Arc::clone(&self.services.content);
                let town = content.town();
                self.player.respawn(&town.name, town.spawn);
                self.sync_presence();
                tracing::info!(session_id = ?self.id(), %monster, "player defeated");
                out.push(ServerMessage::CombatDefeat(format!(
                    "You were defeated by the {}",
                    monster
                )));
                out.extend(self.area_frames(town));
            }
            CombatOutcome::Fled { monster } => {
                out.push(ServerMessage::CombatFled(format!("You fled from the {}", monster)));
                out.push(ServerMessage::Monsters(self.player.monsters.clone()));
                out.push(self.stats());
            }
        }
        out
    }

    fn repopulate(&mut self) {
        let content = Arc::clone(&self.services.content);
        if let Some(area) = content.area(&self.player.area) {
            self.player.monsters = populate(area, &content, &self.services.monster_ids, &mut self.rng);
        }
    }

    fn give_xp(&mut self, amount: u32) -> Vec<ServerMessage> {
        if let Err(out) = self.ready_for_action() {
            return out;
        }
        let level_ups = self.player.grant_xp(amount);
        let mut out = vec![ServerMessage::Status(format!("Gained {} xp", amount))];
        out.extend(level_ups.into_iter().map(|l| ServerMessage::LevelUp(LevelUpView::from(l))));
        out.push(self.stats());
        out
    }

    fn request_players(&self) -> Vec<ServerMessage> {
        let has_grid = self
            .services
            .content
            .area(&self.player.area)
            .is_some_and(|a| a.grid.is_some());
        if !has_grid {
            return reject("this area has no map");
        }
        let others = self
            .services
            .players
            .in_area(&self.player.area, self.id())
            .into_iter()
            .map(PlayerView::from)
            .collect();
        vec![ServerMessage::PlayersInArea(others)]
    }
}

fn reject(msg: impl std::fmt::Display) -> Vec<ServerMessage> {
    vec![ServerMessage::error(msg)]
}
