//! Turn-based combat between a player and one opponent.
//!
//! A player action is resolved completely in one call: the player's move,
//! then (unless the fight ended) the opponent's answer.

use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::content::MonsterTemplate;
use crate::player::{LevelUp, PlayerState, Spell};

/// A monster promoted into a fight. Lives on the player for the fight's duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatOpponent {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub asset: String,
    pub health: i32,
    pub max_health: i32,
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    #[serde(skip)]
    pub xp: u32,
}

impl CombatOpponent {
    pub fn from_template(id: u64, template: &MonsterTemplate) -> Self {
        Self {
            id,
            kind: template.id.clone(),
            asset: template.asset.clone(),
            health: template.health,
            max_health: template.health,
            attack: template.attack,
            defense: template.defense,
            speed: template.speed,
            xp: template.xp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatAction {
    Attack,
    Spell(Spell),
    Defend,
    Flee,
}

/// Actions refused without using up the player's turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("not in combat")]
    NotInCombat,
    #[error("you do not know {0}")]
    SpellNotKnown(&'static str),
    #[error("not enough mana for {spell} (need {needed}, have {have})")]
    InsufficientMana {
        spell: &'static str,
        needed: i32,
        have: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombatOutcome {
    /// The fight goes on; it is the player's turn again.
    Continue,
    Victory {
        monster: String,
        xp: u32,
        level_ups: Vec<LevelUp>,
    },
    /// Player health reached zero. The caller respawns the player.
    Defeat { monster: String },
    Fled { monster: String },
}

/// Health and mana of both sides after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatUpdate {
    pub player_health: i32,
    pub player_max_health: i32,
    pub player_mana: i32,
    pub player_max_mana: i32,
    pub monster_health: i32,
    pub monster_max_health: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatReport {
    pub log: Vec<String>,
    pub update: CombatUpdate,
    pub outcome: CombatOutcome,
}

/// `max(1, round((attack - defense) * U[0.8, 1.2]))`
pub fn attack_damage(attack: i32, defense: i32, rng: &mut impl Rng) -> i32 {
    let roll: f64 = rng.gen_range(0.8..=1.2);
    (((attack - defense) as f64 * roll).round() as i32).max(1)
}

pub fn spell_damage(spell: Spell, player: &PlayerState, rng: &mut impl Rng) -> i32 {
    let (lo, hi) = spell.variance();
    let roll: f64 = rng.gen_range(lo..=hi);
    ((spell.base_damage(&player.stats) * roll).round() as i32).max(1)
}

/// Opponent's hit. Defending doubles the player's defense for that hit.
pub fn monster_damage(attack: i32, defense: i32, defending: bool) -> i32 {
    let defense = if defending { defense * 2 } else { defense };
    (attack - defense).max(1)
}

pub fn flee_chance(player_speed: i32, opponent_speed: i32) -> f64 {
    (0.5 + 0.05 * (player_speed - opponent_speed) as f64).clamp(0.1, 0.9)
}

/// Resolve one player action against the current opponent.
pub fn resolve(
    player: &mut PlayerState,
    action: CombatAction,
    rng: &mut impl Rng,
) -> Result<CombatReport, CombatError> {
    let Some(mut opponent) = player.opponent.take() else {
        return Err(CombatError::NotInCombat);
    };

    // Refusals leave the fight exactly as it was.
    if let CombatAction::Spell(spell) = action {
        let refusal = if !player.spells.contains(&spell) {
            Some(CombatError::SpellNotKnown(spell.name()))
        } else if player.stats.mana < spell.mana_cost() {
            Some(CombatError::InsufficientMana {
                spell: spell.name(),
                needed: spell.mana_cost(),
                have: player.stats.mana,
            })
        } else {
            None
        };
        if let Some(err) = refusal {
            player.opponent = Some(opponent);
            return Err(err);
        }
    }

    let mut log = Vec::new();
    match action {
        CombatAction::Attack => {
            let dmg = attack_damage(player.stats.attack, opponent.defense, rng);
            opponent.health -= dmg;
            log.push(format!("You hit the {} for {} damage", opponent.kind, dmg));
        }
        CombatAction::Spell(spell) => {
            player.stats.mana -= spell.mana_cost();
            let dmg = spell_damage(spell, player, rng);
            opponent.health -= dmg;
            log.push(format!(
                "You cast {} on the {} for {} damage",
                spell.name(),
                opponent.kind,
                dmg
            ));
        }
        CombatAction::Defend => {
            player.defending = true;
            log.push("You raise your guard".to_string());
        }
        CombatAction::Flee => {
            let chance = flee_chance(player.stats.speed, opponent.speed);
            if rng.gen_bool(chance) {
                player.defending = false;
                log.push(format!("You escaped from the {}", opponent.kind));
                let update = snapshot(player, &opponent);
                return Ok(CombatReport {
                    log,
                    update,
                    outcome: CombatOutcome::Fled {
                        monster: opponent.kind,
                    },
                });
            }
            log.push(format!("You failed to escape from the {}", opponent.kind));
        }
    }

    if opponent.health <= 0 {
        opponent.health = 0;
        player.defending = false;
        log.push(format!("The {} is defeated", opponent.kind));
        let update = snapshot(player, &opponent);
        let level_ups = player.grant_xp(opponent.xp);
        return Ok(CombatReport {
            log,
            update,
            outcome: CombatOutcome::Victory {
                monster: opponent.kind,
                xp: opponent.xp,
                level_ups,
            },
        });
    }

    let dmg = monster_damage(opponent.attack, player.stats.defense, player.defending);
    player.defending = false;
    player.stats.health -= dmg;
    log.push(format!("The {} hits you for {} damage", opponent.kind, dmg));

    if player.stats.health <= 0 {
        player.stats.health = 0;
        log.push("You have been defeated".to_string());
        let update = snapshot(player, &opponent);
        return Ok(CombatReport {
            log,
            update,
            outcome: CombatOutcome::Defeat {
                monster: opponent.kind,
            },
        });
    }

    let update = snapshot(player, &opponent);
    player.opponent = Some(opponent);
    Ok(CombatReport {
        log,
        update,
        outcome: CombatOutcome::Continue,
    })
}

fn snapshot(player: &PlayerState, opponent: &CombatOpponent) -> CombatUpdate {
    CombatUpdate {
        player_health: player.stats.health,
        player_max_health: player.stats.max_health,
        player_mana: player.stats.mana,
        player_max_mana: player.stats.max_mana,
        monster_health: opponent.health,
        monster_max_health: opponent.max_health,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use session::{PlayerClass, SessionId};
    use space::GridPos;

    fn template(health: i32, attack: i32, defense: i32, speed: i32) -> MonsterTemplate {
        MonsterTemplate {
            id: "GOBLIN".to_string(),
            asset: "goblin".to_string(),
            health,
            attack,
            defense,
            speed,
            xp: 25,
        }
    }

    fn fighting(class: PlayerClass, opponent: MonsterTemplate) -> PlayerState {
        let mut p = PlayerState::new(SessionId(1), "FOREST", GridPos::new(1, 5));
        p.select_class(class);
        p.opponent = Some(CombatOpponent::from_template(9, &opponent));
        p
    }

    #[test]
    fn damage_is_at_least_one() {
        let mut rng = StdRng::seed_from_u64(3);
        for attack in -5..20 {
            for defense in 0..30 {
                assert!(attack_damage(attack, defense, &mut rng) >= 1);
                assert!(monster_damage(attack, defense, true) >= 1);
                assert!(monster_damage(attack, defense, false) >= 1);
            }
        }
    }

    #[test]
    fn attack_damage_within_variance() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let dmg = attack_damage(20, 0, &mut rng);
            assert!((16..=24).contains(&dmg), "{}", dmg);
        }
    }

    #[test]
    fn flee_chance_is_clamped() {
        assert_eq!(flee_chance(5, 5), 0.5);
        assert!((flee_chance(10, 6) - 0.7).abs() < 1e-9);
        for p in -50..50 {
            for o in -50..50 {
                let c = flee_chance(p, o);
                assert!((0.1..=0.9).contains(&c));
            }
        }
    }

    #[test]
    fn defending_doubles_defense_once() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut p = fighting(PlayerClass::Fighter, template(500, 20, 0, 1));
        let report = resolve(&mut p, CombatAction::Defend, &mut rng).unwrap();
        assert_eq!(report.outcome, CombatOutcome::Continue);
        // 20 - 2 * 8
        assert_eq!(p.stats.health, 120 - 4);
        assert!(!p.defending);

        resolve(&mut p, CombatAction::Attack, &mut rng).unwrap();
        assert_eq!(p.stats.health, 116 - 12);
    }

    #[test]
    fn spell_costs_mana_and_ignores_defense() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut p = fighting(PlayerClass::Wizard, template(500, 1, 1000, 1));
        let report = resolve(&mut p, CombatAction::Spell(Spell::Fireball), &mut rng).unwrap();
        assert_eq!(p.stats.mana, 80);
        // base 6 + 100/8 = 18.5, variance 0.8..1.2
        let dealt = 500 - p.opponent.as_ref().unwrap().health;
        assert!((15..=22).contains(&dealt), "{}", dealt);
        assert_eq!(report.update.player_mana, 80);
    }

    #[test]
    fn insufficient_mana_consumes_no_turn() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut p = fighting(PlayerClass::Wizard, template(500, 30, 0, 1));
        p.stats.mana = 12;
        let err = resolve(&mut p, CombatAction::Spell(Spell::Lightning), &mut rng).unwrap_err();
        assert!(matches!(err, CombatError::InsufficientMana { needed: 15, have: 12, .. }));
        assert_eq!(p.stats.health, 80);
        assert_eq!(p.stats.mana, 12);
        assert!(p.in_combat());
    }

    #[test]
    fn non_wizard_cannot_cast() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut p = fighting(PlayerClass::Rogue, template(500, 30, 0, 1));
        let err = resolve(&mut p, CombatAction::Spell(Spell::Freeze), &mut rng).unwrap_err();
        assert_eq!(err, CombatError::SpellNotKnown("Freeze"));
        assert!(p.in_combat());
    }

    #[test]
    fn victory_grants_xp_without_monster_turn() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = fighting(PlayerClass::Fighter, template(1, 100, 0, 1));
        let report = resolve(&mut p, CombatAction::Attack, &mut rng).unwrap();
        match report.outcome {
            CombatOutcome::Victory { monster, xp, level_ups } => {
                assert_eq!(monster, "GOBLIN");
                assert_eq!(xp, 25);
                assert!(level_ups.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(p.stats.health, 120);
        assert_eq!(p.stats.xp, 25);
        assert!(!p.in_combat());
        assert_eq!(report.update.monster_health, 0);
    }

    #[test]
    fn defeat_clamps_health() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = fighting(PlayerClass::Wizard, template(500, 999, 0, 1));
        let report = resolve(&mut p, CombatAction::Defend, &mut rng).unwrap();
        assert!(matches!(report.outcome, CombatOutcome::Defeat { .. }));
        assert_eq!(p.stats.health, 0);
        assert!(!p.in_combat());
    }

    #[test]
    fn flee_outcomes() {
        let mut fled = 0;
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut p = fighting(PlayerClass::Rogue, template(500, 5, 0, 10));
            let report = resolve(&mut p, CombatAction::Flee, &mut rng).unwrap();
            match report.outcome {
                CombatOutcome::Fled { .. } => {
                    fled += 1;
                    assert!(!p.in_combat());
                    assert_eq!(p.stats.health, 90);
                }
                CombatOutcome::Continue => {
                    assert!(p.in_combat());
                    assert_eq!(p.stats.health, 90 - 1);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(fled > 0 && fled < 50);
    }

    #[test]
    fn not_in_combat() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = PlayerState::new(SessionId(1), "TOWN", GridPos::new(5, 5));
        assert_eq!(
            resolve(&mut p, CombatAction::Attack, &mut rng).unwrap_err(),
            CombatError::NotInCombat
        );
    }

    #[test]
    fn opponent_wire_shape() {
        let o = CombatOpponent::from_template(4, &template(30, 8, 2, 6));
        assert_eq!(
            serde_json::to_string(&o).unwrap(),
            r#"{"id":4,"type":"GOBLIN","asset":"goblin","health":30,"maxHealth":30,"attack":8,"defense":2,"speed":6}"#
        );
    }
}
