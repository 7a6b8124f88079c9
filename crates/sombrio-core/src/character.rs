//! Characters, talents and per-player derived stats.
//!
//! Characters are static content loaded from data files. A player's
//! mutable numbers (health, movement, talent levels) live in
//! [`PlayerState`], derived from the character's talent tables.

use crate::game::GameError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Talent id that feeds the maximum health stat.
pub const TALENT_MAX_HEALTH: &str = "max_health";
/// Talent id that feeds the movement budget.
pub const TALENT_MOVEMENT: &str = "movement";
/// Talent id whose base value is added to tracking rolls.
pub const TALENT_TRACKING: &str = "tracking";

/// A talent with one value per level. Level 0 is the starting value;
/// upgrades walk the `levels` table one step at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Talent {
    pub id: String,
    pub levels: Vec<i32>,
    /// Rounds a card requiring this talent takes to mount, for players who
    /// have trained the talent past level 0. Absent means the built-in
    /// default for this talent id applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounting_rounds: Option<u32>,
}

impl Talent {
    /// Value at the given level, clamped to the last defined level.
    pub fn value_at(&self, level: usize) -> i32 {
        if self.levels.is_empty() {
            return 0;
        }
        let index = level.min(self.levels.len() - 1);
        self.levels[index]
    }

    /// Highest level this talent can be trained to.
    pub fn max_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }
}

/// Whether an ability triggers on use or is always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbilityKind {
    Active,
    Passive,
}

/// A character ability. Effects are resolved by the presentation layer;
/// the engine only carries the identity and kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ability {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AbilityKind,
}

/// A playable character: identity, talent tables and abilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub talents: Vec<Talent>,
    #[serde(default)]
    pub abilities: Vec<Ability>,
    /// Base render color, packed 0xRRGGBB.
    #[serde(default)]
    pub color: u32,
}

impl Character {
    pub fn talent(&self, talent_id: &str) -> Option<&Talent> {
        self.talents.iter().find(|t| t.id == talent_id)
    }

    /// Talent value at a level, 0 for talents the character does not have.
    pub fn talent_value(&self, talent_id: &str, level: usize) -> i32 {
        self.talent(talent_id).map_or(0, |t| t.value_at(level))
    }

    /// Flat bonus added to this character's tracking rolls.
    pub fn tracking_bonus(&self) -> i32 {
        self.talent_value(TALENT_TRACKING, 0)
    }
}

/// The full set of playable characters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    characters: Vec<Character>,
}

impl Roster {
    pub fn new(characters: Vec<Character>) -> Self {
        Self { characters }
    }

    pub fn by_id(&self, character_id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == character_id)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter()
    }
}

/// A player's mutable stats, derived from their character's talents.
///
/// `max_health` and `movement` are caches of the corresponding talent
/// values at the player's current levels; they are recomputed whenever the
/// backing talent is upgraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub talent_levels: HashMap<String, usize>,
    pub current_health: i32,
    pub max_health: i32,
    pub movement: i32,
    #[serde(default)]
    pub effects: Vec<String>,
}

impl PlayerState {
    /// Starting state for a character: every talent at level 0, health full.
    pub fn new(character: &Character) -> Self {
        let talent_levels = character
            .talents
            .iter()
            .map(|t| (t.id.clone(), 0))
            .collect();
        let max_health = character.talent_value(TALENT_MAX_HEALTH, 0);
        Self {
            talent_levels,
            current_health: max_health,
            max_health,
            movement: character.talent_value(TALENT_MOVEMENT, 0),
            effects: Vec::new(),
        }
    }

    /// Current level of a talent, 0 if never trained.
    pub fn level_of(&self, talent_id: &str) -> usize {
        self.talent_levels.get(talent_id).copied().unwrap_or(0)
    }

    /// Whether the talent has been trained past its starting level.
    pub fn has_trained(&self, talent_id: &str) -> bool {
        self.level_of(talent_id) > 0
    }

    /// Raise a talent one level and refresh the derived stats.
    ///
    /// A max health upgrade grants the health difference immediately; other
    /// stat talents only change their cached value.
    pub fn upgrade_talent(
        &mut self,
        character: &Character,
        talent_id: &str,
    ) -> Result<usize, GameError> {
        let talent = character
            .talent(talent_id)
            .ok_or(GameError::UnknownTalent)?;
        let current = self.level_of(talent_id);
        if current >= talent.max_level() {
            return Err(GameError::TalentAtMax);
        }

        let new_level = current + 1;
        self.talent_levels.insert(talent_id.to_string(), new_level);

        if talent_id == TALENT_MAX_HEALTH {
            let new_max = talent.value_at(new_level);
            let gained = new_max - self.max_health;
            self.max_health = new_max;
            self.current_health = (self.current_health + gained).clamp(0, new_max);
        } else if talent_id == TALENT_MOVEMENT {
            self.movement = talent.value_at(new_level);
        }

        Ok(new_level)
    }

    /// Apply a health delta, clamped to `0..=max_health`. Returns the new
    /// current health.
    pub fn modify_health(&mut self, delta: i32) -> i32 {
        self.current_health = (self.current_health + delta).clamp(0, self.max_health);
        self.current_health
    }

    pub fn is_alive(&self) -> bool {
        self.current_health > 0
    }
}
