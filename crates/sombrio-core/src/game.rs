//! Core session state machine.
//!
//! This module contains the main `GameSession` struct and all turn logic:
//! the lobby, the once-per-turn movement and main action flags, tracking
//! rolls, card draws and the multi-round mounting flow.

use crate::actions::{GameAction, GameEvent};
use crate::cards::{CardStatus, DeckDefinition, DeckSet};
use crate::character::{PlayerState, Roster};
use crate::map::{is_location, MapGraph};
use crate::player::{Player, PlayerRegistry};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors that can occur when applying actions
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Already used this turn")]
    AlreadyUsed,

    #[error("No movement in progress")]
    NotMoving,

    #[error("Destination is not reachable")]
    Unreachable,

    #[error("Deck is empty")]
    DeckEmpty,

    #[error("Card is already mounted")]
    AlreadyMounted,

    #[error("Mounting is already in progress")]
    AlreadyInProgress,

    #[error("Mounting has not been started")]
    MountingNotStarted,

    #[error("Only possible at a location")]
    NotInLocation,

    #[error("Main action already used this turn")]
    MainActionUsed,

    #[error("The game has not started")]
    GameNotStarted,

    #[error("No players in the game")]
    NoPlayers,

    #[error("Maximum number of players reached")]
    MaxPlayersReached,

    #[error("Character is already in use")]
    CharacterInUse,

    #[error("No character selected")]
    NoCharacterSelected,

    #[error("No name provided")]
    NoNameProvided,

    #[error("Character not found")]
    UnknownCharacter,

    #[error("Deck not found")]
    UnknownDeck,

    #[error("Player not found")]
    UnknownPlayer,

    #[error("Talent not found")]
    UnknownTalent,

    #[error("Card not found")]
    CardNotFound,

    #[error("Talent is already at maximum level")]
    TalentAtMax,
}

/// Per-turn flags, reset whenever the turn passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnActions {
    pub movement_used: bool,
    pub main_action_used: bool,
    /// Bonus action ids used this turn; each may appear once.
    #[serde(default)]
    pub bonus_actions: Vec<String>,
}

impl TurnActions {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn bonus_used(&self, action_id: &str) -> bool {
        self.bonus_actions.iter().any(|a| a == action_id)
    }
}

/// An open movement phase: who is moving and where they may go.
/// Ephemeral; never persisted or broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementPlan {
    pub player_id: String,
    pub reachable: HashMap<String, u32>,
}

/// The complete session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    /// The tile graph
    pub map: MapGraph,
    /// All playable characters
    pub roster: Roster,
    /// Decks and their live quantities
    pub decks: DeckSet,
    /// Players in turn order plus the turn cursor
    pub registry: PlayerRegistry,
    /// Flags for the turn in progress
    pub turn_actions: TurnActions,
    /// Whether the game has left the lobby
    pub started: bool,
    /// Movement phase in progress, if any
    pub(crate) movement_plan: Option<MovementPlan>,
}

impl GameSession {
    /// Create a session from loaded content, in the lobby with no players.
    pub fn new(map: MapGraph, roster: Roster, decks: BTreeMap<String, DeckDefinition>) -> Self {
        Self {
            map,
            roster,
            decks: DeckSet::new(decks),
            registry: PlayerRegistry::new(),
            turn_actions: TurnActions::default(),
            started: false,
            movement_plan: None,
        }
    }

    pub fn movement_plan(&self) -> Option<&MovementPlan> {
        self.movement_plan.as_ref()
    }

    /// Tiles the open movement phase allows, if one is open.
    pub fn reachable_tiles(&self) -> Option<&HashMap<String, u32>> {
        self.movement_plan.as_ref().map(|p| &p.reachable)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.registry.current_player()
    }

    pub fn find_player(&self, player_id: &str) -> Option<&Player> {
        self.registry.find(player_id)
    }

    // ==================== Lobby ====================

    /// Add a player with a chosen name and character. New players start on
    /// the map's start tile with their character's base stats.
    pub fn add_player(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        character_id: impl Into<String>,
    ) -> Result<Vec<GameEvent>, GameError> {
        let id = id.into();
        let name = name.into();
        let character_id = character_id.into();

        self.registry.validate_addition(&name, &character_id)?;
        let character = self
            .roster
            .by_id(&character_id)
            .ok_or(GameError::UnknownCharacter)?;

        let player = Player {
            id: id.clone(),
            name: name.clone(),
            character_id,
            color: character.color,
            position: self.map.start_tile().to_string(),
            state: PlayerState::new(character),
            cards: Vec::new(),
            has_moved: false,
        };
        self.registry.add(player)?;

        Ok(vec![GameEvent::PlayerAdded {
            player_id: id,
            name,
        }])
    }

    /// Remove a player. Unknown ids are a quiet no-op so departure
    /// notifications can race each other safely.
    pub fn remove_player(&mut self, player_id: &str) -> Result<Vec<GameEvent>, GameError> {
        match self.registry.remove(player_id) {
            Some(removed) => Ok(vec![GameEvent::PlayerRemoved {
                player_id: removed.id,
            }]),
            None => Ok(Vec::new()),
        }
    }

    /// Leave the lobby. Starting an already started game is a no-op.
    pub fn start_game(&mut self) -> Result<Vec<GameEvent>, GameError> {
        if self.started {
            return Ok(Vec::new());
        }
        if self.registry.is_empty() {
            return Err(GameError::NoPlayers);
        }
        self.started = true;
        Ok(vec![GameEvent::GameStarted])
    }

    /// Return to the lobby: players dropped, flags cleared, decks restored.
    pub fn reset_game(&mut self) -> Result<Vec<GameEvent>, GameError> {
        self.registry.clear();
        self.turn_actions.reset();
        self.movement_plan = None;
        self.started = false;
        self.decks.reset();
        Ok(vec![GameEvent::GameReset])
    }

    // ==================== Movement ====================

    /// Open the movement phase for the current player and compute the
    /// tiles their budget reaches.
    pub fn start_movement(&mut self) -> Result<Vec<GameEvent>, GameError> {
        let player = self.registry.current_player().ok_or(GameError::NoPlayers)?;
        if self.turn_actions.movement_used {
            return Err(GameError::AlreadyUsed);
        }
        if !self.started {
            return Err(GameError::GameNotStarted);
        }

        let budget = player.state.movement.max(0) as u32;
        let reachable = self.map.reachable_tiles(&player.position, budget);
        let player_id = player.id.clone();
        self.movement_plan = Some(MovementPlan {
            player_id: player_id.clone(),
            reachable,
        });

        Ok(vec![GameEvent::MovementStarted { player_id }])
    }

    /// Move to a reachable tile and close the movement phase. This spends
    /// the turn's movement.
    pub fn confirm_movement(&mut self, destination: &str) -> Result<Vec<GameEvent>, GameError> {
        let plan = self.movement_plan.as_ref().ok_or(GameError::NotMoving)?;
        if !plan.reachable.contains_key(destination) {
            return Err(GameError::Unreachable);
        }

        let player_id = plan.player_id.clone();
        let player = self
            .registry
            .find_mut(&player_id)
            .ok_or(GameError::UnknownPlayer)?;
        let from = std::mem::replace(&mut player.position, destination.to_string());
        player.has_moved = true;
        self.turn_actions.movement_used = true;
        self.movement_plan = None;

        Ok(vec![GameEvent::MovementConfirmed {
            player_id,
            from,
            to: destination.to_string(),
        }])
    }

    /// Close the movement phase without moving. The movement stays
    /// available this turn.
    pub fn cancel_movement(&mut self) -> Result<Vec<GameEvent>, GameError> {
        match self.movement_plan.take() {
            Some(plan) => Ok(vec![GameEvent::MovementCancelled {
                player_id: plan.player_id,
            }]),
            None => Ok(Vec::new()),
        }
    }

    // ==================== Tracking & Cards ====================

    /// Roll for tracking at the current location.
    pub fn execute_tracking(&mut self) -> Result<Vec<GameEvent>, GameError> {
        self.execute_tracking_with_rng(&mut rand::thread_rng())
    }

    /// Roll a d20 plus the character's tracking bonus and offer the decks
    /// whose range contains the total.
    ///
    /// When nothing is drawable (no deck in range, or every deck in range
    /// is spent) the roll itself consumes the main action. Otherwise the
    /// main action stays free until [`select_deck`](Self::select_deck)
    /// finishes the flow.
    pub fn execute_tracking_with_rng<R: Rng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<GameEvent>, GameError> {
        if !self.started {
            return Err(GameError::GameNotStarted);
        }
        if self.turn_actions.main_action_used {
            return Err(GameError::MainActionUsed);
        }
        let player = self.registry.current_player().ok_or(GameError::NoPlayers)?;
        if !is_location(&player.position) {
            return Err(GameError::NotInLocation);
        }

        let roll = rng.gen_range(1..=20);
        let bonus = self
            .roster
            .by_id(&player.character_id)
            .map_or(0, |c| c.tracking_bonus());
        let total = roll + bonus;
        let player_id = player.id.clone();
        let decks = self.decks.available_decks(total);
        let nothing_to_draw = decks.iter().all(|d| d.is_empty);

        let mut events = vec![GameEvent::TrackingRolled {
            player_id: player_id.clone(),
            roll,
            bonus,
            total,
            decks,
        }];
        if nothing_to_draw {
            self.turn_actions.main_action_used = true;
            events.push(GameEvent::MainActionUsed {
                player_id,
                action: "tracking".to_string(),
            });
        }
        Ok(events)
    }

    /// Draw from one of the offered decks.
    pub fn select_deck(&mut self, deck_id: &str) -> Result<Vec<GameEvent>, GameError> {
        self.select_deck_with_rng(deck_id, &mut rand::thread_rng())
    }

    /// Draw a card weighted by the remaining copies and hand it to the
    /// current player. The draw finishes the tracking flow, so this is
    /// where the main action is consumed.
    pub fn select_deck_with_rng<R: Rng>(
        &mut self,
        deck_id: &str,
        rng: &mut R,
    ) -> Result<Vec<GameEvent>, GameError> {
        let player_id = self
            .registry
            .current_player()
            .ok_or(GameError::NoPlayers)?
            .id
            .clone();
        let card = self.decks.draw(deck_id, rng)?;

        if let Some(player) = self.registry.current_player_mut() {
            player.cards.push(card.clone());
        }
        self.turn_actions.main_action_used = true;

        Ok(vec![
            GameEvent::CardDrawn {
                player_id: player_id.clone(),
                deck_id: deck_id.to_string(),
                card,
            },
            GameEvent::MainActionUsed {
                player_id,
                action: "draw".to_string(),
            },
        ])
    }

    // ==================== Mounting ====================

    /// Begin mounting a card at a location.
    ///
    /// Cards whose computed rounds are zero mount immediately and do not
    /// consume the main action; everything else records one round of
    /// progress and does.
    pub fn start_mounting(&mut self, card_id: &str) -> Result<Vec<GameEvent>, GameError> {
        let player = self.registry.current_player().ok_or(GameError::NoPlayers)?;
        let index = player
            .cards
            .iter()
            .position(|c| c.id == card_id)
            .ok_or(GameError::CardNotFound)?;
        if !is_location(&player.position) {
            return Err(GameError::NotInLocation);
        }

        let card = &player.cards[index];
        if card.mounted || card.mounting.is_none() {
            return Err(GameError::AlreadyMounted);
        }
        if card.mounting_progress > 0 {
            return Err(GameError::AlreadyInProgress);
        }

        let character = self
            .roster
            .by_id(&player.character_id)
            .ok_or(GameError::UnknownCharacter)?;
        let rounds = card.rounds_required(character, &player.state);
        let player_id = player.id.clone();

        if rounds == 0 {
            if let Some(player) = self.registry.current_player_mut() {
                let card = &mut player.cards[index];
                card.mounted = true;
                card.mounting_progress = 0;
            }
            return Ok(vec![GameEvent::MountingCompleted {
                player_id,
                card_id: card_id.to_string(),
            }]);
        }

        if self.turn_actions.main_action_used {
            return Err(GameError::MainActionUsed);
        }

        let mut completed = false;
        if let Some(player) = self.registry.current_player_mut() {
            let card = &mut player.cards[index];
            card.mounting_progress = 1;
            if card.mounting_progress >= rounds {
                card.mounted = true;
                card.mounting_progress = 0;
                completed = true;
            }
        }
        self.turn_actions.main_action_used = true;

        let mut events = vec![GameEvent::MountingStarted {
            player_id: player_id.clone(),
            card_id: card_id.to_string(),
            progress: 1,
            rounds,
        }];
        if completed {
            events.push(GameEvent::MountingCompleted {
                player_id: player_id.clone(),
                card_id: card_id.to_string(),
            });
        }
        events.push(GameEvent::MainActionUsed {
            player_id,
            action: "mounting".to_string(),
        });
        Ok(events)
    }

    /// Spend this turn's main action advancing a mount one round.
    pub fn advance_mounting(&mut self, card_id: &str) -> Result<Vec<GameEvent>, GameError> {
        let player = self.registry.current_player().ok_or(GameError::NoPlayers)?;
        let index = player
            .cards
            .iter()
            .position(|c| c.id == card_id)
            .ok_or(GameError::CardNotFound)?;
        if !is_location(&player.position) {
            return Err(GameError::NotInLocation);
        }
        if self.turn_actions.main_action_used {
            return Err(GameError::MainActionUsed);
        }

        let card = &player.cards[index];
        if card.mounted || card.mounting.is_none() {
            return Err(GameError::AlreadyMounted);
        }
        if card.mounting_progress == 0 {
            return Err(GameError::MountingNotStarted);
        }

        let character = self
            .roster
            .by_id(&player.character_id)
            .ok_or(GameError::UnknownCharacter)?;
        // Rounds reflect the talents as trained now, so later upgrades can
        // shorten a mount already underway.
        let rounds = card.rounds_required(character, &player.state);
        let player_id = player.id.clone();

        let mut progress = 0;
        let mut completed = false;
        if let Some(player) = self.registry.current_player_mut() {
            let card = &mut player.cards[index];
            card.mounting_progress += 1;
            progress = card.mounting_progress;
            if card.mounting_progress >= rounds {
                card.mounted = true;
                card.mounting_progress = 0;
                completed = true;
            }
        }
        self.turn_actions.main_action_used = true;

        let mut events = vec![GameEvent::MountingAdvanced {
            player_id: player_id.clone(),
            card_id: card_id.to_string(),
            progress,
            rounds,
        }];
        if completed {
            events.push(GameEvent::MountingCompleted {
                player_id: player_id.clone(),
                card_id: card_id.to_string(),
            });
        }
        events.push(GameEvent::MainActionUsed {
            player_id,
            action: "mounting".to_string(),
        });
        Ok(events)
    }

    // ==================== Player Development ====================

    /// Use a bonus action. Each id may be used once per turn.
    pub fn use_bonus_action(&mut self, action_id: &str) -> Result<Vec<GameEvent>, GameError> {
        let player = self.registry.current_player().ok_or(GameError::NoPlayers)?;
        if self.turn_actions.bonus_used(action_id) {
            return Err(GameError::AlreadyUsed);
        }
        let player_id = player.id.clone();
        self.turn_actions.bonus_actions.push(action_id.to_string());

        Ok(vec![GameEvent::BonusActionUsed {
            player_id,
            action_id: action_id.to_string(),
        }])
    }

    /// Raise one of a player's talents a level and refresh derived stats.
    pub fn upgrade_talent(
        &mut self,
        player_id: &str,
        talent_id: &str,
    ) -> Result<Vec<GameEvent>, GameError> {
        let player = self
            .registry
            .find_mut(player_id)
            .ok_or(GameError::UnknownPlayer)?;
        let character = self
            .roster
            .by_id(&player.character_id)
            .ok_or(GameError::UnknownCharacter)?;
        let new_level = player.state.upgrade_talent(character, talent_id)?;

        Ok(vec![GameEvent::TalentUpgraded {
            player_id: player.id.clone(),
            talent_id: talent_id.to_string(),
            new_level,
        }])
    }

    /// Apply damage or healing, clamped to the player's health range.
    pub fn modify_health(
        &mut self,
        player_id: &str,
        delta: i32,
    ) -> Result<Vec<GameEvent>, GameError> {
        let player = self
            .registry
            .find_mut(player_id)
            .ok_or(GameError::UnknownPlayer)?;
        let current_health = player.state.modify_health(delta);

        Ok(vec![GameEvent::HealthChanged {
            player_id: player.id.clone(),
            current_health,
            max_health: player.state.max_health,
        }])
    }

    // ==================== Turn Management ====================

    /// Pass the turn: reset the flags, advance the cursor and open the
    /// next player's turn, reporting their mounts still underway.
    pub fn end_turn(&mut self) -> Result<Vec<GameEvent>, GameError> {
        if !self.started {
            return Err(GameError::GameNotStarted);
        }
        if self.registry.is_empty() {
            return Err(GameError::NoPlayers);
        }

        let ending_id = self
            .registry
            .current_player()
            .map(|p| p.id.clone())
            .unwrap_or_default();
        self.turn_actions.reset();
        self.movement_plan = None;
        let current_player_index = self.registry.advance_turn();

        let mut events = vec![GameEvent::TurnEnded {
            player_id: ending_id,
            current_player_index,
        }];
        if let Some(event) = self.open_next_turn() {
            events.push(event);
        }
        Ok(events)
    }

    /// Open the current player's turn: clear their movement marker and
    /// report the mounts they still have underway.
    pub(crate) fn open_next_turn(&mut self) -> Option<GameEvent> {
        let player = self.registry.current_player_mut()?;
        player.has_moved = false;
        let mounting_in_progress: Vec<String> = player
            .cards
            .iter()
            .filter(|c| c.status() == CardStatus::Mounting)
            .map(|c| c.id.clone())
            .collect();
        Some(GameEvent::TurnStarted {
            player_id: player.id.clone(),
            mounting_in_progress,
        })
    }

    // ==================== Dispatch ====================

    /// Apply an action to the session
    pub fn apply_action(&mut self, action: GameAction) -> Result<Vec<GameEvent>, GameError> {
        self.apply_action_with_rng(action, &mut rand::thread_rng())
    }

    /// Apply an action with a caller-supplied RNG, for deterministic play.
    pub fn apply_action_with_rng<R: Rng>(
        &mut self,
        action: GameAction,
        rng: &mut R,
    ) -> Result<Vec<GameEvent>, GameError> {
        match action {
            // ==================== Lobby ====================
            GameAction::AddPlayer {
                id,
                name,
                character_id,
            } => self.add_player(id, name, character_id),
            GameAction::RemovePlayer { player_id } => self.remove_player(&player_id),
            GameAction::StartGame => self.start_game(),
            GameAction::ResetGame => self.reset_game(),

            // ==================== Movement ====================
            GameAction::StartMovement => self.start_movement(),
            GameAction::ConfirmMovement { destination } => self.confirm_movement(&destination),
            GameAction::CancelMovement => self.cancel_movement(),

            // ==================== Tracking & Cards ====================
            GameAction::ExecuteTracking => self.execute_tracking_with_rng(rng),
            GameAction::SelectDeck { deck_id } => self.select_deck_with_rng(&deck_id, rng),

            // ==================== Mounting ====================
            GameAction::StartMounting { card_id } => self.start_mounting(&card_id),
            GameAction::AdvanceMounting { card_id } => self.advance_mounting(&card_id),

            // ==================== Player Development ====================
            GameAction::UseBonusAction { action_id } => self.use_bonus_action(&action_id),
            GameAction::UpgradeTalent {
                player_id,
                talent_id,
            } => self.upgrade_talent(&player_id, &talent_id),
            GameAction::ModifyHealth { player_id, delta } => {
                self.modify_health(&player_id, delta)
            }

            // ==================== Turn Management ====================
            GameAction::EndTurn => self.end_turn(),
        }
    }

    /// Actions the current player could take right now.
    pub fn available_actions(&self) -> Vec<GameAction> {
        let mut actions = Vec::new();

        if !self.started {
            if !self.registry.is_empty() {
                actions.push(GameAction::StartGame);
            }
            return actions;
        }
        let Some(player) = self.registry.current_player() else {
            return actions;
        };

        if let Some(plan) = &self.movement_plan {
            for destination in plan.reachable.keys() {
                actions.push(GameAction::ConfirmMovement {
                    destination: destination.clone(),
                });
            }
            actions.push(GameAction::CancelMovement);
        } else if !self.turn_actions.movement_used {
            actions.push(GameAction::StartMovement);
        }

        if !self.turn_actions.main_action_used && is_location(&player.position) {
            actions.push(GameAction::ExecuteTracking);
            for card in &player.cards {
                let action = match card.status() {
                    CardStatus::Unmounted => GameAction::StartMounting {
                        card_id: card.id.clone(),
                    },
                    CardStatus::Mounting => GameAction::AdvanceMounting {
                        card_id: card.id.clone(),
                    },
                    _ => continue,
                };
                // Duplicate copies of a card collapse to one entry.
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }

        actions.push(GameAction::EndTurn);
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CardDefinition, Mounting};
    use crate::character::{Character, Talent};

    fn test_map() -> MapGraph {
        let mut adjacency = HashMap::new();
        adjacency.insert("path001".to_string(), vec!["Lighthouse".to_string()]);
        adjacency.insert("Lighthouse".to_string(), vec!["path001".to_string()]);
        MapGraph::new(adjacency, "path001")
    }

    fn test_roster() -> Roster {
        Roster::new(vec![
            Character {
                id: "scout".to_string(),
                name: "Scout".to_string(),
                talents: vec![
                    Talent {
                        id: "max_health".to_string(),
                        levels: vec![10],
                        mounting_rounds: None,
                    },
                    Talent {
                        id: "movement".to_string(),
                        levels: vec![2],
                        mounting_rounds: None,
                    },
                    Talent {
                        id: "tracking".to_string(),
                        levels: vec![1],
                        mounting_rounds: None,
                    },
                ],
                abilities: vec![],
                color: 0x111111,
            },
            Character {
                id: "medic".to_string(),
                name: "Medic".to_string(),
                talents: vec![Talent {
                    id: "max_health".to_string(),
                    levels: vec![12],
                    mounting_rounds: None,
                }],
                abilities: vec![],
                color: 0x222222,
            },
        ])
    }

    fn test_decks() -> BTreeMap<String, DeckDefinition> {
        let mut decks = BTreeMap::new();
        decks.insert(
            "verde".to_string(),
            DeckDefinition {
                name: "Verde".to_string(),
                color: "#2e7d32".to_string(),
                min_roll: 1,
                max_roll: 20,
                cards: vec![CardDefinition {
                    id: "lupa".to_string(),
                    name: "Lupa".to_string(),
                    card_type: "item".to_string(),
                    effect: String::new(),
                    quantity: 2,
                    mounting: None,
                }],
            },
        );
        decks
    }

    fn started_session() -> GameSession {
        let mut session = GameSession::new(test_map(), test_roster(), test_decks());
        session.add_player("p1", "Ana", "scout").unwrap();
        session.start_game().unwrap();
        session
    }

    #[test]
    fn test_new_session_is_in_lobby() {
        let session = GameSession::new(test_map(), test_roster(), test_decks());
        assert!(!session.started);
        assert!(session.registry.is_empty());
        assert_eq!(session.decks.remaining("verde"), 2);
    }

    #[test]
    fn test_add_player_guards() {
        let mut session = GameSession::new(test_map(), test_roster(), test_decks());

        let result = session.add_player("p1", "", "scout");
        assert!(matches!(result, Err(GameError::NoNameProvided)));

        let result = session.add_player("p1", "Ana", "");
        assert!(matches!(result, Err(GameError::NoCharacterSelected)));

        session.add_player("p1", "Ana", "scout").unwrap();
        let result = session.add_player("p2", "Bia", "scout");
        assert!(matches!(result, Err(GameError::CharacterInUse)));

        let result = session.add_player("p2", "Bia", "ghost");
        assert!(matches!(result, Err(GameError::UnknownCharacter)));
    }

    #[test]
    fn test_added_player_starts_on_start_tile() {
        let mut session = GameSession::new(test_map(), test_roster(), test_decks());
        session.add_player("p1", "Ana", "scout").unwrap();

        let player = session.find_player("p1").unwrap();
        assert_eq!(player.position, "path001");
        assert_eq!(player.state.movement, 2);
        assert_eq!(player.color, 0x111111);
        assert!(!player.has_moved);
    }

    #[test]
    fn test_start_game_requires_players() {
        let mut session = GameSession::new(test_map(), test_roster(), test_decks());
        assert!(matches!(session.start_game(), Err(GameError::NoPlayers)));

        session.add_player("p1", "Ana", "scout").unwrap();
        let events = session.start_game().unwrap();
        assert_eq!(events, vec![GameEvent::GameStarted]);

        // Starting again is a no-op.
        assert!(session.start_game().unwrap().is_empty());
    }

    #[test]
    fn test_movement_flow() {
        let mut session = started_session();

        session.start_movement().unwrap();
        assert!(session.reachable_tiles().unwrap().contains_key("Lighthouse"));

        let result = session.confirm_movement("path999");
        assert!(matches!(result, Err(GameError::Unreachable)));

        session.confirm_movement("Lighthouse").unwrap();
        let player = session.find_player("p1").unwrap();
        assert_eq!(player.position, "Lighthouse");
        assert!(player.has_moved);
        assert!(session.turn_actions.movement_used);
        assert!(session.movement_plan().is_none());

        let result = session.start_movement();
        assert!(matches!(result, Err(GameError::AlreadyUsed)));
    }

    #[test]
    fn test_confirm_without_plan() {
        let mut session = started_session();
        let result = session.confirm_movement("Lighthouse");
        assert!(matches!(result, Err(GameError::NotMoving)));
    }

    #[test]
    fn test_cancel_keeps_movement_available() {
        let mut session = started_session();
        session.start_movement().unwrap();
        session.cancel_movement().unwrap();

        assert!(!session.turn_actions.movement_used);
        assert!(session.start_movement().is_ok());
    }

    #[test]
    fn test_movement_requires_started_game() {
        let mut session = GameSession::new(test_map(), test_roster(), test_decks());
        session.add_player("p1", "Ana", "scout").unwrap();
        let result = session.start_movement();
        assert!(matches!(result, Err(GameError::GameNotStarted)));
    }

    #[test]
    fn test_tracking_requires_location() {
        let mut session = started_session();
        // Players start on a path tile.
        let result = session.execute_tracking();
        assert!(matches!(result, Err(GameError::NotInLocation)));
    }

    #[test]
    fn test_bonus_action_once_per_turn() {
        let mut session = started_session();
        session.use_bonus_action("heal").unwrap();
        let result = session.use_bonus_action("heal");
        assert!(matches!(result, Err(GameError::AlreadyUsed)));

        session.use_bonus_action("search").unwrap();
        assert_eq!(session.turn_actions.bonus_actions.len(), 2);
    }

    #[test]
    fn test_end_turn_resets_flags() {
        let mut session = started_session();
        session.add_player("p2", "Bia", "medic").unwrap();

        session.start_movement().unwrap();
        session.confirm_movement("Lighthouse").unwrap();
        session.use_bonus_action("heal").unwrap();

        let events = session.end_turn().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::TurnEnded { current_player_index: 1, .. })));
        assert!(!session.turn_actions.movement_used);
        assert!(session.turn_actions.bonus_actions.is_empty());
        assert_eq!(session.current_player().unwrap().id, "p2");
    }

    #[test]
    fn test_end_turn_clears_has_moved_for_next_player() {
        let mut session = started_session();
        session.start_movement().unwrap();
        session.confirm_movement("Lighthouse").unwrap();
        assert!(session.find_player("p1").unwrap().has_moved);

        // Single player: the turn comes straight back.
        session.end_turn().unwrap();
        assert!(!session.find_player("p1").unwrap().has_moved);
    }

    #[test]
    fn test_reset_returns_to_lobby() {
        let mut session = started_session();
        session
            .select_deck_with_rng("verde", &mut rand::thread_rng())
            .unwrap();
        assert_eq!(session.decks.remaining("verde"), 1);

        session.reset_game().unwrap();
        assert!(!session.started);
        assert!(session.registry.is_empty());
        assert_eq!(session.decks.remaining("verde"), 2);
    }

    #[test]
    fn test_instant_mount_skips_main_action() {
        let mut session = started_session();
        session.registry.find_mut("p1").unwrap().position = "Lighthouse".to_string();
        // A configured zero-round talent mounts in place.
        session.roster = Roster::new(vec![Character {
            id: "scout".to_string(),
            name: "Scout".to_string(),
            talents: vec![Talent {
                id: "tecnologia".to_string(),
                levels: vec![0, 1],
                mounting_rounds: Some(0),
            }],
            abilities: vec![],
            color: 0,
        }]);
        let player = session.registry.find_mut("p1").unwrap();
        player.state.talent_levels.insert("tecnologia".to_string(), 1);
        player.cards.push(crate::cards::Card {
            id: "radio".to_string(),
            name: "Radio".to_string(),
            card_type: "item".to_string(),
            effect: String::new(),
            deck: "Verde".to_string(),
            deck_id: "verde".to_string(),
            mounted: false,
            mounting_progress: 0,
            mounting: Some(Mounting {
                required_talents: vec!["tecnologia".to_string()],
            }),
        });

        let events = session.start_mounting("radio").unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], GameEvent::MountingCompleted { .. }));
        assert!(!session.turn_actions.main_action_used);
        assert_eq!(
            session.find_player("p1").unwrap().cards[0].status(),
            CardStatus::Mounted
        );
    }

    #[test]
    fn test_available_actions_in_lobby() {
        let mut session = GameSession::new(test_map(), test_roster(), test_decks());
        assert!(session.available_actions().is_empty());

        session.add_player("p1", "Ana", "scout").unwrap();
        assert_eq!(session.available_actions(), vec![GameAction::StartGame]);
    }
}
