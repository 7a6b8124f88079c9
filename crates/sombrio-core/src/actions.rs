//! Game actions that players can take.
//!
//! This module defines all possible actions in the game and the events
//! that result from those actions.

use crate::cards::{Card, DeckChoice};
use serde::{Deserialize, Serialize};

/// All possible actions a player can take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameAction {
    // ==================== Lobby ====================
    /// Join the session with a chosen name and character
    AddPlayer {
        id: String,
        name: String,
        character_id: String,
    },
    /// Remove a player (left the room or dropped)
    RemovePlayer { player_id: String },
    /// Start the game once everyone has joined
    StartGame,
    /// Return the session to the lobby and restore the decks
    ResetGame,

    // ==================== Movement ====================
    /// Begin the movement phase and compute reachable tiles
    StartMovement,
    /// Move the current player to a reachable tile
    ConfirmMovement { destination: String },
    /// Abandon the movement phase without moving
    CancelMovement,

    // ==================== Tracking & Cards ====================
    /// Roll for card tracking at the current location
    ExecuteTracking,
    /// Draw from one of the decks offered by the tracking roll
    SelectDeck { deck_id: String },

    // ==================== Mounting ====================
    /// Start mounting a card at a location
    StartMounting { card_id: String },
    /// Spend a later turn's main action to advance a mount
    AdvanceMounting { card_id: String },

    // ==================== Player Development ====================
    /// Use a once-per-turn bonus action
    UseBonusAction { action_id: String },
    /// Raise one of a player's talents a level
    UpgradeTalent {
        player_id: String,
        talent_id: String,
    },
    /// Apply a health delta (damage or healing)
    ModifyHealth { player_id: String, delta: i32 },

    // ==================== Turn Management ====================
    /// End your turn
    EndTurn,
}

/// Events that occur as a result of actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// The game left the lobby
    GameStarted,

    /// The session returned to the lobby
    GameReset,

    /// A player joined
    PlayerAdded { player_id: String, name: String },

    /// A player left
    PlayerRemoved { player_id: String },

    /// The movement phase opened for a player
    MovementStarted { player_id: String },

    /// A player moved
    MovementConfirmed {
        player_id: String,
        from: String,
        to: String,
    },

    /// The movement phase was abandoned
    MovementCancelled { player_id: String },

    /// A tracking roll happened
    TrackingRolled {
        player_id: String,
        roll: i32,
        bonus: i32,
        total: i32,
        decks: Vec<DeckChoice>,
    },

    /// A card was drawn from a deck
    CardDrawn {
        player_id: String,
        deck_id: String,
        card: Card,
    },

    /// The turn's main action was consumed
    MainActionUsed { player_id: String, action: String },

    /// Mounting began on a card
    MountingStarted {
        player_id: String,
        card_id: String,
        progress: u32,
        rounds: u32,
    },

    /// A mount advanced one round
    MountingAdvanced {
        player_id: String,
        card_id: String,
        progress: u32,
        rounds: u32,
    },

    /// A mount finished
    MountingCompleted { player_id: String, card_id: String },

    /// A bonus action was used this turn
    BonusActionUsed {
        player_id: String,
        action_id: String,
    },

    /// A talent went up a level
    TalentUpgraded {
        player_id: String,
        talent_id: String,
        new_level: usize,
    },

    /// A player's health changed
    HealthChanged {
        player_id: String,
        current_health: i32,
        max_health: i32,
    },

    /// Turn ended
    TurnEnded {
        player_id: String,
        current_player_index: usize,
    },

    /// The next player's turn opened
    TurnStarted {
        player_id: String,
        mounting_in_progress: Vec<String>,
    },

    /// A chat line arrived from another player
    ChatMessage { from: String, message: String },

    /// Shared room state was applied from a remote update
    RoomSynced { current_player_index: usize },

    /// The room was deleted remotely
    RoomClosed,

    /// A full state rebuild finished
    Resynced { player_count: usize },

    /// A player's row was merged from a remote update
    PlayerSynced { player_id: String },

    /// A peer's realtime connection appeared
    PeerConnected { player_id: String },

    /// A peer's realtime connection dropped
    PeerDisconnected { player_id: String },
}
