//! Players and the turn-order registry.

use crate::cards::Card;
use crate::character::PlayerState;
use crate::game::GameError;
use serde::{Deserialize, Serialize};

/// Hard cap on players per session.
pub const MAX_PLAYERS: usize = 6;

/// One player in a session. The id is minted by the joining client and is
/// globally unique; turn order is the player's index in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub character_id: String,
    pub color: u32,
    pub position: String,
    pub state: PlayerState,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub has_moved: bool,
}

/// Ordered player list plus the turn cursor and the local identity.
///
/// Insertion order is turn order. The current player index always refers
/// into `players`; removal clamps it back to the first player when it
/// would dangle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerRegistry {
    players: Vec<Player>,
    current_player_index: usize,
    local_player_id: Option<String>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that a player with this name and character could join now.
    pub fn validate_addition(&self, name: &str, character_id: &str) -> Result<(), GameError> {
        if name.trim().is_empty() {
            return Err(GameError::NoNameProvided);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::MaxPlayersReached);
        }
        if character_id.is_empty() {
            return Err(GameError::NoCharacterSelected);
        }
        if self.character_in_use(character_id) {
            return Err(GameError::CharacterInUse);
        }
        Ok(())
    }

    /// Append a player at the end of the turn order.
    pub fn add(&mut self, player: Player) -> Result<(), GameError> {
        self.validate_addition(&player.name, &player.character_id)?;
        self.players.push(player);
        Ok(())
    }

    /// Append a row-backed player without lobby validation. Rows the
    /// backend accepted are mirrored as-is.
    pub(crate) fn insert_synced(&mut self, player: Player) {
        self.players.push(player);
    }

    /// Remove a player by id. The turn cursor is clamped to the first
    /// player if it no longer points at a valid slot.
    pub fn remove(&mut self, player_id: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        let removed = self.players.remove(index);
        if self.current_player_index >= self.players.len() {
            self.current_player_index = 0;
        }
        Some(removed)
    }

    pub fn find(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn find_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn character_in_use(&self, character_id: &str) -> bool {
        self.players.iter().any(|p| p.character_id == character_id)
    }

    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }

    pub fn current_player_mut(&mut self) -> Option<&mut Player> {
        self.players.get_mut(self.current_player_index)
    }

    pub fn current_player_index(&self) -> usize {
        self.current_player_index
    }

    /// Point the turn cursor at an index delivered by a remote update.
    /// Stored as-is; reads go through `current_player`, which returns
    /// `None` until the matching player row arrives.
    pub fn set_current_player_index(&mut self, index: usize) {
        self.current_player_index = index;
    }

    /// Advance the cursor one seat, wrapping. Returns the new index.
    pub fn advance_turn(&mut self) -> usize {
        if !self.players.is_empty() {
            self.current_player_index = (self.current_player_index + 1) % self.players.len();
        }
        self.current_player_index
    }

    pub fn local_player_id(&self) -> Option<&str> {
        self.local_player_id.as_deref()
    }

    pub fn set_local_player(&mut self, player_id: Option<String>) {
        self.local_player_id = player_id;
    }

    pub fn is_local(&self, player_id: &str) -> bool {
        self.local_player_id.as_deref() == Some(player_id)
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.local_player_id
            .as_deref()
            .and_then(|id| self.find(id))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Drop every player and reset the cursor and local identity.
    pub fn clear(&mut self) {
        self.players.clear();
        self.current_player_index = 0;
        self.local_player_id = None;
    }
}
