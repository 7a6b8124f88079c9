//! Synchronization vocabulary and the reconciler.
//!
//! Play is optimistic: the local session applies an action immediately and
//! the [`Reconciler`] reports the persistence and broadcast effects a
//! transport should perform. Inbound remote changes arrive as
//! [`SyncEvent`]s and are merged idempotently, so duplicated or re-ordered
//! deliveries converge on the same state.

use crate::actions::{GameAction, GameEvent};
use crate::cards::Card;
use crate::character::PlayerState;
use crate::game::{GameError, GameSession, TurnActions};
use crate::map::MapGraph;
use crate::player::Player;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle of a shared room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
}

impl Default for RoomStatus {
    fn default() -> Self {
        RoomStatus::Waiting
    }
}

/// The shared per-room state as persisted: everything except the player
/// rows themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    #[serde(default)]
    pub status: RoomStatus,
    #[serde(default)]
    pub current_player_index: usize,
    #[serde(default, rename = "current_turn_actions")]
    pub turn_actions: TurnActions,
    #[serde(default)]
    pub deck_quantities: HashMap<String, u32>,
    #[serde(default)]
    pub card_quantities: HashMap<String, HashMap<String, u32>>,
}

impl RoomSnapshot {
    /// Capture the shared room state from a session.
    pub fn capture(session: &GameSession) -> Self {
        Self {
            status: if session.started {
                RoomStatus::Playing
            } else {
                RoomStatus::Waiting
            },
            current_player_index: session.registry.current_player_index(),
            turn_actions: session.turn_actions.clone(),
            deck_quantities: session.decks.deck_quantities().clone(),
            card_quantities: session.decks.card_quantities().clone(),
        }
    }
}

/// One player's persisted row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRow {
    pub player_id: String,
    pub player_name: String,
    pub character_id: String,
    #[serde(default)]
    pub color: u32,
    pub position: String,
    pub player_state: PlayerState,
    #[serde(default)]
    pub cards: Vec<Card>,
    pub turn_order: usize,
    #[serde(default = "default_online")]
    pub is_online: bool,
}

fn default_online() -> bool {
    true
}

impl PlayerRow {
    pub fn from_player(player: &Player, turn_order: usize) -> Self {
        Self {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            character_id: player.character_id.clone(),
            color: player.color,
            position: player.position.clone(),
            player_state: player.state.clone(),
            cards: player.cards.clone(),
            turn_order,
            is_online: true,
        }
    }

    /// Rebuild a player from their row. Positions from older map revisions
    /// are repaired to the start tile.
    pub fn into_player(self, map: &MapGraph) -> Player {
        let position = map.validate_position(&self.position).to_string();
        Player {
            id: self.player_id,
            name: self.player_name,
            character_id: self.character_id,
            color: self.color,
            position,
            state: self.player_state,
            cards: self.cards,
            has_moved: false,
        }
    }
}

/// A partial row update: only the present fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRowUpdate {
    pub player_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_state: Option<PlayerState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<Card>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

impl PlayerRowUpdate {
    /// A full update carrying every replicated field of a row.
    pub fn from_row(row: &PlayerRow) -> Self {
        Self {
            player_id: row.player_id.clone(),
            position: Some(row.position.clone()),
            player_state: Some(row.player_state.clone()),
            cards: Some(row.cards.clone()),
            is_online: Some(row.is_online),
        }
    }
}

/// Deltas published on the room's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GameBroadcast {
    /// A player joined the session
    PlayerAdded { player: PlayerRow },

    /// A player left the session
    PlayerRemoved { player_id: String },

    /// A player opened their movement phase
    MovementStarted { player_id: String },

    /// A player moved to a tile
    MovementConfirmed { player_id: String, position: String },

    /// A player abandoned their movement phase
    MovementCancelled { player_id: String },

    /// The turn's main action was consumed
    MainActionExecuted { player_id: String, action: String },

    /// A bonus action was used this turn
    BonusActionExecuted { player_id: String, action: String },

    /// The turn passed
    TurnEnded { current_player_index: usize },

    /// A player's stats changed
    PlayerStateUpdated {
        player_id: String,
        state: PlayerState,
    },

    /// The game left the lobby
    GameStarted,

    /// The session returned to the lobby
    GameReset,

    /// Table chat
    ChatMessage {
        from: String,
        message: String,
        timestamp: u64,
    },
}

/// A broadcast as it travels: the delta plus who sent it and when.
/// Receivers drop envelopes carrying their own sender id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub sender_id: String,
    pub timestamp: u64,
    #[serde(flatten)]
    pub action: GameBroadcast,
}

/// Everything the transport can deliver to the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncEvent {
    /// The room row changed
    RoomUpdated { room: RoomSnapshot },

    /// The room row was deleted
    RoomDeleted,

    /// A player row appeared
    PlayerAdded { player: PlayerRow },

    /// A player row changed
    PlayerUpdated { update: PlayerRowUpdate },

    /// A player row was deleted
    PlayerRemoved { player_id: String },

    /// A broadcast arrived on the room channel
    Action(BroadcastEnvelope),

    /// A peer's realtime connection appeared
    PresenceJoined { player_id: String },

    /// A peer's realtime connection dropped
    PresenceLeft { player_id: String },
}

/// What the transport must do after a local action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEffect {
    /// Write the shared room state
    PersistRoom(RoomSnapshot),

    /// Upsert one player's row
    PersistPlayer(PlayerRow),

    /// Delete one player's row
    DeletePlayerRow { player_id: String },

    /// Publish a delta on the room channel
    Broadcast(GameBroadcast),
}

/// A locally applied action: what happened and what to tell the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub events: Vec<GameEvent>,
    pub effects: Vec<SyncEffect>,
}

/// Owns the session on behalf of one client and keeps it converging with
/// the other clients' sessions.
///
/// Local actions go through [`perform`](Self::perform): applied
/// optimistically, with the resulting persistence and broadcast effects
/// returned for the transport to carry out. Remote deliveries go through
/// [`receive`](Self::receive); row events win wholesale, broadcast deltas
/// apply at most once.
#[derive(Debug)]
pub struct Reconciler {
    session: GameSession,
    local_player_id: String,
}

impl Reconciler {
    pub fn new(mut session: GameSession, local_player_id: impl Into<String>) -> Self {
        let local_player_id = local_player_id.into();
        session
            .registry
            .set_local_player(Some(local_player_id.clone()));
        Self {
            session,
            local_player_id,
        }
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut GameSession {
        &mut self.session
    }

    pub fn into_session(self) -> GameSession {
        self.session
    }

    pub fn local_player_id(&self) -> &str {
        &self.local_player_id
    }

    /// Apply a local action and derive the effects to replicate it.
    pub fn perform(&mut self, action: GameAction) -> Result<ActionOutcome, GameError> {
        self.perform_with_rng(action, &mut rand::thread_rng())
    }

    pub fn perform_with_rng<R: Rng>(
        &mut self,
        action: GameAction,
        rng: &mut R,
    ) -> Result<ActionOutcome, GameError> {
        let events = self.session.apply_action_with_rng(action, rng)?;
        let effects = self.effects_for(&events);
        Ok(ActionOutcome { events, effects })
    }

    /// Map applied events onto persistence and broadcast effects. Rows are
    /// built from the post-action state, and repeated writes to the same
    /// row collapse into one.
    fn effects_for(&self, events: &[GameEvent]) -> Vec<SyncEffect> {
        let mut persist_room = false;
        let mut persist_players: Vec<String> = Vec::new();
        let mut deletes: Vec<String> = Vec::new();
        let mut broadcasts: Vec<GameBroadcast> = Vec::new();

        let mut mark_player = |list: &mut Vec<String>, id: &str| {
            if !list.iter().any(|p| p == id) {
                list.push(id.to_string());
            }
        };

        for event in events {
            match event {
                GameEvent::GameStarted => {
                    persist_room = true;
                    broadcasts.push(GameBroadcast::GameStarted);
                }
                GameEvent::GameReset => {
                    persist_room = true;
                    broadcasts.push(GameBroadcast::GameReset);
                }
                GameEvent::PlayerAdded { player_id, .. } => {
                    mark_player(&mut persist_players, player_id);
                    if let Some(row) = self.player_row(player_id) {
                        broadcasts.push(GameBroadcast::PlayerAdded { player: row });
                    }
                }
                GameEvent::PlayerRemoved { player_id } => {
                    deletes.push(player_id.clone());
                    broadcasts.push(GameBroadcast::PlayerRemoved {
                        player_id: player_id.clone(),
                    });
                }
                GameEvent::MovementStarted { player_id } => {
                    broadcasts.push(GameBroadcast::MovementStarted {
                        player_id: player_id.clone(),
                    });
                }
                GameEvent::MovementConfirmed { player_id, to, .. } => {
                    mark_player(&mut persist_players, player_id);
                    persist_room = true;
                    broadcasts.push(GameBroadcast::MovementConfirmed {
                        player_id: player_id.clone(),
                        position: to.clone(),
                    });
                }
                GameEvent::MovementCancelled { player_id } => {
                    broadcasts.push(GameBroadcast::MovementCancelled {
                        player_id: player_id.clone(),
                    });
                }
                GameEvent::CardDrawn { player_id, .. } => {
                    mark_player(&mut persist_players, player_id);
                    persist_room = true;
                }
                GameEvent::MainActionUsed { player_id, action } => {
                    persist_room = true;
                    broadcasts.push(GameBroadcast::MainActionExecuted {
                        player_id: player_id.clone(),
                        action: action.clone(),
                    });
                }
                GameEvent::MountingStarted { player_id, .. }
                | GameEvent::MountingAdvanced { player_id, .. }
                | GameEvent::MountingCompleted { player_id, .. } => {
                    mark_player(&mut persist_players, player_id);
                }
                GameEvent::BonusActionUsed {
                    player_id,
                    action_id,
                } => {
                    persist_room = true;
                    broadcasts.push(GameBroadcast::BonusActionExecuted {
                        player_id: player_id.clone(),
                        action: action_id.clone(),
                    });
                }
                GameEvent::TalentUpgraded { player_id, .. }
                | GameEvent::HealthChanged { player_id, .. } => {
                    mark_player(&mut persist_players, player_id);
                    if let Some(player) = self.session.find_player(player_id) {
                        broadcasts.push(GameBroadcast::PlayerStateUpdated {
                            player_id: player_id.clone(),
                            state: player.state.clone(),
                        });
                    }
                }
                GameEvent::TurnEnded {
                    current_player_index,
                    ..
                } => {
                    persist_room = true;
                    broadcasts.push(GameBroadcast::TurnEnded {
                        current_player_index: *current_player_index,
                    });
                }
                // Rolls, turn openings and sync-side notifications change
                // nothing another client needs told about.
                _ => {}
            }
        }

        let mut effects = Vec::new();
        for player_id in persist_players {
            if let Some(row) = self.player_row(&player_id) {
                effects.push(SyncEffect::PersistPlayer(row));
            }
        }
        if persist_room {
            effects.push(SyncEffect::PersistRoom(RoomSnapshot::capture(
                &self.session,
            )));
        }
        for player_id in deletes {
            effects.push(SyncEffect::DeletePlayerRow { player_id });
        }
        effects.extend(broadcasts.into_iter().map(SyncEffect::Broadcast));
        effects
    }

    fn player_row(&self, player_id: &str) -> Option<PlayerRow> {
        let players = self.session.registry.players();
        let turn_order = players.iter().position(|p| p.id == player_id)?;
        Some(PlayerRow::from_player(&players[turn_order], turn_order))
    }

    /// Merge one remote delivery into the session.
    pub fn receive(&mut self, event: SyncEvent) -> Result<Vec<GameEvent>, GameError> {
        match event {
            SyncEvent::RoomUpdated { room } => Ok(self.apply_room(room)),
            SyncEvent::RoomDeleted => Ok(vec![GameEvent::RoomClosed]),
            SyncEvent::PlayerAdded { player } => Ok(self.apply_player_row(player)),
            SyncEvent::PlayerUpdated { update } => Ok(self.apply_player_update(update)),
            SyncEvent::PlayerRemoved { player_id } => self.session.remove_player(&player_id),
            SyncEvent::Action(envelope) => self.apply_remote_action(envelope),
            SyncEvent::PresenceJoined { player_id } => {
                Ok(vec![GameEvent::PeerConnected { player_id }])
            }
            SyncEvent::PresenceLeft { player_id } => {
                Ok(vec![GameEvent::PeerDisconnected { player_id }])
            }
        }
    }

    /// Rebuild the whole session from a fetched room and its player rows,
    /// as done on connect and reconnect.
    pub fn resync(&mut self, room: RoomSnapshot, mut rows: Vec<PlayerRow>) -> Vec<GameEvent> {
        rows.sort_by_key(|r| r.turn_order);

        self.session.registry.clear();
        self.session
            .registry
            .set_local_player(Some(self.local_player_id.clone()));
        for row in rows {
            let player = row.into_player(&self.session.map);
            self.session.registry.insert_synced(player);
        }
        let player_count = self.session.registry.len();
        self.apply_room(room);

        vec![GameEvent::Resynced { player_count }]
    }

    /// The room row is authoritative for everything it carries.
    fn apply_room(&mut self, room: RoomSnapshot) -> Vec<GameEvent> {
        let current_player_index = room.current_player_index;
        self.session.started = room.status == RoomStatus::Playing;
        self.session
            .registry
            .set_current_player_index(current_player_index);
        self.session.turn_actions = room.turn_actions;
        // Empty maps mean the columns were never written; a row that has
        // tracked quantities always carries one entry per deck.
        if !room.deck_quantities.is_empty() {
            self.session
                .decks
                .apply_quantities(room.deck_quantities, room.card_quantities);
        }

        vec![GameEvent::RoomSynced {
            current_player_index,
        }]
    }

    /// Insert a remotely added player, skipping rows already mirrored.
    fn apply_player_row(&mut self, row: PlayerRow) -> Vec<GameEvent> {
        if self.session.registry.find(&row.player_id).is_some() {
            return Vec::new();
        }
        let player_id = row.player_id.clone();
        let name = row.player_name.clone();
        let player = row.into_player(&self.session.map);
        self.session.registry.insert_synced(player);

        vec![GameEvent::PlayerAdded { player_id, name }]
    }

    /// Merge the present fields of a row update. Updates for players not
    /// yet mirrored are dropped; their insert event carries the full row.
    fn apply_player_update(&mut self, update: PlayerRowUpdate) -> Vec<GameEvent> {
        let map = &self.session.map;
        let Some(player) = self.session.registry.find_mut(&update.player_id) else {
            return Vec::new();
        };

        if let Some(position) = update.position {
            player.position = map.validate_position(&position).to_string();
        }
        if let Some(state) = update.player_state {
            player.state = state;
        }
        if let Some(cards) = update.cards {
            player.cards = cards;
        }

        vec![GameEvent::PlayerSynced {
            player_id: update.player_id,
        }]
    }

    /// Apply a broadcast delta, dropping our own envelopes and any
    /// duplicate deliveries.
    fn apply_remote_action(
        &mut self,
        envelope: BroadcastEnvelope,
    ) -> Result<Vec<GameEvent>, GameError> {
        if envelope.sender_id == self.local_player_id {
            return Ok(Vec::new());
        }

        match envelope.action {
            GameBroadcast::PlayerAdded { player } => Ok(self.apply_player_row(player)),
            GameBroadcast::PlayerRemoved { player_id } => self.session.remove_player(&player_id),
            GameBroadcast::MovementStarted { player_id } => {
                Ok(vec![GameEvent::MovementStarted { player_id }])
            }
            GameBroadcast::MovementConfirmed {
                player_id,
                position,
            } => Ok(self.apply_remote_move(player_id, position)),
            GameBroadcast::MovementCancelled { player_id } => {
                Ok(vec![GameEvent::MovementCancelled { player_id }])
            }
            GameBroadcast::MainActionExecuted { player_id, action } => {
                if self.session.turn_actions.main_action_used {
                    return Ok(Vec::new());
                }
                self.session.turn_actions.main_action_used = true;
                Ok(vec![GameEvent::MainActionUsed { player_id, action }])
            }
            GameBroadcast::BonusActionExecuted { player_id, action } => {
                if self.session.turn_actions.bonus_used(&action) {
                    return Ok(Vec::new());
                }
                self.session.turn_actions.bonus_actions.push(action.clone());
                Ok(vec![GameEvent::BonusActionUsed {
                    player_id,
                    action_id: action,
                }])
            }
            GameBroadcast::TurnEnded {
                current_player_index,
            } => Ok(self.apply_remote_turn(current_player_index)),
            GameBroadcast::PlayerStateUpdated { player_id, state } => {
                match self.session.registry.find_mut(&player_id) {
                    Some(player) => {
                        player.state = state;
                        Ok(vec![GameEvent::PlayerSynced { player_id }])
                    }
                    None => Ok(Vec::new()),
                }
            }
            GameBroadcast::GameStarted => {
                if self.session.started {
                    return Ok(Vec::new());
                }
                self.session.started = true;
                Ok(vec![GameEvent::GameStarted])
            }
            GameBroadcast::GameReset => self.session.reset_game(),
            GameBroadcast::ChatMessage { from, message, .. } => {
                Ok(vec![GameEvent::ChatMessage { from, message }])
            }
        }
    }

    /// A move we already mirrored (or performed) is a no-op.
    fn apply_remote_move(&mut self, player_id: String, position: String) -> Vec<GameEvent> {
        let map = &self.session.map;
        let Some(player) = self.session.registry.find_mut(&player_id) else {
            return Vec::new();
        };
        // The delta says this player moved this turn, even when the row
        // update already carried the position.
        player.has_moved = true;
        let to = map.validate_position(&position).to_string();
        if player.position == to {
            return Vec::new();
        }
        let from = std::mem::replace(&mut player.position, to.clone());

        vec![GameEvent::MovementConfirmed {
            player_id,
            from,
            to,
        }]
    }

    fn apply_remote_turn(&mut self, current_player_index: usize) -> Vec<GameEvent> {
        let previous = self
            .session
            .registry
            .current_player()
            .map(|p| p.id.clone())
            .unwrap_or_default();
        self.session.turn_actions.reset();
        self.session.movement_plan = None;
        self.session
            .registry
            .set_current_player_index(current_player_index);

        let mut events = vec![GameEvent::TurnEnded {
            player_id: previous,
            current_player_index,
        }];
        if let Some(event) = self.session.open_next_turn() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CardDefinition, DeckDefinition};
    use crate::character::{Character, Roster, Talent};
    use crate::map::MapGraph;
    use std::collections::BTreeMap;

    fn test_session() -> GameSession {
        let mut adjacency = HashMap::new();
        adjacency.insert("path001".to_string(), vec!["Chapel".to_string()]);
        adjacency.insert("Chapel".to_string(), vec!["path001".to_string()]);
        let map = MapGraph::new(adjacency, "path001");

        let roster = Roster::new(vec![
            character("scout", 0x111111),
            character("medic", 0x222222),
        ]);

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
                    quantity: 3,
                    mounting: None,
                }],
            },
        );
        GameSession::new(map, roster, decks)
    }

    fn character(id: &str, color: u32) -> Character {
        Character {
            id: id.to_string(),
            name: id.to_uppercase(),
            talents: vec![
                Talent {
                    id: "max_health".to_string(),
                    levels: vec![10, 12],
                    mounting_rounds: None,
                },
                Talent {
                    id: "movement".to_string(),
                    levels: vec![2],
                    mounting_rounds: None,
                },
            ],
            abilities: vec![],
            color,
        }
    }

    fn envelope(sender: &str, action: GameBroadcast) -> SyncEvent {
        SyncEvent::Action(BroadcastEnvelope {
            sender_id: sender.to_string(),
            timestamp: 0,
            action,
        })
    }

    #[test]
    fn test_own_broadcasts_are_dropped() {
        let mut session = test_session();
        session.add_player("p1", "Ana", "scout").unwrap();
        session.start_game().unwrap();
        let mut rec = Reconciler::new(session, "p1");

        let events = rec
            .receive(envelope(
                "p1",
                GameBroadcast::MainActionExecuted {
                    player_id: "p1".to_string(),
                    action: "tracking".to_string(),
                },
            ))
            .unwrap();
        assert!(events.is_empty());
        assert!(!rec.session().turn_actions.main_action_used);
    }

    #[test]
    fn test_duplicate_main_action_applies_once() {
        let mut session = test_session();
        session.add_player("p1", "Ana", "scout").unwrap();
        session.start_game().unwrap();
        let mut rec = Reconciler::new(session, "p2");

        let delta = GameBroadcast::MainActionExecuted {
            player_id: "p1".to_string(),
            action: "tracking".to_string(),
        };
        let first = rec.receive(envelope("p1", delta.clone())).unwrap();
        assert_eq!(first.len(), 1);
        assert!(rec.session().turn_actions.main_action_used);

        let second = rec.receive(envelope("p1", delta)).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_remote_move_is_idempotent_and_repaired() {
        let mut session = test_session();
        session.add_player("p1", "Ana", "scout").unwrap();
        session.start_game().unwrap();
        let mut rec = Reconciler::new(session, "p2");

        let delta = GameBroadcast::MovementConfirmed {
            player_id: "p1".to_string(),
            position: "Chapel".to_string(),
        };
        assert_eq!(rec.receive(envelope("p1", delta.clone())).unwrap().len(), 1);
        assert_eq!(rec.session().find_player("p1").unwrap().position, "Chapel");

        // Redelivery changes nothing.
        assert!(rec.receive(envelope("p1", delta)).unwrap().is_empty());

        // A position the map no longer knows lands on the start tile.
        let events = rec
            .receive(envelope(
                "p1",
                GameBroadcast::MovementConfirmed {
                    player_id: "p1".to_string(),
                    position: "demolished".to_string(),
                },
            ))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(rec.session().find_player("p1").unwrap().position, "path001");
    }

    #[test]
    fn test_remote_player_added_skips_known_rows() {
        let mut session = test_session();
        session.add_player("p1", "Ana", "scout").unwrap();
        let mut rec = Reconciler::new(session, "p1");

        let row = rec.player_row("p1").unwrap();
        let events = rec
            .receive(SyncEvent::PlayerAdded { player: row })
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(rec.session().registry.len(), 1);
    }

    #[test]
    fn test_room_update_wins_wholesale() {
        let mut session = test_session();
        session.add_player("p1", "Ana", "scout").unwrap();
        session.add_player("p2", "Bia", "medic").unwrap();
        session.start_game().unwrap();
        let mut rec = Reconciler::new(session, "p1");
        rec.session_mut().turn_actions.main_action_used = true;

        let mut room = RoomSnapshot::capture(rec.session());
        room.current_player_index = 1;
        room.turn_actions = TurnActions::default();

        rec.receive(SyncEvent::RoomUpdated { room }).unwrap();
        assert_eq!(rec.session().registry.current_player_index(), 1);
        assert!(!rec.session().turn_actions.main_action_used);
        assert!(rec.session().started);
    }

    #[test]
    fn test_movement_effects() {
        let mut session = test_session();
        session.add_player("p1", "Ana", "scout").unwrap();
        session.start_game().unwrap();
        let mut rec = Reconciler::new(session, "p1");

        rec.perform(GameAction::StartMovement).unwrap();
        let outcome = rec
            .perform(GameAction::ConfirmMovement {
                destination: "Chapel".to_string(),
            })
            .unwrap();

        assert!(outcome.effects.iter().any(|e| matches!(
            e,
            SyncEffect::PersistPlayer(row) if row.position == "Chapel"
        )));
        assert!(outcome.effects.iter().any(|e| matches!(
            e,
            SyncEffect::PersistRoom(room) if room.turn_actions.movement_used
        )));
        assert!(outcome.effects.iter().any(|e| matches!(
            e,
            SyncEffect::Broadcast(GameBroadcast::MovementConfirmed { position, .. })
                if position == "Chapel"
        )));
    }

    #[test]
    fn test_add_player_effects_carry_row() {
        let session = test_session();
        let mut rec = Reconciler::new(session, "p1");

        let outcome = rec
            .perform(GameAction::AddPlayer {
                id: "p1".to_string(),
                name: "Ana".to_string(),
                character_id: "scout".to_string(),
            })
            .unwrap();

        let persisted = outcome.effects.iter().find_map(|e| match e {
            SyncEffect::PersistPlayer(row) => Some(row),
            _ => None,
        });
        let row = persisted.expect("join must persist the new row");
        assert_eq!(row.turn_order, 0);
        assert_eq!(row.player_name, "Ana");
        assert!(row.is_online);
    }

    #[test]
    fn test_remote_turn_ended_resets_and_opens_turn() {
        let mut session = test_session();
        session.add_player("p1", "Ana", "scout").unwrap();
        session.add_player("p2", "Bia", "medic").unwrap();
        session.start_game().unwrap();
        session.turn_actions.main_action_used = true;
        session.registry.find_mut("p1").unwrap().has_moved = true;
        let mut rec = Reconciler::new(session, "p1");

        let events = rec
            .receive(envelope(
                "p2",
                GameBroadcast::TurnEnded {
                    current_player_index: 1,
                },
            ))
            .unwrap();

        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::TurnEnded { current_player_index: 1, .. })));
        assert!(!rec.session().turn_actions.main_action_used);
        assert_eq!(rec.session().current_player().unwrap().id, "p2");
    }

    #[test]
    fn test_resync_rebuilds_in_turn_order() {
        let mut source = test_session();
        source.add_player("p1", "Ana", "scout").unwrap();
        source.add_player("p2", "Bia", "medic").unwrap();
        source.start_game().unwrap();
        let room = RoomSnapshot::capture(&source);
        let mut rows: Vec<PlayerRow> = source
            .registry
            .players()
            .iter()
            .enumerate()
            .map(|(i, p)| PlayerRow::from_player(p, i))
            .collect();
        // Deliver rows out of order with a stale position.
        rows.reverse();
        rows[0].position = "gone_tile".to_string();

        let mut rec = Reconciler::new(test_session(), "p1");
        let events = rec.resync(room, rows);

        assert_eq!(events, vec![GameEvent::Resynced { player_count: 2 }]);
        let players = rec.session().registry.players();
        assert_eq!(players[0].id, "p1");
        assert_eq!(players[1].id, "p2");
        assert_eq!(players[1].position, "path001");
        assert!(rec.session().started);
        assert!(rec.session().registry.is_local("p1"));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = BroadcastEnvelope {
            sender_id: "p1".to_string(),
            timestamp: 1234,
            action: GameBroadcast::TurnEnded {
                current_player_index: 2,
            },
        };
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["sender_id"], "p1");
        assert_eq!(value["timestamp"], 1234);
        assert_eq!(value["type"], "TurnEnded");
        assert_eq!(value["payload"]["current_player_index"], 2);

        let back: BroadcastEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }
}
