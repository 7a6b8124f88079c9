//! In-memory realtime backend.
//!
//! Rows live in [`DashMap`] tables and every write fans its change event out
//! to the room's subscribers, which is exactly the delivery model the hosted
//! service provides. Used by the tests and the simulator; it is not a network
//! server.

use crate::backend::{BackendError, NewRoom, RealtimeBackend, RoomRow, RoomStatePatch, Subscription};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sombrio_core::{BroadcastEnvelope, PlayerRow, PlayerRowUpdate, RoomStatus, SyncEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Peer {
    player_id: String,
    tx: mpsc::UnboundedSender<SyncEvent>,
}

struct RoomRecord {
    row: RoomRow,
    players: HashMap<String, PlayerRow>,
    subscribers: Vec<Peer>,
}

struct Hub {
    rooms: DashMap<String, RoomRecord>,
}

impl Hub {
    /// Deliver an event to every subscriber, dropping feeds whose receiver
    /// is gone.
    fn fan(subscribers: &mut Vec<Peer>, event: SyncEvent) {
        subscribers.retain(|peer| peer.tx.send(event.clone()).is_ok());
    }

    fn unsubscribe(&self, code: &str, player_id: &str) {
        let Some(mut record) = self.rooms.get_mut(code) else {
            return;
        };
        let before = record.subscribers.len();
        record.subscribers.retain(|peer| peer.player_id != player_id);
        if record.subscribers.len() < before {
            Self::fan(
                &mut record.subscribers,
                SyncEvent::PresenceLeft {
                    player_id: player_id.to_string(),
                },
            );
        }
    }
}

/// [`RealtimeBackend`] over in-process tables.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Hub>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Hub {
                rooms: DashMap::new(),
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeBackend for MemoryBackend {
    async fn create_room(&self, room: NewRoom) -> Result<RoomRow, BackendError> {
        match self.inner.rooms.entry(room.code.clone()) {
            Entry::Occupied(_) => Err(BackendError::CodeTaken),
            Entry::Vacant(slot) => {
                let row = RoomRow {
                    code: room.code,
                    name: room.name,
                    host_name: room.host_name,
                    host_player_id: room.host_player_id,
                    max_players: room.max_players,
                    current_players: 1,
                    is_private: room.is_private,
                    state: room.state,
                };
                slot.insert(RoomRecord {
                    row: row.clone(),
                    players: HashMap::new(),
                    subscribers: Vec::new(),
                });
                Ok(row)
            }
        }
    }

    async fn fetch_room(&self, code: &str) -> Result<Option<RoomRow>, BackendError> {
        Ok(self.inner.rooms.get(code).map(|record| record.row.clone()))
    }

    async fn update_room(&self, code: &str, patch: RoomStatePatch) -> Result<(), BackendError> {
        let Some(mut record) = self.inner.rooms.get_mut(code) else {
            return Ok(());
        };
        if let Some(current_players) = patch.current_players {
            record.row.current_players = current_players;
        }
        if let Some(state) = patch.state {
            record.row.state = state;
        }
        let room = record.row.state.clone();
        Hub::fan(&mut record.subscribers, SyncEvent::RoomUpdated { room });
        Ok(())
    }

    async fn delete_room(&self, code: &str) -> Result<(), BackendError> {
        if let Some((_, mut record)) = self.inner.rooms.remove(code) {
            Hub::fan(&mut record.subscribers, SyncEvent::RoomDeleted);
        }
        Ok(())
    }

    async fn list_open_rooms(&self) -> Result<Vec<RoomRow>, BackendError> {
        Ok(self
            .inner
            .rooms
            .iter()
            .filter(|record| {
                !record.row.is_private && record.row.state.status == RoomStatus::Waiting
            })
            .map(|record| record.row.clone())
            .collect())
    }

    async fn upsert_player(&self, code: &str, row: PlayerRow) -> Result<(), BackendError> {
        let Some(mut record) = self.inner.rooms.get_mut(code) else {
            return Err(BackendError::Request(format!("no such room: {}", code)));
        };
        let event = match record.players.insert(row.player_id.clone(), row.clone()) {
            None => SyncEvent::PlayerAdded { player: row },
            Some(_) => SyncEvent::PlayerUpdated {
                update: PlayerRowUpdate::from_row(&row),
            },
        };
        Hub::fan(&mut record.subscribers, event);
        Ok(())
    }

    async fn fetch_players(&self, code: &str) -> Result<Vec<PlayerRow>, BackendError> {
        let mut rows: Vec<PlayerRow> = match self.inner.rooms.get(code) {
            Some(record) => record.players.values().cloned().collect(),
            None => Vec::new(),
        };
        rows.sort_by_key(|row| row.turn_order);
        Ok(rows)
    }

    async fn delete_player(&self, code: &str, player_id: &str) -> Result<(), BackendError> {
        let Some(mut record) = self.inner.rooms.get_mut(code) else {
            return Ok(());
        };
        if record.players.remove(player_id).is_some() {
            Hub::fan(
                &mut record.subscribers,
                SyncEvent::PlayerRemoved {
                    player_id: player_id.to_string(),
                },
            );
        }
        Ok(())
    }

    async fn broadcast(&self, code: &str, envelope: BroadcastEnvelope) -> Result<(), BackendError> {
        let Some(mut record) = self.inner.rooms.get_mut(code) else {
            return Err(BackendError::Request(format!("no such room: {}", code)));
        };
        Hub::fan(&mut record.subscribers, SyncEvent::Action(envelope));
        Ok(())
    }

    async fn subscribe(&self, code: &str, player_id: &str) -> Result<Subscription, BackendError> {
        let Some(mut record) = self.inner.rooms.get_mut(code) else {
            return Err(BackendError::Request(format!("no such room: {}", code)));
        };

        // Announce before attaching, so the joiner does not see itself.
        Hub::fan(
            &mut record.subscribers,
            SyncEvent::PresenceJoined {
                player_id: player_id.to_string(),
            },
        );

        let (tx, rx) = mpsc::unbounded_channel();
        record.subscribers.push(Peer {
            player_id: player_id.to_string(),
            tx,
        });

        let hub = Arc::clone(&self.inner);
        let code = code.to_string();
        let player_id = player_id.to_string();
        Ok(Subscription::with_cleanup(rx, move || {
            hub.unsubscribe(&code, &player_id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sombrio_core::{PlayerState, RoomSnapshot};

    fn new_room(code: &str) -> NewRoom {
        NewRoom {
            code: code.to_string(),
            name: "Mansao".to_string(),
            host_name: "Ana".to_string(),
            host_player_id: "player_host".to_string(),
            max_players: 6,
            is_private: false,
            state: RoomSnapshot::default(),
        }
    }

    fn player_row(player_id: &str, turn_order: usize) -> PlayerRow {
        PlayerRow {
            player_id: player_id.to_string(),
            player_name: player_id.to_string(),
            character_id: "explorador".to_string(),
            color: 0,
            position: "path001".to_string(),
            player_state: PlayerState {
                talent_levels: HashMap::new(),
                current_health: 10,
                max_health: 10,
                movement: 2,
                effects: Vec::new(),
            },
            cards: Vec::new(),
            turn_order,
            is_online: true,
        }
    }

    #[tokio::test]
    async fn test_row_writes_reach_every_subscriber() {
        let backend = MemoryBackend::new();
        backend.create_room(new_room("AAAAAA")).await.unwrap();
        let mut a = backend.subscribe("AAAAAA", "player_a").await.unwrap();
        let mut b = backend.subscribe("AAAAAA", "player_b").await.unwrap();

        // The join of b is announced to a only.
        assert!(matches!(
            a.try_next(),
            Some(SyncEvent::PresenceJoined { player_id }) if player_id == "player_b"
        ));
        assert!(b.try_next().is_none());

        backend
            .upsert_player("AAAAAA", player_row("player_a", 0))
            .await
            .unwrap();

        // Row changes carry no sender: the writer hears its own write.
        assert!(matches!(a.try_next(), Some(SyncEvent::PlayerAdded { .. })));
        assert!(matches!(b.try_next(), Some(SyncEvent::PlayerAdded { .. })));
    }

    #[tokio::test]
    async fn test_upsert_distinguishes_insert_from_update() {
        let backend = MemoryBackend::new();
        backend.create_room(new_room("AAAAAA")).await.unwrap();
        let mut feed = backend.subscribe("AAAAAA", "player_a").await.unwrap();

        backend
            .upsert_player("AAAAAA", player_row("player_a", 0))
            .await
            .unwrap();
        let mut row = player_row("player_a", 0);
        row.position = "Igreja".to_string();
        backend.upsert_player("AAAAAA", row).await.unwrap();

        assert!(matches!(feed.try_next(), Some(SyncEvent::PlayerAdded { .. })));
        match feed.try_next() {
            Some(SyncEvent::PlayerUpdated { update }) => {
                assert_eq!(update.position.as_deref(), Some("Igreja"));
            }
            other => panic!("expected PlayerUpdated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_room_code_is_rejected() {
        let backend = MemoryBackend::new();
        backend.create_room(new_room("AAAAAA")).await.unwrap();
        assert!(matches!(
            backend.create_room(new_room("AAAAAA")).await,
            Err(BackendError::CodeTaken)
        ));
    }

    #[tokio::test]
    async fn test_dropping_a_subscription_announces_leave() {
        let backend = MemoryBackend::new();
        backend.create_room(new_room("AAAAAA")).await.unwrap();
        let mut a = backend.subscribe("AAAAAA", "player_a").await.unwrap();
        let b = backend.subscribe("AAAAAA", "player_b").await.unwrap();

        assert!(matches!(a.try_next(), Some(SyncEvent::PresenceJoined { .. })));
        drop(b);
        assert!(matches!(
            a.try_next(),
            Some(SyncEvent::PresenceLeft { player_id }) if player_id == "player_b"
        ));
    }

    #[tokio::test]
    async fn test_deleting_a_room_closes_its_feed() {
        let backend = MemoryBackend::new();
        backend.create_room(new_room("AAAAAA")).await.unwrap();
        let mut feed = backend.subscribe("AAAAAA", "player_a").await.unwrap();

        backend.delete_room("AAAAAA").await.unwrap();
        assert!(matches!(feed.try_next(), Some(SyncEvent::RoomDeleted)));
        assert!(backend.fetch_room("AAAAAA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_room_listing_skips_private_rooms() {
        let backend = MemoryBackend::new();
        backend.create_room(new_room("AAAAAA")).await.unwrap();
        let mut hidden = new_room("BBBBBB");
        hidden.is_private = true;
        backend.create_room(hidden).await.unwrap();

        let open = backend.list_open_rooms().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].code, "AAAAAA");
    }
}
