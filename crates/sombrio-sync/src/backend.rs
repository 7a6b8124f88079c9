//! The realtime backend capability.
//!
//! The game treats its backend as an opaque row store with change
//! notifications plus a per-room broadcast channel and presence. This module
//! defines that capability as a trait so the rest of the crate never depends
//! on a concrete service.

use serde::{Deserialize, Serialize};
use sombrio_core::{BroadcastEnvelope, PlayerRow, RoomSnapshot, SyncEvent};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Room code already exists")]
    CodeTaken,

    #[error("Backend request failed: {0}")]
    Request(String),
}

/// A room row as stored by the backend: the lobby columns plus the shared
/// game-state columns of [`RoomSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRow {
    pub code: String,
    pub name: String,
    pub host_name: String,
    pub host_player_id: String,
    pub max_players: u32,
    pub current_players: u32,
    #[serde(default)]
    pub is_private: bool,
    #[serde(flatten)]
    pub state: RoomSnapshot,
}

/// Parameters for inserting a room row.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub code: String,
    pub name: String,
    pub host_name: String,
    pub host_player_id: String,
    pub max_players: u32,
    pub is_private: bool,
    pub state: RoomSnapshot,
}

/// A partial room update; only the present fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_players: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RoomSnapshot>,
}

impl RoomStatePatch {
    /// Patch only the shared game-state columns.
    pub fn game_state(state: RoomSnapshot) -> Self {
        Self {
            current_players: None,
            state: Some(state),
        }
    }

    /// Patch only the lobby player count.
    pub fn player_count(current_players: u32) -> Self {
        Self {
            current_players: Some(current_players),
            state: None,
        }
    }
}

/// A live feed of one room's [`SyncEvent`]s.
///
/// Dropping the subscription detaches from the room; backends announce the
/// departure to the remaining subscribers as `PresenceLeft`.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<SyncEvent>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<SyncEvent>) -> Self {
        Self { rx, on_drop: None }
    }

    /// A subscription that runs `cleanup` when dropped.
    pub fn with_cleanup(
        rx: mpsc::UnboundedReceiver<SyncEvent>,
        cleanup: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            on_drop: Some(Box::new(cleanup)),
        }
    }

    /// Wait for the next event. `None` means the backend closed the feed.
    pub async fn next(&mut self) -> Option<SyncEvent> {
        self.rx.recv().await
    }

    /// Take an already queued event without waiting.
    pub fn try_next(&mut self) -> Option<SyncEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cleanup) = self.on_drop.take() {
            cleanup();
        }
    }
}

/// The backend capability: room rows, player rows, broadcasts, presence.
///
/// Every row write fans the matching row-change [`SyncEvent`] out to all of
/// the room's subscribers, the writer included; only broadcast envelopes
/// carry a sender id for self-filtering.
pub trait RealtimeBackend: Send + Sync + 'static {
    /// Insert a room row. Fails with [`BackendError::CodeTaken`] when the
    /// code is already in use.
    fn create_room(&self, room: NewRoom) -> impl Future<Output = Result<RoomRow, BackendError>> + Send;

    fn fetch_room(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<RoomRow>, BackendError>> + Send;

    /// Apply a patch to a room row. Patching an unknown room is a no-op.
    fn update_room(
        &self,
        code: &str,
        patch: RoomStatePatch,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn delete_room(&self, code: &str) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Public rooms still waiting for players.
    fn list_open_rooms(&self) -> impl Future<Output = Result<Vec<RoomRow>, BackendError>> + Send;

    fn upsert_player(
        &self,
        code: &str,
        row: PlayerRow,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// All player rows of a room, ordered by `turn_order`.
    fn fetch_players(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Vec<PlayerRow>, BackendError>> + Send;

    fn delete_player(
        &self,
        code: &str,
        player_id: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Publish an envelope on the room's broadcast channel.
    fn broadcast(
        &self,
        code: &str,
        envelope: BroadcastEnvelope,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Attach to the room's event feed and announce presence.
    fn subscribe(
        &self,
        code: &str,
        player_id: &str,
    ) -> impl Future<Output = Result<Subscription, BackendError>> + Send;
}
