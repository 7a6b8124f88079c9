//! The client event loop.
//!
//! One task owns the [`Reconciler`] and serves two sources: local intents
//! coming through a [`ClientHandle`] and remote [`SyncEvent`]s from the
//! backend subscription. Local actions apply optimistically; the resulting
//! effects are persisted and broadcast in the background and a failure there
//! never rolls the local session back.

use crate::backend::{RealtimeBackend, RoomStatePatch, Subscription};
use crate::room::{RoomError, RoomService};
use sombrio_core::{
    BroadcastEnvelope, GameAction, GameBroadcast, GameError, GameEvent, GameSession, Player,
    Reconciler, RoomSnapshot, SyncEffect, MAX_PLAYERS,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error("Sync client stopped")]
    Stopped,
}

/// Mint the identity a client carries for its lifetime.
pub fn mint_player_id() -> String {
    format!("player_{}", Uuid::new_v4())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A copy of the client's current shared state, for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub room: RoomSnapshot,
    pub players: Vec<Player>,
}

enum Command {
    Perform {
        action: GameAction,
        reply: oneshot::Sender<Result<Vec<GameEvent>, GameError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    AvailableActions {
        reply: oneshot::Sender<Vec<GameAction>>,
    },
    Chat {
        message: String,
        reply: oneshot::Sender<()>,
    },
    Leave {
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
}

/// Cheap, cloneable control surface for a running [`SyncClient`].
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    code: String,
    player_id: String,
}

impl ClientHandle {
    pub fn room_code(&self) -> &str {
        &self.code
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Apply an action to the local session and schedule its effects.
    pub async fn perform(&self, action: GameAction) -> Result<Vec<GameEvent>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Perform { action, reply: tx })
            .map_err(|_| ClientError::Stopped)?;
        let result = rx.await.map_err(|_| ClientError::Stopped)?;
        result.map_err(ClientError::Game)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply: tx })
            .map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    pub async fn available_actions(&self) -> Result<Vec<GameAction>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::AvailableActions { reply: tx })
            .map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    /// Publish a table-chat line to the other clients.
    pub async fn send_chat(&self, message: impl Into<String>) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Chat {
                message: message.into(),
                reply: tx,
            })
            .map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    /// Leave the room and stop the client task.
    pub async fn leave(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Leave { reply: tx })
            .map_err(|_| ClientError::Stopped)?;
        let result = rx.await.map_err(|_| ClientError::Stopped)?;
        result.map_err(ClientError::Room)
    }
}

/// The event loop. Construct with [`SyncClient::host`], [`SyncClient::join`]
/// or [`SyncClient::reconnect`], then drive it with `run` on a task of its
/// own.
pub struct SyncClient<B: RealtimeBackend> {
    backend: Arc<B>,
    code: String,
    player_id: String,
    reconciler: Reconciler,
    subscription: Subscription,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<GameEvent>,
}

type Connected<B> = (
    SyncClient<B>,
    ClientHandle,
    mpsc::UnboundedReceiver<GameEvent>,
);

impl<B: RealtimeBackend> SyncClient<B> {
    /// Create a room seeded with the session's state and connect to it.
    pub async fn host(
        backend: Arc<B>,
        session: GameSession,
        room_name: &str,
        host_name: &str,
    ) -> Result<Connected<B>, ClientError> {
        let player_id = mint_player_id();
        let rooms = RoomService::new(Arc::clone(&backend));
        let row = rooms
            .create(
                room_name,
                host_name,
                &player_id,
                MAX_PLAYERS as u32,
                false,
                RoomSnapshot::capture(&session),
            )
            .await?;
        Self::connect(backend, session, row.code, player_id).await
    }

    /// Join a waiting room by code and connect to it.
    pub async fn join(
        backend: Arc<B>,
        session: GameSession,
        code: &str,
    ) -> Result<Connected<B>, ClientError> {
        let player_id = mint_player_id();
        let rooms = RoomService::new(Arc::clone(&backend));
        let row = rooms.join(code).await?;
        Self::connect(backend, session, row.code, player_id).await
    }

    /// Reattach to a room the player already belongs to, bypassing the
    /// waiting-room guards. Used after a disconnect mid-game.
    pub async fn reconnect(
        backend: Arc<B>,
        session: GameSession,
        code: &str,
        player_id: String,
    ) -> Result<Connected<B>, ClientError> {
        let code = code.trim().to_uppercase();
        Self::connect(backend, session, code, player_id).await
    }

    /// Subscribe first, then fetch and resync, so every change since the
    /// fetch is replayed through the feed rather than lost.
    async fn connect(
        backend: Arc<B>,
        session: GameSession,
        code: String,
        player_id: String,
    ) -> Result<Connected<B>, ClientError> {
        let mut reconciler = Reconciler::new(session, player_id.clone());

        let subscription = backend
            .subscribe(&code, &player_id)
            .await
            .map_err(RoomError::from)?;
        let room = backend
            .fetch_room(&code)
            .await
            .map_err(RoomError::from)?
            .ok_or(RoomError::RoomNotFound)?;
        let rows = backend.fetch_players(&code).await.map_err(RoomError::from)?;
        let resync_events = reconciler.resync(room.state, rows);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        for event in resync_events {
            let _ = event_tx.send(event);
        }

        info!("Player {} connected to room {}", player_id, code);

        let client = Self {
            backend,
            code: code.clone(),
            player_id: player_id.clone(),
            reconciler,
            subscription,
            commands: command_rx,
            events: event_tx,
        };
        let handle = ClientHandle {
            commands: command_tx,
            code,
            player_id,
        };
        Ok((client, handle, event_rx))
    }

    /// Drive the client until the room closes, the feed ends, or every
    /// handle is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Perform { action, reply }) => {
                        match self.reconciler.perform(action) {
                            Ok(outcome) => {
                                self.forward(&outcome.events);
                                self.dispatch(outcome.effects);
                                let _ = reply.send(Ok(outcome.events));
                            }
                            Err(error) => {
                                let _ = reply.send(Err(error));
                            }
                        }
                    }
                    Some(Command::Snapshot { reply }) => {
                        let session = self.reconciler.session();
                        let _ = reply.send(SessionSnapshot {
                            room: RoomSnapshot::capture(session),
                            players: session.registry.players().to_vec(),
                        });
                    }
                    Some(Command::AvailableActions { reply }) => {
                        let _ = reply.send(self.reconciler.session().available_actions());
                    }
                    Some(Command::Chat { message, reply }) => {
                        // Chat carries the seated name, not the player id.
                        let from = self
                            .reconciler
                            .session()
                            .find_player(&self.player_id)
                            .map(|p| p.name.clone())
                            .unwrap_or_else(|| self.player_id.clone());
                        self.dispatch(vec![SyncEffect::Broadcast(GameBroadcast::ChatMessage {
                            from,
                            message,
                            timestamp: now_millis(),
                        })]);
                        let _ = reply.send(());
                    }
                    Some(Command::Leave { reply }) => {
                        let rooms = RoomService::new(Arc::clone(&self.backend));
                        let result = rooms.leave(&self.code, &self.player_id).await;
                        let _ = reply.send(result);
                        break;
                    }
                    None => break,
                },
                event = self.subscription.next() => match event {
                    Some(event) => match self.reconciler.receive(event) {
                        Ok(events) => self.forward(&events),
                        Err(error) => {
                            warn!("Remote event could not be applied: {}", error);
                        }
                    },
                    None => {
                        info!("Room {} feed closed", self.code);
                        break;
                    }
                },
            }
        }
    }

    fn forward(&self, events: &[GameEvent]) {
        for event in events {
            let _ = self.events.send(event.clone());
        }
    }

    /// Execute effects off the loop: persistence and broadcasts must never
    /// block play, and a failure only gets logged.
    fn dispatch(&self, effects: Vec<SyncEffect>) {
        if effects.is_empty() {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let code = self.code.clone();
        let sender_id = self.player_id.clone();
        tokio::spawn(async move {
            for effect in effects {
                let result = match effect {
                    SyncEffect::PersistRoom(room) => {
                        backend
                            .update_room(&code, RoomStatePatch::game_state(room))
                            .await
                    }
                    SyncEffect::PersistPlayer(row) => backend.upsert_player(&code, row).await,
                    SyncEffect::DeletePlayerRow { player_id } => {
                        backend.delete_player(&code, &player_id).await
                    }
                    SyncEffect::Broadcast(action) => {
                        let envelope = BroadcastEnvelope {
                            sender_id: sender_id.clone(),
                            timestamp: now_millis(),
                            action,
                        };
                        backend.broadcast(&code, envelope).await
                    }
                };
                if let Err(error) = result {
                    warn!("Sync effect failed: {}", error);
                }
            }
        });
    }
}
