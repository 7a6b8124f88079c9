//! Room lifecycle: codes, create, join, leave.

use crate::backend::{BackendError, NewRoom, RealtimeBackend, RoomRow, RoomStatePatch};
use rand::Rng;
use sombrio_core::{RoomSnapshot, RoomStatus, MAX_PLAYERS};
use std::sync::Arc;
use thiserror::Error;

/// Characters usable in room codes. Lookalikes (0/O, 1/I) are left out so
/// codes survive being read aloud.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const ROOM_CODE_LENGTH: usize = 6;

const CODE_ATTEMPTS: usize = 16;

const MAX_ROOM_NAME: usize = 30;
const MAX_HOST_NAME: usize = 20;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Game already in progress")]
    GameInProgress,

    #[error("Room is full")]
    RoomFull,

    #[error("Not in a room")]
    NotInRoom,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Generate a room code.
pub fn generate_room_code<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

fn truncated(value: &str, max: usize) -> String {
    value.trim().chars().take(max).collect()
}

/// Room directory operations over a backend.
pub struct RoomService<B> {
    backend: Arc<B>,
}

impl<B: RealtimeBackend> RoomService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Create a room and join it as the host. The initial game-state columns
    /// are seeded from `state` so late fetches see the full deck counts.
    pub async fn create(
        &self,
        name: &str,
        host_name: &str,
        host_player_id: &str,
        max_players: u32,
        is_private: bool,
        state: RoomSnapshot,
    ) -> Result<RoomRow, RoomError> {
        let name = truncated(name, MAX_ROOM_NAME);
        let host_name = truncated(host_name, MAX_HOST_NAME);
        let max_players = max_players.clamp(2, MAX_PLAYERS as u32);

        let mut rng = rand::thread_rng();
        for _ in 0..CODE_ATTEMPTS {
            let room = NewRoom {
                code: generate_room_code(&mut rng),
                name: name.clone(),
                host_name: host_name.clone(),
                host_player_id: host_player_id.to_string(),
                max_players,
                is_private,
                state: state.clone(),
            };
            match self.backend.create_room(room).await {
                Ok(row) => return Ok(row),
                Err(BackendError::CodeTaken) => continue,
                Err(error) => return Err(error.into()),
            }
        }
        Err(BackendError::Request("could not allocate a room code".to_string()).into())
    }

    /// Join a waiting room by code.
    pub async fn join(&self, code: &str) -> Result<RoomRow, RoomError> {
        let code = code.trim().to_uppercase();
        let room = self
            .backend
            .fetch_room(&code)
            .await?
            .ok_or(RoomError::RoomNotFound)?;

        if room.state.status != RoomStatus::Waiting {
            return Err(RoomError::GameInProgress);
        }
        if room.current_players >= room.max_players {
            return Err(RoomError::RoomFull);
        }

        let current_players = room.current_players + 1;
        self.backend
            .update_room(&code, RoomStatePatch::player_count(current_players))
            .await?;
        Ok(RoomRow {
            current_players,
            ..room
        })
    }

    /// Leave a room: drop the caller's player row, then either persist the
    /// reduced count or delete the room once it empties.
    pub async fn leave(&self, code: &str, player_id: &str) -> Result<(), RoomError> {
        self.backend.delete_player(code, player_id).await?;
        let room = self
            .backend
            .fetch_room(code)
            .await?
            .ok_or(RoomError::NotInRoom)?;

        let current_players = room.current_players.saturating_sub(1);
        if current_players == 0 {
            self.backend.delete_room(code).await?;
        } else {
            self.backend
                .update_room(code, RoomStatePatch::player_count(current_players))
                .await?;
        }
        Ok(())
    }

    /// Public rooms still waiting for players, for the room browser.
    pub async fn list(&self) -> Result<Vec<RoomRow>, RoomError> {
        Ok(self.backend.list_open_rooms().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn service() -> RoomService<MemoryBackend> {
        RoomService::new(Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn test_codes_use_the_safe_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = generate_room_code(&mut rng);
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            for c in code.bytes() {
                assert!(
                    ROOM_CODE_ALPHABET.contains(&c),
                    "unexpected code character {}",
                    c as char
                );
                assert!(!b"0O1I".contains(&c), "lookalike character {}", c as char);
            }
        }
    }

    #[tokio::test]
    async fn test_create_clamps_names_and_capacity() {
        let rooms = service();
        let long_name = "x".repeat(80);
        let row = rooms
            .create(&long_name, &long_name, "player_h", 99, false, RoomSnapshot::default())
            .await
            .unwrap();

        assert_eq!(row.name.len(), 30);
        assert_eq!(row.host_name.len(), 20);
        assert_eq!(row.max_players, MAX_PLAYERS as u32);
        assert_eq!(row.current_players, 1);
        assert_eq!(row.state.status, RoomStatus::Waiting);
    }

    #[tokio::test]
    async fn test_join_is_case_insensitive_and_counts() {
        let rooms = service();
        let row = rooms
            .create("Sala", "Ana", "player_h", 4, false, RoomSnapshot::default())
            .await
            .unwrap();

        let joined = rooms.join(&row.code.to_lowercase()).await.unwrap();
        assert_eq!(joined.code, row.code);
        assert_eq!(joined.current_players, 2);
    }

    #[tokio::test]
    async fn test_join_guards() {
        let rooms = service();
        assert!(matches!(
            rooms.join("ZZZZZZ").await,
            Err(RoomError::RoomNotFound)
        ));

        let row = rooms
            .create("Sala", "Ana", "player_h", 2, false, RoomSnapshot::default())
            .await
            .unwrap();
        rooms.join(&row.code).await.unwrap();
        assert!(matches!(
            rooms.join(&row.code).await,
            Err(RoomError::RoomFull)
        ));

        let playing = RoomSnapshot {
            status: RoomStatus::Playing,
            ..RoomSnapshot::default()
        };
        let started = rooms
            .create("Partida", "Bia", "player_b", 4, false, playing)
            .await
            .unwrap();
        assert!(matches!(
            rooms.join(&started.code).await,
            Err(RoomError::GameInProgress)
        ));
    }

    #[tokio::test]
    async fn test_last_leave_deletes_the_room() {
        let backend = Arc::new(MemoryBackend::new());
        let rooms = RoomService::new(Arc::clone(&backend));
        let row = rooms
            .create("Sala", "Ana", "player_h", 4, false, RoomSnapshot::default())
            .await
            .unwrap();
        rooms.join(&row.code).await.unwrap();

        rooms.leave(&row.code, "player_x").await.unwrap();
        let remaining = backend.fetch_room(&row.code).await.unwrap().unwrap();
        assert_eq!(remaining.current_players, 1);

        rooms.leave(&row.code, "player_h").await.unwrap();
        assert!(backend.fetch_room(&row.code).await.unwrap().is_none());
    }
}
