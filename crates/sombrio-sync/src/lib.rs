//! Async synchronization layer for Mundo Sombrio
//!
//! This crate drives a [`sombrio_core::GameSession`] over a realtime backend:
//! rooms and player rows persist shared state, broadcasts carry action
//! deltas, and a per-client task reconciles both into a converging session.
//!
//! # Modules
//!
//! - [`backend`]: The realtime backend trait and its row types
//! - [`memory`]: An in-process backend for tests and simulations
//! - [`room`]: Room codes and the create/join/leave/list lifecycle
//! - [`client`]: The per-client sync task and its handle

pub mod backend;
pub mod client;
pub mod memory;
pub mod room;

// Re-export commonly used types
pub use backend::{BackendError, NewRoom, RealtimeBackend, RoomRow, RoomStatePatch, Subscription};
pub use client::{mint_player_id, ClientError, ClientHandle, SessionSnapshot, SyncClient};
pub use memory::MemoryBackend;
pub use room::{generate_room_code, RoomError, RoomService, ROOM_CODE_ALPHABET, ROOM_CODE_LENGTH};
