//! Mundo Sombrio - a cooperative exploration board game engine
//!
//! This crate provides the core game logic for Mundo Sombrio, including:
//! - The tile graph and breadth-first movement resolution
//! - Characters, talents and per-player derived stats
//! - Finite card decks, tracking rolls and the mounting flow
//! - The turn state machine with once-per-turn action flags
//! - A reconciler that keeps peer sessions converging over a
//!   rows-plus-broadcasts realtime backend
//!
//! # Architecture
//!
//! The engine is synchronous and platform-agnostic. It can be compiled to:
//! - Native Rust, driven by an async sync client
//! - WebAssembly, with the hosting page supplying the realtime transport
//!
//! # Modules
//!
//! - [`map`]: Tile graph, path/location partition and reachability
//! - [`character`]: Characters, talents and player stats
//! - [`cards`]: Decks, weighted draws and mounting
//! - [`player`]: Players and the turn-order registry
//! - [`game`]: Session state machine
//! - [`sync`]: Synchronization vocabulary and the reconciler

pub mod actions;
pub mod cards;
pub mod character;
pub mod game;
pub mod map;
pub mod player;
pub mod sync;
#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use actions::{GameAction, GameEvent};
pub use cards::{Card, CardDefinition, CardStatus, DeckChoice, DeckDefinition, DeckSet, Mounting};
pub use character::{Ability, AbilityKind, Character, PlayerState, Roster, Talent};
pub use game::{GameError, GameSession, MovementPlan, TurnActions};
pub use map::{is_location, MapGraph, TileId};
pub use player::{Player, PlayerRegistry, MAX_PLAYERS};
pub use sync::{
    ActionOutcome, BroadcastEnvelope, GameBroadcast, PlayerRow, PlayerRowUpdate, Reconciler,
    RoomSnapshot, RoomStatus, SyncEffect, SyncEvent,
};
