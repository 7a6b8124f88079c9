//! Headless convergence simulator.
//!
//! Runs a full multiplayer session over the in-memory backend: a host
//! creates a room, peers join, every client plays its scripted turns, and
//! the run ends by checking that all clients hold identical shared state.

use anyhow::{bail, Context};
use sombrio_core::{
    is_location, CardDefinition, CardStatus, Character, DeckDefinition, GameAction, GameEvent,
    GameSession, MapGraph, Mounting, Player, Roster, Talent, MAX_PLAYERS,
};
use sombrio_sync::{ClientHandle, MemoryBackend, SyncClient};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn demo_map() -> MapGraph {
    let edges = [
        ("path001", "Igreja"),
        ("path001", "path002"),
        ("path002", "Mercado"),
        ("path002", "path003"),
        ("path003", "Biblioteca"),
        ("path003", "path004"),
        ("path004", "Cemiterio"),
        ("path004", "path005"),
        ("path005", "Farol"),
        ("path005", "path001"),
        ("Mercado", "Estacao"),
    ];
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for (a, b) in edges {
        adjacency
            .entry(a.to_string())
            .or_default()
            .push(b.to_string());
        adjacency
            .entry(b.to_string())
            .or_default()
            .push(a.to_string());
    }
    MapGraph::new(adjacency, "path001")
}

fn talent(id: &str, levels: &[i32], mounting_rounds: Option<u32>) -> Talent {
    Talent {
        id: id.to_string(),
        levels: levels.to_vec(),
        mounting_rounds,
    }
}

fn demo_roster() -> Roster {
    let spec: [(&str, &str, u32, i32, &str, Option<u32>); 6] = [
        ("explorador", "Explorador", 0x2e7d32, 3, "geografia", None),
        ("ocultista", "Ocultista", 0x6a1b9a, 2, "traducao", Some(4)),
        ("doutora", "Doutora", 0x1565c0, 2, "inteligencia", Some(3)),
        ("cacador", "Cacador", 0x8b0000, 4, "tecnologia", None),
        ("padre", "Padre", 0x37474f, 2, "dinheiro", Some(2)),
        ("viajante", "Viajante", 0xef6c00, 3, "geografia", Some(1)),
    ];
    Roster::new(
        spec.iter()
            .map(|(id, name, color, movement, talent_id, rounds)| Character {
                id: id.to_string(),
                name: name.to_string(),
                talents: vec![
                    talent("max_health", &[10, 12, 15], None),
                    talent("movement", &[*movement, movement + 1], None),
                    talent("tracking", &[2, 3], None),
                    talent(talent_id, &[0, 1, 2], *rounds),
                ],
                abilities: Vec::new(),
                color: *color,
            })
            .collect(),
    )
}

fn card(id: &str, name: &str, quantity: u32, talents: &[&str]) -> CardDefinition {
    CardDefinition {
        id: id.to_string(),
        name: name.to_string(),
        card_type: "item".to_string(),
        effect: String::new(),
        quantity,
        mounting: if talents.is_empty() {
            None
        } else {
            Some(Mounting {
                required_talents: talents.iter().map(|t| t.to_string()).collect(),
            })
        },
    }
}

fn demo_decks() -> BTreeMap<String, DeckDefinition> {
    let mut decks = BTreeMap::new();
    decks.insert(
        "verde".to_string(),
        DeckDefinition {
            name: "Verde".to_string(),
            color: "#2e7d32".to_string(),
            min_roll: 1,
            max_roll: 10,
            cards: vec![
                card("velas", "Velas", 3, &[]),
                card("mapa_rasgado", "Mapa Rasgado", 2, &[]),
            ],
        },
    );
    decks.insert(
        "azul".to_string(),
        DeckDefinition {
            name: "Azul".to_string(),
            color: "#1565c0".to_string(),
            min_roll: 8,
            max_roll: 16,
            cards: vec![
                card("lanterna", "Lanterna", 2, &["tecnologia"]),
                card("binoculo", "Binoculo", 2, &[]),
            ],
        },
    );
    decks.insert(
        "vermelho".to_string(),
        DeckDefinition {
            name: "Vermelho".to_string(),
            color: "#b71c1c".to_string(),
            min_roll: 14,
            max_roll: 25,
            cards: vec![
                card("grimorio", "Grimorio", 2, &["inteligencia", "traducao"]),
                card("relicario", "Relicario", 1, &["dinheiro"]),
            ],
        },
    );
    decks
}

fn demo_session() -> GameSession {
    GameSession::new(demo_map(), demo_roster(), demo_decks())
}

fn env_usize(name: &str, default: usize) -> anyhow::Result<usize> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a number", name)),
        Err(_) => Ok(default),
    }
}

/// Let spawned effect tasks and client loops drain their queues.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

async fn current_player(handle: &ClientHandle) -> anyhow::Result<Player> {
    let snapshot = handle.snapshot().await?;
    snapshot
        .players
        .get(snapshot.room.current_player_index)
        .cloned()
        .context("no current player")
}

/// One scripted turn: move somewhere, spend the main action if a location
/// allows it, end the turn.
async fn play_turn(handle: &ClientHandle) -> anyhow::Result<()> {
    handle.perform(GameAction::StartMovement).await?;
    let destination = handle
        .available_actions()
        .await?
        .into_iter()
        .filter_map(|action| match action {
            GameAction::ConfirmMovement { destination } => Some(destination),
            _ => None,
        })
        .min();
    match destination {
        Some(destination) => {
            handle
                .perform(GameAction::ConfirmMovement { destination })
                .await?;
        }
        None => {
            handle.perform(GameAction::CancelMovement).await?;
        }
    }

    let me = current_player(handle).await?;
    if is_location(&me.position) {
        if let Some(card) = me.cards.iter().find(|c| c.status() == CardStatus::Mounting) {
            handle
                .perform(GameAction::AdvanceMounting {
                    card_id: card.id.clone(),
                })
                .await?;
        } else if let Some(card) = me
            .cards
            .iter()
            .find(|c| c.status() == CardStatus::Unmounted)
        {
            handle
                .perform(GameAction::StartMounting {
                    card_id: card.id.clone(),
                })
                .await?;
        } else {
            let events = handle.perform(GameAction::ExecuteTracking).await?;
            let offered = events
                .iter()
                .find_map(|event| match event {
                    GameEvent::TrackingRolled { decks, .. } => Some(decks.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            if let Some(deck) = offered.iter().find(|d| !d.is_empty) {
                handle
                    .perform(GameAction::SelectDeck {
                        deck_id: deck.id.clone(),
                    })
                    .await?;
            }
        }
    }

    handle.perform(GameAction::EndTurn).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let players = env_usize("SIM_PLAYERS", 3)?.clamp(2, MAX_PLAYERS);
    let turns = env_usize("SIM_TURNS", 12)?;

    info!(
        "Starting simulation: {} players, {} turns",
        players, turns
    );

    let backend = Arc::new(MemoryBackend::new());
    let (client, host, host_events) = SyncClient::host(
        Arc::clone(&backend),
        demo_session(),
        "Simulacao",
        "Anfitriao",
    )
    .await?;
    tokio::spawn(client.run());
    info!("Room {} created", host.room_code());

    let mut handles = vec![host.clone()];
    let mut event_feeds = vec![host_events];
    for _ in 1..players {
        let (client, handle, events) =
            SyncClient::join(Arc::clone(&backend), demo_session(), host.room_code()).await?;
        tokio::spawn(client.run());
        handles.push(handle);
        event_feeds.push(events);
    }
    settle().await;

    // Everyone picks a character and sits down, in join order.
    let roster = demo_roster();
    for (index, handle) in handles.iter().enumerate() {
        let character = roster
            .iter()
            .nth(index)
            .context("not enough characters for the requested players")?;
        handle
            .perform(GameAction::AddPlayer {
                id: handle.player_id().to_string(),
                name: format!("Jogador {}", index + 1),
                character_id: character.id.clone(),
            })
            .await?;
        settle().await;
    }

    host.perform(GameAction::StartGame).await?;
    settle().await;

    for turn in 0..turns {
        let handle = &handles[turn % handles.len()];
        play_turn(handle).await?;
        settle().await;
    }

    // Every client must have converged on the host's view.
    let reference = host.snapshot().await?;
    for handle in &handles[1..] {
        let snapshot = handle.snapshot().await?;
        if snapshot != reference {
            bail!("client {} diverged from the host", handle.player_id());
        }
    }
    let cards: usize = reference.players.iter().map(|p| p.cards.len()).sum();
    info!(
        "Converged: {} players, {} turns, {} cards drawn",
        handles.len(),
        turns,
        cards
    );

    for handle in &handles {
        handle.leave().await?;
        settle().await;
    }
    drop(event_feeds);

    info!("Simulation complete");
    Ok(())
}
