//! Card decks, acquisition and the mounting model.
//!
//! Decks are finite: every card definition carries a quantity, and the
//! live counts are tracked per deck and per card so draws can be weighted
//! by what is actually left. Some cards must be mounted over several
//! rounds before their effect applies; the number of rounds comes from the
//! player's trained talents.

use crate::character::{Character, PlayerState};
use crate::game::GameError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Mounting rounds used for a required talent the player has not trained,
/// or that has no configured override.
pub fn default_mounting_rounds(talent_id: &str) -> u32 {
    match talent_id {
        "inteligencia" => 5,
        "tecnologia" => 6,
        "dinheiro" => 4,
        "geografia" => 3,
        "traducao" => 7,
        _ => 5,
    }
}

/// Mounting requirements attached to a card. Cards without this block can
/// never enter the mounting flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mounting {
    pub required_talents: Vec<String>,
}

/// A card as defined in the deck data, before any copy is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: String,
    #[serde(default)]
    pub effect: String,
    /// Copies of this card in a fresh deck.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounting: Option<Mounting>,
}

fn default_quantity() -> u32 {
    1
}

/// A deck: display data, the tracking roll range that selects it, and its
/// card definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckDefinition {
    pub name: String,
    pub color: String,
    pub min_roll: i32,
    pub max_roll: i32,
    pub cards: Vec<CardDefinition>,
}

/// A drawn copy of a card, owned by a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: String,
    #[serde(default)]
    pub effect: String,
    /// Display name of the deck this copy came from.
    pub deck: String,
    pub deck_id: String,
    #[serde(default)]
    pub mounted: bool,
    #[serde(default)]
    pub mounting_progress: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounting: Option<Mounting>,
}

/// Display status of a card, derived from its fields. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    /// No mounting requirements; usable as drawn.
    Ready,
    /// Mountable but not yet started.
    Unmounted,
    /// Mounting underway.
    Mounting,
    /// Mounting finished.
    Mounted,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Ready => "ready",
            CardStatus::Unmounted => "unmounted",
            CardStatus::Mounting => "mounting",
            CardStatus::Mounted => "mounted",
        }
    }
}

impl Card {
    /// The one derivation of card status. The `mounting: None` check comes
    /// first: a card without requirements is `Ready` no matter what the
    /// progress fields say.
    pub fn status(&self) -> CardStatus {
        if self.mounting.is_none() {
            CardStatus::Ready
        } else if self.mounted {
            CardStatus::Mounted
        } else if self.mounting_progress > 0 {
            CardStatus::Mounting
        } else {
            CardStatus::Unmounted
        }
    }

    /// Rounds this card takes to mount for the given player.
    ///
    /// Cards without requirements take 0 rounds, an empty requirement list
    /// takes 1, otherwise the minimum over the required talents: a trained
    /// talent contributes its configured rounds (or the default for its
    /// id), an untrained one always contributes the default.
    pub fn rounds_required(&self, character: &Character, state: &PlayerState) -> u32 {
        let Some(mounting) = &self.mounting else {
            return 0;
        };
        if mounting.required_talents.is_empty() {
            return 1;
        }
        mounting
            .required_talents
            .iter()
            .map(|talent_id| {
                if state.has_trained(talent_id) {
                    character
                        .talent(talent_id)
                        .and_then(|t| t.mounting_rounds)
                        .unwrap_or_else(|| default_mounting_rounds(talent_id))
                } else {
                    default_mounting_rounds(talent_id)
                }
            })
            .min()
            .unwrap_or(1)
    }
}

/// Count cards per `(id, status)` pair, the grouping the hand display uses.
pub fn group_cards(cards: &[Card]) -> HashMap<(String, CardStatus), usize> {
    let mut groups: HashMap<(String, CardStatus), usize> = HashMap::new();
    for card in cards {
        *groups.entry((card.id.clone(), card.status())).or_default() += 1;
    }
    groups
}

/// A deck as offered after a tracking roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckChoice {
    pub id: String,
    pub name: String,
    pub color: String,
    pub min_roll: i32,
    pub max_roll: i32,
    pub remaining: u32,
    pub is_empty: bool,
}

/// All decks plus their live quantities.
///
/// `deck_quantities` always equals the per-deck sum of `card_quantities`;
/// both maps are kept because they are persisted and merged independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckSet {
    decks: BTreeMap<String, DeckDefinition>,
    deck_quantities: HashMap<String, u32>,
    card_quantities: HashMap<String, HashMap<String, u32>>,
}

impl DeckSet {
    pub fn new(decks: BTreeMap<String, DeckDefinition>) -> Self {
        let mut set = Self {
            decks,
            deck_quantities: HashMap::new(),
            card_quantities: HashMap::new(),
        };
        set.reset();
        set
    }

    /// Restore every quantity to the definition counts.
    pub fn reset(&mut self) {
        self.deck_quantities.clear();
        self.card_quantities.clear();
        for (deck_id, definition) in &self.decks {
            let mut counts = HashMap::new();
            let mut total = 0;
            for card in &definition.cards {
                *counts.entry(card.id.clone()).or_insert(0) += card.quantity;
                total += card.quantity;
            }
            self.card_quantities.insert(deck_id.clone(), counts);
            self.deck_quantities.insert(deck_id.clone(), total);
        }
    }

    pub fn definition(&self, deck_id: &str) -> Option<&DeckDefinition> {
        self.decks.get(deck_id)
    }

    /// Cards left in a deck, 0 for unknown decks.
    pub fn remaining(&self, deck_id: &str) -> u32 {
        self.deck_quantities.get(deck_id).copied().unwrap_or(0)
    }

    pub fn is_deck_empty(&self, deck_id: &str) -> bool {
        self.remaining(deck_id) == 0
    }

    /// Decks whose roll range contains `total`, annotated with what is
    /// left. Empty decks stay in the list so they can be shown as spent.
    pub fn available_decks(&self, total: i32) -> Vec<DeckChoice> {
        self.decks
            .iter()
            .filter(|(_, d)| d.min_roll <= total && total <= d.max_roll)
            .map(|(id, d)| {
                let remaining = self.remaining(id);
                DeckChoice {
                    id: id.clone(),
                    name: d.name.clone(),
                    color: d.color.clone(),
                    min_roll: d.min_roll,
                    max_roll: d.max_roll,
                    remaining,
                    is_empty: remaining == 0,
                }
            })
            .collect()
    }

    /// Draw one card, weighted by the remaining copy counts.
    pub fn draw<R: Rng>(&mut self, deck_id: &str, rng: &mut R) -> Result<Card, GameError> {
        let definition = self.decks.get(deck_id).ok_or(GameError::UnknownDeck)?;
        if self.remaining(deck_id) == 0 {
            return Err(GameError::DeckEmpty);
        }

        let counts = self.card_quantities.get(deck_id);
        let mut pool = Vec::new();
        for card in &definition.cards {
            let left = counts
                .and_then(|c| c.get(&card.id))
                .copied()
                .unwrap_or(0);
            for _ in 0..left {
                pool.push(card);
            }
        }
        if pool.is_empty() {
            return Err(GameError::DeckEmpty);
        }

        let chosen = pool[rng.gen_range(0..pool.len())];
        let card = Card {
            id: chosen.id.clone(),
            name: chosen.name.clone(),
            card_type: chosen.card_type.clone(),
            effect: chosen.effect.clone(),
            deck: definition.name.clone(),
            deck_id: deck_id.to_string(),
            mounted: false,
            mounting_progress: 0,
            mounting: chosen.mounting.clone(),
        };

        if let Some(counts) = self.card_quantities.get_mut(deck_id) {
            if let Some(left) = counts.get_mut(&card.id) {
                *left = left.saturating_sub(1);
            }
        }
        if let Some(total) = self.deck_quantities.get_mut(deck_id) {
            *total = total.saturating_sub(1);
        }

        Ok(card)
    }

    pub fn deck_quantities(&self) -> &HashMap<String, u32> {
        &self.deck_quantities
    }

    pub fn card_quantities(&self) -> &HashMap<String, HashMap<String, u32>> {
        &self.card_quantities
    }

    /// Replace the live counts wholesale, as delivered by a room update.
    pub fn apply_quantities(
        &mut self,
        deck_quantities: HashMap<String, u32>,
        card_quantities: HashMap<String, HashMap<String, u32>>,
    ) {
        self.deck_quantities = deck_quantities;
        self.card_quantities = card_quantities;
    }
}
