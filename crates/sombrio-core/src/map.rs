//! Tile graph and movement resolution.
//!
//! This module contains:
//! - The map adjacency graph loaded from external geometry data
//! - The path/location partition of tiles
//! - Breadth-first reachability used by the movement phase

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Tile identifier. Tiles whose id starts with `"path"` are transit-only
/// path tiles; every other id names a location tile.
pub type TileId = String;

/// True if the tile id names a location (somewhere location-gated actions
/// such as tracking and mounting are legal), false for path tiles.
pub fn is_location(tile_id: &str) -> bool {
    !tile_id.starts_with("path")
}

/// The map as an adjacency graph over tile ids.
///
/// Adjacency is symmetric in the shipped data but nothing here assumes it;
/// edges are followed as given. The graph is immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapGraph {
    adjacency: HashMap<TileId, Vec<TileId>>,
    start_tile: TileId,
}

impl MapGraph {
    /// Build a graph from raw adjacency data and the configured start tile.
    pub fn new(adjacency: HashMap<TileId, Vec<TileId>>, start_tile: impl Into<TileId>) -> Self {
        Self {
            adjacency,
            start_tile: start_tile.into(),
        }
    }

    /// The tile new players are placed on (and the repair target for
    /// invalid persisted positions).
    pub fn start_tile(&self) -> &str {
        &self.start_tile
    }

    /// Whether the graph knows this tile id.
    pub fn contains(&self, tile_id: &str) -> bool {
        self.adjacency.contains_key(tile_id)
    }

    /// Neighbors of a tile, empty for unknown ids.
    pub fn neighbors(&self, tile_id: &str) -> &[TileId] {
        self.adjacency
            .get(tile_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of tiles in the graph.
    pub fn tile_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Returns the position unchanged if the graph knows it, otherwise the
    /// start tile. Persisted rows can carry positions from older map
    /// revisions; they are repaired on load rather than rejected.
    pub fn validate_position<'a>(&'a self, position: &'a str) -> &'a str {
        if self.contains(position) {
            position
        } else {
            &self.start_tile
        }
    }

    /// All tiles reachable from `start` within `budget` hops, mapped to
    /// their minimal hop distance.
    ///
    /// A tile is included iff `1 <= distance <= budget`; the start tile is
    /// never part of the result and unreachable tiles are simply absent.
    /// BFS guarantees each tile is recorded at its shortest distance.
    pub fn reachable_tiles(&self, start: &str, budget: u32) -> HashMap<TileId, u32> {
        let mut reachable = HashMap::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        visited.insert(start.to_string());
        queue.push_back((start.to_string(), 0u32));

        while let Some((tile, distance)) = queue.pop_front() {
            if distance > 0 && distance <= budget {
                reachable.insert(tile.clone(), distance);
            }

            if distance < budget {
                for next in self.neighbors(&tile) {
                    if visited.insert(next.clone()) {
                        queue.push_back((next.clone(), distance + 1));
                    }
                }
            }
        }

        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph() -> MapGraph {
        // A - B - C
        let mut adjacency = HashMap::new();
        adjacency.insert("A".to_string(), vec!["B".to_string()]);
        adjacency.insert("B".to_string(), vec!["A".to_string(), "C".to_string()]);
        adjacency.insert("C".to_string(), vec!["B".to_string()]);
        MapGraph::new(adjacency, "A")
    }

    #[test]
    fn test_reachable_line() {
        let graph = line_graph();
        let reachable = graph.reachable_tiles("A", 2);

        assert_eq!(reachable.len(), 2);
        assert_eq!(reachable.get("B"), Some(&1));
        assert_eq!(reachable.get("C"), Some(&2));
    }

    #[test]
    fn test_reachable_excludes_start() {
        let graph = line_graph();
        let reachable = graph.reachable_tiles("B", 1);

        assert!(!reachable.contains_key("B"));
        assert_eq!(reachable.get("A"), Some(&1));
        assert_eq!(reachable.get("C"), Some(&1));
    }

    #[test]
    fn test_reachable_budget_zero() {
        let graph = line_graph();
        assert!(graph.reachable_tiles("A", 0).is_empty());
    }

    #[test]
    fn test_reachable_records_shortest_distance() {
        // Diamond: S has a direct edge to T and a longer route via M1/M2.
        let mut adjacency = HashMap::new();
        adjacency.insert("S".to_string(), vec!["T".to_string(), "M1".to_string()]);
        adjacency.insert("T".to_string(), vec!["S".to_string()]);
        adjacency.insert("M1".to_string(), vec!["S".to_string(), "M2".to_string()]);
        adjacency.insert("M2".to_string(), vec!["M1".to_string(), "T".to_string()]);
        let graph = MapGraph::new(adjacency, "S");

        let reachable = graph.reachable_tiles("S", 3);
        assert_eq!(reachable.get("T"), Some(&1), "direct edge wins over the detour");
        assert_eq!(reachable.get("M2"), Some(&2));
    }

    #[test]
    fn test_reachable_unknown_start() {
        let graph = line_graph();
        assert!(graph.reachable_tiles("nowhere", 3).is_empty());
    }

    #[test]
    fn test_validate_position() {
        let graph = line_graph();
        assert_eq!(graph.validate_position("C"), "C");
        assert_eq!(graph.validate_position("ghost"), "A");
    }

    #[test]
    fn test_location_partition() {
        assert!(!is_location("path001"));
        assert!(!is_location("path042"));
        assert!(is_location("ArthurHouse"));
        assert!(is_location("SwordStone"));
    }
}
