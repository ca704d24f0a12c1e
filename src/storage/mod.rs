//! Persistence layer.
//!
//! `PositionStore` is the in-memory, insertion-ordered symbol → position map
//! the engine works on. Loading and saving go through a `PositionRepository`;
//! the default one writes a pretty-printed JSON object to disk.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{HunterError, Position, DEFAULT_DECIMALS};

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "positions.json";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Open positions keyed by symbol, iterated in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionStore {
    positions: Vec<Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-keyed positions. A repeated symbol keeps
    /// its first slot and takes the later value.
    pub fn from_positions(positions: impl IntoIterator<Item = Position>) -> Self {
        let mut store = Self::new();
        for position in positions {
            match store.index_of(&position.symbol) {
                Some(i) => {
                    warn!(symbol = %position.symbol, "Duplicate symbol in state, keeping last entry");
                    store.positions[i] = position;
                }
                None => store.positions.push(position),
            }
        }
        store
    }

    fn index_of(&self, symbol: &str) -> Option<usize> {
        self.positions.iter().position(|p| p.symbol == symbol)
    }

    /// Record a freshly bought position with the default token decimals.
    pub fn add_position(
        &mut self,
        symbol: &str,
        token_address: &str,
        balance: Decimal,
        capital: Decimal,
        tx_ref: &str,
    ) -> Result<&Position, HunterError> {
        let position = Position::new(symbol, token_address, DEFAULT_DECIMALS, balance, capital, tx_ref);
        self.insert(position)
    }

    /// Add a fully built position. Symbols must be unique.
    pub fn insert(&mut self, position: Position) -> Result<&Position, HunterError> {
        if self.contains(&position.symbol) {
            return Err(HunterError::DuplicatePosition(position.symbol));
        }
        info!(
            symbol = %position.symbol,
            token = %position.token_address,
            balance = %position.current_balance,
            capital = %position.capital,
            "Position added"
        );
        self.positions.push(position);
        let last = self.positions.len() - 1;
        Ok(&self.positions[last])
    }

    pub fn remove_position(&mut self, symbol: &str) -> Option<Position> {
        let index = self.index_of(symbol)?;
        let removed = self.positions.remove(index);
        info!(symbol, "Position removed");
        Some(removed)
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.symbol == symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.index_of(symbol).is_some()
    }

    /// Owned copy of every position, in insertion order.
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.clone()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.positions.iter().map(|p| p.symbol.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Load from `repo`, or start empty if nothing has been saved yet.
    pub fn load(repo: &dyn PositionRepository) -> Result<Self> {
        let store = Self::from_positions(repo.load()?);
        info!(positions = store.len(), "Positions loaded");
        Ok(store)
    }

    pub fn save(&self, repo: &dyn PositionRepository) -> Result<()> {
        repo.save(&self.positions)
    }
}

// ---------------------------------------------------------------------------
// On-disk format: a JSON object keyed by symbol, in insertion order
// ---------------------------------------------------------------------------

struct PositionMap<'a>(&'a [Position]);

impl Serialize for PositionMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for position in self.0 {
            map.serialize_entry(&position.symbol, position)?;
        }
        map.end()
    }
}

struct LoadedPositions(Vec<Position>);

impl<'de> Deserialize<'de> for LoadedPositions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = LoadedPositions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping symbols to positions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut positions = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((symbol, mut position)) = access.next_entry::<String, Position>()? {
                    position.symbol = symbol;
                    positions.push(position);
                }
                Ok(LoadedPositions(positions))
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

/// Encode positions in the on-disk format.
pub fn to_json(positions: &[Position]) -> Result<String> {
    serde_json::to_string_pretty(&PositionMap(positions)).context("Failed to serialise positions")
}

/// Decode the on-disk format.
pub fn from_json(json: &str) -> Result<Vec<Position>> {
    let loaded: LoadedPositions = serde_json::from_str(json).context("Failed to parse positions")?;
    Ok(loaded.0)
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// Durable storage for the position map.
#[cfg_attr(test, mockall::automock)]
pub trait PositionRepository: Send + Sync {
    /// Saved positions in their stored order; empty when nothing is saved.
    fn load(&self) -> Result<Vec<Position>>;

    fn save(&self, positions: &[Position]) -> Result<()>;
}

/// Positions as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the state file (for testing or reset).
    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .context(format!("Failed to delete state file {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl Default for JsonFileRepository {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl PositionRepository for JsonFileRepository {
    fn load(&self) -> Result<Vec<Position>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No saved positions found, starting fresh");
            return Ok(Vec::new());
        }

        let json = std::fs::read_to_string(&self.path)
            .context(format!("Failed to read positions from {}", self.path.display()))?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }

        from_json(&json).context(format!("Invalid state file {}", self.path.display()))
    }

    fn save(&self, positions: &[Position]) -> Result<()> {
        let json = to_json(positions)?;

        // Write-then-rename so a crash mid-write leaves the old file intact.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).context(format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .context(format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), positions = positions.len(), "Positions saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
