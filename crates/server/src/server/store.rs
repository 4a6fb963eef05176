//! Player persistence between sessions.

use parking_lot::Mutex;
use protocol::types::{InventoryEntry, Item, ResourceKind};
use protocol::{Hitpoints, Vector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// What is kept about a player between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub pos: Vector,
    pub hitpoints: Hitpoints,
    pub inventory: Vec<InventoryEntry>,
    pub items: Vec<Item>,
}

impl PlayerRecord {
    /// A new player with a stack of starter bricks.
    pub fn fresh(pos: Vector, hitpoints: Hitpoints, bricks: u32) -> Self {
        let inventory = if bricks > 0 {
            vec![InventoryEntry { resource_type: ResourceKind::Brick, quantity: bricks }]
        } else {
            Vec::new()
        };
        Self { pos, hitpoints, inventory, items: Vec::new() }
    }
}

/// Load and save player records keyed by their persistent uuid.
pub trait PlayerStore: Send + Sync {
    fn load(&self, uuid: &Uuid) -> Option<PlayerRecord>;
    fn save(&self, uuid: Uuid, record: PlayerRecord);
}

/// Process-local store. Records are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, PlayerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl PlayerStore for MemoryStore {
    fn load(&self, uuid: &Uuid) -> Option<PlayerRecord> {
        self.records.lock().get(uuid).cloned()
    }

    fn save(&self, uuid: Uuid, record: PlayerRecord) {
        self.records.lock().insert(uuid, record);
    }
}
