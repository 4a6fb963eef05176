//! Resource ids, the id -> cell index, seeding and loot tables.

use super::CellCoord;
use crate::config::{Config, ResourceConfig};
use parking_lot::RwLock;
use protocol::types::{Resource, ResourceKind};
use protocol::{Hitpoints, Vector};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Spread of loot around the destroyed resource.
const LOOT_JITTER: i32 = 20;

/// Single authority for resource ids and where each resource lives.
#[derive(Debug)]
pub struct ResourceManager {
    next_id: AtomicU32,
    index: RwLock<HashMap<u32, CellCoord>>,
    config: ResourceConfig,
    cell_size: i32,
}

impl ResourceManager {
    pub fn new(config: &Config) -> Self {
        Self {
            next_id: AtomicU32::new(1),
            index: RwLock::new(HashMap::new()),
            config: config.resources.clone(),
            cell_size: config.grid.cell_size,
        }
    }

    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record that resource `id` lives in `coord`.
    pub fn track(&self, id: u32, coord: CellCoord) {
        self.index.write().insert(id, coord);
    }

    pub fn forget(&self, id: u32) {
        self.index.write().remove(&id);
    }

    pub fn locate(&self, id: u32) -> Option<CellCoord> {
        self.index.read().get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    fn make(
        &self,
        kind: ResourceKind,
        pos: Vector,
        quantity: u32,
        hitpoints: i32,
        is_solid: bool,
        is_lootable: bool,
    ) -> Resource {
        Resource {
            id: self.next_id(),
            resource_type: kind,
            pos,
            quantity,
            hitpoints: Hitpoints::full(hitpoints),
            is_solid,
            is_lootable,
            grid_cell_key: CellCoord::containing(pos, self.cell_size).key(),
            remove: false,
        }
    }

    /// Scatter stones and trees over a new cell and index them.
    pub fn seed_cell<R: Rng + ?Sized>(&self, rng: &mut R, coord: CellCoord) -> Vec<Resource> {
        let size = self.cell_size;
        let origin = coord.origin(size);
        let hp = self.config.hitpoints;
        let mut out = Vec::new();

        // Stones cluster in the north-west quarter, trees anywhere.
        let stones = rng.random_range(1..50);
        let cluster = origin.translate(size / 4, size / 4);
        for _ in 0..stones {
            let pos = cluster.translate(
                rng.random_range(-size / 4..=size / 4),
                rng.random_range(-size / 4..=size / 4),
            );
            out.push(self.make(ResourceKind::Stone, pos, 100, hp, true, false));
        }

        let trees = rng.random_range(2..50);
        for _ in 0..trees {
            let pos = origin.translate(rng.random_range(0..size), rng.random_range(0..size));
            out.push(self.make(ResourceKind::Tree, pos, 100, hp, true, false));
        }

        let mut index = self.index.write();
        for r in &out {
            index.insert(r.id, coord);
        }
        out
    }

    /// Loot dropped by a destroyed resource. Not yet indexed.
    pub fn loot<R: Rng + ?Sized>(&self, rng: &mut R, destroyed: &Resource) -> Vec<Resource> {
        let at = destroyed.pos;
        match destroyed.resource_type {
            ResourceKind::Stone => {
                let bricks = rng.random_range(2..=4);
                let mut out = vec![self.scatter(rng, at, ResourceKind::Brick, bricks)];
                if rng.random_bool(0.3) {
                    let ore = rng.random_range(1..=2);
                    out.push(self.scatter(rng, at, ResourceKind::IronOre, ore));
                }
                out
            }
            ResourceKind::Tree => {
                let logs = rng.random_range(3..=4);
                vec![self.scatter(rng, at, ResourceKind::Log, logs)]
            }
            ResourceKind::Blockade => {
                vec![self.scatter(rng, at, ResourceKind::Brick, self.config.blockade_cost)]
            }
            ResourceKind::Brick | ResourceKind::Log | ResourceKind::IronOre => Vec::new(),
        }
    }

    fn scatter<R: Rng + ?Sized>(&self, rng: &mut R, at: Vector, kind: ResourceKind, quantity: u32) -> Resource {
        let pos = at.translate(
            rng.random_range(-LOOT_JITTER..=LOOT_JITTER),
            rng.random_range(-LOOT_JITTER..=LOOT_JITTER),
        );
        self.make(kind, pos, quantity, 1, false, true)
    }

    /// A blockade placed by a player. Not yet indexed.
    pub fn blockade(&self, pos: Vector) -> Resource {
        self.make(
            ResourceKind::Blockade,
            pos,
            1,
            self.config.blockade_hitpoints,
            true,
            false,
        )
    }

    pub fn blockade_cost(&self) -> u32 {
        self.config.blockade_cost
    }
}
