//! Client session state shared between the connection and the cells.

use crate::server::store::PlayerRecord;
use crate::world::CellCoord;
use parking_lot::Mutex;
use protocol::types::{InventoryEntry, Item, ResourceKind};
use protocol::{Hitpoints, ServerEvent, Vector};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};
use uuid::Uuid;

/// A connected client as seen by the world.
///
/// Cells hold this behind an `Arc` and read it concurrently, so every field is
/// guarded on its own. Sending never blocks: events that do not fit the
/// outbound queue are dropped.
#[derive(Debug)]
pub struct ClientProxy {
    /// Session id, unique for the lifetime of the process.
    pub id: u32,
    /// Stable key under which the player is persisted.
    pub uuid: Uuid,
    connected: AtomicBool,
    /// Number of cell transitions so far.
    zone_changes: AtomicU64,
    pos: Mutex<Vector>,
    cell: Mutex<CellCoord>,
    hitpoints: Mutex<Hitpoints>,
    inventory: Mutex<BTreeMap<ResourceKind, u32>>,
    items: Mutex<Vec<Item>>,
    outbound: mpsc::Sender<ServerEvent>,
}

impl ClientProxy {
    /// Create a proxy and the receiving half of its outbound queue.
    pub fn new(
        id: u32,
        uuid: Uuid,
        record: PlayerRecord,
        cell: CellCoord,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let inventory = record
            .inventory
            .iter()
            .map(|entry| (entry.resource_type, entry.quantity))
            .collect();
        let proxy = Self {
            id,
            uuid,
            connected: AtomicBool::new(true),
            zone_changes: AtomicU64::new(0),
            pos: Mutex::new(record.pos),
            cell: Mutex::new(cell),
            hitpoints: Mutex::new(record.hitpoints),
            inventory: Mutex::new(inventory),
            items: Mutex::new(record.items),
            outbound: tx,
        };
        (proxy, rx)
    }

    /// Queue an event for this client. Returns false if it was dropped.
    pub fn send(&self, event: ServerEvent) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.outbound.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Outbound queue of client {} full, dropping {}", self.id, event.name());
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Outbound queue of client {} closed", self.id);
                false
            }
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark the client as gone. Every cell stops serving it on its next tick.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    #[inline]
    pub fn zone_changes(&self) -> u64 {
        self.zone_changes.load(Ordering::Acquire)
    }

    /// Record a cell transition and return the new count.
    pub fn bump_zone_changes(&self) -> u64 {
        self.zone_changes.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn pos(&self) -> Vector {
        *self.pos.lock()
    }

    pub fn set_pos(&self, pos: Vector) {
        *self.pos.lock() = pos;
    }

    /// Coordinate of the cell the client is a member of.
    pub fn cell(&self) -> CellCoord {
        *self.cell.lock()
    }

    pub fn set_cell(&self, coord: CellCoord) {
        *self.cell.lock() = coord;
    }

    pub fn hitpoints(&self) -> Hitpoints {
        *self.hitpoints.lock()
    }

    /// Apply damage and return the resulting hitpoints.
    pub fn take_damage(&self, amount: i32) -> Hitpoints {
        let mut hp = self.hitpoints.lock();
        hp.take_damage(amount);
        *hp
    }

    /// Quantity of a material in the inventory.
    pub fn quantity(&self, kind: ResourceKind) -> u32 {
        self.inventory.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Merge materials into the inventory and return the new total.
    pub fn add_resource(&self, kind: ResourceKind, quantity: u32) -> u32 {
        let mut inventory = self.inventory.lock();
        let total = inventory.entry(kind).or_insert(0);
        *total = total.saturating_add(quantity);
        *total
    }

    /// Remove `quantity` of a material if enough is held.
    ///
    /// On failure returns the quantity actually available.
    pub fn try_spend(&self, kind: ResourceKind, quantity: u32) -> Result<u32, u32> {
        let mut inventory = self.inventory.lock();
        let held = inventory.get(&kind).copied().unwrap_or(0);
        if held < quantity {
            return Err(held);
        }
        inventory.insert(kind, held - quantity);
        Ok(held - quantity)
    }

    pub fn inventory(&self) -> Vec<InventoryEntry> {
        self.inventory
            .lock()
            .iter()
            .map(|(&resource_type, &quantity)| InventoryEntry { resource_type, quantity })
            .collect()
    }

    pub fn add_item(&self, item: Item) {
        self.items.lock().push(item);
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.lock().clone()
    }

    /// Snapshot of everything that outlives the session.
    pub fn record(&self) -> PlayerRecord {
        PlayerRecord {
            pos: self.pos(),
            hitpoints: self.hitpoints(),
            inventory: self.inventory(),
            items: self.items(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(capacity: usize) -> (ClientProxy, mpsc::Receiver<ServerEvent>) {
        let record = PlayerRecord::fresh(Vector::ZERO, Hitpoints::full(100), 50);
        ClientProxy::new(1, Uuid::new_v4(), record, CellCoord::new(0, 0), capacity)
    }

    #[test]
    fn test_send_drops_when_full() {
        let (client, mut rx) = proxy(1);
        assert!(client.send(ServerEvent::RemovePlayer { id: 1 }));
        assert!(!client.send(ServerEvent::RemovePlayer { id: 2 }));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::RemovePlayer { id: 1 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_disconnect() {
        let (client, mut rx) = proxy(4);
        client.disconnect();
        assert!(!client.send(ServerEvent::RemovePlayer { id: 1 }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_inventory_spend() {
        let (client, _rx) = proxy(1);
        assert_eq!(client.quantity(ResourceKind::Brick), 50);
        assert_eq!(client.try_spend(ResourceKind::Brick, 5), Ok(45));
        assert_eq!(client.try_spend(ResourceKind::Brick, 46), Err(45));
        assert_eq!(client.add_resource(ResourceKind::Log, 3), 3);
        assert_eq!(client.inventory().len(), 2);
    }

    #[test]
    fn test_zone_changes() {
        let (client, _rx) = proxy(1);
        assert_eq!(client.zone_changes(), 0);
        assert_eq!(client.bump_zone_changes(), 1);
        assert_eq!(client.zone_changes(), 1);
    }
}
