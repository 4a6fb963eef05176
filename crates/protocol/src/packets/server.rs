//! Server -> Client events.

use crate::types::{GameConfig, InventoryEntry, Item, NpcInfo, Resource, SubCell};
use crate::{Hitpoints, Vector};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every event the server emits.
///
/// Serialized as a JSON object whose `eventType` field carries the variant
/// name. `Batch` wraps the events of one cell tick so they reach each
/// subscriber as a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// A player became visible.
    NewPlayer {
        id: u32,
        pos: Vector,
        hitpoints: Hitpoints,
    },
    /// Session bootstrap: assigned id, persistent key and game constants.
    #[serde(rename_all = "camelCase")]
    UserInit {
        id: u32,
        pos: Vector,
        hitpoints: Hitpoints,
        uuid: Uuid,
        game_config: GameConfig,
    },
    PlayerTargetPosition {
        id: u32,
        pos: Vector,
        /// Snap instead of interpolating.
        force: bool,
    },
    ResourcePositions {
        resources: Vec<Resource>,
    },
    RemovePlayer {
        id: u32,
    },
    #[serde(rename_all = "camelCase")]
    UpdateResource {
        grid_cell_key: String,
        id: u32,
        hitpoints: Hitpoints,
        remove: bool,
        damage: i32,
    },
    LoadInventory {
        resources: Vec<InventoryEntry>,
        items: Vec<Item>,
    },
    UpdateInventory {
        resource: InventoryEntry,
        remove: bool,
    },
    /// The client should discard everything it holds for this cell.
    #[serde(rename_all = "camelCase")]
    RemoveGridCell {
        grid_cell_key: String,
    },
    Batch {
        events: Vec<ServerEvent>,
    },
    /// Terrain snapshot of a cell.
    #[serde(rename_all = "camelCase")]
    CellData {
        grid_cell_key: String,
        pos: Vector,
        sub_cells: Vec<SubCell>,
        sub_cell_base64: String,
    },
    #[serde(rename_all = "camelCase")]
    NpcList {
        grid_cell_key: String,
        npc_list: Vec<NpcInfo>,
    },
    #[serde(rename_all = "camelCase")]
    NpcTargetPosition {
        grid_cell_key: String,
        #[serde(rename = "npcUUID")]
        npc_uuid: Uuid,
        pos: Vector,
    },
    #[serde(rename_all = "camelCase")]
    UpdateNpc {
        grid_cell_key: String,
        #[serde(rename = "npcUUID")]
        npc_uuid: Uuid,
        hitpoints: Hitpoints,
        remove: bool,
        damage: i32,
    },
    #[serde(rename_all = "camelCase")]
    UpdatePlayer {
        player_id: u32,
        hitpoints: Hitpoints,
        damage: i32,
        heal: i32,
        crit: bool,
    },
    #[serde(rename_all = "camelCase")]
    NpcAttackAnim {
        #[serde(rename = "npcUUID")]
        npc_uuid: Uuid,
        attack_id: u32,
    },
    #[serde(rename_all = "camelCase")]
    ItemPositions {
        grid_cell_key: String,
        items: Vec<Item>,
    },
    RemoveItem {
        uuid: Uuid,
    },
    UpdateInventoryItem {
        item: Item,
        remove: bool,
    },
}

impl ServerEvent {
    /// Wrap events into a single batch.
    pub fn batch(events: Vec<ServerEvent>) -> Self {
        ServerEvent::Batch { events }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewPlayer { .. } => "new-player",
            ServerEvent::UserInit { .. } => "user-init",
            ServerEvent::PlayerTargetPosition { .. } => "player-target-position",
            ServerEvent::ResourcePositions { .. } => "resource-positions",
            ServerEvent::RemovePlayer { .. } => "remove-player",
            ServerEvent::UpdateResource { .. } => "update-resource",
            ServerEvent::LoadInventory { .. } => "load-inventory",
            ServerEvent::UpdateInventory { .. } => "update-inventory",
            ServerEvent::RemoveGridCell { .. } => "remove-grid-cell",
            ServerEvent::Batch { .. } => "batch",
            ServerEvent::CellData { .. } => "cell-data",
            ServerEvent::NpcList { .. } => "npc-list",
            ServerEvent::NpcTargetPosition { .. } => "npc-target-position",
            ServerEvent::UpdateNpc { .. } => "update-npc",
            ServerEvent::UpdatePlayer { .. } => "update-player",
            ServerEvent::NpcAttackAnim { .. } => "npc-attack-anim",
            ServerEvent::ItemPositions { .. } => "item-positions",
            ServerEvent::RemoveItem { .. } => "remove-item",
            ServerEvent::UpdateInventoryItem { .. } => "update-inventory-item",
        }
    }
}
