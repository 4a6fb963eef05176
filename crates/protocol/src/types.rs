//! Records carried inside event payloads.

use crate::{Hitpoints, Vector};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of world resources and inventory materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Stone,
    Tree,
    Brick,
    Log,
    IronOre,
    Blockade,
}

/// A resource placed in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: u32,
    pub resource_type: ResourceKind,
    pub pos: Vector,
    pub quantity: u32,
    pub hitpoints: Hitpoints,
    pub is_solid: bool,
    pub is_lootable: bool,
    pub grid_cell_key: String,
    pub remove: bool,
}

/// A stack of one material in a player's inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    pub resource_type: ResourceKind,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    ArmourItem,
    WeaponItem,
    ConsumableItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemSubType {
    Axe,
    Sword,
    Hammer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rarity {
    Normal,
    Magic,
    Unique,
    Ultra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoniAttribute {
    Strength,
    Agility,
    Vitality,
}

/// A stat bonus granted by an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boni {
    pub attribute: BoniAttribute,
    pub value: i32,
}

/// An item lying on the ground or held in an inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub uuid: Uuid,
    /// Coordinate of the cell the item lies in.
    pub grid_cell_pos: Vector,
    pub item_type: ItemType,
    pub item_sub_type: ItemSubType,
    pub pos: Vector,
    pub quantity: u32,
    pub rarity: Rarity,
    pub quality: u32,
    pub min_damage: i32,
    pub max_damage: i32,
    pub absorb: i32,
    pub attack_speed: i32,
    pub boni: Vec<Boni>,
}

/// Client-visible view of an NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcInfo {
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub pos: Vector,
    pub hitpoints: Hitpoints,
    pub npc_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerrainType {
    Grass,
    Sand,
    ShallowWater,
    Water,
}

impl TerrainType {
    /// Compact one-byte code used by the minimap encoding.
    pub const fn code(self) -> u8 {
        match self {
            TerrainType::Grass => 0,
            TerrainType::Sand => 1,
            TerrainType::ShallowWater => 2,
            TerrainType::Water => 3,
        }
    }
}

/// One terrain sample inside a cell, addressed by sub-cell index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCell {
    pub pos: Vector,
    pub terrain_type: TerrainType,
}

/// Constants handed to a client once at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub grid_cell_size: i32,
    pub sub_cells: i32,
    pub player_step_size: i32,
    pub sub_cell_size: i32,
}
