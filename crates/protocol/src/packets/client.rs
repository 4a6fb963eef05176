//! Client -> Server commands.

use crate::types::ResourceKind;
use crate::Vector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A decoded client command.
///
/// On the wire: `{"eventType": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    /// First frame of a session. A known `uuid` restores the saved player.
    Login {
        #[serde(default)]
        uuid: Option<Uuid>,
    },
    /// Keyboard movement; `key` is one of `w`, `a`, `s`, `d`.
    Move { key: String },
    HitResource {
        id: u32,
        #[serde(default)]
        skill: String,
    },
    HitNpc {
        uuid: Uuid,
        #[serde(default)]
        skill: String,
    },
    LootResource { id: u32 },
    #[serde(rename_all = "camelCase")]
    PlaceResource {
        resource_type: ResourceKind,
        pos: Vector,
    },
    #[serde(rename_all = "camelCase")]
    PickItem { uuid: Uuid, grid_cell_pos: Vector },
}

/// A movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Left,
    Down,
    Right,
}

impl Direction {
    /// Map a keyboard key to a direction.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "w" => Some(Direction::Up),
            "a" => Some(Direction::Left),
            "s" => Some(Direction::Down),
            "d" => Some(Direction::Right),
            _ => None,
        }
    }

    /// Offset of one step of `step` world units. `y` grows downward.
    pub fn offset(self, step: i32) -> Vector {
        match self {
            Direction::Up => Vector::new(0, -step),
            Direction::Left => Vector::new(-step, 0),
            Direction::Down => Vector::new(0, step),
            Direction::Right => Vector::new(step, 0),
        }
    }
}
