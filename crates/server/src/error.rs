//! Command rejection reasons.

use thiserror::Error;
use uuid::Uuid;

/// Why a client command had no effect.
///
/// Rejections never reach the client; they are logged and dropped.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("client {0} is not connected")]
    NotConnected(u32),

    #[error("no resource with id {0}")]
    ResourceNotFound(u32),

    #[error("no npc {0}")]
    NpcNotFound(Uuid),

    #[error("no item {0}")]
    ItemNotFound(Uuid),

    #[error("target is {distance:.1} away, reach is {reach:.1}")]
    OutOfRange { distance: f64, reach: f64 },

    #[error("resource {0} cannot be handled this way")]
    WrongResourceState(u32),

    #[error("need {needed} bricks, have {available}")]
    InsufficientMaterials { needed: u32, available: u32 },

    #[error("unknown movement key {0:?}")]
    UnknownKey(String),

    #[error("cannot place this resource")]
    NotPlaceable,

    #[error("step blocked by resource {0}")]
    Blocked(u32),
}

impl CommandError {
    /// Check `distance` against `reach`.
    pub fn check_reach(distance: f64, reach: f64) -> Result<(), CommandError> {
        if distance < reach {
            Ok(())
        } else {
            Err(CommandError::OutOfRange { distance, reach })
        }
    }
}
