//! Shared protocol crate for gridcast.
//!
//! This crate contains:
//! - Integer geometry (`Vector`, `Hitpoints`)
//! - Event and command definitions
//! - Payload records (resources, items, NPCs, terrain)
//! - The JSON codec used by the transport

mod codec;
mod error;
mod geometry;
pub mod packets;
pub mod types;

pub use codec::{decode, encode};
pub use error::ProtocolError;
pub use geometry::{Hitpoints, Vector};
pub use packets::{ClientCommand, Direction, ServerEvent};
