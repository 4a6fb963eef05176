//! Spatial cell broadcast server library.

pub mod ai;
pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod server;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use error::CommandError;
pub use server::{GameState, MemoryStore, PlayerStore, run};
pub use world::{Cell, CellCoord, GridManager};
