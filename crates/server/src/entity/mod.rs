//! World entities that live inside cells.

pub mod item;
