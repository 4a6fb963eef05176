//! NPC behavior.

mod npc;

pub use npc::{Npc, NpcContext, NpcState};
