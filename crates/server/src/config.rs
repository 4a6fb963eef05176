//! Server configuration.

use protocol::types::GameConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub npc: NpcConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Constants handed to clients at login.
    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            grid_cell_size: self.grid.cell_size,
            sub_cells: self.grid.sub_cells,
            player_step_size: self.player.step_size,
            sub_cell_size: self.grid.sub_cell_size(),
        }
    }
}

/// Networking settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Capacity of each client's outbound queue. Events beyond it are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

fn default_port() -> u16 {
    8080
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    500
}
fn default_ip_limit() -> usize {
    20
}
fn default_outbound_queue() -> usize {
    256
}

/// Spatial partitioning and cell loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridConfig {
    /// Side length of a cell in world units.
    #[serde(default = "default_cell_size")]
    pub cell_size: i32,
    /// Cell tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Radius in cells of the neighborhood a client subscribes to.
    #[serde(default = "default_neighborhood_radius")]
    pub neighborhood_radius: i32,
    /// Zone changes a subscription may lag behind before it expires.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: u64,
    /// Terrain samples per cell side.
    #[serde(default = "default_sub_cells")]
    pub sub_cells: i32,
    /// Seed of the terrain noise.
    #[serde(default = "default_terrain_seed")]
    pub terrain_seed: u64,
}

impl GridConfig {
    pub fn sub_cell_size(&self) -> i32 {
        self.cell_size / self.sub_cells.max(1)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            tick_interval_ms: default_tick_interval(),
            neighborhood_radius: default_neighborhood_radius(),
            stale_threshold: default_stale_threshold(),
            sub_cells: default_sub_cells(),
            terrain_seed: default_terrain_seed(),
        }
    }
}

fn default_cell_size() -> i32 {
    500
}
fn default_tick_interval() -> u64 {
    50
}
fn default_neighborhood_radius() -> i32 {
    2
}
fn default_stale_threshold() -> u64 {
    5
}
fn default_sub_cells() -> i32 {
    20
}
fn default_terrain_seed() -> u64 {
    54000
}

/// Player movement and interaction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Distance covered by one movement command.
    #[serde(default = "default_player_step")]
    pub step_size: i32,
    /// A step is rejected when a solid resource is closer than this.
    #[serde(default = "default_collision_radius")]
    pub collision_radius: f64,
    /// Maximum distance for hitting, looting, placing and picking up.
    #[serde(default = "default_reach")]
    pub reach: f64,
    /// Damage dealt by one hit.
    #[serde(default = "default_hit_damage")]
    pub hit_damage: i32,
    #[serde(default = "default_player_hitpoints")]
    pub hitpoints: i32,
    /// Bricks granted to a new player.
    #[serde(default = "default_starting_bricks")]
    pub starting_bricks: u32,
    /// New players spawn within this distance of the origin on each axis.
    #[serde(default = "default_spawn_spread")]
    pub spawn_spread: i32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            step_size: default_player_step(),
            collision_radius: default_collision_radius(),
            reach: default_reach(),
            hit_damage: default_hit_damage(),
            hitpoints: default_player_hitpoints(),
            starting_bricks: default_starting_bricks(),
            spawn_spread: default_spawn_spread(),
        }
    }
}

fn default_player_step() -> i32 {
    25
}
fn default_collision_radius() -> f64 {
    40.0
}
fn default_reach() -> f64 {
    150.0
}
fn default_hit_damage() -> i32 {
    34
}
fn default_player_hitpoints() -> i32 {
    100
}
fn default_starting_bricks() -> u32 {
    50
}
fn default_spawn_spread() -> i32 {
    4 * 35
}

/// NPC behavior settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NpcConfig {
    /// NPCs spawned at each new cell's origin corner.
    #[serde(default = "default_npcs_per_cell")]
    pub per_cell: usize,
    #[serde(default = "default_npc_hitpoints")]
    pub hitpoints: i32,
    /// Untargeted NPCs pick up subscribers closer than this.
    #[serde(default = "default_aggro_radius")]
    pub aggro_radius: f64,
    #[serde(default = "default_melee_range")]
    pub melee_range: f64,
    /// Walking further than this from spawn sends the NPC home.
    #[serde(default = "default_leash_radius")]
    pub leash_radius: f64,
    /// Distance from spawn at which a returning NPC counts as home.
    #[serde(default = "default_return_radius")]
    pub return_radius: f64,
    #[serde(default = "default_player_step")]
    pub step_size: i32,
    /// Ticks an NPC rests between walk steps.
    #[serde(default = "default_move_cooldown")]
    pub move_cooldown: u32,
    /// Ticks between attacks.
    #[serde(default = "default_attack_speed")]
    pub attack_speed: u32,
    #[serde(default = "default_npc_min_damage")]
    pub min_damage: i32,
    #[serde(default = "default_npc_max_damage")]
    pub max_damage: i32,
    /// Probability that an attack deals double damage.
    #[serde(default = "default_crit_chance")]
    pub crit_chance: f64,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            per_cell: default_npcs_per_cell(),
            hitpoints: default_npc_hitpoints(),
            aggro_radius: default_aggro_radius(),
            melee_range: default_melee_range(),
            leash_radius: default_leash_radius(),
            return_radius: default_return_radius(),
            step_size: default_player_step(),
            move_cooldown: default_move_cooldown(),
            attack_speed: default_attack_speed(),
            min_damage: default_npc_min_damage(),
            max_damage: default_npc_max_damage(),
            crit_chance: default_crit_chance(),
        }
    }
}

fn default_npcs_per_cell() -> usize {
    1
}
fn default_npc_hitpoints() -> i32 {
    250
}
fn default_aggro_radius() -> f64 {
    150.0
}
fn default_melee_range() -> f64 {
    75.0
}
fn default_leash_radius() -> f64 {
    500.0
}
fn default_return_radius() -> f64 {
    50.0
}
fn default_move_cooldown() -> u32 {
    2
}
fn default_attack_speed() -> u32 {
    20
}
fn default_npc_min_damage() -> i32 {
    20
}
fn default_npc_max_damage() -> i32 {
    35
}
fn default_crit_chance() -> f64 {
    0.5
}

/// World content settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceConfig {
    /// Scatter stones and trees over every new cell.
    #[serde(default = "default_true")]
    pub seed_cells: bool,
    /// Drop a handful of unique items around the centre of cell (0, 0).
    #[serde(default = "default_true")]
    pub seed_origin_items: bool,
    #[serde(default = "default_resource_hitpoints")]
    pub hitpoints: i32,
    /// Bricks consumed by placing a blockade.
    #[serde(default = "default_blockade_cost")]
    pub blockade_cost: u32,
    #[serde(default = "default_blockade_hitpoints")]
    pub blockade_hitpoints: i32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            seed_cells: true,
            seed_origin_items: true,
            hitpoints: default_resource_hitpoints(),
            blockade_cost: default_blockade_cost(),
            blockade_hitpoints: default_blockade_hitpoints(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_resource_hitpoints() -> i32 {
    100
}
fn default_blockade_cost() -> u32 {
    5
}
fn default_blockade_hitpoints() -> i32 {
    500
}
