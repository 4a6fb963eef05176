//! Spatial partitioning of the world into cells.
//!
//! The [`GridManager`] maps integer cell coordinates to [`Cell`] actors and
//! creates them on first use. Work that crosses cells is never done inline:
//! it goes through the grid [`Coordinator`] or into the target cell's inbox.

mod cell;
mod resources;
pub mod terrain;

pub use cell::{Cell, CellCommand, Subscription};
pub use resources::ResourceManager;

use crate::ai::Npc;
use crate::config::Config;
use crate::entity::item;
use crate::server::client::ClientProxy;
use parking_lot::RwLock;
use protocol::types::Resource;
use protocol::{ServerEvent, Vector};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use terrain::{Perlin, Terrain};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Integer coordinate of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Cell containing a world position.
    ///
    /// Uses floor division so every cell spans exactly `cell_size` units,
    /// including those at negative coordinates.
    pub fn containing(pos: Vector, cell_size: i32) -> Self {
        let size = cell_size.max(1);
        Self::new(pos.x.div_euclid(size), pos.y.div_euclid(size))
    }

    /// World position of the cell's north-west corner.
    pub fn origin(self, cell_size: i32) -> Vector {
        Vector::new(self.x * cell_size, self.y * cell_size)
    }

    /// Key used on the wire, `"x#y"`.
    pub fn key(self) -> String {
        self.to_string()
    }

    pub fn as_vector(self) -> Vector {
        Vector::new(self.x, self.y)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.x, self.y)
    }
}

impl From<Vector> for CellCoord {
    fn from(v: Vector) -> Self {
        Self::new(v.x, v.y)
    }
}

/// Requests handled by the grid coordinator task.
#[derive(Debug)]
pub enum GridCommand {
    /// A client's position changed.
    ClientMoved(Arc<ClientProxy>),
    /// A new resource entered the world.
    AddResource(Resource),
}

/// State shared by the grid and every cell.
#[derive(Debug)]
pub struct WorldContext {
    pub config: Arc<Config>,
    pub resources: ResourceManager,
    noise: Perlin,
    /// Which cell each living NPC belongs to.
    npc_homes: RwLock<HashMap<Uuid, CellCoord>>,
    coordinator: mpsc::UnboundedSender<GridCommand>,
}

impl WorldContext {
    /// Hand a command to the grid coordinator.
    pub fn dispatch(&self, command: GridCommand) {
        if self.coordinator.send(command).is_err() {
            trace!("Grid coordinator is gone, command dropped");
        }
    }

    pub fn forget_npc(&self, uuid: &Uuid) {
        self.npc_homes.write().remove(uuid);
    }

    pub fn cell_size(&self) -> i32 {
        self.config.grid.cell_size
    }
}

/// Index of all cells by coordinate.
#[derive(Debug)]
pub struct GridManager {
    cells: RwLock<HashMap<CellCoord, Arc<Cell>>>,
    ctx: Arc<WorldContext>,
}

impl GridManager {
    /// Create an empty grid and the coordinator that serves it.
    pub fn new(config: Arc<Config>) -> (Arc<Self>, Coordinator) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(WorldContext {
            resources: ResourceManager::new(&config),
            noise: Perlin::new(config.grid.terrain_seed),
            npc_homes: RwLock::new(HashMap::new()),
            coordinator: tx,
            config,
        });
        let grid = Arc::new(Self {
            cells: RwLock::new(HashMap::new()),
            ctx,
        });
        let coordinator = Coordinator { grid: Arc::clone(&grid), rx };
        (grid, coordinator)
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.ctx.resources
    }

    pub fn coord_of(&self, pos: Vector) -> CellCoord {
        CellCoord::containing(pos, self.ctx.cell_size())
    }

    /// The cell containing `pos`, created if needed.
    pub fn cell_for(&self, pos: Vector) -> Arc<Cell> {
        self.cell_at(self.coord_of(pos))
    }

    /// The cell at `coord`, created if needed.
    ///
    /// Concurrent callers for the same coordinate always get the same cell.
    pub fn cell_at(&self, coord: CellCoord) -> Arc<Cell> {
        if let Some(cell) = self.cells.read().get(&coord) {
            return Arc::clone(cell);
        }

        let mut cells = self.cells.write();
        let cell = cells.entry(coord).or_insert_with(|| self.create_cell(coord));
        Arc::clone(cell)
    }

    /// The cell at `coord` if it already exists.
    pub fn get(&self, coord: CellCoord) -> Option<Arc<Cell>> {
        self.cells.read().get(&coord).cloned()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.read().len()
    }

    /// All cells within `radius` of `center` on both axes, created on demand.
    pub fn neighborhood(&self, center: CellCoord, radius: i32) -> Vec<Arc<Cell>> {
        let radius = radius.max(0);
        let mut out = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                out.push(self.cell_at(CellCoord::new(center.x + dx, center.y + dy)));
            }
        }
        out
    }

    /// Cells that may hold something within `radius` of `pos`.
    pub fn cells_near(&self, pos: Vector, radius: i32) -> Vec<Arc<Cell>> {
        let mut coords = Vec::with_capacity(4);
        for dy in [-radius, radius] {
            for dx in [-radius, radius] {
                let coord = self.coord_of(pos.translate(dx, dy));
                if !coords.contains(&coord) {
                    coords.push(coord);
                }
            }
        }
        coords.into_iter().map(|c| self.cell_at(c)).collect()
    }

    /// Cell an NPC lives in.
    pub fn locate_npc(&self, uuid: &Uuid) -> Option<CellCoord> {
        self.ctx.npc_homes.read().get(uuid).copied()
    }

    /// Put a freshly logged in client into its cell and subscribe it to the
    /// surrounding neighborhood.
    pub fn place_client(&self, client: &Arc<ClientProxy>) {
        let coord = self.coord_of(client.pos());
        client.set_cell(coord);
        self.cell_at(coord).add_player(client);
        self.subscribe_neighborhood(client, coord);
    }

    /// Ask the coordinator to process a movement.
    pub fn notify_moved(&self, client: &Arc<ClientProxy>) {
        self.ctx.dispatch(GridCommand::ClientMoved(Arc::clone(client)));
    }

    /// Ask the coordinator to place a new resource.
    pub fn add_resource(&self, resource: Resource) {
        self.ctx.dispatch(GridCommand::AddResource(resource));
    }

    /// Move a client between cells if its position left its owning cell.
    ///
    /// Returns whether a transition happened. Old subscriptions are not
    /// cancelled; they expire once the client has moved far enough.
    /// Viewers of the old cell that do not watch the new one are told to
    /// drop the client.
    pub fn on_client_moved(&self, client: &Arc<ClientProxy>) -> bool {
        let old = client.cell();
        let new = self.coord_of(client.pos());
        if old == new {
            return false;
        }

        let old_cell = self.cell_at(old);
        let new_cell = self.cell_at(new);
        old_cell.remove_player(client);
        new_cell.add_player(client);
        old_cell.enqueue(CellCommand::PlayerLeft { id: client.id, watchers: new_cell.subscriber_ids() });
        client.set_cell(new);
        let zone = client.bump_zone_changes();
        trace!("Client {} moved {} -> {} (zone change {})", client.id, old, new, zone);

        self.subscribe_neighborhood(client, new);
        true
    }

    fn subscribe_neighborhood(&self, client: &Arc<ClientProxy>, center: CellCoord) {
        for cell in self.neighborhood(center, self.config().grid.neighborhood_radius) {
            cell.subscribe(client);
        }
    }

    /// Execute one coordinator command.
    pub fn handle_command(&self, command: GridCommand) {
        match command {
            GridCommand::ClientMoved(client) => {
                if !client.is_connected() {
                    return;
                }
                let pos = client.pos();
                self.cell_at(self.coord_of(pos)).enqueue(CellCommand::Broadcast(
                    ServerEvent::PlayerTargetPosition { id: client.id, pos, force: false },
                ));
                self.on_client_moved(&client);
            }
            GridCommand::AddResource(mut resource) => {
                let coord = self.coord_of(resource.pos);
                resource.grid_cell_key = coord.key();
                self.ctx.resources.track(resource.id, coord);
                self.cell_at(coord).add_resource(resource);
            }
        }
    }

    fn create_cell(&self, coord: CellCoord) -> Arc<Cell> {
        let config = &self.ctx.config;
        let cell_size = config.grid.cell_size;
        let mut rng = rand::rng();

        let terrain = Terrain::generate(&self.ctx.noise, coord, config.grid.sub_cells);

        let spawn = coord.origin(cell_size);
        let npcs: Vec<Npc> = (0..config.npc.per_cell)
            .map(|_| Npc::new(spawn, config.npc.hitpoints))
            .collect();
        {
            let mut homes = self.ctx.npc_homes.write();
            for npc in &npcs {
                homes.insert(npc.uuid, coord);
            }
        }

        let resources = if config.resources.seed_cells {
            self.ctx.resources.seed_cell(&mut rng, coord)
        } else {
            Vec::new()
        };

        let items = if config.resources.seed_origin_items && coord == CellCoord::default() {
            item::origin_items(&mut rng, cell_size)
        } else {
            Vec::new()
        };

        debug!(
            "Created cell {} ({} npcs, {} resources, {} items)",
            coord,
            npcs.len(),
            resources.len(),
            items.len()
        );
        Arc::new(Cell::new(coord, Arc::clone(&self.ctx), terrain, npcs, resources, items))
    }
}

/// Serializes movement transitions and resource placement.
#[derive(Debug)]
pub struct Coordinator {
    grid: Arc<GridManager>,
    rx: mpsc::UnboundedReceiver<GridCommand>,
}

impl Coordinator {
    /// Process commands until every sender is gone.
    pub async fn run(mut self) {
        info!("Grid coordinator started");
        while let Some(command) = self.rx.recv().await {
            self.grid.handle_command(command);
        }
        info!("Grid coordinator stopped");
    }

    /// Process everything queued right now and return how many commands ran.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(command) = self.rx.try_recv() {
            self.grid.handle_command(command);
            handled += 1;
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn quiet_config() -> Arc<Config> {
        let mut config = Config::default();
        config.resources.seed_cells = false;
        config.resources.seed_origin_items = false;
        Arc::new(config)
    }

    #[test]
    fn test_coord_floors() {
        assert_eq!(CellCoord::containing(Vector::new(0, 0), 500), CellCoord::new(0, 0));
        assert_eq!(CellCoord::containing(Vector::new(499, 499), 500), CellCoord::new(0, 0));
        assert_eq!(CellCoord::containing(Vector::new(0, -40), 500), CellCoord::new(0, -1));
        assert_eq!(CellCoord::containing(Vector::new(500, -500), 500), CellCoord::new(1, -1));
        assert_eq!(CellCoord::containing(Vector::new(-501, 0), 500), CellCoord::new(-2, 0));
        assert_eq!(CellCoord::new(-3, 7).key(), "-3#7");
    }

    #[test]
    fn test_cell_for_is_idempotent() {
        let (grid, _coordinator) = GridManager::new(quiet_config());
        let a = grid.cell_for(Vector::new(10, 10));
        let b = grid.cell_for(Vector::new(480, 20));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(grid.cell_count(), 1);
    }

    #[test]
    fn test_neighborhood_size() {
        let (grid, _coordinator) = GridManager::new(quiet_config());
        let cells = grid.neighborhood(CellCoord::new(4, -2), 2);
        let coords: HashSet<CellCoord> = cells.iter().map(|c| c.coord()).collect();
        assert_eq!(cells.len(), 25);
        assert_eq!(coords.len(), 25);
        assert!(coords.contains(&CellCoord::new(2, -4)));
        assert!(coords.contains(&CellCoord::new(6, 0)));
        assert_eq!(grid.cell_count(), 25);
    }

    #[test]
    fn test_cell_seeds_npc_at_origin() {
        let (grid, _coordinator) = GridManager::new(quiet_config());
        let cell = grid.cell_at(CellCoord::new(1, -1));
        let npcs = cell.npcs();
        assert_eq!(npcs.len(), 1);
        assert_eq!(npcs[0].pos, Vector::new(500, -500));
        assert_eq!(grid.locate_npc(&npcs[0].uuid), Some(CellCoord::new(1, -1)));
    }

    #[test]
    fn test_add_resource_through_coordinator() {
        let (grid, mut coordinator) = GridManager::new(quiet_config());
        let blockade = grid.resources().blockade(Vector::new(520, 10));
        let id = blockade.id;
        grid.add_resource(blockade);
        assert_eq!(coordinator.drain(), 1);

        let cell = grid.cell_at(CellCoord::new(1, 0));
        cell.tick();
        let resources = cell.resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].grid_cell_key, "1#0");
        assert_eq!(grid.resources().locate(id), Some(CellCoord::new(1, 0)));
    }
}
