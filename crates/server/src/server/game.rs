//! Session registry and command handling.

use super::client::ClientProxy;
use super::store::{PlayerRecord, PlayerStore};
use crate::collision;
use crate::config::Config;
use crate::error::CommandError;
use crate::world::{Cell, CellCommand, CellCoord, Coordinator, GridManager};
use parking_lot::RwLock;
use protocol::types::{InventoryEntry, ResourceKind};
use protocol::{ClientCommand, Direction, Hitpoints, ServerEvent, Vector};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything shared by the connection handlers.
pub struct GameState {
    config: Arc<Config>,
    grid: Arc<GridManager>,
    store: Arc<dyn PlayerStore>,
    clients: RwLock<HashMap<u32, Arc<ClientProxy>>>,
    next_client_id: AtomicU32,
}

impl GameState {
    /// Create the game state and the grid coordinator that must be run
    /// alongside it.
    pub fn new(config: Arc<Config>, store: Arc<dyn PlayerStore>) -> (Self, Coordinator) {
        let (grid, coordinator) = GridManager::new(Arc::clone(&config));
        let state = Self {
            config,
            grid,
            store,
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicU32::new(1),
        };
        (state, coordinator)
    }

    pub fn grid(&self) -> &Arc<GridManager> {
        &self.grid
    }

    pub fn client(&self, id: u32) -> Option<Arc<ClientProxy>> {
        self.clients.read().get(&id).cloned()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Log a client in, restoring its saved state when `uuid` is known.
    pub fn connect(&self, uuid: Option<Uuid>) -> (Arc<ClientProxy>, mpsc::Receiver<ServerEvent>) {
        let uuid = uuid.unwrap_or_else(Uuid::new_v4);
        let record = match self.store.load(&uuid) {
            Some(record) => {
                debug!("Restoring player {}", uuid);
                record
            }
            None => self.fresh_record(),
        };

        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let coord = self.grid.coord_of(record.pos);
        let (proxy, rx) = ClientProxy::new(id, uuid, record, coord, self.config.server.outbound_queue);
        let client = Arc::new(proxy);

        let pos = client.pos();
        client.send(ServerEvent::UserInit {
            id,
            pos,
            hitpoints: client.hitpoints(),
            uuid,
            game_config: self.config.game_config(),
        });
        client.send(ServerEvent::PlayerTargetPosition { id, pos, force: true });
        client.send(ServerEvent::LoadInventory {
            resources: client.inventory(),
            items: client.items(),
        });

        self.clients.write().insert(id, Arc::clone(&client));
        self.grid.place_client(&client);
        info!("Client {} logged in as {} at ({}, {})", id, uuid, pos.x, pos.y);
        (client, rx)
    }

    fn fresh_record(&self) -> PlayerRecord {
        let player = &self.config.player;
        let spread = player.spawn_spread.max(0);
        let mut rng = rand::rng();
        let pos = Vector::new(
            rng.random_range(-spread..=spread),
            rng.random_range(-spread..=spread),
        );
        PlayerRecord::fresh(pos, Hitpoints::full(player.hitpoints), player.starting_bricks)
    }

    /// Tear a session down and persist the player.
    pub fn disconnect(&self, id: u32) {
        let Some(client) = self.clients.write().remove(&id) else {
            return;
        };
        client.disconnect();
        if let Some(cell) = self.grid.get(client.cell()) {
            cell.remove_player(&client);
        }
        self.store.save(client.uuid, client.record());
        info!("Client {} disconnected", id);
    }

    /// Apply one decoded command from client `id`.
    pub fn handle_command(&self, id: u32, command: ClientCommand) -> Result<(), CommandError> {
        let client = self
            .client(id)
            .filter(|c| c.is_connected())
            .ok_or(CommandError::NotConnected(id))?;

        match command {
            ClientCommand::Login { .. } => {
                debug!("Client {} sent a second login", id);
                Ok(())
            }
            ClientCommand::Move { key } => self.handle_move(&client, &key),
            ClientCommand::HitResource { id: resource_id, .. } => {
                let (cell, pos) = self.locate_resource(resource_id)?;
                self.within_reach(&client, pos)?;
                cell.enqueue(CellCommand::HitResource { client, id: resource_id });
                Ok(())
            }
            ClientCommand::LootResource { id: resource_id } => {
                let (cell, pos) = self.locate_resource(resource_id)?;
                self.within_reach(&client, pos)?;
                cell.enqueue(CellCommand::LootResource { client, id: resource_id });
                Ok(())
            }
            ClientCommand::HitNpc { uuid, .. } => {
                let pos = self
                    .grid
                    .locate_npc(&uuid)
                    .and_then(|coord| self.grid.get(coord))
                    .and_then(|cell| Some((cell.npc_pos(&uuid)?, cell)));
                let (pos, cell) = pos.ok_or(CommandError::NpcNotFound(uuid))?;
                self.within_reach(&client, pos)?;
                cell.enqueue(CellCommand::HitNpc { client, uuid });
                Ok(())
            }
            ClientCommand::PickItem { uuid, grid_cell_pos } => {
                let cell = self
                    .grid
                    .get(CellCoord::from(grid_cell_pos))
                    .ok_or(CommandError::ItemNotFound(uuid))?;
                let pos = cell.item_pos(&uuid).ok_or(CommandError::ItemNotFound(uuid))?;
                self.within_reach(&client, pos)?;
                cell.enqueue(CellCommand::PickItem { client, uuid });
                Ok(())
            }
            ClientCommand::PlaceResource { resource_type, pos } => {
                self.handle_place(&client, resource_type, pos)
            }
        }
    }

    /// Cell and position of a live resource.
    fn locate_resource(&self, id: u32) -> Result<(Arc<Cell>, Vector), CommandError> {
        self.grid
            .resources()
            .locate(id)
            .and_then(|coord| self.grid.get(coord))
            .and_then(|cell| Some((Arc::clone(&cell), cell.resource_pos(id)?)))
            .ok_or(CommandError::ResourceNotFound(id))
    }

    /// Reject targets the cell would refuse anyway, so they never queue up.
    fn within_reach(&self, client: &ClientProxy, target: Vector) -> Result<(), CommandError> {
        CommandError::check_reach(target.distance(client.pos()), self.config.player.reach)
    }

    fn handle_move(&self, client: &Arc<ClientProxy>, key: &str) -> Result<(), CommandError> {
        let direction = Direction::from_key(key).ok_or_else(|| CommandError::UnknownKey(key.to_string()))?;
        let player = &self.config.player;
        let dest = client.pos() + direction.offset(player.step_size);

        collision::check_step(&self.grid, dest, player.collision_radius)?;

        client.set_pos(dest);
        self.grid.notify_moved(client);
        Ok(())
    }

    fn handle_place(
        &self,
        client: &Arc<ClientProxy>,
        kind: ResourceKind,
        pos: Vector,
    ) -> Result<(), CommandError> {
        if kind != ResourceKind::Blockade {
            return Err(CommandError::NotPlaceable);
        }
        CommandError::check_reach(pos.distance(client.pos()), self.config.player.reach)?;

        let resources = self.grid.resources();
        let cost = resources.blockade_cost();
        client
            .try_spend(ResourceKind::Brick, cost)
            .map_err(|available| CommandError::InsufficientMaterials { needed: cost, available })?;

        self.grid.add_resource(resources.blockade(pos));
        client.send(ServerEvent::UpdateInventory {
            resource: InventoryEntry { resource_type: ResourceKind::Brick, quantity: cost },
            remove: true,
        });
        Ok(())
    }
}
