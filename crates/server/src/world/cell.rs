//! The cell actor.
//!
//! A cell owns everything inside one grid square. Other tasks only ever push
//! into its inbox; the cell's own tick is the single writer of its state and
//! emits everything that happened during the tick as one batch per subscriber.

use super::terrain::Terrain;
use super::{CellCoord, GridCommand, WorldContext};
use crate::ai::{Npc, NpcContext};
use crate::entity::item;
use crate::error::CommandError;
use crate::server::client::ClientProxy;
use parking_lot::Mutex;
use protocol::types::{InventoryEntry, Item, NpcInfo, Resource};
use protocol::{ServerEvent, Vector};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Spread of items dropped by a dying NPC.
const NPC_LOOT_SPREAD: i32 = 50;

/// A client's interest in a cell.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub client: Arc<ClientProxy>,
    /// The client's zone change count when it last (re)subscribed.
    pub tick: u64,
}

/// Work queued for a cell by other tasks.
#[derive(Debug)]
pub enum CellCommand {
    HitResource { client: Arc<ClientProxy>, id: u32 },
    LootResource { client: Arc<ClientProxy>, id: u32 },
    HitNpc { client: Arc<ClientProxy>, uuid: Uuid },
    PickItem { client: Arc<ClientProxy>, uuid: Uuid },
    /// Player `id` moved to another cell. Subscribers not in `watchers`
    /// can no longer see it.
    PlayerLeft { id: u32, watchers: HashSet<u32> },
    /// Relay an event to every subscriber with this tick's batch.
    Broadcast(ServerEvent),
}

#[derive(Debug, Default)]
struct Inbox {
    subscribe: Vec<Subscription>,
    remove: Vec<Arc<ClientProxy>>,
    add: Vec<Arc<ClientProxy>>,
    commands: Vec<CellCommand>,
    resources: Vec<Resource>,
    items: Vec<Item>,
}

#[derive(Debug)]
struct CellState {
    ticks: u64,
    players: HashMap<u32, Arc<ClientProxy>>,
    subscriptions: HashMap<u32, Subscription>,
    resources: BTreeMap<u32, Resource>,
    items: BTreeMap<Uuid, Item>,
    npcs: Vec<Npc>,
    /// Items produced during this tick, placed with the queued additions.
    dropped: Vec<Item>,
    events: Vec<ServerEvent>,
}

impl CellState {
    fn has_work(&self) -> bool {
        !self.subscriptions.is_empty() || self.npcs.iter().any(|n| n.target.is_some())
    }
}

/// One square of the world.
#[derive(Debug)]
pub struct Cell {
    coord: CellCoord,
    key: String,
    ctx: Arc<WorldContext>,
    terrain: Terrain,
    inbox: Mutex<Inbox>,
    state: Mutex<CellState>,
    /// Whether a tick task is alive for this cell.
    running: Mutex<bool>,
}

impl Cell {
    pub(super) fn new(
        coord: CellCoord,
        ctx: Arc<WorldContext>,
        terrain: Terrain,
        npcs: Vec<Npc>,
        resources: Vec<Resource>,
        items: Vec<Item>,
    ) -> Self {
        let state = CellState {
            ticks: 0,
            players: HashMap::new(),
            subscriptions: HashMap::new(),
            resources: resources.into_iter().map(|r| (r.id, r)).collect(),
            items: items.into_iter().map(|i| (i.uuid, i)).collect(),
            npcs,
            dropped: Vec::new(),
            events: Vec::new(),
        };
        Self {
            key: coord.key(),
            coord,
            ctx,
            terrain,
            inbox: Mutex::new(Inbox::default()),
            state: Mutex::new(state),
            running: Mutex::new(false),
        }
    }

    pub fn coord(&self) -> CellCoord {
        self.coord
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    // ---- inbox -------------------------------------------------------------

    /// Queue a subscription request without waking the cell.
    ///
    /// The client's zone change count is captured now, not when the request
    /// is processed.
    pub fn request_subscribe(&self, client: &Arc<ClientProxy>) {
        let request = Subscription { client: Arc::clone(client), tick: client.zone_changes() };
        self.inbox.lock().subscribe.push(request);
    }

    /// Queue a subscription request and make sure the cell is ticking.
    pub fn subscribe(self: &Arc<Self>, client: &Arc<ClientProxy>) {
        self.request_subscribe(client);
        self.ensure_running();
    }

    pub fn add_player(&self, client: &Arc<ClientProxy>) {
        self.inbox.lock().add.push(Arc::clone(client));
    }

    pub fn remove_player(&self, client: &Arc<ClientProxy>) {
        self.inbox.lock().remove.push(Arc::clone(client));
    }

    pub fn enqueue(&self, command: CellCommand) {
        self.inbox.lock().commands.push(command);
    }

    pub fn add_resource(&self, resource: Resource) {
        self.inbox.lock().resources.push(resource);
    }

    pub fn add_item(&self, item: Item) {
        self.inbox.lock().items.push(item);
    }

    // ---- snapshots ---------------------------------------------------------

    /// Resources currently in the cell.
    pub fn resources(&self) -> Vec<Resource> {
        self.state.lock().resources.values().filter(|r| !r.remove).cloned().collect()
    }

    pub fn items(&self) -> Vec<Item> {
        self.state.lock().items.values().cloned().collect()
    }

    pub fn npcs(&self) -> Vec<NpcInfo> {
        self.state.lock().npcs.iter().filter(|n| !n.remove).map(Npc::info).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Zone tick stored for a subscriber.
    pub fn subscription_tick(&self, client_id: u32) -> Option<u64> {
        self.state.lock().subscriptions.get(&client_id).map(|s| s.tick)
    }

    /// Ids of current subscribers and of pending subscription requests.
    pub fn subscriber_ids(&self) -> HashSet<u32> {
        let mut ids: HashSet<u32> = self.state.lock().subscriptions.keys().copied().collect();
        ids.extend(self.inbox.lock().subscribe.iter().map(|s| s.client.id));
        ids
    }

    /// Position of a live resource.
    pub fn resource_pos(&self, id: u32) -> Option<Vector> {
        self.state.lock().resources.get(&id).filter(|r| !r.remove).map(|r| r.pos)
    }

    /// Position of a live NPC.
    pub fn npc_pos(&self, uuid: &Uuid) -> Option<Vector> {
        self.state
            .lock()
            .npcs
            .iter()
            .find(|n| n.uuid == *uuid && !n.remove)
            .map(|n| n.pos)
    }

    pub fn item_pos(&self, uuid: &Uuid) -> Option<Vector> {
        self.state.lock().items.get(uuid).map(|i| i.pos)
    }

    /// Commands waiting for the next tick.
    pub fn pending_commands(&self) -> usize {
        self.inbox.lock().commands.len()
    }

    pub fn has_player(&self, client_id: u32) -> bool {
        self.state.lock().players.contains_key(&client_id)
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    /// First solid resource closer than `radius` to `pos`, if any.
    pub fn obstacle_near(&self, pos: Vector, radius: f64) -> Option<u32> {
        self.state
            .lock()
            .resources
            .values()
            .find(|r| r.is_solid && !r.remove && r.pos.distance(pos) < radius)
            .map(|r| r.id)
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Start the tick task unless one is already alive.
    ///
    /// Outside a tokio runtime the cell stays dormant and has to be ticked by
    /// hand.
    pub fn ensure_running(self: &Arc<Self>) {
        let mut running = self.running.lock();
        if *running {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            trace!("No runtime, cell {} stays dormant", self.key);
            return;
        };
        *running = true;
        let cell = Arc::clone(self);
        handle.spawn(cell.run());
    }

    async fn run(self: Arc<Self>) {
        let period = self.ctx.config.grid.tick_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("Cell {} activated", self.key);

        loop {
            ticker.tick().await;

            let tick_start = StdInstant::now();
            let has_work = self.tick();
            let elapsed = tick_start.elapsed();
            if elapsed > period {
                warn!("Slow tick in cell {}: {:.3}ms", self.key, elapsed.as_secs_f64() * 1000.0);
            }

            if !has_work && self.park() {
                debug!("Cell {} went dormant", self.key);
                return;
            }
        }
    }

    /// Clear the running flag unless a subscription request is waiting.
    fn park(&self) -> bool {
        let mut running = self.running.lock();
        if !self.inbox.lock().subscribe.is_empty() {
            return false;
        }
        *running = false;
        true
    }

    // ---- tick --------------------------------------------------------------

    /// Run one update and flush the resulting batch.
    ///
    /// Returns whether the cell still has subscribers or a hunting NPC.
    pub fn tick(&self) -> bool {
        let inbox = std::mem::take(&mut *self.inbox.lock());
        let mut state = self.state.lock();
        let mut rng = rand::rng();
        state.ticks += 1;

        self.apply_subscriptions(&mut state, inbox.subscribe);
        self.expire_subscriptions(&mut state);
        self.apply_membership(&mut state, inbox.remove, inbox.add);

        for command in inbox.commands {
            if let Err(e) = self.apply_command(&mut state, command, &mut rng) {
                trace!("Cell {} ignored command: {}", self.key, e);
            }
        }

        self.step_npcs(&mut state, &mut rng);
        self.apply_additions(&mut state, inbox.resources, inbox.items);
        self.flush(&mut state);

        state.has_work()
    }

    fn apply_subscriptions(&self, state: &mut CellState, requests: Vec<Subscription>) {
        for request in requests {
            let client = &request.client;
            if !client.is_connected() {
                continue;
            }

            if let Some(existing) = state.subscriptions.get_mut(&client.id) {
                existing.tick = request.tick;
                continue;
            }

            client.send(ServerEvent::batch(self.snapshot_for(state, client.id)));
            state.subscriptions.insert(client.id, request);
        }
    }

    /// Everything a client needs when it first looks at this cell.
    fn snapshot_for(&self, state: &CellState, client_id: u32) -> Vec<ServerEvent> {
        let mut events: Vec<ServerEvent> = state
            .players
            .values()
            .filter(|p| p.id != client_id && p.is_connected())
            .map(|p| ServerEvent::NewPlayer { id: p.id, pos: p.pos(), hitpoints: p.hitpoints() })
            .collect();

        events.push(ServerEvent::ResourcePositions {
            resources: state.resources.values().filter(|r| !r.remove).cloned().collect(),
        });
        events.push(ServerEvent::ItemPositions {
            grid_cell_key: self.key.clone(),
            items: state.items.values().cloned().collect(),
        });
        events.push(ServerEvent::CellData {
            grid_cell_key: self.key.clone(),
            pos: self.coord.as_vector(),
            sub_cells: self.terrain.sub_cells.clone(),
            sub_cell_base64: self.terrain.minimap.clone(),
        });
        events.push(ServerEvent::NpcList {
            grid_cell_key: self.key.clone(),
            npc_list: state.npcs.iter().filter(|n| !n.remove).map(Npc::info).collect(),
        });
        events
    }

    fn expire_subscriptions(&self, state: &mut CellState) {
        let threshold = self.ctx.config.grid.stale_threshold;
        state.subscriptions.retain(|_, sub| {
            let client = &sub.client;
            if !client.is_connected() {
                return false;
            }
            if client.zone_changes().saturating_sub(sub.tick) > threshold {
                client.send(ServerEvent::RemoveGridCell { grid_cell_key: self.key.clone() });
                return false;
            }
            true
        });
    }

    fn apply_membership(
        &self,
        state: &mut CellState,
        removed: Vec<Arc<ClientProxy>>,
        added: Vec<Arc<ClientProxy>>,
    ) {
        for client in removed {
            state.players.remove(&client.id);
            if !client.is_connected() {
                state.events.push(ServerEvent::RemovePlayer { id: client.id });
            }
        }

        for client in added {
            if !client.is_connected() {
                continue;
            }
            state.events.push(ServerEvent::NewPlayer {
                id: client.id,
                pos: client.pos(),
                hitpoints: client.hitpoints(),
            });
            state.players.insert(client.id, client);
        }
    }

    fn apply_command<R: rand::Rng + ?Sized>(
        &self,
        state: &mut CellState,
        command: CellCommand,
        rng: &mut R,
    ) -> Result<(), CommandError> {
        let reach = self.ctx.config.player.reach;
        let damage = self.ctx.config.player.hit_damage;

        match command {
            CellCommand::Broadcast(event) => {
                state.events.push(event);
            }
            CellCommand::HitResource { client, id } => {
                let resource = state
                    .resources
                    .get_mut(&id)
                    .filter(|r| !r.remove)
                    .ok_or(CommandError::ResourceNotFound(id))?;
                if resource.is_lootable {
                    return Err(CommandError::WrongResourceState(id));
                }
                CommandError::check_reach(resource.pos.distance(client.pos()), reach)?;

                resource.hitpoints.take_damage(damage);
                let destroyed = resource.hitpoints.is_depleted();
                resource.remove = destroyed;
                state.events.push(ServerEvent::UpdateResource {
                    grid_cell_key: self.key.clone(),
                    id,
                    hitpoints: resource.hitpoints,
                    remove: destroyed,
                    damage,
                });

                if destroyed {
                    if let Some(resource) = state.resources.remove(&id) {
                        self.ctx.resources.forget(id);
                        for loot in self.ctx.resources.loot(rng, &resource) {
                            self.ctx.dispatch(GridCommand::AddResource(loot));
                        }
                    }
                }
            }
            CellCommand::LootResource { client, id } => {
                let resource = state
                    .resources
                    .get(&id)
                    .filter(|r| !r.remove)
                    .ok_or(CommandError::ResourceNotFound(id))?;
                if !resource.is_lootable {
                    return Err(CommandError::WrongResourceState(id));
                }
                CommandError::check_reach(resource.pos.distance(client.pos()), reach)?;

                let Some(resource) = state.resources.remove(&id) else {
                    return Err(CommandError::ResourceNotFound(id));
                };
                self.ctx.resources.forget(id);
                client.add_resource(resource.resource_type, resource.quantity);
                state.events.push(ServerEvent::UpdateResource {
                    grid_cell_key: self.key.clone(),
                    id,
                    hitpoints: resource.hitpoints,
                    remove: true,
                    damage: 0,
                });
                client.send(ServerEvent::UpdateInventory {
                    resource: InventoryEntry {
                        resource_type: resource.resource_type,
                        quantity: resource.quantity,
                    },
                    remove: false,
                });
            }
            CellCommand::HitNpc { client, uuid } => {
                let npc = state
                    .npcs
                    .iter_mut()
                    .find(|n| n.uuid == uuid && !n.remove)
                    .ok_or(CommandError::NpcNotFound(uuid))?;
                CommandError::check_reach(npc.pos.distance(client.pos()), reach)?;

                if npc.take_hit(&self.key, damage, &mut state.events) {
                    self.ctx.forget_npc(&uuid);
                    let loot = item::scatter(rng, self.coord.as_vector(), npc.pos, NPC_LOOT_SPREAD);
                    state.dropped.push(loot);
                }
            }
            CellCommand::PlayerLeft { id, watchers } => {
                for sub in state.subscriptions.values() {
                    let viewer = &sub.client;
                    if viewer.id != id && !watchers.contains(&viewer.id) && viewer.is_connected() {
                        viewer.send(ServerEvent::RemovePlayer { id });
                    }
                }
            }
            CellCommand::PickItem { client, uuid } => {
                let item = state.items.get(&uuid).ok_or(CommandError::ItemNotFound(uuid))?;
                CommandError::check_reach(item.pos.distance(client.pos()), reach)?;

                let Some(item) = state.items.remove(&uuid) else {
                    return Err(CommandError::ItemNotFound(uuid));
                };
                client.add_item(item.clone());
                state.events.push(ServerEvent::RemoveItem { uuid });
                client.send(ServerEvent::UpdateInventoryItem { item, remove: false });
            }
        }
        Ok(())
    }

    fn step_npcs<R: rand::Rng + ?Sized>(&self, state: &mut CellState, rng: &mut R) {
        let CellState { npcs, subscriptions, events, .. } = state;
        npcs.retain(|n| !n.remove);

        let ctx = NpcContext {
            config: &self.ctx.config.npc,
            cell_key: &self.key,
            subscriptions: &*subscriptions,
        };
        for npc in npcs.iter_mut() {
            npc.update(&ctx, events, rng);
        }
    }

    fn apply_additions(&self, state: &mut CellState, resources: Vec<Resource>, mut items: Vec<Item>) {
        if !resources.is_empty() {
            for resource in &resources {
                state.resources.insert(resource.id, resource.clone());
            }
            state.events.push(ServerEvent::ResourcePositions { resources });
        }

        items.append(&mut state.dropped);
        if !items.is_empty() {
            for item in &items {
                state.items.insert(item.uuid, item.clone());
            }
            state.events.push(ServerEvent::ItemPositions {
                grid_cell_key: self.key.clone(),
                items,
            });
        }
    }

    fn flush(&self, state: &mut CellState) {
        if state.events.is_empty() {
            return;
        }
        let batch = ServerEvent::batch(std::mem::take(&mut state.events));
        for sub in state.subscriptions.values() {
            if sub.client.is_connected() {
                sub.client.send(batch.clone());
            }
        }
    }
}
