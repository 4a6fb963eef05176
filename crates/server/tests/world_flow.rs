//! End-to-end flows through the game state, grid and cells.
//!
//! Plain `#[test]`s run without a tokio runtime, so cells stay dormant and are
//! ticked by hand. The `#[tokio::test]` at the end exercises the real loops.

use protocol::types::ResourceKind;
use protocol::{ClientCommand, Hitpoints, ServerEvent, Vector};
use server::server::PlayerRecord;
use server::server::client::ClientProxy;
use server::world::Coordinator;
use server::{CellCoord, CommandError, Config, GameState, GridManager, MemoryStore, PlayerStore};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.resources.seed_cells = false;
    config.resources.seed_origin_items = false;
    config.npc.per_cell = 0;
    config
}

/// A game with one player standing at `pos`.
fn game_with_player(
    config: Config,
    pos: Vector,
) -> (GameState, Coordinator, Arc<ClientProxy>, mpsc::Receiver<ServerEvent>) {
    let store = Arc::new(MemoryStore::new());
    let uuid = Uuid::new_v4();
    store.save(uuid, PlayerRecord::fresh(pos, Hitpoints::full(100), 50));
    let (game, coordinator) = GameState::new(Arc::new(config), store);
    let (client, rx) = game.connect(Some(uuid));
    (game, coordinator, client, rx)
}

fn step(game: &GameState, client: &ClientProxy, key: &str) -> Result<(), CommandError> {
    game.handle_command(client.id, ClientCommand::Move { key: key.to_string() })
}

fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn test_concurrent_cell_creation() {
    let (grid, _coordinator) = GridManager::new(Arc::new(quiet_config()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let grid = Arc::clone(&grid);
            thread::spawn(move || grid.cell_for(Vector::new(10 + i, 20 + i)))
        })
        .collect();
    let cells: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(cells.iter().all(|c| Arc::ptr_eq(c, &cells[0])));
    assert_eq!(grid.cell_count(), 1);
}

#[test]
fn test_four_steps_north() {
    let (game, mut coordinator, client, _rx) = game_with_player(quiet_config(), Vector::ZERO);

    for _ in 0..4 {
        assert_eq!(step(&game, &client, "w"), Ok(()));
    }
    assert_eq!(client.pos(), Vector::new(0, -100));

    assert_eq!(coordinator.drain(), 4);
    assert_eq!(client.cell(), CellCoord::new(0, -1));
    assert_eq!(client.zone_changes(), 1);
}

#[test]
fn test_blockade_stops_movement() {
    let (game, mut coordinator, client, _rx) = game_with_player(quiet_config(), Vector::ZERO);
    let grid = game.grid();

    let blockade = grid.resources().blockade(Vector::new(0, -40));
    grid.add_resource(blockade);
    coordinator.drain();
    grid.cell_at(CellCoord::new(0, -1)).tick();

    for _ in 0..3 {
        assert!(matches!(step(&game, &client, "w"), Err(CommandError::Blocked(_))));
    }
    assert_eq!(client.pos(), Vector::ZERO);

    assert_eq!(step(&game, &client, "d"), Ok(()));
    assert_eq!(client.pos(), Vector::new(25, 0));
}

#[test]
fn test_moves_are_seen_by_neighbors() {
    let (game, mut coordinator, mover, _rx) = game_with_player(quiet_config(), Vector::new(100, 100));
    let (_watcher, mut watcher_rx) = game.connect(None);
    let cell = game.grid().cell_at(CellCoord::new(0, 0));
    cell.tick();
    drain(&mut watcher_rx);

    assert_eq!(step(&game, &mover, "s"), Ok(()));
    coordinator.drain();
    cell.tick();

    let events = drain(&mut watcher_rx);
    assert_eq!(
        events,
        vec![ServerEvent::batch(vec![ServerEvent::PlayerTargetPosition {
            id: mover.id,
            pos: Vector::new(100, 125),
            force: false,
        }])]
    );
}

#[test]
fn test_viewers_losing_sight_drop_the_mover() {
    let store = Arc::new(MemoryStore::new());
    let spots = [Vector::new(490, 10), Vector::new(-990, 10), Vector::new(0, 10)];
    let uuids: Vec<Uuid> = spots
        .iter()
        .map(|&pos| {
            let uuid = Uuid::new_v4();
            store.save(uuid, PlayerRecord::fresh(pos, Hitpoints::full(100), 0));
            uuid
        })
        .collect();
    let (game, mut coordinator) = GameState::new(Arc::new(quiet_config()), store);
    let (mover, _mover_rx) = game.connect(Some(uuids[0]));
    // (-2,0) sees out to (0,0) only; the origin sees both (0,0) and (1,0).
    let (_far, mut far_rx) = game.connect(Some(uuids[1]));
    let (_near, mut near_rx) = game.connect(Some(uuids[2]));

    let grid = game.grid();
    let origin = grid.cell_at(CellCoord::new(0, 0));
    let east = grid.cell_at(CellCoord::new(1, 0));
    origin.tick();
    east.tick();
    drain(&mut far_rx);
    drain(&mut near_rx);

    assert_eq!(step(&game, &mover, "d"), Ok(()));
    coordinator.drain();
    assert_eq!(mover.cell(), CellCoord::new(1, 0));
    origin.tick();
    east.tick();

    assert_eq!(drain(&mut far_rx), vec![ServerEvent::RemovePlayer { id: mover.id }]);

    let seen: Vec<ServerEvent> = drain(&mut near_rx)
        .into_iter()
        .flat_map(|event| match event {
            ServerEvent::Batch { events } => events,
            other => vec![other],
        })
        .collect();
    assert!(!seen.iter().any(|e| matches!(e, ServerEvent::RemovePlayer { .. })));
    assert!(seen.contains(&ServerEvent::PlayerTargetPosition {
        id: mover.id,
        pos: Vector::new(515, 10),
        force: false,
    }));
}

#[test]
fn test_old_neighborhood_goes_stale() {
    let (game, _coordinator, client, mut rx) = game_with_player(quiet_config(), Vector::new(10, 10));
    let grid = game.grid();
    let far_west = grid.cell_at(CellCoord::new(-2, 0));
    let origin = grid.cell_at(CellCoord::new(0, 0));
    far_west.tick();
    origin.tick();
    drain(&mut rx);

    for k in 1..=6 {
        client.set_pos(Vector::new(500 * k + 10, 10));
        assert!(grid.on_client_moved(&client));
    }
    assert_eq!(client.zone_changes(), 6);

    far_west.tick();
    assert_eq!(far_west.subscriber_count(), 0);
    assert_eq!(
        drain(&mut rx),
        vec![ServerEvent::RemoveGridCell { grid_cell_key: "-2#0".into() }]
    );

    // (0,0) was renewed while the client passed through (1,0) and (2,0).
    origin.tick();
    assert_eq!(origin.subscription_tick(client.id), Some(2));
    assert_eq!(origin.subscriber_count(), 1);
}

#[test]
fn test_harvest_tree() {
    let (game, mut coordinator, client, mut rx) = game_with_player(quiet_config(), Vector::new(250, 250));
    let grid = game.grid();
    let cell = grid.cell_at(CellCoord::new(0, 0));

    let mut tree = grid.resources().blockade(Vector::new(300, 250));
    tree.resource_type = ResourceKind::Tree;
    tree.hitpoints = Hitpoints::full(60);
    let tree_id = tree.id;
    grid.add_resource(tree);
    coordinator.drain();
    cell.tick();
    drain(&mut rx);

    let hit = ClientCommand::HitResource { id: tree_id, skill: String::new() };
    assert_eq!(game.handle_command(client.id, hit.clone()), Ok(()));
    assert_eq!(game.handle_command(client.id, hit), Ok(()));
    cell.tick();
    assert_eq!(grid.resources().locate(tree_id), None);

    coordinator.drain();
    cell.tick();
    let logs = cell.resources();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].resource_type, ResourceKind::Log);

    let loot = ClientCommand::LootResource { id: logs[0].id };
    assert_eq!(game.handle_command(client.id, loot), Ok(()));
    cell.tick();
    assert!((3..=4).contains(&client.quantity(ResourceKind::Log)));
    assert!(cell.resources().is_empty());
}

#[tokio::test]
async fn test_cells_activate_and_go_dormant() {
    let mut config = quiet_config();
    config.grid.tick_interval_ms = 10;
    let (game, coordinator) = GameState::new(Arc::new(config), Arc::new(MemoryStore::new()));
    tokio::spawn(coordinator.run());

    let (client, mut rx) = game.connect(None);
    let home = game.grid().cell_at(client.cell());
    assert!(home.is_running());

    let snapshot = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(event) = rx.recv().await {
            if let ServerEvent::Batch { events } = event {
                if events.iter().any(|e| matches!(e, ServerEvent::CellData { .. })) {
                    return true;
                }
            }
        }
        false
    })
    .await;
    assert_eq!(snapshot, Ok(true));

    game.disconnect(client.id);
    let parked = tokio::time::timeout(Duration::from_secs(2), async {
        while home.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(parked.is_ok());
    assert_eq!(home.subscriber_count(), 0);
}
