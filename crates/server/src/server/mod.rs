//! WebSocket transport and session plumbing.

use crate::config::Config;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use protocol::{ClientCommand, ServerEvent};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tracing::{error, info, trace, warn};

pub mod client;
pub mod game;
pub mod store;

pub use game::GameState;
pub use store::{MemoryStore, PlayerRecord, PlayerStore};

/// Connection tracking state (shared across connection handlers).
#[derive(Debug, Default)]
struct ConnectionState {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
}

impl ConnectionState {
    /// Try to add a connection, returns true if allowed.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }

        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }

        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            if *count > 0 {
                *count -= 1;
                self.total_connections = self.total_connections.saturating_sub(1);
            }
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }
}

/// Run the server until the listener fails.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    let config = Arc::new(config);
    let store: Arc<dyn PlayerStore> = Arc::new(MemoryStore::new());
    let (game, coordinator) = GameState::new(Arc::clone(&config), store);
    let game = Arc::new(game);
    tokio::spawn(coordinator.run());

    let conn_state = Arc::new(Mutex::new(ConnectionState::default()));
    let max_connections = config.server.max_connections;
    let ip_limit = config.server.ip_limit;

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip();

        if !conn_state.lock().try_add_connection(ip, max_connections, ip_limit) {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }

        let game = Arc::clone(&game);
        let conn_state = Arc::clone(&conn_state);
        tokio::spawn(async move {
            let result = handle_connection(stream, addr, game).await;

            // Always remove from connection tracking when done
            conn_state.lock().remove_connection(ip);

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Read frames until the first login command.
async fn await_login(
    read: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
) -> anyhow::Result<Option<ClientCommand>> {
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => return Ok(Some(protocol::decode(&text)?)),
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

/// Handle a single WebSocket connection.
async fn handle_connection(stream: TcpStream, addr: SocketAddr, game: Arc<GameState>) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (mut write, mut read) = ws_stream.split();

    let uuid = match await_login(&mut read).await? {
        Some(ClientCommand::Login { uuid }) => uuid,
        Some(other) => {
            warn!("Expected login from {}, got {:?}", addr, other);
            return Ok(());
        }
        None => return Ok(()),
    };

    let (client, mut outbound) = game.connect(uuid);
    let client_id = client.id;
    drop(client);

    let result = session_loop(&game, client_id, addr, &mut write, &mut read, &mut outbound).await;

    game.disconnect(client_id);
    result
}

async fn session_loop<W, R>(
    game: &GameState,
    client_id: u32,
    addr: SocketAddr,
    write: &mut W,
    read: &mut R,
    outbound: &mut mpsc::Receiver<ServerEvent>,
) -> anyhow::Result<()>
where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    R: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let command = protocol::decode(&text)?;
                        if let Err(e) = game.handle_command(client_id, command) {
                            trace!("Client {} command ignored: {}", client_id, e);
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => {
                        break;
                    }
                    _ => {}
                }
            }
            event = outbound.recv() => {
                let Some(event) = event else {
                    break;
                };
                let frame = protocol::encode(&event)?;
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    warn!("Failed to send {} to {}: {}", event.name(), addr, e);
                    break;
                }
            }
        }
    }
    Ok(())
}
