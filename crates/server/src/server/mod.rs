//! Game server implementation.

use crate::config::Config;
use crate::entity::OwnerId;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use protocol::packets::{self, CellRecord, PlayerRecord};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

pub mod delta;
pub mod game;
mod intake;
mod tick;

pub use delta::{DeltaTracker, StateDelta};
pub use game::{GameState, ServerStatus, run_broadcast_loop, run_game_loop};

/// Who receives an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    Only(OwnerId),
    AllExcept(OwnerId),
}

impl Audience {
    #[inline]
    pub fn includes(&self, client_id: OwnerId) -> bool {
        match *self {
            Audience::Everyone => true,
            Audience::Only(id) => id == client_id,
            Audience::AllExcept(id) => id != client_id,
        }
    }
}

/// Messages the simulation emits towards clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    InitialState {
        owner_id: OwnerId,
        bounds: [f64; 4],
        players: Vec<PlayerRecord>,
        cells: Vec<CellRecord>,
    },
    PlayerJoined {
        player: PlayerRecord,
        cells: Vec<CellRecord>,
    },
    PlayerLeft {
        owner_id: OwnerId,
    },
    StateDelta(StateDelta),
    Died {
        final_score: u32,
    },
    Chat {
        owner_id: OwnerId,
        nickname: String,
        text: String,
        timestamp_ms: u64,
    },
    SystemNotice {
        text: String,
        timestamp_ms: u64,
    },
}

impl ServerMessage {
    /// Encode to the binary wire format.
    pub fn encode(&self) -> Bytes {
        let writer = match self {
            ServerMessage::InitialState { owner_id, bounds, players, cells } => {
                packets::build_initial_state(*owner_id, *bounds, players, cells)
            }
            ServerMessage::PlayerJoined { player, cells } => packets::build_player_joined(player, cells),
            ServerMessage::PlayerLeft { owner_id } => packets::build_player_left(*owner_id),
            ServerMessage::StateDelta(delta) => {
                packets::build_state_delta(&delta.new_cells, &delta.updated, &delta.removed)
            }
            ServerMessage::Died { final_score } => packets::build_died(*final_score),
            ServerMessage::Chat { owner_id, nickname, text, timestamp_ms } => {
                packets::build_chat_message(*owner_id, nickname, text, *timestamp_ms)
            }
            ServerMessage::SystemNotice { text, timestamp_ms } => {
                packets::build_system_notice(text, *timestamp_ms)
            }
        };
        writer.finish()
    }
}

/// A queued message and its audience, produced while the game lock is held.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub audience: Audience,
    pub message: ServerMessage,
}

/// An encoded message on the fan-out channel.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub payload: Bytes,
}

impl Outbound {
    #[inline]
    pub fn is_for(&self, client_id: OwnerId) -> bool {
        self.audience.includes(client_id)
    }
}

impl From<&Envelope> for Outbound {
    fn from(envelope: &Envelope) -> Self {
        Self {
            audience: envelope.audience,
            payload: envelope.message.encode(),
        }
    }
}

/// Shared access to the game state plus the outbound fan-out channel.
///
/// Every mutation goes through [`ServerHandle::with_game`], which holds the
/// write lock for the whole operation.
#[derive(Clone)]
pub struct ServerHandle {
    game: Arc<RwLock<GameState>>,
    outbound_tx: broadcast::Sender<Outbound>,
}

impl ServerHandle {
    pub fn new(config: &Config) -> Self {
        let (outbound_tx, _) = broadcast::channel::<Outbound>(256);
        Self {
            game: Arc::new(RwLock::new(GameState::new(config))),
            outbound_tx,
        }
    }

    /// Run `f` with exclusive access to the game, then publish whatever it
    /// queued. Messages are published before the lock is released so every
    /// connection observes them in mutation order.
    pub async fn with_game<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        let mut game = self.game.write().await;
        let result = f(&mut game);
        for envelope in game.drain_outbox() {
            // No receivers is fine: nobody is connected.
            let _ = self.outbound_tx.send(Outbound::from(&envelope));
        }
        result
    }

    /// Read-only access, for status queries.
    pub async fn read<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        let game = self.game.read().await;
        f(&game)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound_tx.subscribe()
    }

    /// A connection's receiver overflowed: resend the world to it.
    pub async fn recover_lagged(&self, client_id: OwnerId, skipped: u64) {
        warn!("Client {} lagged, {} messages dropped; resyncing", client_id, skipped);
        self.with_game(|game| game.resync(client_id)).await;
    }

    /// Fill the world and start the simulation and broadcast loops.
    pub async fn start(&self) {
        self.with_game(|game| game.populate()).await;
        let (tick_rate, broadcast_rate) = self
            .read(|game| (game.config.server.tick_rate, game.config.server.broadcast_rate))
            .await;

        let handle = self.clone();
        tokio::spawn(async move {
            run_game_loop(handle, tick_rate).await;
        });
        let handle = self.clone();
        tokio::spawn(async move {
            run_broadcast_loop(handle, broadcast_rate).await;
        });
    }
}

/// Connection tracking state (shared across connection handlers).
pub struct ConnectionLimits {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
    max_total: usize,
    max_per_ip: usize,
}

impl ConnectionLimits {
    pub fn new(max_total: usize, max_per_ip: usize) -> Self {
        Self {
            ip_connections: HashMap::new(),
            total_connections: 0,
            max_total,
            max_per_ip,
        }
    }

    /// Try to add a connection, returns true if allowed.
    pub fn try_add(&mut self, ip: IpAddr) -> bool {
        if self.total_connections >= self.max_total {
            return false;
        }
        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= self.max_per_ip {
            return false;
        }
        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    /// Remove a connection.
    pub fn remove(&mut self, ip: IpAddr) {
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

/// Run the game server on a bare WebSocket listener.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    let limits = Arc::new(RwLock::new(ConnectionLimits::new(
        config.server.max_connections,
        config.server.ip_limit,
    )));

    let handle = ServerHandle::new(&config);
    handle.start().await;

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip();

        if !limits.write().await.try_add(ip) {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }

        let handle = handle.clone();
        let limits = Arc::clone(&limits);
        tokio::spawn(async move {
            let result = handle_connection(stream, addr, handle).await;
            limits.write().await.remove(addr.ip());
            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(stream: TcpStream, addr: SocketAddr, handle: ServerHandle) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    // Subscribe before registering so the join reply can't be missed.
    let mut outbound_rx = handle.subscribe();
    let client_id = handle.with_game(|game| game.add_client(addr)).await;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        handle.with_game(|game| game.handle_packet(client_id, &data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    _ => {}
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Ok(out) => {
                        if !out.is_for(client_id) {
                            continue;
                        }
                        if let Err(e) = write.send(Message::Binary(out.payload)).await {
                            warn!("Failed to send to {}: {}", addr, e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        handle.recover_lagged(client_id, skipped).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    handle.with_game(|game| game.remove_client(client_id)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience() {
        assert!(Audience::Everyone.includes(3));
        assert!(Audience::Only(3).includes(3));
        assert!(!Audience::Only(3).includes(4));
        assert!(Audience::AllExcept(3).includes(4));
        assert!(!Audience::AllExcept(3).includes(3));
    }

    #[test]
    fn test_connection_limits() {
        let mut limits = ConnectionLimits::new(3, 2);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limits.try_add(a));
        assert!(limits.try_add(a));
        assert!(!limits.try_add(a), "per-ip limit");
        assert!(limits.try_add(b));
        assert!(!limits.try_add(b), "total limit");
        limits.remove(a);
        assert!(limits.try_add(b));
    }

    #[tokio::test]
    async fn test_join_reply_is_published_to_the_joiner_only() {
        let handle = ServerHandle::new(&Config::default());
        let mut rx = handle.subscribe();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        let (a, b) = handle
            .with_game(|game| (game.add_client(addr), game.add_client(addr)))
            .await;
        let join = packets::build_join("alpha", protocol::Color::new(200, 10, 10), None).finish();
        handle.with_game(|game| game.handle_packet(a, &join)).await;

        // InitialState (to a), PlayerJoined (to b), SystemNotice (to all).
        let first = rx.recv().await.unwrap();
        assert!(first.is_for(a) && !first.is_for(b));
        assert_eq!(first.payload[0], packets::ServerOpcode::InitialState as u8);

        let second = rx.recv().await.unwrap();
        assert!(second.is_for(b) && !second.is_for(a));
        assert_eq!(second.payload[0], packets::ServerOpcode::PlayerJoined as u8);

        let third = rx.recv().await.unwrap();
        assert!(third.is_for(a) && third.is_for(b));
        assert_eq!(third.payload[0], packets::ServerOpcode::SystemNotice as u8);
    }

    #[tokio::test]
    async fn test_lagging_receiver_is_resynced() {
        let mut config = Config::default();
        config.pellet.target = 0;
        config.virus.target = 0;
        let handle = ServerHandle::new(&config);
        let mut rx = handle.subscribe();
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let client = handle.with_game(|game| game.add_client(addr)).await;

        let doomed = handle
            .with_game(|game| {
                let id = game.world.spawn_pellet(1.0);
                game.broadcast_delta();
                id
            })
            .await;
        handle
            .with_game(|game| {
                game.world.remove_cell(doomed);
                game.broadcast_delta();
            })
            .await;
        // Overflow the channel so the removal above is dropped for `rx`.
        for _ in 0..300 {
            handle
                .with_game(|game| {
                    game.world.spawn_pellet(1.0);
                    game.broadcast_delta();
                })
                .await;
        }

        let mut lagged = false;
        let mut resynced = false;
        loop {
            match rx.try_recv() {
                Ok(out) => {
                    if lagged && out.is_for(client) && out.payload[0] == packets::ServerOpcode::InitialState as u8 {
                        resynced = true;
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    lagged = true;
                    handle.recover_lagged(client, skipped).await;
                }
                Err(_) => break,
            }
        }
        assert!(lagged);
        assert!(resynced, "a lagged client receives a fresh snapshot");

        let snapshot = handle.read(|game| game.initial_state(client)).await;
        match snapshot {
            ServerMessage::InitialState { owner_id, cells, .. } => {
                assert_eq!(owner_id, client);
                assert_eq!(cells.len(), 300);
                assert!(cells.iter().all(|c| c.cell_id != doomed));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
