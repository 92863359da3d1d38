//! Game state and main loops.

use crate::config::Config;
use crate::entity::{OwnerId, Player};
use crate::mass::MassModel;
use crate::world::World;
use fixedbitset::FixedBitSet;
use protocol::packets::ClientPacket;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::delta::DeltaTracker;
use super::{Audience, Envelope, ServerHandle, ServerMessage};

/// Main game state.
pub struct GameState {
    pub config: Config,
    pub world: World,
    pub tick_count: u64,
    pub start_time: std::time::Instant,

    // ID counters
    next_client_id: OwnerId,

    /// Connected sessions. A session outlives its player: after dying the
    /// connection stays open and may join again.
    clients: HashMap<OwnerId, SocketAddr>,

    /// Messages queued by the current operation.
    outbox: Vec<Envelope>,

    delta: DeltaTracker,
    broadcast_count: u64,

    /// Ticks after a split or join during which siblings cannot merge.
    pub(super) merge_cooldown_ticks: u64,

    // Reusable per-tick buffer
    pub(super) involved: FixedBitSet,

    /// Exponential moving average of tick time in milliseconds.
    pub update_time_avg: f64,
}

/// Snapshot of server counters for the status route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    #[serde(rename = "uptime")]
    pub uptime_secs: u64,
    pub connections: usize,
    pub players: usize,
    pub cells: usize,
    pub pellets: usize,
    pub viruses: usize,
    #[serde(rename = "update")]
    pub tick_ms: f64,
}

impl GameState {
    pub fn new(config: &Config) -> Self {
        let mass = MassModel::from_config(&config.player);
        let world = World::new(config.border.width as f32, config.border.height as f32, mass);

        Self {
            merge_cooldown_ticks: config.merge_cooldown_ticks(),
            delta: DeltaTracker::new(config.physics.diff_epsilon),
            config: config.clone(),
            world,
            tick_count: 0,
            start_time: std::time::Instant::now(),
            next_client_id: 1,
            clients: HashMap::new(),
            outbox: Vec::new(),
            broadcast_count: 0,
            involved: FixedBitSet::new(),
            update_time_avg: 0.0,
        }
    }

    /// Fill pellets and viruses up to their targets.
    pub fn populate(&mut self) {
        while self.world.pellet_count() < self.config.pellet.target {
            self.world.spawn_pellet(self.config.pellet.score);
        }
        while self.world.virus_count() < self.config.virus.target {
            self.world.spawn_virus(self.config.virus.score);
        }
        info!(
            "World populated: {} pellets, {} viruses",
            self.world.pellet_count(),
            self.world.virus_count()
        );
    }

    /// Register a new connection and return its id.
    pub fn add_client(&mut self, addr: SocketAddr) -> OwnerId {
        let id = self.next_client_id;
        self.next_client_id = self.next_client_id.wrapping_add(1).max(1);
        self.clients.insert(id, addr);
        info!("Client {} connected from {}", id, addr);
        id
    }

    /// Tear down a connection: its player (if any) leaves immediately.
    pub fn remove_client(&mut self, client_id: OwnerId) {
        if let Some(addr) = self.clients.remove(&client_id) {
            self.disconnect(client_id);
            info!("Client {} disconnected ({})", client_id, addr);
        }
    }

    #[inline]
    pub fn is_connected(&self, client_id: OwnerId) -> bool {
        self.clients.contains_key(&client_id)
    }

    #[inline]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Decode and apply one inbound packet. Malformed input is dropped.
    pub fn handle_packet(&mut self, client_id: OwnerId, data: &[u8]) {
        if !self.is_connected(client_id) {
            return;
        }
        let packet = match ClientPacket::parse(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping packet from client {}: {}", client_id, e);
                return;
            }
        };

        match packet {
            ClientPacket::Join { nickname, color, avatar } => self.join(client_id, &nickname, color, avatar.as_deref()),
            ClientPacket::Steer { x, y } => self.steer(client_id, x, y),
            ClientPacket::Split { dx, dy } => self.split(client_id, dx, dy),
            ClientPacket::Eject { dx, dy } => self.eject(client_id, dx, dy),
            ClientPacket::Chat { text } => self.chat(client_id, &text),
        }
    }

    /// Full world snapshot addressed to `client_id`.
    pub(super) fn initial_state(&self, client_id: OwnerId) -> ServerMessage {
        let players = self
            .world
            .player_ids()
            .into_iter()
            .filter_map(|id| self.world.player(id))
            .map(Player::record)
            .collect();
        ServerMessage::InitialState {
            owner_id: client_id,
            bounds: self.world.border.bounds(),
            players,
            cells: self.world.records(),
        }
    }

    /// Send a fresh snapshot to a client that missed outbound messages.
    /// Deltas diff against one shared snapshot; a gap needs a full view.
    pub fn resync(&mut self, client_id: OwnerId) {
        if !self.is_connected(client_id) {
            return;
        }
        let snapshot = self.initial_state(client_id);
        self.send(Audience::Only(client_id), snapshot);
        debug!("Resynced client {}", client_id);
    }

    /// Queue a message for delivery once the current operation finishes.
    pub(super) fn send(&mut self, audience: Audience, message: ServerMessage) {
        self.outbox.push(Envelope { audience, message });
    }

    /// Take every queued message.
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    /// Diff the world against the last broadcast and queue the delta.
    pub fn broadcast_delta(&mut self) {
        let delta = self.delta.diff(&self.world);
        self.broadcast_count += 1;

        if self.broadcast_count % 300 == 0 {
            let metrics = self.delta.metrics();
            debug!(
                "Delta metrics: {} broadcasts, {} sent, {} cells examined, {} records sent ({:.1}% of full)",
                metrics.broadcasts,
                metrics.messages_sent,
                metrics.cells_examined,
                metrics.records_sent,
                metrics.compression_percent(),
            );
        }

        if let Some(delta) = delta {
            self.send(Audience::Everyone, ServerMessage::StateDelta(delta));
        }
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            name: self.config.server.name.clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            connections: self.clients.len(),
            players: self.world.player_count(),
            cells: self.world.cell_count(),
            pellets: self.world.pellet_count(),
            viruses: self.world.virus_count(),
            tick_ms: self.update_time_avg,
        }
    }

    /// Fold one tick duration into the moving average.
    pub(super) fn record_tick_time(&mut self, elapsed_ms: f64) {
        self.update_time_avg += 0.5 * (elapsed_ms - self.update_time_avg);
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub(super) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Run the simulation at `tick_rate` Hz.
pub async fn run_game_loop(handle: ServerHandle, tick_rate: f32) {
    let period = Duration::from_secs_f32(1.0 / tick_rate);
    let budget_ms = period.as_secs_f64() * 1000.0;
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Game loop started at {} Hz", tick_rate);

    loop {
        interval.tick().await;
        handle
            .with_game(|game| {
                let started = std::time::Instant::now();
                game.tick();
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                game.record_tick_time(elapsed_ms);

                if elapsed_ms > budget_ms * 0.9 {
                    warn!("Slow tick {}: {:.2}ms (budget {:.2}ms)", game.tick_count, elapsed_ms, budget_ms);
                }
            })
            .await;
    }
}

/// Run the broadcast diff at `broadcast_rate` Hz.
pub async fn run_broadcast_loop(handle: ServerHandle, broadcast_rate: f32) {
    let period = Duration::from_secs_f32(1.0 / broadcast_rate);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Broadcast loop started at {} Hz", broadcast_rate);

    loop {
        interval.tick().await;
        handle.with_game(|game| game.broadcast_delta()).await;
    }
}
