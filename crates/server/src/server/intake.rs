//! Client command handling.
//!
//! Every command is validated here before it touches the world. Invalid
//! input and commands for players that are not joined are silently dropped.

use crate::entity::{Cell, CellKind, OwnerId, Player};
use glam::Vec2;
use protocol::Color;
use tracing::{debug, info};

use super::game::{GameState, now_ms};
use super::{Audience, ServerMessage};

const DEFAULT_NICKNAME: &str = "An unnamed cell";
const MIN_DIRECTION_LENGTH: f32 = 1e-6;

/// Normalize a client-supplied direction; `None` if it is unusable.
fn unit_direction(dx: f32, dy: f32) -> Option<Vec2> {
    let dir = Vec2::new(dx, dy);
    if !dir.is_finite() {
        return None;
    }
    let len = dir.length();
    if !len.is_finite() || len < MIN_DIRECTION_LENGTH {
        return None;
    }
    Some(dir / len)
}

fn sanitize_nickname(raw: &str, max_len: usize) -> String {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(max_len)
        .collect();
    let name = name.trim();
    if name.is_empty() {
        DEFAULT_NICKNAME.to_string()
    } else {
        name.to_string()
    }
}

fn sanitize_avatar(raw: Option<&str>, max_len: usize) -> Option<String> {
    let avatar = raw?.trim();
    if avatar.is_empty() {
        return None;
    }
    Some(avatar.chars().take(max_len).collect())
}

impl GameState {
    /// Create a player with one cell at a random in-bounds position.
    pub fn join(&mut self, owner: OwnerId, nickname: &str, color: Color, avatar: Option<&str>) {
        if !self.is_connected(owner) || self.world.player(owner).is_some() {
            debug!("Ignoring join from client {}", owner);
            return;
        }

        let nickname = sanitize_nickname(nickname, self.config.player.max_nick_length);
        let avatar = sanitize_avatar(avatar, self.config.player.max_avatar_length);
        let score = self.config.player.start_score;
        let position = self.world.border.random_position(self.world.mass.radius(score));

        let player = Player::new(owner, nickname.clone(), color, avatar, position);
        let record = player.record();
        self.world.add_player(player);

        let id = self.world.next_cell_id();
        let mass = self.world.mass;
        let ready = self.tick_count + self.merge_cooldown_ticks;
        self.world
            .insert_cell(Cell::player(id, owner, position, score, color, ready, &mass));

        let snapshot = self.initial_state(owner);
        self.send(Audience::Only(owner), snapshot);

        let own_cells = self
            .world
            .cell(id)
            .map(|cell| vec![self.world.record(cell)])
            .unwrap_or_default();
        self.send(
            Audience::AllExcept(owner),
            ServerMessage::PlayerJoined {
                player: record,
                cells: own_cells,
            },
        );
        self.send(
            Audience::Everyone,
            ServerMessage::SystemNotice {
                text: format!("{} joined the arena", nickname),
                timestamp_ms: now_ms(),
            },
        );

        info!("Client {} joined as \"{}\"", owner, nickname);
    }

    /// Replace the steering target. Last write wins.
    pub fn steer(&mut self, owner: OwnerId, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        let target = Vec2::new(x as f32, y as f32);
        if !target.is_finite() {
            return;
        }
        if let Some(player) = self.world.player_mut(owner) {
            player.target = target;
        }
    }

    /// Split every eligible cell in two along `(dx, dy)`.
    pub fn split(&mut self, owner: OwnerId, dx: f32, dy: f32) {
        let Some(dir) = unit_direction(dx, dy) else {
            debug!("Ignoring split with bad direction from client {}", owner);
            return;
        };
        // Snapshot so cells created below are not split again.
        let cell_ids = self.world.player_cell_ids(owner);
        if cell_ids.is_empty() {
            return;
        }

        let mass = self.world.mass;
        let ready = self.tick_count + self.merge_cooldown_ticks;
        let gap = self.config.player.split_gap;
        let launch_factor = self.config.player.split_launch_factor;

        for cell_id in cell_ids {
            let owned = self.world.player(owner).map(|p| p.cells.len()).unwrap_or(0);
            if owned >= self.config.player.max_cells {
                break;
            }
            let Some(cell) = self.world.cell_mut(cell_id) else {
                continue;
            };
            if cell.score() < self.config.player.min_split_score {
                continue;
            }

            let half = cell.score() / 2.0;
            cell.set_score(half, &mass);
            cell.merge_ready_tick = ready;
            let radius = cell.radius();
            let position = cell.position + dir * (radius + gap);
            let color = cell.color;

            let id = self.world.next_cell_id();
            let mut sibling = Cell::player(id, owner, position, half, color, ready, &mass);
            sibling.launch = Some(dir * radius * launch_factor);
            self.world.insert_cell(sibling);
        }
    }

    /// Shed a blob of mass from every eligible cell along `(dx, dy)`.
    pub fn eject(&mut self, owner: OwnerId, dx: f32, dy: f32) {
        let Some(dir) = unit_direction(dx, dy) else {
            debug!("Ignoring eject with bad direction from client {}", owner);
            return;
        };
        let cell_ids = self.world.player_cell_ids(owner);

        let mass = self.world.mass;
        let eject = self.config.eject.clone();

        for cell_id in cell_ids {
            let Some(cell) = self.world.cell_mut(cell_id) else {
                continue;
            };
            if cell.score() < eject.min_score {
                continue;
            }

            cell.set_score(cell.score() - eject.cost, &mass);
            let position = cell.position + dir * (cell.radius() + eject.gap);
            let color = cell.color;

            let id = self.world.next_cell_id();
            let mut blob = Cell::neutral(id, CellKind::Ejected, position, eject.score, color, &mass);
            blob.launch = Some(dir * eject.launch_speed);
            self.world.insert_cell(blob);
        }
    }

    /// Relay a chat line from a joined player to everyone.
    pub fn chat(&mut self, owner: OwnerId, text: &str) {
        let Some(player) = self.world.player(owner) else {
            return;
        };
        let text: String = text.trim().chars().take(self.config.chat.max_length).collect();
        let text = text.trim_end();
        if text.is_empty() {
            return;
        }

        let nickname = player.nickname.clone();
        info!("[Chat] {}: {}", nickname, text);
        self.send(
            Audience::Everyone,
            ServerMessage::Chat {
                owner_id: owner,
                nickname,
                text: text.to_string(),
                timestamp_ms: now_ms(),
            },
        );
    }

    /// Remove the player and all its cells, then tell everyone else.
    pub(super) fn disconnect(&mut self, owner: OwnerId) {
        let Some((player, cells)) = self.world.remove_player(owner) else {
            return;
        };
        debug!("Removed player {} with {} cells", owner, cells.len());

        self.send(Audience::AllExcept(owner), ServerMessage::PlayerLeft { owner_id: owner });
        self.send(
            Audience::AllExcept(owner),
            ServerMessage::SystemNotice {
                text: format!("{} left the arena", player.nickname),
                timestamp_ms: now_ms(),
            },
        );
    }
}
