//! Player (owner) state.

use super::{IdList, OwnerId};
use glam::Vec2;
use protocol::Color;

/// A joined player: identity, appearance, steering target and owned cells.
#[derive(Debug, Clone)]
pub struct Player {
    /// Connection id.
    pub id: OwnerId,
    pub nickname: String,
    pub color: Color,
    pub avatar: Option<String>,
    /// Cell ids owned by this player, in insertion order.
    pub cells: IdList,
    /// Last steering target, in world coordinates.
    pub target: Vec2,
}

impl Player {
    pub fn new(id: OwnerId, nickname: String, color: Color, avatar: Option<String>, target: Vec2) -> Self {
        Self {
            id,
            nickname,
            color,
            avatar,
            cells: IdList::with_capacity(16),
            target,
        }
    }

    pub fn record(&self) -> protocol::packets::PlayerRecord {
        protocol::packets::PlayerRecord {
            owner_id: self.id,
            nickname: self.nickname.clone(),
            color: self.color,
            avatar: self.avatar.clone(),
        }
    }
}
