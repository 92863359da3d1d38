//! Server -> Client packet building.

use super::ServerOpcode;
use crate::{BinaryWriter, Color};

/// Public description of a player (owner) sent on join.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub owner_id: u32,
    pub nickname: String,
    pub color: Color,
    pub avatar: Option<String>,
}

/// Full public record of a cell. Sent for cells a client has not seen yet.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub cell_id: u32,
    pub kind: u8,
    /// Owning player, `None` for neutral cells (written as 0).
    pub owner_id: Option<u32>,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub score: f32,
    pub color: Color,
    pub nickname: Option<String>,
}

/// Position/size change of an already-known cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellUpdate {
    pub cell_id: u32,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

fn put_player(w: &mut BinaryWriter, p: &PlayerRecord) {
    w.put_u32(p.owner_id);
    w.put_string_utf8(&p.nickname);
    w.put_color(p.color);
    w.put_string_utf8(p.avatar.as_deref().unwrap_or(""));
}

fn put_cell(w: &mut BinaryWriter, c: &CellRecord) {
    w.put_u32(c.cell_id);
    w.put_u8(c.kind);
    w.put_u32(c.owner_id.unwrap_or(0));
    w.put_f32(c.x);
    w.put_f32(c.y);
    w.put_f32(c.radius);
    w.put_f32(c.score);
    w.put_color(c.color);
    w.put_string_utf8(c.nickname.as_deref().unwrap_or(""));
}

/// Build an InitialState packet (0x40).
pub fn build_initial_state(
    your_owner_id: u32,
    bounds: [f64; 4],
    players: &[PlayerRecord],
    cells: &[CellRecord],
) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(39 + cells.len() * 32);
    w.put_u8(ServerOpcode::InitialState as u8);
    w.put_u32(your_owner_id);
    for v in bounds {
        w.put_f64(v);
    }
    w.put_u16(players.len() as u16);
    for p in players {
        put_player(&mut w, p);
    }
    w.put_u32(cells.len() as u32);
    for c in cells {
        put_cell(&mut w, c);
    }
    w
}

/// Build a PlayerJoined packet (0x20).
pub fn build_player_joined(player: &PlayerRecord, cells: &[CellRecord]) -> BinaryWriter {
    let mut w = BinaryWriter::new();
    w.put_u8(ServerOpcode::PlayerJoined as u8);
    put_player(&mut w, player);
    w.put_u16(cells.len() as u16);
    for c in cells {
        put_cell(&mut w, c);
    }
    w
}

/// Build a PlayerLeft packet (0x21).
pub fn build_player_left(owner_id: u32) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(5);
    w.put_u8(ServerOpcode::PlayerLeft as u8);
    w.put_u32(owner_id);
    w
}

/// Build a StateDelta packet (0x10).
///
/// The packet format is:
/// - opcode 0x10
/// - new_count: u32, then full cell records
/// - updated_count: u32, then (id, x, y, radius)
/// - removed_count: u32, then ids
///
/// Receivers apply new records as upserts and ignore removed ids they
/// never saw: a joiner's snapshot may already hold some of the new cells.
pub fn build_state_delta(
    new_cells: &[CellRecord],
    updated: &[CellUpdate],
    removed: &[u32],
) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(
        13 + new_cells.len() * 32 + updated.len() * 16 + removed.len() * 4,
    );
    w.put_u8(ServerOpcode::StateDelta as u8);

    w.put_u32(new_cells.len() as u32);
    for c in new_cells {
        put_cell(&mut w, c);
    }

    w.put_u32(updated.len() as u32);
    for u in updated {
        w.put_u32(u.cell_id);
        w.put_f32(u.x);
        w.put_f32(u.y);
        w.put_f32(u.radius);
    }

    w.put_u32(removed.len() as u32);
    for &id in removed {
        w.put_u32(id);
    }
    w
}

/// Build a Died packet (0x30).
pub fn build_died(final_score: u32) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(5);
    w.put_u8(ServerOpcode::Died as u8);
    w.put_u32(final_score);
    w
}

/// Build a Chat packet (0x63).
pub fn build_chat_message(owner_id: u32, nickname: &str, text: &str, timestamp_ms: u64) -> BinaryWriter {
    let mut w = BinaryWriter::new();
    w.put_u8(ServerOpcode::Chat as u8);
    w.put_u32(owner_id);
    w.put_string_utf8(nickname);
    w.put_string_utf8(text);
    w.put_u64(timestamp_ms);
    w
}

/// Build a SystemNotice packet (0x64).
pub fn build_system_notice(text: &str, timestamp_ms: u64) -> BinaryWriter {
    let mut w = BinaryWriter::new();
    w.put_u8(ServerOpcode::SystemNotice as u8);
    w.put_string_utf8(text);
    w.put_u64(timestamp_ms);
    w
}
