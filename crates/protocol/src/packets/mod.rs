//! Packet definitions for the arena protocol.
//!
//! This module contains both client->server and server->client packet types.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Opcodes for client -> server packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Join with nickname, color and optional avatar.
    Join = 0x00,
    /// Steering target update.
    Steer = 0x10,
    /// Split along a direction.
    Split = 0x11,
    /// Eject mass along a direction.
    Eject = 0x15,
    /// Chat message.
    Chat = 0x63,
}

/// Opcodes for server -> client packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
    /// New/updated/removed cells since the last broadcast.
    StateDelta = 0x10,
    /// Another player joined.
    PlayerJoined = 0x20,
    /// A player left or died.
    PlayerLeft = 0x21,
    /// This connection's player was eliminated.
    Died = 0x30,
    /// Full world snapshot sent on join.
    InitialState = 0x40,
    /// Chat message.
    Chat = 0x63,
    /// Server notice.
    SystemNotice = 0x64,
}
