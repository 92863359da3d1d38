//! Client -> Server packet parsing.

use super::ClientOpcode;
use crate::{BinaryReader, Color, ProtocolError};

/// Parsed client packet.
///
/// Values are carried exactly as received; range and finiteness checks are
/// the server's job.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    /// Join (0x00).
    Join {
        nickname: String,
        color: Color,
        avatar: Option<String>,
    },
    /// Steering target (0x10).
    Steer { x: f64, y: f64 },
    /// Split (0x11).
    Split { dx: f32, dy: f32 },
    /// Eject mass (0x15).
    Eject { dx: f32, dy: f32 },
    /// Chat message (0x63).
    Chat { text: String },
}

impl ClientPacket {
    /// Parse a client packet from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = BinaryReader::new(data.to_vec());
        let opcode = reader.get_u8()?;

        let packet = match opcode {
            op if op == ClientOpcode::Join as u8 => {
                let nickname = reader.get_string_utf8()?;
                let color = reader.get_color()?;
                let avatar = reader.get_string_utf8()?;
                ClientPacket::Join {
                    nickname,
                    color,
                    avatar: if avatar.is_empty() { None } else { Some(avatar) },
                }
            }
            op if op == ClientOpcode::Steer as u8 => ClientPacket::Steer {
                x: reader.get_f64()?,
                y: reader.get_f64()?,
            },
            op if op == ClientOpcode::Split as u8 => ClientPacket::Split {
                dx: reader.get_f32()?,
                dy: reader.get_f32()?,
            },
            op if op == ClientOpcode::Eject as u8 => ClientPacket::Eject {
                dx: reader.get_f32()?,
                dy: reader.get_f32()?,
            },
            op if op == ClientOpcode::Chat as u8 => ClientPacket::Chat {
                text: reader.get_string_utf8()?,
            },
            _ => return Err(ProtocolError::InvalidOpcode(opcode)),
        };

        if reader.remaining() > 0 {
            return Err(ProtocolError::TrailingBytes {
                opcode,
                extra: reader.remaining(),
            });
        }
        Ok(packet)
    }
}

/// Encode a Join packet (used by clients and tests).
pub fn build_join(nickname: &str, color: Color, avatar: Option<&str>) -> crate::BinaryWriter {
    let mut w = crate::BinaryWriter::new();
    w.put_u8(ClientOpcode::Join as u8);
    w.put_string_utf8(nickname);
    w.put_color(color);
    w.put_string_utf8(avatar.unwrap_or(""));
    w
}

/// Encode a Steer packet.
pub fn build_steer(x: f64, y: f64) -> crate::BinaryWriter {
    let mut w = crate::BinaryWriter::with_capacity(17);
    w.put_u8(ClientOpcode::Steer as u8);
    w.put_f64(x);
    w.put_f64(y);
    w
}

/// Encode a Split or Eject packet.
pub fn build_direction(opcode: ClientOpcode, dx: f32, dy: f32) -> crate::BinaryWriter {
    let mut w = crate::BinaryWriter::with_capacity(9);
    w.put_u8(opcode as u8);
    w.put_f32(dx);
    w.put_f32(dy);
    w
}

/// Encode a Chat packet.
pub fn build_chat(text: &str) -> crate::BinaryWriter {
    let mut w = crate::BinaryWriter::new();
    w.put_u8(ClientOpcode::Chat as u8);
    w.put_string_utf8(text);
    w
}
