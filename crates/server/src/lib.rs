//! Mass arena game server library.

pub mod collision;
pub mod config;
pub mod entity;
pub mod mass;
pub mod server;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use server::{Audience, Outbound, ServerHandle, ServerMessage, ServerStatus, run};
