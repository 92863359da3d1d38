//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Upper bound for the tick and broadcast rates, in Hz.
pub const MAX_RATE: f32 = 1000.0;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub border: BorderConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub pellet: PelletConfig,
    #[serde(default)]
    pub virus: VirusConfig,
    #[serde(default)]
    pub eject: EjectConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("eject.min_score ({min}) must be at least eject.cost ({cost})")]
    EjectCostTooHigh { min: f32, cost: f32 },
    #[error("{name} must be at most {max}")]
    RateTooHigh { name: &'static str, max: f32 },
    #[error("{0} must be a finite non-negative number")]
    Negative(&'static str),
    #[error("physics.launch_decay must be in [0, 1), got {0}")]
    LaunchDecay(f32),
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Load from the path in `ARENA_CONFIG` if set, else from `config.toml`.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var_os("ARENA_CONFIG") {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                Self::load_from(Path::new(&path))
            }
            None => Self::load(),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("server.tick_rate", self.server.tick_rate),
            ("server.broadcast_rate", self.server.broadcast_rate),
            ("border.width", self.border.width as f32),
            ("border.height", self.border.height as f32),
            ("player.start_score", self.player.start_score),
            ("virus.split_unit", self.virus.split_unit),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive(name));
            }
        }
        for (name, value) in [
            ("server.tick_rate", self.server.tick_rate),
            ("server.broadcast_rate", self.server.broadcast_rate),
        ] {
            if value > MAX_RATE {
                return Err(ConfigError::RateTooHigh { name, max: MAX_RATE });
            }
        }
        if !(self.player.base_mass >= 0.0 && self.player.base_mass.is_finite()) {
            return Err(ConfigError::Negative("player.base_mass"));
        }
        if self.player.max_cells == 0 {
            return Err(ConfigError::NotPositive("player.max_cells"));
        }
        if self.virus.max_split == 0 {
            return Err(ConfigError::NotPositive("virus.max_split"));
        }
        if self.eject.min_score < self.eject.cost {
            return Err(ConfigError::EjectCostTooHigh {
                min: self.eject.min_score,
                cost: self.eject.cost,
            });
        }
        if !(0.0..1.0).contains(&self.physics.launch_decay) {
            return Err(ConfigError::LaunchDecay(self.physics.launch_decay));
        }
        Ok(())
    }

    /// Merge cooldown expressed in simulation ticks.
    pub fn merge_cooldown_ticks(&self) -> u64 {
        (self.player.merge_cooldown_secs * self.server.tick_rate).round().max(0.0) as u64
    }
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Server name shown to clients.
    #[serde(default = "default_name")]
    pub name: String,
    /// Simulation ticks per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: f32,
    /// State deltas per second.
    #[serde(default = "default_broadcast_rate")]
    pub broadcast_rate: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            name: default_name(),
            tick_rate: default_tick_rate(),
            broadcast_rate: default_broadcast_rate(),
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    100
}
fn default_ip_limit() -> usize {
    10
}
fn default_name() -> String {
    "Mass Arena".to_string()
}
fn default_tick_rate() -> f32 {
    60.0
}
fn default_broadcast_rate() -> f32 {
    30.0
}

/// World border configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BorderConfig {
    #[serde(default = "default_border_size")]
    pub width: f64,
    #[serde(default = "default_border_size")]
    pub height: f64,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            width: default_border_size(),
            height: default_border_size(),
        }
    }
}

fn default_border_size() -> f64 {
    4000.0
}

/// Player configuration, including the mass/radius curve.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_start_score")]
    pub start_score: f32,
    #[serde(default = "default_base_mass")]
    pub base_mass: f32,
    #[serde(default = "default_growth_rate")]
    pub growth_rate: f32,
    #[serde(default = "default_growth_cap")]
    pub growth_cap: f32,
    /// Steering step for a radius-20 cell, in units per tick.
    #[serde(default = "default_player_speed")]
    pub speed: f32,
    #[serde(default = "default_min_split_score")]
    pub min_split_score: f32,
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
    #[serde(default = "default_merge_cooldown")]
    pub merge_cooldown_secs: f32,
    #[serde(default = "default_split_gap")]
    pub split_gap: f32,
    /// Split launch speed per unit of radius (units per second).
    #[serde(default = "default_split_launch_factor")]
    pub split_launch_factor: f32,
    #[serde(default = "default_max_nick_length")]
    pub max_nick_length: usize,
    #[serde(default = "default_max_avatar_length")]
    pub max_avatar_length: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            start_score: default_start_score(),
            base_mass: default_base_mass(),
            growth_rate: default_growth_rate(),
            growth_cap: default_growth_cap(),
            speed: default_player_speed(),
            min_split_score: default_min_split_score(),
            max_cells: default_max_cells(),
            merge_cooldown_secs: default_merge_cooldown(),
            split_gap: default_split_gap(),
            split_launch_factor: default_split_launch_factor(),
            max_nick_length: default_max_nick_length(),
            max_avatar_length: default_max_avatar_length(),
        }
    }
}

fn default_start_score() -> f32 {
    25.0
}
fn default_base_mass() -> f32 {
    25.0
}
fn default_growth_rate() -> f32 {
    1.0
}
fn default_growth_cap() -> f32 {
    4.0
}
fn default_player_speed() -> f32 {
    2.0
}
fn default_min_split_score() -> f32 {
    20.0
}
fn default_max_cells() -> usize {
    16
}
fn default_merge_cooldown() -> f32 {
    10.0
}
fn default_split_gap() -> f32 {
    2.0
}
fn default_split_launch_factor() -> f32 {
    25.0
}
fn default_max_nick_length() -> usize {
    24
}
fn default_max_avatar_length() -> usize {
    256
}

/// Pellet (food) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PelletConfig {
    #[serde(default = "default_pellet_target")]
    pub target: usize,
    #[serde(default = "default_pellet_score")]
    pub score: f32,
}

impl Default for PelletConfig {
    fn default() -> Self {
        Self {
            target: default_pellet_target(),
            score: default_pellet_score(),
        }
    }
}

fn default_pellet_target() -> usize {
    500
}
fn default_pellet_score() -> f32 {
    1.0
}

/// Virus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirusConfig {
    #[serde(default = "default_virus_target")]
    pub target: usize,
    #[serde(default = "default_virus_score")]
    pub score: f32,
    /// Score per piece when a virus pops a player.
    #[serde(default = "default_virus_split_unit")]
    pub split_unit: f32,
    /// Maximum number of pieces a single pop produces.
    #[serde(default = "default_virus_max_split")]
    pub max_split: usize,
    /// Pop launch speed per unit of child radius (units per second).
    #[serde(default = "default_virus_pop_launch_factor")]
    pub pop_launch_factor: f32,
}

impl Default for VirusConfig {
    fn default() -> Self {
        Self {
            target: default_virus_target(),
            score: default_virus_score(),
            split_unit: default_virus_split_unit(),
            max_split: default_virus_max_split(),
            pop_launch_factor: default_virus_pop_launch_factor(),
        }
    }
}

fn default_virus_target() -> usize {
    20
}
fn default_virus_score() -> f32 {
    100.0
}
fn default_virus_split_unit() -> f32 {
    20.0
}
fn default_virus_max_split() -> usize {
    16
}
fn default_virus_pop_launch_factor() -> f32 {
    20.0
}

/// Ejected mass configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EjectConfig {
    /// Score deducted from the ejecting cell.
    #[serde(default = "default_eject_cost")]
    pub cost: f32,
    /// Score of the spawned ejected cell.
    #[serde(default = "default_eject_score")]
    pub score: f32,
    /// Minimum score a cell needs to eject.
    #[serde(default = "default_eject_min_score")]
    pub min_score: f32,
    #[serde(default = "default_eject_gap")]
    pub gap: f32,
    #[serde(default = "default_eject_launch_speed")]
    pub launch_speed: f32,
}

impl Default for EjectConfig {
    fn default() -> Self {
        Self {
            cost: default_eject_cost(),
            score: default_eject_score(),
            min_score: default_eject_min_score(),
            gap: default_eject_gap(),
            launch_speed: default_eject_launch_speed(),
        }
    }
}

fn default_eject_cost() -> f32 {
    10.0
}
fn default_eject_score() -> f32 {
    8.0
}
fn default_eject_min_score() -> f32 {
    30.0
}
fn default_eject_gap() -> f32 {
    2.0
}
fn default_eject_launch_speed() -> f32 {
    600.0
}

/// Tuning for momentum, consumption, repulsion and broadcast diffing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhysicsConfig {
    /// Launch velocity multiplier applied every tick.
    #[serde(default = "default_launch_decay")]
    pub launch_decay: f32,
    /// Below this speed (units per second) momentum ends.
    #[serde(default = "default_launch_stop_speed")]
    pub launch_stop_speed: f32,
    /// Fraction of the smaller radius that may still stick out when eaten.
    #[serde(default = "default_consume_threshold")]
    pub consume_threshold: f32,
    #[serde(default = "default_repulsion_strength")]
    pub repulsion_strength: f32,
    #[serde(default = "default_min_separation_factor")]
    pub min_separation_factor: f32,
    /// Launch velocity multiplier on an axis clamped at the border.
    #[serde(default = "default_wall_damping")]
    pub wall_damping: f32,
    /// Smallest position/radius change reported as an update.
    #[serde(default = "default_diff_epsilon")]
    pub diff_epsilon: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            launch_decay: default_launch_decay(),
            launch_stop_speed: default_launch_stop_speed(),
            consume_threshold: default_consume_threshold(),
            repulsion_strength: default_repulsion_strength(),
            min_separation_factor: default_min_separation_factor(),
            wall_damping: default_wall_damping(),
            diff_epsilon: default_diff_epsilon(),
        }
    }
}

fn default_launch_decay() -> f32 {
    0.9
}
fn default_launch_stop_speed() -> f32 {
    5.0
}
fn default_consume_threshold() -> f32 {
    0.4
}
fn default_repulsion_strength() -> f32 {
    0.5
}
fn default_min_separation_factor() -> f32 {
    1.05
}
fn default_wall_damping() -> f32 {
    0.5
}
fn default_diff_epsilon() -> f32 {
    0.1
}

/// Chat configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_max_length")]
    pub max_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_length: default_chat_max_length(),
        }
    }
}

fn default_chat_max_length() -> usize {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
        assert_eq!(Config::default().merge_cooldown_ticks(), 600);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("[border]\nwidth = 100.0\n").unwrap();
        assert_eq!(config.border.width, 100.0);
        assert_eq!(config.border.height, 4000.0);
        assert_eq!(config.player.max_cells, 16);
    }

    #[test]
    fn test_rejects_unaffordable_eject() {
        let mut config = Config::default();
        config.eject.cost = 50.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EjectCostTooHigh { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_tick_rate() {
        let mut config = Config::default();
        config.server.tick_rate = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::NotPositive("server.tick_rate")));
    }

    #[test]
    fn test_rejects_runaway_rates() {
        let mut config = Config::default();
        config.server.tick_rate = 1e12;
        assert_eq!(
            config.validate(),
            Err(ConfigError::RateTooHigh { name: "server.tick_rate", max: MAX_RATE })
        );

        let mut config = Config::default();
        config.server.broadcast_rate = f32::INFINITY;
        assert!(matches!(config.validate(), Err(ConfigError::RateTooHigh { .. })));

        let mut config = Config::default();
        config.server.tick_rate = MAX_RATE;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_negative_base_mass() {
        let mut config = Config::default();
        config.player.base_mass = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::Negative("player.base_mass")));

        config.player.base_mass = f32::NAN;
        assert_eq!(config.validate(), Err(ConfigError::Negative("player.base_mass")));

        config.player.base_mass = 0.0;
        assert_eq!(config.validate(), Ok(()));
    }
}
