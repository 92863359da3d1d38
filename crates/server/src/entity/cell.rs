//! Cell type and common functionality.

use crate::mass::MassModel;
use glam::Vec2;
use protocol::Color;

/// Process-unique cell identifier. Never reused.
pub type CellId = u32;

/// Connection identity of a player.
pub type OwnerId = u32;

/// Cell kind, matching the wire `kind` byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Player-controlled cell.
    Player = 0,
    /// Food pellet.
    Pellet = 1,
    /// Virus.
    Virus = 2,
    /// Ejected mass.
    Ejected = 3,
}

impl CellKind {
    #[inline]
    pub fn is_neutral(self) -> bool {
        self != CellKind::Player
    }
}

/// A single physical mass unit.
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: CellId,
    pub kind: CellKind,
    /// Owning player; only set for `CellKind::Player`.
    pub owner: Option<OwnerId>,
    pub position: Vec2,
    pub color: Color,
    /// Residual momentum in units per second. `None` means no momentum,
    /// which is not the same as a zero vector.
    pub launch: Option<Vec2>,
    /// First tick at which this cell may merge with a sibling.
    pub merge_ready_tick: u64,
    score: f32,
    radius: f32,
}

impl Cell {
    /// Create a neutral cell (pellet, virus or ejected mass).
    pub fn neutral(id: CellId, kind: CellKind, position: Vec2, score: f32, color: Color, mass: &MassModel) -> Self {
        debug_assert!(kind.is_neutral());
        Self {
            id,
            kind,
            owner: None,
            position,
            color,
            launch: None,
            merge_ready_tick: 0,
            score,
            radius: mass.radius(score),
        }
    }

    /// Create a player cell.
    pub fn player(
        id: CellId,
        owner: OwnerId,
        position: Vec2,
        score: f32,
        color: Color,
        merge_ready_tick: u64,
        mass: &MassModel,
    ) -> Self {
        Self {
            id,
            kind: CellKind::Player,
            owner: Some(owner),
            position,
            color,
            launch: None,
            merge_ready_tick,
            score,
            radius: mass.radius(score),
        }
    }

    #[inline]
    pub fn score(&self) -> f32 {
        self.score
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Set the score and recompute the radius. The only way radius changes.
    #[inline]
    pub fn set_score(&mut self, score: f32, mass: &MassModel) {
        self.score = score;
        self.radius = mass.radius(score);
    }

    /// Called when this cell absorbs `amount` score.
    #[inline]
    pub fn gain(&mut self, amount: f32, mass: &MassModel) {
        self.set_score(self.score + amount, mass);
    }

    #[inline]
    pub fn can_merge(&self, tick: u64) -> bool {
        tick >= self.merge_ready_tick
    }

    /// Advance launch momentum by one step.
    /// Returns true if the cell still carries momentum afterwards.
    pub fn integrate_launch(&mut self, dt: f32, decay: f32, stop_speed: f32) -> bool {
        let Some(velocity) = self.launch else {
            return false;
        };
        self.position += velocity * dt;
        let next = velocity * decay;
        if next.length() < stop_speed {
            self.launch = None;
            false
        } else {
            self.launch = Some(next);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_score_updates_radius() {
        let mass = MassModel::default();
        let mut cell = Cell::player(1, 1, Vec2::ZERO, 10.0, Color::default(), 0, &mass);
        cell.set_score(100.0, &mass);
        assert_eq!(cell.radius(), mass.radius(100.0));
        cell.gain(5.0, &mass);
        assert_eq!(cell.score(), 105.0);
        assert_eq!(cell.radius(), mass.radius(105.0));
    }

    #[test]
    fn test_launch_decays_then_clears() {
        let mass = MassModel::default();
        let mut cell = Cell::neutral(2, CellKind::Ejected, Vec2::ZERO, 8.0, Color::default(), &mass);
        cell.launch = Some(Vec2::new(60.0, 0.0));

        assert!(cell.integrate_launch(1.0 / 60.0, 0.5, 5.0));
        assert!((cell.position.x - 1.0).abs() < 1e-5);
        assert_eq!(cell.launch, Some(Vec2::new(30.0, 0.0)));

        // 30 -> 15 -> 7.5 -> 3.75 (< 5, cleared)
        assert!(cell.integrate_launch(1.0 / 60.0, 0.5, 5.0));
        assert!(cell.integrate_launch(1.0 / 60.0, 0.5, 5.0));
        assert!(!cell.integrate_launch(1.0 / 60.0, 0.5, 5.0));
        assert_eq!(cell.launch, None);

        let resting = cell.position;
        assert!(!cell.integrate_launch(1.0 / 60.0, 0.5, 5.0));
        assert_eq!(cell.position, resting);
    }
}
