//! Collision detection helpers.
//!
//! Pure geometry used by the tick:
//! - Regular consumption (a bigger cell swallowing a smaller one)
//! - Virus popping (a large player cell touching a virus)
//! - Rigid separation of same-owner cells that may not merge yet

use glam::Vec2;

/// Consumer radius must exceed the victim's by this factor.
pub const CONSUME_RADIUS_RATIO: f32 = 1.1;
/// Player score must exceed the virus score by this factor to pop.
pub const VIRUS_POP_SCORE_RATIO: f32 = 1.1;

/// Result of checking collision between two circles.
#[derive(Debug, Clone, Copy)]
pub struct CollisionResult {
    /// Combined radius of both cells.
    pub r: f32,
    /// Vector from the first centre to the second.
    pub delta: Vec2,
    /// Actual distance.
    pub d: f32,
}

impl CollisionResult {
    /// Check if cells are actually overlapping.
    #[inline]
    pub fn is_colliding(&self) -> bool {
        self.d < self.r
    }

    /// Overlap depth (0 when apart).
    #[inline]
    pub fn overlap(&self) -> f32 {
        (self.r - self.d).max(0.0)
    }

    /// Unit vector from the first centre to the second; +x when coincident.
    #[inline]
    pub fn normal(&self) -> Vec2 {
        if self.d > f32::EPSILON {
            self.delta / self.d
        } else {
            Vec2::X
        }
    }
}

/// Check collision between two circles.
#[inline]
pub fn check_cell_collision(a_pos: Vec2, a_radius: f32, b_pos: Vec2, b_radius: f32) -> CollisionResult {
    let delta = b_pos - a_pos;
    CollisionResult {
        r: a_radius + b_radius,
        delta,
        d: delta.length(),
    }
}

/// Regular consumption test, with the two cells already ordered by radius.
#[inline]
pub fn can_consume(distance: f32, bigger_radius: f32, smaller_radius: f32, threshold: f32) -> bool {
    distance < bigger_radius - smaller_radius * threshold
        && bigger_radius > smaller_radius * CONSUME_RADIUS_RATIO
}

/// Virus pop test.
#[inline]
pub fn pops_virus(distance: f32, player_radius: f32, player_score: f32, virus_radius: f32, virus_score: f32) -> bool {
    distance < virus_radius + player_radius && player_score > virus_score * VIRUS_POP_SCORE_RATIO
}

/// Inverse-mass shares of a push between two cells: the lighter one moves more.
#[inline]
pub fn push_shares(a_mass: f32, b_mass: f32) -> (f32, f32) {
    let total = a_mass + b_mass;
    if total <= 0.0 {
        return (0.5, 0.5);
    }
    (b_mass / total, a_mass / total)
}
