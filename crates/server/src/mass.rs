//! Score to radius conversion.

use crate::config::PlayerConfig;

/// The score -> radius curve shared by every cell kind.
///
/// `radius = sqrt(score + base_mass) * min(1 + score / 100 * growth_rate, growth_cap)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassModel {
    pub base_mass: f32,
    pub growth_rate: f32,
    pub growth_cap: f32,
}

impl MassModel {
    pub fn from_config(player: &PlayerConfig) -> Self {
        Self {
            base_mass: player.base_mass,
            growth_rate: player.growth_rate,
            growth_cap: player.growth_cap,
        }
    }

    /// Radius for a score. Negative or non-finite scores count as zero.
    #[inline]
    pub fn radius(&self, score: f32) -> f32 {
        let score = if score.is_finite() { score.max(0.0) } else { 0.0 };
        let growth = (1.0 + (score / 100.0) * self.growth_rate).min(self.growth_cap);
        (score + self.base_mass).sqrt() * growth
    }
}

impl Default for MassModel {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        let model = MassModel::default();
        // sqrt(25) * 1.0
        assert!((model.radius(0.0) - 5.0).abs() < 1e-5);
        // sqrt(125) * 2.0
        assert!((model.radius(100.0) - 125f32.sqrt() * 2.0).abs() < 1e-4);
        // multiplier capped at 4
        assert!((model.radius(1000.0) - 1025f32.sqrt() * 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_monotonic() {
        let model = MassModel::default();
        let mut last = model.radius(0.0);
        let mut s = 0.0;
        while s < 5000.0 {
            s += 0.5;
            let r = model.radius(s);
            assert!(r >= last, "radius({}) = {} < {}", s, r, last);
            last = r;
        }
    }

    #[test]
    fn test_garbage_scores() {
        let model = MassModel::default();
        assert_eq!(model.radius(-10.0), model.radius(0.0));
        assert_eq!(model.radius(f32::NAN), model.radius(0.0));
    }
}
