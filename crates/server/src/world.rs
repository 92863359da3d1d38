//! World state management.
//!
//! Owns every live cell. Player cells are indexed per owner, everything else
//! sits in the neutral bucket. Removal from either index is O(1).

use crate::entity::{Cell, CellId, CellKind, IdList, OwnerId, Player};
use crate::mass::MassModel;
use glam::Vec2;
use protocol::Color;
use protocol::packets::CellRecord;
use rand::Rng;
use std::collections::HashMap;

/// Default virus color (green).
pub const VIRUS_COLOR: Color = Color::new(51, 255, 51);

/// World border bounds, centred on the origin.
#[derive(Debug, Clone, Copy)]
pub struct WorldBorder {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub width: f32,
    pub height: f32,
}

impl WorldBorder {
    pub fn new(width: f32, height: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self {
            min_x: -half_w,
            min_y: -half_h,
            max_x: half_w,
            max_y: half_h,
            width,
            height,
        }
    }

    /// `[min_x, min_y, max_x, max_y]` as sent to clients.
    pub fn bounds(&self) -> [f64; 4] {
        [self.min_x as f64, self.min_y as f64, self.max_x as f64, self.max_y as f64]
    }

    /// Random position whose distance to every edge is at least `margin`.
    pub fn random_position(&self, margin: f32) -> Vec2 {
        let mut rng = rand::rng();
        Vec2::new(
            random_axis(&mut rng, self.min_x + margin, self.max_x - margin),
            random_axis(&mut rng, self.min_y + margin, self.max_y - margin),
        )
    }

    /// Clamp a centre so a circle of `radius` stays inside the border.
    /// Also reports which axes were moved.
    pub fn clamp(&self, position: Vec2, radius: f32) -> (Vec2, bool, bool) {
        let (x, cx) = clamp_axis(position.x, self.min_x + radius, self.max_x - radius);
        let (y, cy) = clamp_axis(position.y, self.min_y + radius, self.max_y - radius);
        (Vec2::new(x, y), cx, cy)
    }

    /// Whether a circle lies fully inside the border (or is centred on an
    /// axis it is too wide for).
    pub fn contains(&self, position: Vec2, radius: f32) -> bool {
        let (clamped, cx, cy) = self.clamp(position, radius);
        !cx && !cy && clamped == position
    }
}

fn random_axis(rng: &mut impl Rng, lo: f32, hi: f32) -> f32 {
    if lo < hi {
        rng.random_range(lo..hi)
    } else {
        (lo + hi) / 2.0
    }
}

fn clamp_axis(v: f32, lo: f32, hi: f32) -> (f32, bool) {
    // Cell wider than the world on this axis: pin it to the centre.
    let clamped = if lo > hi { (lo + hi) / 2.0 } else { v.clamp(lo, hi) };
    (clamped, clamped != v)
}

/// The game world containing all cells and players.
#[derive(Debug)]
pub struct World {
    /// Next cell ID to assign.
    next_cell_id: CellId,
    pub border: WorldBorder,
    pub mass: MassModel,

    /// All cells by ID.
    cells: HashMap<CellId, Cell>,
    /// Joined players by connection id.
    players: HashMap<OwnerId, Player>,
    /// Pellets, viruses and ejected mass.
    neutral: IdList,

    pellet_count: usize,
    virus_count: usize,
}

impl World {
    /// Create a new world with the given border size.
    pub fn new(width: f32, height: f32, mass: MassModel) -> Self {
        Self {
            next_cell_id: 1,
            border: WorldBorder::new(width, height),
            mass,
            cells: HashMap::with_capacity(2048),
            players: HashMap::with_capacity(128),
            neutral: IdList::with_capacity(1024),
            pellet_count: 0,
            virus_count: 0,
        }
    }

    /// Allocate a fresh cell ID.
    pub fn next_cell_id(&mut self) -> CellId {
        let id = self.next_cell_id;
        self.next_cell_id = self
            .next_cell_id
            .checked_add(1)
            .expect("cell id space exhausted");
        id
    }

    #[inline]
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    #[inline]
    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    /// Insert a cell into the arena and its owner's (or the neutral) index.
    /// A player cell whose owner is not joined is rejected.
    pub fn insert_cell(&mut self, cell: Cell) -> bool {
        debug_assert!(!self.cells.contains_key(&cell.id), "cell id {} reused", cell.id);
        let id = cell.id;
        match (cell.kind, cell.owner) {
            (CellKind::Player, Some(owner)) => match self.players.get_mut(&owner) {
                Some(player) => {
                    player.cells.push(id);
                }
                None => return false,
            },
            (CellKind::Player, None) => return false,
            (kind, _) => {
                self.neutral.push(id);
                match kind {
                    CellKind::Pellet => self.pellet_count += 1,
                    CellKind::Virus => self.virus_count += 1,
                    _ => {}
                }
            }
        }
        self.cells.insert(id, cell);
        true
    }

    /// Remove a cell. A player left without cells is *not* removed here;
    /// the caller decides whether that is a death or a transition.
    pub fn remove_cell(&mut self, id: CellId) -> Option<Cell> {
        let cell = self.cells.remove(&id)?;
        match cell.owner {
            Some(owner) => {
                if let Some(player) = self.players.get_mut(&owner) {
                    player.cells.remove(id);
                }
            }
            None => {
                self.neutral.remove(id);
                match cell.kind {
                    CellKind::Pellet => self.pellet_count -= 1,
                    CellKind::Virus => self.virus_count -= 1,
                    _ => {}
                }
            }
        }
        Some(cell)
    }

    /// Register a player. Returns false if the id is already joined.
    pub fn add_player(&mut self, player: Player) -> bool {
        if self.players.contains_key(&player.id) {
            return false;
        }
        self.players.insert(player.id, player);
        true
    }

    /// Remove a player together with all of its cells.
    pub fn remove_player(&mut self, owner: OwnerId) -> Option<(Player, Vec<Cell>)> {
        let player = self.players.remove(&owner)?;
        let cells = player
            .cells
            .iter()
            .filter_map(|id| self.cells.remove(&id))
            .collect();
        Some((player, cells))
    }

    #[inline]
    pub fn player(&self, owner: OwnerId) -> Option<&Player> {
        self.players.get(&owner)
    }

    #[inline]
    pub fn player_mut(&mut self, owner: OwnerId) -> Option<&mut Player> {
        self.players.get_mut(&owner)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Player ids sorted ascending, for deterministic iteration.
    pub fn player_ids(&self) -> Vec<OwnerId> {
        let mut ids: Vec<OwnerId> = self.players.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of a player's cell ids.
    pub fn player_cell_ids(&self, owner: OwnerId) -> Vec<CellId> {
        self.players
            .get(&owner)
            .map(|p| p.cells.as_slice().to_vec())
            .unwrap_or_default()
    }

    /// Total score over all of a player's cells.
    pub fn player_score(&self, owner: OwnerId) -> f32 {
        self.players
            .get(&owner)
            .map(|p| p.cells.iter().filter_map(|id| self.cells.get(&id)).map(Cell::score).sum())
            .unwrap_or(0.0)
    }

    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Iterate over all cells.
    #[inline]
    pub fn iter_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    #[inline]
    pub fn iter_cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.values_mut()
    }

    /// All cell ids sorted ascending.
    pub fn cell_ids(&self) -> Vec<CellId> {
        let mut ids: Vec<CellId> = self.cells.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn neutral_count(&self) -> usize {
        self.neutral.len()
    }

    #[inline]
    pub fn pellet_count(&self) -> usize {
        self.pellet_count
    }

    #[inline]
    pub fn virus_count(&self) -> usize {
        self.virus_count
    }

    /// Total score of every cell in the world.
    pub fn total_score(&self) -> f32 {
        self.cells.values().map(Cell::score).sum()
    }

    /// Generate a random color.
    #[inline]
    pub fn random_color() -> Color {
        let mut rng = rand::rng();
        Color::new(
            rng.random_range(50..=255),
            rng.random_range(50..=255),
            rng.random_range(50..=255),
        )
    }

    /// Spawn one pellet at a random in-bounds position.
    pub fn spawn_pellet(&mut self, score: f32) -> CellId {
        let position = self.border.random_position(self.mass.radius(score));
        let id = self.next_cell_id();
        let cell = Cell::neutral(id, CellKind::Pellet, position, score, Self::random_color(), &self.mass);
        self.insert_cell(cell);
        id
    }

    /// Spawn one virus at a random in-bounds position.
    pub fn spawn_virus(&mut self, score: f32) -> CellId {
        let position = self.border.random_position(self.mass.radius(score));
        let id = self.next_cell_id();
        let cell = Cell::neutral(id, CellKind::Virus, position, score, VIRUS_COLOR, &self.mass);
        self.insert_cell(cell);
        id
    }

    /// Public record of a cell, as sent to clients.
    pub fn record(&self, cell: &Cell) -> CellRecord {
        let nickname = cell
            .owner
            .and_then(|owner| self.players.get(&owner))
            .map(|p| p.nickname.clone());
        CellRecord {
            cell_id: cell.id,
            kind: cell.kind as u8,
            owner_id: cell.owner,
            x: cell.position.x,
            y: cell.position.y,
            radius: cell.radius(),
            score: cell.score(),
            color: cell.color,
            nickname,
        }
    }

    /// Records for every live cell, by ascending id.
    pub fn records(&self) -> Vec<CellRecord> {
        self.cell_ids()
            .into_iter()
            .filter_map(|id| self.cells.get(&id))
            .map(|cell| self.record(cell))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new(1000.0, 1000.0, MassModel::default())
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let mut w = world();
        let a = w.spawn_pellet(1.0);
        let b = w.spawn_virus(100.0);
        let c = w.next_cell_id();
        assert!(a < b && b < c);

        w.remove_cell(a);
        let d = w.spawn_pellet(1.0);
        assert!(d > c, "removed ids are never handed out again");
    }

    #[test]
    fn test_counters_follow_inserts_and_removals() {
        let mut w = world();
        let p = w.spawn_pellet(1.0);
        w.spawn_pellet(1.0);
        let v = w.spawn_virus(100.0);
        assert_eq!((w.pellet_count(), w.virus_count(), w.neutral_count()), (2, 1, 3));

        w.remove_cell(p);
        w.remove_cell(v);
        assert_eq!((w.pellet_count(), w.virus_count(), w.neutral_count()), (1, 0, 1));
        assert!(w.remove_cell(v).is_none());
    }

    #[test]
    fn test_player_cells_need_a_joined_owner() {
        let mut w = world();
        let mass = w.mass;
        let id = w.next_cell_id();
        let orphan = Cell::player(id, 9, Vec2::ZERO, 10.0, Color::default(), 0, &mass);
        assert!(!w.insert_cell(orphan));
        assert_eq!(w.cell_count(), 0);

        assert!(w.add_player(Player::new(9, "nine".into(), Color::default(), None, Vec2::ZERO)));
        assert!(!w.add_player(Player::new(9, "again".into(), Color::default(), None, Vec2::ZERO)));
        let id = w.next_cell_id();
        assert!(w.insert_cell(Cell::player(id, 9, Vec2::ZERO, 10.0, Color::default(), 0, &mass)));
        assert_eq!(w.player_cell_ids(9), vec![id]);
        assert_eq!(w.player_score(9), 10.0);
        assert_eq!(w.record(w.cell(id).unwrap()).nickname.as_deref(), Some("nine"));
    }

    #[test]
    fn test_remove_player_takes_all_cells() {
        let mut w = world();
        let mass = w.mass;
        w.add_player(Player::new(1, "a".into(), Color::default(), None, Vec2::ZERO));
        for _ in 0..3 {
            let id = w.next_cell_id();
            w.insert_cell(Cell::player(id, 1, Vec2::ZERO, 10.0, Color::default(), 0, &mass));
        }
        w.spawn_pellet(1.0);

        let (player, cells) = w.remove_player(1).unwrap();
        assert_eq!(player.id, 1);
        assert_eq!(cells.len(), 3);
        assert_eq!(w.cell_count(), 1);
        assert!(w.remove_player(1).is_none());
    }

    #[test]
    fn test_clamp_and_spawn_stay_in_bounds() {
        let w = world();
        let (p, cx, cy) = w.border.clamp(Vec2::new(600.0, -499.0), 10.0);
        assert_eq!(p, Vec2::new(490.0, -490.0));
        assert!(cx && cy);

        let (p, cx, cy) = w.border.clamp(Vec2::new(3.0, 4.0), 10.0);
        assert_eq!(p, Vec2::new(3.0, 4.0));
        assert!(!cx && !cy);

        // Wider than the world: centred, never panics.
        let (p, _, _) = w.border.clamp(Vec2::new(100.0, 0.0), 800.0);
        assert_eq!(p, Vec2::ZERO);

        for _ in 0..200 {
            let pos = w.border.random_position(20.0);
            assert!(w.border.contains(pos, 20.0));
        }
    }
}
