//! Broadcast diffing.
//!
//! Compares the live world against what was last broadcast and reports the
//! cells that appeared, moved or resized, or disappeared.

use crate::entity::CellId;
use crate::world::World;
use glam::Vec2;
use protocol::packets::{CellRecord, CellUpdate};
use std::collections::HashMap;

/// Changes since the previous broadcast.
///
/// The diff is shared by every connection, so it can repeat cells a client
/// learned from `InitialState` or `PlayerJoined`, and it can remove cells a
/// recent joiner never saw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub new_cells: Vec<CellRecord>,
    pub updated: Vec<CellUpdate>,
    pub removed: Vec<CellId>,
}

impl StateDelta {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.new_cells.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Running totals for bandwidth reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaMetrics {
    pub broadcasts: u64,
    pub messages_sent: u64,
    pub cells_examined: u64,
    pub records_sent: u64,
}

impl DeltaMetrics {
    /// Records sent as a share of what full snapshots would have cost.
    pub fn compression_percent(&self) -> f64 {
        if self.cells_examined == 0 {
            return 0.0;
        }
        self.records_sent as f64 / self.cells_examined as f64 * 100.0
    }
}

/// Last broadcast snapshot of `{cell id -> (position, radius)}`.
#[derive(Debug)]
pub struct DeltaTracker {
    last: HashMap<CellId, (Vec2, f32)>,
    epsilon: f32,
    metrics: DeltaMetrics,
}

impl DeltaTracker {
    pub fn new(epsilon: f32) -> Self {
        Self {
            last: HashMap::new(),
            epsilon,
            metrics: DeltaMetrics::default(),
        }
    }

    /// Diff the world against the previous snapshot, then replace the
    /// snapshot. Returns `None` when nothing changed.
    pub fn diff(&mut self, world: &World) -> Option<StateDelta> {
        let mut current = HashMap::with_capacity(world.cell_count());
        let mut delta = StateDelta::default();

        for id in world.cell_ids() {
            let Some(cell) = world.cell(id) else { continue };
            let (position, radius) = (cell.position, cell.radius());

            match self.last.get(&id) {
                None => delta.new_cells.push(world.record(cell)),
                Some(&(last_pos, last_radius)) => {
                    if position.distance(last_pos) > self.epsilon || (radius - last_radius).abs() > self.epsilon {
                        delta.updated.push(CellUpdate {
                            cell_id: id,
                            x: position.x,
                            y: position.y,
                            radius,
                        });
                    }
                }
            }
            current.insert(id, (position, radius));
        }

        delta.removed = self
            .last
            .keys()
            .filter(|id| !current.contains_key(id))
            .copied()
            .collect();
        delta.removed.sort_unstable();

        self.last = current;

        self.metrics.broadcasts += 1;
        self.metrics.cells_examined += world.cell_count() as u64;
        if delta.is_empty() {
            return None;
        }
        self.metrics.messages_sent += 1;
        self.metrics.records_sent += (delta.new_cells.len() + delta.updated.len() + delta.removed.len()) as u64;
        Some(delta)
    }

    #[inline]
    pub fn metrics(&self) -> DeltaMetrics {
        self.metrics
    }

    /// Number of cells in the last snapshot.
    #[inline]
    pub fn tracked(&self) -> usize {
        self.last.len()
    }
}
