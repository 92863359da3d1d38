//! The fixed-rate simulation step.
//!
//! Phases run in a fixed order over the whole world:
//! 1. steering movement
//! 2. launch momentum
//! 3. consumption detection
//! 4. consumption resolution
//! 5. sibling merge / repulsion
//! 6. border clamping
//! 7. pellet and virus respawn

use crate::collision::{can_consume, check_cell_collision, pops_virus, push_shares};
use crate::entity::{Cell, CellId, CellKind, OwnerId};
use glam::Vec2;
use rand::Rng;
use std::f32::consts::TAU;
use tracing::{debug, info};

use super::game::GameState;
use super::{Audience, ServerMessage};

/// A queued consumption, applied after detection finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Consumption {
    VirusPop { cell: CellId, virus: CellId },
    Regular { eater: CellId, eaten: CellId },
}

/// Immutable view of a cell taken at the start of detection.
#[derive(Debug, Clone, Copy)]
struct Probe {
    id: CellId,
    kind: CellKind,
    owner: Option<OwnerId>,
    position: Vec2,
    radius: f32,
    score: f32,
}

impl From<&Cell> for Probe {
    fn from(cell: &Cell) -> Self {
        Self {
            id: cell.id,
            kind: cell.kind,
            owner: cell.owner,
            position: cell.position,
            radius: cell.radius(),
            score: cell.score(),
        }
    }
}

fn classify(a: &Probe, b: &Probe, threshold: f32) -> Option<Consumption> {
    let distance = a.position.distance(b.position);
    match (a.kind, b.kind) {
        (CellKind::Player, CellKind::Virus) => pops_virus(distance, a.radius, a.score, b.radius, b.score)
            .then_some(Consumption::VirusPop { cell: a.id, virus: b.id }),
        (CellKind::Virus, CellKind::Player) => pops_virus(distance, b.radius, b.score, a.radius, a.score)
            .then_some(Consumption::VirusPop { cell: b.id, virus: a.id }),
        (CellKind::Virus, _) | (_, CellKind::Virus) => None,
        _ => {
            let (bigger, smaller) = if a.radius >= b.radius { (a, b) } else { (b, a) };
            if bigger.kind != CellKind::Player {
                return None;
            }
            can_consume(distance, bigger.radius, smaller.radius, threshold).then_some(Consumption::Regular {
                eater: bigger.id,
                eaten: smaller.id,
            })
        }
    }
}

impl GameState {
    /// Advance the world by one step.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        let dt = 1.0 / self.config.server.tick_rate;

        self.move_cells();
        self.integrate_launches(dt);
        let events = self.detect_consumption();
        self.resolve_consumption(events);
        self.resolve_siblings();
        self.clamp_to_border();
        self.respawn();

        self.check_invariants();

        if self.tick_count % 600 == 0 {
            debug!(
                "Tick {}: {} players, {} cells ({} pellets, {} viruses), avg {:.3}ms",
                self.tick_count,
                self.world.player_count(),
                self.world.cell_count(),
                self.world.pellet_count(),
                self.world.virus_count(),
                self.update_time_avg,
            );
        }
    }

    /// Move every player cell toward its owner's target. Larger cells are slower.
    fn move_cells(&mut self) {
        let speed = self.config.player.speed;
        let targets: Vec<(OwnerId, Vec2)> = self.world.players().map(|p| (p.id, p.target)).collect();

        for (owner, target) in targets {
            for id in self.world.player_cell_ids(owner) {
                let Some(cell) = self.world.cell_mut(id) else {
                    continue;
                };
                let to_target = target - cell.position;
                let distance = to_target.length();
                let radius = cell.radius();
                // Target inside the cell: hold still.
                if distance > radius {
                    cell.position += to_target / distance * (speed * (20.0 / radius));
                }
            }
        }
    }

    fn integrate_launches(&mut self, dt: f32) {
        let decay = self.config.physics.launch_decay;
        let stop_speed = self.config.physics.launch_stop_speed;
        for cell in self.world.iter_cells_mut() {
            cell.integrate_launch(dt, decay, stop_speed);
        }
    }

    /// Pairwise scan, in ascending id order. A cell takes part in at most
    /// one event per tick.
    fn detect_consumption(&mut self) -> Vec<Consumption> {
        let threshold = self.config.physics.consume_threshold;
        let probes: Vec<Probe> = self
            .world
            .cell_ids()
            .into_iter()
            .filter_map(|id| self.world.cell(id))
            .map(Probe::from)
            .collect();

        self.involved.clear();
        self.involved.grow(probes.len());

        let mut events = Vec::new();
        for i in 0..probes.len() {
            if self.involved.contains(i) {
                continue;
            }
            let a = &probes[i];
            for j in (i + 1)..probes.len() {
                if self.involved.contains(j) {
                    continue;
                }
                let b = &probes[j];
                // Siblings never eat each other; neither do two neutral cells.
                if a.owner == b.owner {
                    continue;
                }
                if let Some(event) = classify(a, b, threshold) {
                    self.involved.insert(i);
                    self.involved.insert(j);
                    events.push(event);
                    break;
                }
            }
        }
        events
    }

    fn resolve_consumption(&mut self, events: Vec<Consumption>) {
        for event in events {
            match event {
                Consumption::Regular { eater, eaten } => self.consume(eater, eaten),
                Consumption::VirusPop { cell, virus } => self.pop_virus(cell, virus),
            }
        }
    }

    fn consume(&mut self, eater: CellId, eaten: CellId) {
        debug_assert!(self.world.cell(eater).is_some(), "eater {} vanished before resolution", eater);
        let Some(victim) = self.world.remove_cell(eaten) else {
            return;
        };
        let mass = self.world.mass;
        if let Some(cell) = self.world.cell_mut(eater) {
            cell.gain(victim.score(), &mass);
        }

        if let Some(owner) = victim.owner {
            let emptied = self.world.player(owner).is_some_and(|p| p.cells.is_empty());
            if emptied {
                self.kill_player(owner, victim.score());
            }
        }
    }

    /// The player lost its last cell.
    fn kill_player(&mut self, owner: OwnerId, final_score: f32) {
        let Some((player, _)) = self.world.remove_player(owner) else {
            return;
        };
        let final_score = final_score.round().max(1.0) as u32;
        info!("Player {} (\"{}\") died with score {}", owner, player.nickname, final_score);

        self.send(Audience::Only(owner), ServerMessage::Died { final_score });
        self.send(Audience::AllExcept(owner), ServerMessage::PlayerLeft { owner_id: owner });
    }

    /// Replace the player cell with evenly spread children and remove the virus.
    fn pop_virus(&mut self, cell_id: CellId, virus_id: CellId) {
        if self.world.cell(virus_id).is_none() || self.world.cell(cell_id).is_none() {
            return;
        }
        self.world.remove_cell(virus_id);
        let Some(cell) = self.world.remove_cell(cell_id) else {
            return;
        };
        let Some(owner) = cell.owner else {
            return;
        };

        let split_unit = self.config.virus.split_unit;
        let max_split = self.config.virus.max_split;
        let launch_factor = self.config.virus.pop_launch_factor;
        let mass = self.world.mass;
        let ready = self.tick_count + self.merge_cooldown_ticks;

        let score = cell.score();
        let count = ((score / split_unit).floor() as usize).clamp(1, max_split.max(1));
        let share = score / count as f32;
        let phase = rand::rng().random_range(0.0..TAU);

        for k in 0..count {
            // Last child takes the remainder so the total is preserved.
            let child_score = if k + 1 == count {
                score - share * (count - 1) as f32
            } else {
                share
            };
            let dir = Vec2::from_angle(phase + k as f32 * TAU / count as f32);
            let radius = mass.radius(child_score);
            let id = self.world.next_cell_id();
            let mut child = Cell::player(id, owner, cell.position + dir * radius, child_score, cell.color, ready, &mass);
            child.launch = Some(dir * radius * launch_factor);
            self.world.insert_cell(child);
        }

        debug!("Player {} popped virus {} into {} cells", owner, virus_id, count);
    }

    /// Merge ready siblings whose centres overlap; push apart the rest.
    fn resolve_siblings(&mut self) {
        let tick = self.tick_count;

        for owner in self.world.player_ids() {
            let ids = self.world.player_cell_ids(owner);
            if ids.len() < 2 {
                continue;
            }
            let mut merged = vec![false; ids.len()];

            for i in 0..ids.len() {
                if merged[i] {
                    continue;
                }
                for j in (i + 1)..ids.len() {
                    if merged[j] {
                        continue;
                    }
                    let (Some(a), Some(b)) = (self.world.cell(ids[i]), self.world.cell(ids[j])) else {
                        continue;
                    };
                    let collision = check_cell_collision(a.position, a.radius(), b.position, b.radius());

                    if a.can_merge(tick) && b.can_merge(tick) {
                        if collision.d < a.radius().max(b.radius()) {
                            let (keep, gone) = if a.radius() >= b.radius() { (i, j) } else { (j, i) };
                            self.merge_cells(ids[keep], ids[gone]);
                            merged[gone] = true;
                            if gone == i {
                                break;
                            }
                        }
                    } else if collision.is_colliding() {
                        self.repel(ids[i], ids[j]);
                    }
                }
            }
        }
    }

    fn merge_cells(&mut self, keep: CellId, gone: CellId) {
        if self.world.cell(keep).is_none() {
            return;
        }
        let Some(gone) = self.world.remove_cell(gone) else {
            return;
        };
        let mass = self.world.mass;
        let Some(cell) = self.world.cell_mut(keep) else {
            return;
        };

        let total = cell.score() + gone.score();
        if total > 0.0 {
            cell.position = (cell.position * cell.score() + gone.position * gone.score()) / total;
        }
        cell.set_score(total, &mass);
        cell.merge_ready_tick = cell.merge_ready_tick.max(gone.merge_ready_tick);
    }

    /// Push two overlapping siblings apart, the lighter one further.
    fn repel(&mut self, a_id: CellId, b_id: CellId) {
        let (Some(a), Some(b)) = (self.world.cell(a_id), self.world.cell(b_id)) else {
            return;
        };
        let (a_pos, a_radius, a_score) = (a.position, a.radius(), a.score());
        let (b_pos, b_radius, b_score) = (b.position, b.radius(), b.score());

        let strength = self.config.physics.repulsion_strength;
        let min_factor = self.config.physics.min_separation_factor;
        let (a_share, b_share) = push_shares(a_score, b_score);

        let collision = check_cell_collision(a_pos, a_radius, b_pos, b_radius);
        let push = collision.overlap() * strength;
        let normal = collision.normal();
        let mut a_next = a_pos - normal * push * a_share;
        let mut b_next = b_pos + normal * push * b_share;

        // Corrective pass: enforce the minimum separation.
        let after = check_cell_collision(a_next, a_radius, b_next, b_radius);
        let min_distance = after.r * min_factor;
        if after.d < min_distance {
            let normal = after.normal();
            let extra = min_distance - after.d;
            a_next -= normal * extra * a_share;
            b_next += normal * extra * b_share;
        }

        if let Some(a) = self.world.cell_mut(a_id) {
            a.position = a_next;
        }
        if let Some(b) = self.world.cell_mut(b_id) {
            b.position = b_next;
        }
    }

    /// Keep every cell inside the border; damp momentum into a wall.
    fn clamp_to_border(&mut self) {
        let border = self.world.border;
        let damping = self.config.physics.wall_damping;
        for cell in self.world.iter_cells_mut() {
            let (position, hit_x, hit_y) = border.clamp(cell.position, cell.radius());
            cell.position = position;
            if let Some(velocity) = cell.launch.as_mut() {
                if hit_x {
                    velocity.x *= damping;
                }
                if hit_y {
                    velocity.y *= damping;
                }
            }
        }
    }

    /// At most one pellet and one virus per tick.
    fn respawn(&mut self) {
        if self.world.pellet_count() < self.config.pellet.target {
            self.world.spawn_pellet(self.config.pellet.score);
        }
        if self.world.virus_count() < self.config.virus.target {
            self.world.spawn_virus(self.config.virus.score);
        }
    }

    fn check_invariants(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        let mass = self.world.mass;
        for cell in self.world.iter_cells() {
            debug_assert!(
                (cell.radius() - mass.radius(cell.score())).abs() <= 1e-3,
                "cell {} radius out of sync",
                cell.id
            );
            debug_assert!(
                self.world.border.contains(cell.position, cell.radius()),
                "cell {} outside the border at {:?}",
                cell.id,
                cell.position
            );
            debug_assert_eq!(cell.owner.is_some(), cell.kind == CellKind::Player);
        }
        for player in self.world.players() {
            debug_assert!(!player.cells.is_empty(), "player {} left without cells", player.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use protocol::Color;
    use std::net::SocketAddr;

    fn game() -> GameState {
        let mut config = Config::default();
        config.pellet.target = 0;
        config.virus.target = 0;
        GameState::new(&config)
    }

    /// Join a player and park its single cell at `position` with `score`.
    fn player_at(game: &mut GameState, position: Vec2, score: f32) -> (OwnerId, CellId) {
        let addr: SocketAddr = "127.0.0.1:6000".parse().unwrap();
        let owner = game.add_client(addr);
        game.join(owner, "cell", Color::new(10, 200, 10), None);
        let id = game.world.player_cell_ids(owner)[0];
        let mass = game.world.mass;
        let cell = game.world.cell_mut(id).unwrap();
        cell.position = position;
        cell.set_score(score, &mass);
        game.world.player_mut(owner).unwrap().target = position;
        game.drain_outbox();
        (owner, id)
    }

    fn add_sibling(game: &mut GameState, owner: OwnerId, position: Vec2, score: f32, ready: u64) -> CellId {
        let mass = game.world.mass;
        let id = game.world.next_cell_id();
        assert!(game.world.insert_cell(Cell::player(id, owner, position, score, Color::default(), ready, &mass)));
        id
    }

    fn add_neutral(game: &mut GameState, kind: CellKind, position: Vec2, score: f32) -> CellId {
        let mass = game.world.mass;
        let id = game.world.next_cell_id();
        assert!(game.world.insert_cell(Cell::neutral(id, kind, position, score, Color::default(), &mass)));
        id
    }

    #[test]
    fn test_steering_moves_toward_target() {
        let mut g = game();
        let (owner, id) = player_at(&mut g, Vec2::ZERO, 25.0);
        g.world.player_mut(owner).unwrap().target = Vec2::new(100.0, 0.0);

        g.move_cells();
        let cell = g.world.cell(id).unwrap();
        let expected = g.config.player.speed * 20.0 / cell.radius();
        assert!((cell.position.x - expected).abs() < 1e-4);
        assert!(cell.position.y.abs() < 1e-6);
    }

    #[test]
    fn test_steering_holds_when_target_inside() {
        let mut g = game();
        let (owner, id) = player_at(&mut g, Vec2::ZERO, 25.0);
        g.world.player_mut(owner).unwrap().target = Vec2::new(2.0, 1.0);
        g.move_cells();
        assert_eq!(g.world.cell(id).unwrap().position, Vec2::ZERO);
    }

    #[test]
    fn test_launch_decays_to_none() {
        let mut g = game();
        let id = add_neutral(&mut g, CellKind::Ejected, Vec2::ZERO, 8.0);
        g.world.cell_mut(id).unwrap().launch = Some(Vec2::new(600.0, 0.0));

        let mut ticks = 0;
        while g.world.cell(id).unwrap().launch.is_some() {
            g.tick();
            ticks += 1;
            assert!(ticks < 200, "momentum never ended");
        }
        let cell = g.world.cell(id).unwrap();
        assert!(cell.position.x > 0.0);
        assert!(cell.launch.is_none());
    }

    #[test]
    fn test_regular_consumption_conserves_score() {
        let mut g = game();
        let (owner, id) = player_at(&mut g, Vec2::ZERO, 100.0);
        let pellet = add_neutral(&mut g, CellKind::Pellet, Vec2::new(1.0, 0.0), 1.0);
        let total = g.world.total_score();

        g.tick();

        assert!(g.world.cell(pellet).is_none());
        assert!((g.world.cell(id).unwrap().score() - 101.0).abs() < 1e-4);
        assert!((g.world.total_score() - total).abs() < 1e-3);
        assert_eq!(g.world.player_cell_ids(owner), vec![id]);
    }

    #[test]
    fn test_one_consumption_per_cell_per_tick() {
        let mut g = game();
        let (_, id) = player_at(&mut g, Vec2::ZERO, 100.0);
        let first = add_neutral(&mut g, CellKind::Pellet, Vec2::new(1.0, 0.0), 1.0);
        let second = add_neutral(&mut g, CellKind::Pellet, Vec2::new(-1.0, 0.0), 1.0);

        g.tick();
        assert!(g.world.cell(first).is_none());
        assert!(g.world.cell(second).is_some());
        assert!((g.world.cell(id).unwrap().score() - 101.0).abs() < 1e-4);

        g.tick();
        assert!(g.world.cell(second).is_none());
    }

    #[test]
    fn test_neutral_cells_never_consume() {
        let mut g = game();
        add_neutral(&mut g, CellKind::Ejected, Vec2::ZERO, 200.0);
        let pellet = add_neutral(&mut g, CellKind::Pellet, Vec2::ZERO, 1.0);
        g.tick();
        assert!(g.world.cell(pellet).is_some());
    }

    #[test]
    fn test_virus_is_ignored_by_small_players() {
        let mut g = game();
        let (owner, id) = player_at(&mut g, Vec2::ZERO, 100.0);
        let virus = add_neutral(&mut g, CellKind::Virus, Vec2::new(2.0, 0.0), 100.0);
        g.tick();
        assert!(g.world.cell(virus).is_some());
        assert_eq!(g.world.player_cell_ids(owner), vec![id]);
    }

    #[test]
    fn test_virus_pop_splits_and_preserves_score() {
        let mut g = game();
        let (owner, id) = player_at(&mut g, Vec2::ZERO, 300.0);
        let virus = add_neutral(&mut g, CellKind::Virus, Vec2::new(5.0, 0.0), 100.0);

        g.tick();

        assert!(g.world.cell(virus).is_none());
        assert!(g.world.cell(id).is_none());
        let cells = g.world.player_cell_ids(owner);
        // floor(300 / 20) = 15
        assert_eq!(cells.len(), 15);
        assert!((g.world.player_score(owner) - 300.0).abs() < 1e-2);
        for cid in cells {
            let cell = g.world.cell(cid).unwrap();
            assert_eq!(cell.merge_ready_tick, g.tick_count + g.merge_cooldown_ticks);
            assert!(cell.launch.is_some());
        }
    }

    #[test]
    fn test_virus_pop_is_capped() {
        let mut g = game();
        let (owner, _) = player_at(&mut g, Vec2::ZERO, 1000.0);
        add_neutral(&mut g, CellKind::Virus, Vec2::ZERO, 100.0);
        g.tick();
        assert_eq!(g.world.player_cell_ids(owner).len(), g.config.virus.max_split);
    }

    #[test]
    fn test_last_cell_eaten_sends_died_once() {
        let mut g = game();
        let (hunter, hunter_cell) = player_at(&mut g, Vec2::ZERO, 200.0);
        let (victim, _) = player_at(&mut g, Vec2::new(1.0, 0.0), 25.4);

        g.tick();

        assert!(g.world.player(victim).is_none());
        assert!((g.world.cell(hunter_cell).unwrap().score() - 225.4).abs() < 1e-3);
        let out = g.drain_outbox();
        let died: Vec<_> = out
            .iter()
            .filter(|e| matches!(e.message, ServerMessage::Died { .. }))
            .collect();
        assert_eq!(died.len(), 1);
        assert_eq!(died[0].audience, Audience::Only(victim));
        assert_eq!(died[0].message, ServerMessage::Died { final_score: 25 });

        let died_at = out.iter().position(|e| matches!(e.message, ServerMessage::Died { .. }));
        let left_at = out
            .iter()
            .position(|e| e.message == ServerMessage::PlayerLeft { owner_id: victim });
        assert!(died_at < left_at);
        assert!(out[left_at.unwrap()].audience.includes(hunter));

        g.tick();
        assert!(g.drain_outbox().is_empty());
        assert!(g.is_connected(victim), "the session survives death");
    }

    #[test]
    fn test_died_score_is_at_least_one() {
        let mut g = game();
        player_at(&mut g, Vec2::ZERO, 200.0);
        let (victim, _) = player_at(&mut g, Vec2::new(1.0, 0.0), 0.2);
        g.tick();
        let out = g.drain_outbox();
        assert!(out.contains(&crate::server::Envelope {
            audience: Audience::Only(victim),
            message: ServerMessage::Died { final_score: 1 },
        }));
    }

    #[test]
    fn test_merge_uses_weighted_centroid() {
        let mut g = game();
        g.tick_count = 1000;
        let (owner, big) = player_at(&mut g, Vec2::ZERO, 30.0);
        g.world.cell_mut(big).unwrap().merge_ready_tick = 0;
        let small = add_sibling(&mut g, owner, Vec2::new(3.0, 0.0), 20.0, 500);

        g.resolve_siblings();

        let cells = g.world.player_cell_ids(owner);
        assert_eq!(cells, vec![big]);
        assert!(g.world.cell(small).is_none());
        let cell = g.world.cell(big).unwrap();
        assert_eq!(cell.score(), 50.0);
        assert!((cell.position.x - 1.2).abs() < 1e-5);
        assert_eq!(cell.merge_ready_tick, 500);
    }

    #[test]
    fn test_apart_ready_siblings_do_not_merge() {
        let mut g = game();
        g.tick_count = 1000;
        let (owner, big) = player_at(&mut g, Vec2::ZERO, 30.0);
        g.world.cell_mut(big).unwrap().merge_ready_tick = 0;
        add_sibling(&mut g, owner, Vec2::new(12.0, 0.0), 20.0, 0);
        g.resolve_siblings();
        assert_eq!(g.world.player_cell_ids(owner).len(), 2);
    }

    #[test]
    fn test_cooling_siblings_are_pushed_apart() {
        let mut g = game();
        let (owner, a) = player_at(&mut g, Vec2::ZERO, 25.0);
        let b = add_sibling(&mut g, owner, Vec2::new(3.0, 0.0), 25.0, u64::MAX);

        g.resolve_siblings();

        let (a, b) = (g.world.cell(a).unwrap(), g.world.cell(b).unwrap());
        let distance = a.position.distance(b.position);
        let min = (a.radius() + b.radius()) * g.config.physics.min_separation_factor;
        assert!(distance >= min - 1e-3, "{} < {}", distance, min);
        // Equal masses move equally.
        assert!((a.position.x + b.position.x - 3.0).abs() < 1e-3);
        assert_eq!(g.world.player_score(owner), 50.0);
    }

    #[test]
    fn test_coincident_siblings_separate_along_x() {
        let mut g = game();
        let (owner, a) = player_at(&mut g, Vec2::ZERO, 25.0);
        let b = add_sibling(&mut g, owner, Vec2::ZERO, 25.0, u64::MAX);
        g.resolve_siblings();
        assert!(g.world.cell(a).unwrap().position.x < 0.0);
        assert!(g.world.cell(b).unwrap().position.x > 0.0);
    }

    #[test]
    fn test_clamp_damps_launch() {
        let mut g = game();
        let id = add_neutral(&mut g, CellKind::Ejected, Vec2::new(5000.0, 0.0), 8.0);
        g.world.cell_mut(id).unwrap().launch = Some(Vec2::new(100.0, 50.0));

        g.clamp_to_border();

        let cell = g.world.cell(id).unwrap();
        assert!((cell.position.x - (g.world.border.max_x - cell.radius())).abs() < 1e-3);
        assert_eq!(cell.launch, Some(Vec2::new(50.0, 50.0)));
    }

    #[test]
    fn test_launched_cells_stay_inside_walls_across_ticks() {
        let mut g = game();
        let mass = g.world.mass;
        let edge = g.world.border.max_x - mass.radius(8.0) - 1.0;
        let blob = add_neutral(&mut g, CellKind::Ejected, Vec2::new(edge, 0.0), 8.0);
        g.world.cell_mut(blob).unwrap().launch = Some(Vec2::new(600.0, 60.0));
        let min_y = g.world.border.min_y;
        let (owner, _) = player_at(&mut g, Vec2::new(0.0, min_y + 20.0), 25.0);
        g.world.player_mut(owner).unwrap().target = Vec2::new(-10_000.0, -10_000.0);

        g.tick();
        let cell = g.world.cell(blob).unwrap();
        assert!((cell.position.x - (g.world.border.max_x - cell.radius())).abs() < 1e-3);
        let launch = cell.launch.unwrap();
        let decay = g.config.physics.launch_decay;
        assert!((launch.x - 600.0 * decay * g.config.physics.wall_damping).abs() < 1e-2);
        assert!((launch.y - 60.0 * decay).abs() < 1e-3, "the free axis is not damped");

        for _ in 0..120 {
            g.tick();
            for cell in g.world.iter_cells() {
                assert!(
                    g.world.border.contains(cell.position, cell.radius()),
                    "cell {} escaped to {:?}",
                    cell.id,
                    cell.position
                );
            }
        }
    }

    #[test]
    fn test_respawn_is_gradual() {
        let mut config = Config::default();
        config.pellet.target = 5;
        config.virus.target = 2;
        let mut g = GameState::new(&config);

        g.tick();
        assert_eq!((g.world.pellet_count(), g.world.virus_count()), (1, 1));
        for _ in 0..10 {
            g.tick();
        }
        assert_eq!((g.world.pellet_count(), g.world.virus_count()), (5, 2));
    }
}
