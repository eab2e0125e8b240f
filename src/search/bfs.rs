//! Breadth-first search for uniform action costs, optionally bidirectional.

use std::time::Duration;

use log::info;

use super::{reconstruct, Deadline, Direction, Layers, Meeting, Problem, SearchOutcome};
use crate::config::SearchConfig;
use crate::error::{PlannerError, Result};
use crate::plan::Plan;
use crate::reference::Ref;

struct Side {
    direction: Direction,
    layers: Layers,
    reached: Ref,
    frontier: Ref,
    depth: u32,
    last_step: Duration,
}

impl Side {
    fn new(direction: Direction, origin: Ref) -> Self {
        let mut layers = Layers::new();
        layers.insert(0, vec![origin]);
        Self {
            direction,
            layers,
            reached: origin,
            frontier: origin,
            depth: 0,
            last_step: Duration::ZERO,
        }
    }
}

pub struct BfsSearch<'a> {
    problem: Problem<'a>,
    config: &'a SearchConfig,
    unit: u32,
}

impl<'a> BfsSearch<'a> {
    pub fn new(problem: Problem<'a>, config: &'a SearchConfig) -> Result<Self> {
        let costs: Vec<u32> = problem.relation.costs().collect();
        let unit = match costs.as_slice() {
            [] => 1,
            [c] if *c > 0 => *c,
            _ => {
                return Err(PlannerError::model(
                    "search",
                    format!("breadth-first search needs one positive action cost, found {:?}", costs),
                ));
            }
        };
        Ok(Self { problem, config, unit })
    }

    fn step(&self, direction: Direction, states: Ref) -> Ref {
        match direction {
            Direction::Forward => self.problem.relation.image_all(self.problem.encoder, states),
            Direction::Backward => self.problem.relation.preimage_all(self.problem.encoder, states),
        }
    }

    /// Time one step from each end; backward is worth it only if not much slower.
    fn backward_is_slow(&self) -> bool {
        let bdd = self.problem.bdd();
        let deadline = Deadline::unlimited(bdd);
        self.step(Direction::Forward, self.problem.init);
        let forward = deadline.elapsed(bdd);
        let deadline = Deadline::unlimited(bdd);
        self.step(Direction::Backward, self.problem.goal);
        let backward = deadline.elapsed(bdd);
        info!("Direction probe: forward {:?}, backward {:?}", forward, backward);
        backward.as_secs_f64() > forward.as_secs_f64() * self.config.direction_probe_factor
    }

    pub fn run(&self) -> Result<SearchOutcome> {
        let problem = &self.problem;
        let bdd = problem.bdd();

        if !bdd.is_zero(bdd.apply_and(problem.init, problem.goal)) {
            info!("Initial state satisfies the goal");
            return Ok(SearchOutcome::Found(Plan::default()));
        }

        let bidirectional = self.config.bidirectional && !(self.config.auto_direction && self.backward_is_slow());
        info!(
            "Starting {} breadth-first search",
            if bidirectional { "bidirectional" } else { "forward" }
        );

        let mut forward = Side::new(Direction::Forward, problem.init);
        let mut backward = Side::new(Direction::Backward, problem.goal);

        loop {
            let (side, other) = if !bidirectional || forward.last_step <= backward.last_step {
                (&mut forward, &backward)
            } else {
                (&mut backward, &forward)
            };

            let deadline = Deadline::unlimited(bdd);
            let layer = bdd.apply_diff(self.step(side.direction, side.frontier), side.reached);
            side.last_step = deadline.elapsed(bdd);

            if bdd.is_zero(layer) {
                info!("{} search exhausted after {} layers", side.direction, side.depth);
                return Ok(SearchOutcome::Unreachable);
            }
            side.depth += 1;
            side.layers.insert(side.depth * self.unit, vec![layer]);
            side.reached = bdd.apply_or(side.reached, layer);
            side.frontier = layer;
            info!(
                "{} layer {}: {} states, {} nodes, {:?}",
                side.direction,
                side.depth,
                problem.encoder.count_states(layer),
                bdd.size(layer),
                side.last_step
            );

            if !bdd.is_zero(bdd.apply_and(layer, other.reached)) {
                let meeting = meet(bdd, side, other)?;
                info!("Frontiers meet, plan length {}", meeting.cost() / self.unit);
                return reconstruct(problem, &forward.layers, &backward.layers, &meeting).map(SearchOutcome::Found);
            }

            problem.maybe_collect_garbage(
                [forward.reached, forward.frontier, backward.reached, backward.frontier]
                    .into_iter()
                    .chain(super::layer_roots(&forward.layers))
                    .chain(super::layer_roots(&backward.layers)),
            );
        }
    }
}

/// The newest layer of `side` against the shallowest meeting layer of `other`.
fn meet(bdd: &crate::bdd::Bdd, side: &Side, other: &Side) -> Result<Meeting> {
    let (&g, layer) = side
        .layers
        .iter()
        .next_back()
        .ok_or_else(|| PlannerError::reconstruction(0, "no layers recorded"))?;
    for (&h, other_layer) in &other.layers {
        let states = bdd.apply_and(layer[0], other_layer[0]);
        if !bdd.is_zero(states) {
            return Ok(match side.direction {
                Direction::Forward => Meeting {
                    forward_g: g,
                    backward_g: h,
                    states,
                },
                Direction::Backward => Meeting {
                    forward_g: h,
                    backward_g: g,
                    states,
                },
            });
        }
    }
    Err(PlannerError::reconstruction(g, "frontiers intersect but no layer matches"))
}
