//! Bidirectional cost-bucket Dijkstra search.
//!
//! Each direction keeps open buckets keyed by accumulated cost and a history
//! of closed buckets. A bucket is closed by popping it, removing states that
//! were already closed, and folding in everything reachable through free
//! actions; each fold is kept as its own sub-layer. Whenever states closed or
//! generated on one side are already closed on the other, the sum of both
//! costs is a candidate plan cost.
//!
//! Backward steps run under a cooperative deadline derived from the slowest
//! forward step. A backward step that overruns is rolled back and the
//! backward direction is abandoned; its closed buckets remain valid, so the
//! forward search alone still finds an optimal plan.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, warn};

use super::{layer_roots, reconstruct, Deadline, Direction, Layers, Meeting, Problem, SearchOutcome, StepOutcome};
use crate::bdd::Bdd;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::plan::Plan;
use crate::reference::Ref;

struct Frontier {
    direction: Direction,
    open: BTreeMap<u32, Ref>,
    closed: Layers,
    closed_total: Ref,
    last_step: Duration,
    max_step: Duration,
    steps: usize,
    abandoned: bool,
}

impl Frontier {
    fn new(bdd: &Bdd, direction: Direction, origin: Ref) -> Self {
        Self {
            direction,
            open: BTreeMap::from([(0, origin)]),
            closed: Layers::new(),
            closed_total: bdd.zero,
            last_step: Duration::ZERO,
            max_step: Duration::ZERO,
            steps: 0,
            abandoned: false,
        }
    }

    /// A direction that never expands: its origin is the only closed layer.
    fn seeded(direction: Direction, origin: Ref) -> Self {
        Self {
            direction,
            open: BTreeMap::new(),
            closed: Layers::from([(0, vec![origin])]),
            closed_total: origin,
            last_step: Duration::ZERO,
            max_step: Duration::ZERO,
            steps: 0,
            abandoned: false,
        }
    }

    /// Lower bound on the cost of any state not closed yet.
    fn bound(&self) -> u32 {
        self.open.keys().next().copied().unwrap_or(0)
    }

    fn can_expand(&self) -> bool {
        !self.abandoned && !self.open.is_empty()
    }

    fn roots(&self) -> impl Iterator<Item = Ref> + '_ {
        self.open
            .values()
            .copied()
            .chain(layer_roots(&self.closed))
            .chain([self.closed_total])
    }

    /// The cheapest closed bucket meeting `states`, if `g` plus its cost beats `best`.
    fn meet(&self, bdd: &Bdd, states: Ref, g: u32, best: Option<u32>) -> Option<(u32, Ref)> {
        if bdd.is_zero(bdd.apply_and(states, self.closed_total)) {
            return None;
        }
        for (&idx, layers) in &self.closed {
            if best.is_some_and(|best| g + idx >= best) {
                break;
            }
            let s = bdd.apply_and(states, bdd.apply_or_many(layers.iter().copied()));
            if !bdd.is_zero(s) {
                return Some((idx, s));
            }
        }
        None
    }
}

/// Result of one step, applied to the frontier only if the step finished in time.
struct Expansion {
    g: u32,
    layers: Vec<Ref>,
    closed_total: Ref,
    successors: Vec<(u32, Ref)>,
    meeting: Option<Meeting>,
}

pub struct DijkstraSearch<'a> {
    problem: Problem<'a>,
    config: &'a SearchConfig,
    forward: Frontier,
    backward: Frontier,
    best: Option<Meeting>,
}

impl<'a> DijkstraSearch<'a> {
    pub fn new(problem: Problem<'a>, config: &'a SearchConfig) -> Self {
        let bdd = problem.bdd();
        let backward = if config.bidirectional {
            Frontier::new(bdd, Direction::Backward, problem.goal)
        } else {
            Frontier::seeded(Direction::Backward, problem.goal)
        };
        Self {
            problem,
            config,
            forward: Frontier::new(bdd, Direction::Forward, problem.init),
            backward,
            best: None,
        }
    }

    pub fn is_backward_abandoned(&self) -> bool {
        self.backward.abandoned
    }

    fn best_cost(&self) -> Option<u32> {
        self.best.map(|m| m.cost())
    }

    fn frontiers(&self, direction: Direction) -> (&Frontier, &Frontier) {
        match direction {
            Direction::Forward => (&self.forward, &self.backward),
            Direction::Backward => (&self.backward, &self.forward),
        }
    }

    fn choose(&self) -> Option<Direction> {
        match (self.forward.can_expand(), self.backward.can_expand()) {
            (true, true) if self.forward.last_step <= self.backward.last_step => Some(Direction::Forward),
            (true, true) => Some(Direction::Backward),
            (true, false) => Some(Direction::Forward),
            (false, true) => Some(Direction::Backward),
            (false, false) => None,
        }
    }

    /// No plan exists once one side is fully explored without meeting the other.
    fn proven_unreachable(&self) -> bool {
        if self.best.is_some() {
            return false;
        }
        let forward_done = self.forward.open.is_empty() && !self.backward.closed.is_empty();
        let backward_done = self.backward.open.is_empty()
            && self.backward.steps > 0
            && !self.backward.abandoned
            && !self.forward.closed.is_empty();
        forward_done || backward_done
    }

    pub fn run(&mut self) -> Result<SearchOutcome> {
        let bdd = self.problem.bdd();
        if !bdd.is_zero(bdd.apply_and(self.problem.init, self.problem.goal)) {
            info!("Initial state satisfies the goal");
            return Ok(SearchOutcome::Found(Plan::default()));
        }
        info!(
            "Starting {} Dijkstra search",
            if self.config.bidirectional { "bidirectional" } else { "forward" }
        );

        loop {
            let bound = self.forward.bound() + self.backward.bound();
            if let Some(best) = self.best_cost().filter(|&best| bound >= best) {
                info!("Lower bound {} reaches best plan cost {}", bound, best);
                break;
            }
            if self.proven_unreachable() {
                info!("Search space exhausted without meeting the goal");
                return Ok(SearchOutcome::Unreachable);
            }
            let Some(direction) = self.choose() else {
                break;
            };

            if self.step(direction) == StepOutcome::TimeExceeded {
                debug!("{} step rolled back", direction);
            }

            let live: Vec<Ref> = self
                .forward
                .roots()
                .chain(self.backward.roots())
                .chain(self.best.map(|m| m.states))
                .collect();
            self.problem.maybe_collect_garbage(live);
        }

        let Some(meeting) = self.best else {
            return Ok(SearchOutcome::Unreachable);
        };
        info!(
            "Optimal plan cost {} (forward {}, backward {})",
            meeting.cost(),
            meeting.forward_g,
            meeting.backward_g
        );
        Self::close_open_buckets(&mut self.forward, meeting.forward_g);
        Self::close_open_buckets(&mut self.backward, meeting.backward_g);
        reconstruct(&self.problem, &self.forward.closed, &self.backward.closed, &meeting).map(SearchOutcome::Found)
    }

    /// One step in `direction`. Only backward steps have a deadline.
    fn step(&mut self, direction: Direction) -> StepOutcome {
        let bdd = self.problem.bdd();
        if direction == Direction::Backward
            && self.config.max_backward_steps.is_some_and(|limit| self.backward.steps >= limit)
        {
            info!("Backward step limit {} reached", self.backward.steps);
            self.abandon_backward(Duration::ZERO);
            return StepOutcome::TimeExceeded;
        }
        let limit = match direction {
            Direction::Forward => None,
            Direction::Backward => Some(self.config.step_timeout(self.forward.max_step)),
        };
        let deadline = Deadline::new(bdd, limit);
        let expansion = {
            let (side, other) = self.frontiers(direction);
            self.expand(side, other, &deadline)
        };
        let elapsed = deadline.elapsed(bdd);

        match expansion {
            Some(expansion) => {
                self.commit(direction, expansion, elapsed);
                StepOutcome::Done
            }
            None => {
                self.abandon_backward(elapsed);
                StepOutcome::TimeExceeded
            }
        }
    }

    /// Expand the cheapest open bucket of `side`; `None` if the deadline passed.
    fn expand(&self, side: &Frontier, other: &Frontier, deadline: &Deadline) -> Option<Expansion> {
        let problem = &self.problem;
        let bdd = problem.bdd();
        let direction = side.direction;
        // Only called for a direction that can expand.
        let (&g, &bucket) = side.open.iter().next()?;

        let mut expansion = Expansion {
            g,
            layers: Vec::new(),
            closed_total: side.closed_total,
            successors: Vec::new(),
            meeting: None,
        };
        let mut best = self.best_cost();
        let mut record = |expansion: &mut Expansion, states: Ref, g: u32| {
            if let Some((idx, s)) = other.meet(bdd, states, g, best) {
                let meeting = match direction {
                    Direction::Forward => Meeting {
                        forward_g: g,
                        backward_g: idx,
                        states: s,
                    },
                    Direction::Backward => Meeting {
                        forward_g: idx,
                        backward_g: g,
                        states: s,
                    },
                };
                debug!("New candidate plan cost {}", meeting.cost());
                best = Some(meeting.cost());
                expansion.meeting = Some(meeting);
            }
        };

        let current = bdd.apply_diff(bucket, side.closed_total);
        if bdd.is_zero(current) {
            return Some(expansion);
        }
        record(&mut expansion, current, g);
        expansion.layers.push(current);
        expansion.closed_total = bdd.apply_or(expansion.closed_total, current);

        // Closure under free actions, one sub-layer per round.
        let mut frontier = current;
        while problem.relation.has_zero_cost() {
            let mut images = Vec::new();
            for action in problem.relation.actions(0) {
                images.push(direction.expand(problem, action, frontier));
                if deadline.exceeded(bdd) {
                    return None;
                }
            }
            let fresh = bdd.apply_diff(bdd.apply_or_many(images), expansion.closed_total);
            if bdd.is_zero(fresh) {
                break;
            }
            record(&mut expansion, fresh, g);
            expansion.layers.push(fresh);
            expansion.closed_total = bdd.apply_or(expansion.closed_total, fresh);
            frontier = fresh;
        }

        let expanded = bdd.apply_or_many(expansion.layers.iter().copied());
        for c in problem.relation.positive_costs() {
            let mut images = Vec::new();
            for action in problem.relation.actions(c) {
                images.push(direction.expand(problem, action, expanded));
                if deadline.exceeded(bdd) {
                    return None;
                }
            }
            let successors = bdd.apply_diff(bdd.apply_or_many(images), expansion.closed_total);
            if !bdd.is_zero(successors) {
                record(&mut expansion, successors, g + c);
                expansion.successors.push((g + c, successors));
            }
        }
        Some(expansion)
    }

    fn commit(&mut self, direction: Direction, expansion: Expansion, elapsed: Duration) {
        let bdd = self.problem.bdd();
        let side = match direction {
            Direction::Forward => &mut self.forward,
            Direction::Backward => &mut self.backward,
        };
        side.open.remove(&expansion.g);
        side.last_step = elapsed;
        side.max_step = side.max_step.max(elapsed);
        side.steps += 1;

        if !expansion.layers.is_empty() {
            info!(
                "{} bucket {}: {} sub-layers, {} new states, {:?}",
                direction,
                expansion.g,
                expansion.layers.len(),
                self.problem
                    .encoder
                    .count_states(bdd.apply_diff(expansion.closed_total, side.closed_total)),
                elapsed
            );
            side.closed.insert(expansion.g, expansion.layers);
            side.closed_total = expansion.closed_total;
        }
        for (key, states) in expansion.successors {
            let entry = side.open.entry(key).or_insert(bdd.zero);
            *entry = bdd.apply_or(*entry, states);
        }
        if let Some(meeting) = expansion.meeting {
            info!("Candidate plan cost {}", meeting.cost());
            self.best = Some(meeting);
        }
    }

    fn abandon_backward(&mut self, elapsed: Duration) {
        if elapsed > Duration::ZERO {
            warn!(
                "Backward step took over {:?} (slowest forward step {:?}), continuing forward only",
                elapsed, self.forward.max_step
            );
        }
        self.backward.abandoned = true;
        if !self.backward.closed.is_empty() {
            return;
        }
        // Nothing closed backward yet: keep the goal as the only backward layer.
        let bdd = self.problem.bdd();
        self.backward = Frontier::seeded(Direction::Backward, self.problem.goal);
        self.backward.abandoned = true;
        for (&g, layers) in &self.forward.closed {
            if self.best_cost().is_some_and(|best| g >= best) {
                break;
            }
            let states = bdd.apply_and(bdd.apply_or_many(layers.iter().copied()), self.problem.goal);
            if !bdd.is_zero(states) {
                self.best = Some(Meeting {
                    forward_g: g,
                    backward_g: 0,
                    states,
                });
                break;
            }
        }
    }

    /// Open buckets up to `limit` become closed layers so reconstruction can use them.
    fn close_open_buckets(side: &mut Frontier, limit: u32) {
        let keys: Vec<u32> = side.open.range(..=limit).map(|(&k, _)| k).collect();
        for key in keys {
            if let Some(states) = side.open.remove(&key) {
                side.closed.entry(key).or_insert_with(|| vec![states]);
            }
        }
    }
}
