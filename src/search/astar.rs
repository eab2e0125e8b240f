//! Forward A* over `f → g → states` buckets, guided by a heuristic table.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{debug, info};

use super::{layer_roots, trace, Direction, Layers, Problem, SearchOutcome};
use crate::bdd::Bdd;
use crate::error::{PlannerError, Result};
use crate::pdb::HeuristicTable;
use crate::plan::Plan;
use crate::reference::Ref;

pub struct AStarSearch<'a> {
    problem: Problem<'a>,
    heuristic: &'a HeuristicTable,
    cost_scale: u32,
}

impl<'a> AStarSearch<'a> {
    pub fn new(problem: Problem<'a>, heuristic: &'a HeuristicTable) -> Self {
        Self {
            problem,
            heuristic,
            cost_scale: 1,
        }
    }

    /// Action costs in the relation are multiplied by `scale`; plan costs are divided back.
    pub fn with_cost_scale(mut self, scale: u32) -> Self {
        self.cost_scale = scale.max(1);
        self
    }

    pub fn run(&self) -> Result<SearchOutcome> {
        let problem = &self.problem;
        let bdd = problem.bdd();
        let relation = problem.relation;

        let Some(h0) = self.heuristic.value(bdd, problem.init) else {
            info!("Initial state has no heuristic value");
            return Ok(SearchOutcome::Unreachable);
        };
        info!("Starting A* with h(init) = {}, max h = {}", h0, self.heuristic.max_h());

        let mut search_space: BTreeMap<u32, BTreeMap<u32, Ref>> = BTreeMap::new();
        search_space.entry(h0).or_default().insert(0, problem.init);
        let mut solution = Layers::new();
        let mut closed = bdd.zero;

        while let Some((f, mut diagonal)) = search_space.pop_first() {
            let Some((g, bucket)) = diagonal.pop_first() else {
                continue;
            };
            if !diagonal.is_empty() {
                search_space.insert(f, diagonal);
            }

            let current = bdd.apply_diff(bucket, closed);
            if bdd.is_zero(current) {
                continue;
            }

            // Zero-cost successors stay in this bucket only if their own f is
            // still `f`; the rest wait in their (f', g) bucket.
            let mut layers = vec![current];
            closed = bdd.apply_or(closed, current);
            let mut frontier = current;
            while relation.has_zero_cost() {
                let fresh = bdd.apply_diff(relation.image(problem.encoder, frontier, 0), closed);
                if bdd.is_zero(fresh) {
                    break;
                }
                let mut same = bdd.zero;
                for (h, states) in self.heuristic.buckets() {
                    let part = bdd.apply_and(fresh, states);
                    if bdd.is_zero(part) {
                        continue;
                    }
                    match (g + h).cmp(&f) {
                        Ordering::Less => return Err(PlannerError::HeuristicInconsistency { f, g, h }),
                        Ordering::Equal => same = bdd.apply_or(same, part),
                        Ordering::Greater => insert(bdd, &mut search_space, g + h, g, part),
                    }
                }
                if bdd.is_zero(same) {
                    break;
                }
                layers.push(same);
                closed = bdd.apply_or(closed, same);
                frontier = same;
            }
            debug!("Expanding f = {}, g = {} ({} sub-layers)", f, g, layers.len());

            let expanded = bdd.apply_or_many(layers.iter().copied());
            solution.entry(g).or_default().extend(layers);

            let reached = bdd.apply_and(expanded, problem.goal);
            if !bdd.is_zero(reached) {
                info!("Goal reached at f = {}, g = {}", f, g);
                let mut actions = trace(problem, &solution, Direction::Forward, reached, g)?;
                actions.reverse();
                return Ok(SearchOutcome::Found(Plan::new(actions, g / self.cost_scale)));
            }

            for d in relation.positive_costs() {
                let successors = bdd.apply_diff(relation.image(problem.encoder, expanded, d), closed);
                if bdd.is_zero(successors) {
                    continue;
                }
                for (h, states) in self.heuristic.buckets() {
                    let part = bdd.apply_and(successors, states);
                    if bdd.is_zero(part) {
                        continue;
                    }
                    let successor_f = g + d + h;
                    if successor_f < f {
                        return Err(PlannerError::HeuristicInconsistency { f, g: g + d, h });
                    }
                    insert(bdd, &mut search_space, successor_f, g + d, part);
                }
            }

            let live = search_space
                .values()
                .flat_map(|row| row.values().copied())
                .chain(layer_roots(&solution))
                .chain(self.heuristic.roots())
                .chain([closed])
                .collect::<Vec<_>>();
            problem.maybe_collect_garbage(live);
        }

        info!("A* exhausted all buckets");
        Ok(SearchOutcome::Unreachable)
    }
}

fn insert(bdd: &Bdd, search_space: &mut BTreeMap<u32, BTreeMap<u32, Ref>>, f: u32, g: u32, states: Ref) {
    let entry = search_space.entry(f).or_default().entry(g).or_insert(bdd.zero);
    *entry = bdd.apply_or(*entry, states);
}
