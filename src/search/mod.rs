//! Symbolic search engines.
//!
//! All engines share a [`Problem`]: the encoder, the transition relation and
//! the initial and goal state sets. Layers of expanded states are recorded
//! per accumulated cost so that a plan can be traced back afterwards.

pub mod astar;
pub mod bfs;
pub mod dijkstra;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use log::debug;

use crate::bdd::Bdd;
use crate::encoding::StateEncoder;
use crate::error::{PlannerError, Result};
use crate::plan::Plan;
use crate::reference::Ref;
use crate::transition::{ActionTransition, TransitionRelation};

/// Everything a search needs, borrowed from the caller.
#[derive(Copy, Clone)]
pub struct Problem<'a> {
    pub encoder: &'a StateEncoder,
    pub relation: &'a TransitionRelation,
    pub init: Ref,
    pub goal: Ref,
}

impl<'a> Problem<'a> {
    pub fn new(encoder: &'a StateEncoder, relation: &'a TransitionRelation, init: Ref, goal: Ref) -> Self {
        Self {
            encoder,
            relation,
            init,
            goal,
        }
    }

    pub fn bdd(&self) -> &'a Bdd {
        self.encoder.bdd()
    }

    /// Roots every engine keeps alive across garbage collections.
    pub fn roots(&self) -> Vec<Ref> {
        let mut roots = self.relation.roots();
        roots.push(self.init);
        roots.push(self.goal);
        roots
    }

    /// Run garbage collection if due, keeping `live` and the problem itself.
    pub fn maybe_collect_garbage(&self, live: impl IntoIterator<Item = Ref>) {
        let mut roots = self.roots();
        roots.extend(live);
        self.bdd().maybe_collect_garbage(&roots);
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    /// One step away from the origin of this direction.
    pub fn expand(self, problem: &Problem, action: &ActionTransition, states: Ref) -> Ref {
        match self {
            Direction::Forward => action.image(problem.encoder, states),
            Direction::Backward => action.preimage(problem.encoder, states),
        }
    }

    /// One step back toward the origin of this direction.
    pub fn retract(self, problem: &Problem, action: &ActionTransition, states: Ref) -> Ref {
        self.opposite().expand(problem, action, states)
    }

    /// Where this direction starts: the initial state or the goal.
    pub fn origin(self, problem: &Problem) -> Ref {
        match self {
            Direction::Forward => problem.init,
            Direction::Backward => problem.goal,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SearchOutcome {
    Found(Plan),
    Unreachable,
}

impl SearchOutcome {
    pub fn plan(&self) -> Option<&Plan> {
        match self {
            SearchOutcome::Found(plan) => Some(plan),
            SearchOutcome::Unreachable => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepOutcome {
    Done,
    TimeExceeded,
}

/// Cooperative deadline for one search step.
///
/// Garbage collection time spent during the step does not count.
#[derive(Debug, Clone)]
pub struct Deadline {
    start: Instant,
    gc_start: Duration,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(bdd: &Bdd, limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            gc_start: bdd.gc_time(),
            limit,
        }
    }

    pub fn unlimited(bdd: &Bdd) -> Self {
        Self::new(bdd, None)
    }

    pub fn elapsed(&self, bdd: &Bdd) -> Duration {
        let gc = bdd.gc_time().saturating_sub(self.gc_start);
        self.start.elapsed().saturating_sub(gc)
    }

    pub fn exceeded(&self, bdd: &Bdd) -> bool {
        match self.limit {
            Some(limit) => self.elapsed(bdd) > limit,
            None => false,
        }
    }
}

/// A state set reachable from both sides, with its cost on either side.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Meeting {
    pub forward_g: u32,
    pub backward_g: u32,
    pub states: Ref,
}

impl Meeting {
    pub fn cost(&self) -> u32 {
        self.forward_g + self.backward_g
    }
}

/// Expanded states per accumulated cost; each bucket holds successive
/// sub-layers, later ones reached from earlier ones by zero-cost actions.
pub type Layers = BTreeMap<u32, Vec<Ref>>;

pub fn layer_roots(layers: &Layers) -> impl Iterator<Item = Ref> + '_ {
    layers.values().flatten().copied()
}

/// Walk recorded layers from `target` (at cost `g`) back to the origin of
/// `direction`. Returns the actions in walking order.
///
/// Zero-cost predecessors are tried in earlier sub-layers of the same bucket
/// first, then costs in descending order; the first match wins.
pub fn trace(problem: &Problem, layers: &Layers, direction: Direction, target: Ref, g: u32) -> Result<Vec<String>> {
    let bdd = problem.bdd();
    let origin = direction.origin(problem);
    let costs: Vec<u32> = problem.relation.positive_costs().collect();

    let mut actions = Vec::new();
    let mut g = g;
    let (mut j, mut states) = locate(bdd, layers, g, target)
        .ok_or_else(|| PlannerError::reconstruction(g, format!("{} target is not in its layer", direction)))?;

    while bdd.is_zero(bdd.apply_and(states, origin)) {
        let found = trace_step(problem, layers, direction, &costs, states, g, j);
        let Some((name, pg, pj, pstates)) = found else {
            return Err(PlannerError::reconstruction(
                g,
                format!("no {} action explains sub-layer {}", direction, j),
            ));
        };
        debug!("Traced '{}' from bucket {} to bucket {}", name, g, pg);
        actions.push(name);
        (g, j, states) = (pg, pj, pstates);
    }
    Ok(actions)
}

fn trace_step(
    problem: &Problem,
    layers: &Layers,
    direction: Direction,
    costs: &[u32],
    states: Ref,
    g: u32,
    j: usize,
) -> Option<(String, u32, usize, Ref)> {
    let bdd = problem.bdd();
    let bucket = layers.get(&g)?;
    for (pj, &layer) in bucket.iter().enumerate().take(j) {
        for action in problem.relation.actions(0) {
            let prev = bdd.apply_and(direction.retract(problem, action, states), layer);
            if !bdd.is_zero(prev) {
                return Some((action.name.clone(), g, pj, prev));
            }
        }
    }
    for &c in costs.iter().rev() {
        let Some(pg) = g.checked_sub(c) else {
            continue;
        };
        let Some(bucket) = layers.get(&pg) else {
            continue;
        };
        for action in problem.relation.actions(c) {
            let prev = direction.retract(problem, action, states);
            if bdd.is_zero(prev) {
                continue;
            }
            for (pj, &layer) in bucket.iter().enumerate() {
                let prev = bdd.apply_and(prev, layer);
                if !bdd.is_zero(prev) {
                    return Some((action.name.clone(), pg, pj, prev));
                }
            }
        }
    }
    None
}

/// First sub-layer of bucket `g` meeting `states`, and the intersection.
fn locate(bdd: &Bdd, layers: &Layers, g: u32, states: Ref) -> Option<(usize, Ref)> {
    layers.get(&g)?.iter().enumerate().find_map(|(j, &layer)| {
        let s = bdd.apply_and(states, layer);
        (!bdd.is_zero(s)).then_some((j, s))
    })
}

/// Join a forward trace and a backward trace through a meeting set.
///
/// The backward half starts from the state the forward half actually reaches.
pub fn reconstruct(problem: &Problem, forward: &Layers, backward: &Layers, meeting: &Meeting) -> Result<Plan> {
    let mut actions = trace(problem, forward, Direction::Forward, meeting.states, meeting.forward_g)?;
    actions.reverse();

    let mut reached = problem.init;
    for name in &actions {
        let (_, action) = problem
            .relation
            .find(name)
            .ok_or_else(|| PlannerError::reconstruction(meeting.forward_g, format!("unknown action '{}'", name)))?;
        reached = action.image(problem.encoder, reached);
    }
    let bdd = problem.bdd();
    let reached = bdd.apply_and(reached, meeting.states);
    if bdd.is_zero(reached) {
        return Err(PlannerError::reconstruction(
            meeting.forward_g,
            "forward prefix does not reach the meeting states",
        ));
    }

    actions.extend(trace(problem, backward, Direction::Backward, reached, meeting.backward_g)?);
    Ok(Plan::new(actions, meeting.cost()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small planning tasks shared by the engine tests.

    use std::rc::Rc;

    use crate::bdd::Bdd;
    use crate::encoding::StateEncoder;
    use crate::expr::Expr;
    use crate::model::{Action, GroundedModel, Partition};
    use crate::reference::Ref;
    use crate::transition::{TransitionBuilder, TransitionRelation};

    pub struct Compiled {
        pub model: GroundedModel,
        pub encoder: StateEncoder,
        pub relation: TransitionRelation,
        pub init: Ref,
        pub goal: Ref,
    }

    impl Compiled {
        pub fn new(model: GroundedModel) -> Self {
            let bdd = Rc::new(Bdd::default());
            let encoder = StateEncoder::new(bdd, &model.partitions);
            let builder = TransitionBuilder::new(&encoder, &model);
            let relation = builder.build().unwrap();
            let init = builder.initial_state().unwrap();
            let goal = builder.goal().unwrap();
            Self {
                model,
                encoder,
                relation,
                init,
                goal,
            }
        }

        pub fn problem(&self) -> super::Problem<'_> {
            super::Problem::new(&self.encoder, &self.relation, self.init, self.goal)
        }
    }

    pub fn action(name: &str, cost: u32, pre: Expr, eff: Expr) -> Action {
        Action {
            name: name.to_string(),
            cost,
            precondition: pre,
            effect: eff,
        }
    }

    fn at(i: usize) -> String {
        format!("at.n{}", i)
    }

    fn step(from: usize, to: usize, cost: u32) -> Action {
        action(
            &format!("move.n{}.n{}", from, to),
            cost,
            Expr::lit(at(from)),
            Expr::And(vec![Expr::not(Expr::lit(at(from))), Expr::lit(at(to))]),
        )
    }

    /// A line of `n` locations with unit moves both ways; start at 0, goal at `n - 1`.
    pub fn line(n: usize) -> GroundedModel {
        let mut actions = Vec::new();
        for i in 0..n - 1 {
            actions.push(step(i, i + 1, 1));
            actions.push(step(i + 1, i, 1));
        }
        GroundedModel::new(
            actions,
            vec![at(0)],
            Expr::lit(at(n - 1)),
            vec![Partition::new((0..n).map(at))],
        )
        .unwrap()
    }

    /// Weighted graph: 0→1 (1), 1→3 (5), 0→2 (2), 2→3 (2), 3→4 (1), 0→4 (9),
    /// plus a free hop 2→5 and 5→3 (1). Cheapest route 0→2→5→3→4 costs 4.
    pub fn weighted() -> GroundedModel {
        GroundedModel::new(
            vec![
                step(0, 1, 1),
                step(1, 3, 5),
                step(0, 2, 2),
                step(2, 3, 2),
                step(3, 4, 1),
                step(0, 4, 9),
                step(2, 5, 0),
                step(5, 3, 1),
            ],
            vec![at(0)],
            Expr::lit(at(4)),
            vec![Partition::new((0..6).map(at))],
        )
        .unwrap()
    }

    /// 0→2 (1), 0→1 (2), a free hop 1→2, then 2→3 (10). Cheapest route 0→2→3 costs 11.
    pub fn shortcut() -> GroundedModel {
        GroundedModel::new(
            vec![step(0, 2, 1), step(0, 1, 2), step(1, 2, 0), step(2, 3, 10)],
            vec![at(0)],
            Expr::lit(at(3)),
            vec![Partition::new((0..4).map(at))],
        )
        .unwrap()
    }

    /// Two rooms plus a key: the door between them needs the key.
    pub fn keys() -> GroundedModel {
        GroundedModel::new(
            vec![
                action(
                    "pick.key",
                    2,
                    Expr::And(vec![Expr::lit("robot.a"), Expr::lit("key.a")]),
                    Expr::And(vec![Expr::not(Expr::lit("key.a")), Expr::lit("key.held")]),
                ),
                action(
                    "go.a.b",
                    3,
                    Expr::And(vec![Expr::lit("robot.a"), Expr::lit("key.held")]),
                    Expr::And(vec![Expr::not(Expr::lit("robot.a")), Expr::lit("robot.b")]),
                ),
                action(
                    "go.b.a",
                    3,
                    Expr::lit("robot.b"),
                    Expr::And(vec![Expr::not(Expr::lit("robot.b")), Expr::lit("robot.a")]),
                ),
                action(
                    "drop.key",
                    1,
                    Expr::And(vec![Expr::lit("robot.b"), Expr::lit("key.held")]),
                    Expr::And(vec![Expr::not(Expr::lit("key.held")), Expr::lit("key.b")]),
                ),
                action(
                    "flip",
                    1,
                    Expr::lit("light.off"),
                    Expr::And(vec![Expr::not(Expr::lit("light.off")), Expr::lit("light.on")]),
                ),
            ],
            vec!["robot.a".into(), "key.a".into(), "light.off".into()],
            Expr::And(vec![Expr::lit("key.b"), Expr::lit("robot.b"), Expr::lit("light.on")]),
            vec![
                Partition::new(["robot.a", "robot.b"]),
                Partition::new(["key.a", "key.held", "key.b"]),
                Partition::new(["light.off", "light.on"]),
            ],
        )
        .unwrap()
    }

    /// Goal unreachable: nothing ever adds `b`.
    pub fn dead_end() -> GroundedModel {
        GroundedModel::new(
            vec![action(
                "spin",
                1,
                Expr::lit("a"),
                Expr::And(vec![Expr::not(Expr::lit("a")), Expr::lit("c")]),
            )],
            vec!["a".into()],
            Expr::lit("b"),
            vec![Partition::new(["a", "b", "c"])],
        )
        .unwrap()
    }
}
