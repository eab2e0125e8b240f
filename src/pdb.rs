//! Pattern databases.
//!
//! A pattern keeps a subset of the partitions and drops the rest. Its
//! database holds the exact cost-to-goal of every abstract state, found by a
//! backward bucket search in the abstract space, as a map `h → states`.
//!
//! # Files
//!
//! Each database `<id>` lives in `<dir>/pdb_<id>/`:
//!
//! ```text
//! abstract_<id>_<h>.bdd   # states with heuristic value h
//! ExPDBs.txt              # one bucket path per line
//! MaxPDB.txt              # largest finalized h, then `complete` or `partial <unreached>`
//! UsedActions.txt         # one 0/1 character per action
//! Pattern.txt             # kept partition indices
//! ```
//!
//! `<dir>/usePDBs.txt` lists the ids of the selected databases.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::bdd::Bdd;
use crate::encoding::StateEncoder;
use crate::error::{PlannerError, Result};
use crate::expr::Effects;
use crate::model::{Action, GroundedModel};
use crate::reference::Ref;
use crate::search::Deadline;
use crate::transition::{Abstraction, TransitionBuilder};
use crate::utils::lcm;

const SELECTION_FILE: &str = "usePDBs.txt";

#[derive(Debug, Clone)]
pub struct PatternDatabase {
    pub id: usize,
    pub pattern: Abstraction,
    /// Finalized buckets.
    buckets: BTreeMap<u32, Ref>,
    /// Valid codes of the kept partitions.
    valid: Ref,
    complete: bool,
    /// Value of abstract states no bucket holds.
    unreached: u32,
    /// Per action, whether it changes a kept partition.
    used: Vec<bool>,
}

impl PatternDatabase {
    pub fn buckets(&self) -> &BTreeMap<u32, Ref> {
        &self.buckets
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn unreached_value(&self) -> u32 {
        self.unreached
    }

    pub fn used_actions(&self) -> &[bool] {
        &self.used
    }

    /// Largest finalized heuristic value.
    pub fn max_h(&self) -> u32 {
        self.buckets.keys().next_back().copied().unwrap_or(0)
    }

    /// Every valid abstract state with its value.
    ///
    /// States missing from a complete database cannot reach the goal and get
    /// `max + 1`; a budget-cut database gives them its first open bucket value.
    pub fn table(&self, bdd: &Bdd) -> BTreeMap<u32, Ref> {
        let mut table = self.buckets.clone();
        let reached = bdd.apply_or_many(self.buckets.values().copied());
        let rest = bdd.apply_diff(self.valid, reached);
        if !bdd.is_zero(rest) {
            let entry = table.entry(self.unreached).or_insert(bdd.zero);
            *entry = bdd.apply_or(*entry, rest);
        }
        table
    }

    /// Mean heuristic value over the finalized buckets, weighted by state count.
    pub fn average(&self, encoder: &StateEncoder) -> f64 {
        let mut weighted = BigUint::zero();
        let mut total = BigUint::zero();
        for (&h, &states) in &self.buckets {
            let count = encoder.count_states(states);
            weighted += &count * h;
            total += count;
        }
        if total.is_zero() {
            return 0.0;
        }
        let weighted = weighted.to_f64().unwrap_or(f64::MAX);
        let total = total.to_f64().unwrap_or(f64::MAX);
        weighted / total
    }

    pub fn roots(&self) -> impl Iterator<Item = Ref> + '_ {
        self.buckets.values().copied().chain([self.valid])
    }

    fn directory(dir: &Path, id: usize) -> PathBuf {
        dir.join(format!("pdb_{}", id))
    }

    pub fn save(&self, bdd: &Bdd, dir: &Path) -> Result<()> {
        let dir = Self::directory(dir, self.id);
        fs::create_dir_all(&dir)?;

        let mut paths = String::new();
        for (&h, &states) in &self.buckets {
            let path = dir.join(format!("abstract_{}_{}.bdd", self.id, h));
            bdd.save(states, &path)?;
            paths.push_str(&format!("{}\n", path.display()));
        }
        fs::write(dir.join("ExPDBs.txt"), paths)?;

        let status = if self.complete {
            "complete".to_string()
        } else {
            format!("partial {}", self.unreached)
        };
        fs::write(dir.join("MaxPDB.txt"), format!("{}\n{}\n", self.max_h(), status))?;

        let used: String = self.used.iter().map(|&u| if u { '1' } else { '0' }).collect();
        fs::write(dir.join("UsedActions.txt"), format!("{}\n", used))?;

        let pattern: Vec<String> = self.pattern.kept().map(|p| p.to_string()).collect();
        fs::write(dir.join("Pattern.txt"), format!("{}\n", pattern.join(" ")))?;

        info!("Saved pattern database {} to {}", self.id, dir.display());
        Ok(())
    }

    pub fn load(encoder: &StateEncoder, dir: &Path, id: usize) -> Result<Self> {
        let bdd = encoder.bdd();
        let dir = Self::directory(dir, id);
        let parse_error = |file: &str, message: String| PlannerError::Parse(format!("{}: {}", dir.join(file).display(), message));

        let kept = fs::read_to_string(dir.join("Pattern.txt"))?
            .split_whitespace()
            .map(|s| s.parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| parse_error("Pattern.txt", e.to_string()))?;
        if let Some(&p) = kept.iter().find(|&&p| p >= encoder.num_partitions()) {
            return Err(parse_error("Pattern.txt", format!("no partition {}", p)));
        }
        let pattern = Abstraction::pattern(kept, encoder.num_partitions());

        let mut buckets = BTreeMap::new();
        for line in fs::read_to_string(dir.join("ExPDBs.txt"))?.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let h = Path::new(line)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.rsplit('_').next())
                .and_then(|h| h.parse::<u32>().ok())
                .ok_or_else(|| parse_error("ExPDBs.txt", format!("bad bucket path '{}'", line)))?;
            buckets.insert(h, bdd.load(line)?);
        }

        let max = fs::read_to_string(dir.join("MaxPDB.txt"))?;
        let mut lines = max.lines().map(str::trim);
        let max_h: u32 = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| parse_error("MaxPDB.txt", "missing maximum".into()))?;
        let (complete, unreached) = match lines.next().map(|l| l.split_whitespace().collect::<Vec<_>>()).as_deref() {
            Some(["complete"]) => (true, max_h + 1),
            Some(["partial", value]) => (
                false,
                value
                    .parse::<u32>()
                    .map_err(|_| parse_error("MaxPDB.txt", format!("bad unreached value '{}'", value)))?,
            ),
            _ => return Err(parse_error("MaxPDB.txt", "missing status".into())),
        };

        let used = fs::read_to_string(dir.join("UsedActions.txt"))?
            .trim()
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(parse_error("UsedActions.txt", format!("unexpected '{}'", other))),
            })
            .collect::<Result<Vec<_>>>()?;

        let valid = bdd.apply_and_many(
            pattern
                .kept()
                .map(|p| encoder.valid_codes(p))
                .collect::<Result<Vec<_>>>()?,
        );

        debug!("Loaded pattern database {} with {} buckets", id, buckets.len());
        Ok(Self {
            id,
            pattern,
            buckets,
            valid,
            complete,
            unreached,
            used,
        })
    }
}

pub fn save_selection(bdd: &Bdd, dir: &Path, databases: &[PatternDatabase]) -> Result<()> {
    fs::create_dir_all(dir)?;
    for db in databases {
        db.save(bdd, dir)?;
    }
    let ids: String = databases.iter().map(|db| format!("{}\n", db.id)).collect();
    fs::write(dir.join(SELECTION_FILE), ids)?;
    Ok(())
}

/// Databases listed in `usePDBs.txt`, or `None` if there is no selection yet.
pub fn load_selection(encoder: &StateEncoder, dir: &Path) -> Result<Option<Vec<PatternDatabase>>> {
    let path = dir.join(SELECTION_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let mut databases = Vec::new();
    for line in fs::read_to_string(&path)?.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let id = line
            .parse()
            .map_err(|_| PlannerError::Parse(format!("{}: bad id '{}'", path.display(), line)))?;
        databases.push(PatternDatabase::load(encoder, dir, id)?);
    }
    Ok(Some(databases))
}

/// Action costs after splitting them across patterns.
///
/// Costs are multiplied by `lcm`, so each share `c * lcm / k` is integral.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CostFactors {
    pub lcm: u32,
    /// Scaled cost of every action in the concrete space.
    pub concrete: Vec<u32>,
    /// Cost share of every action, per pattern.
    pub per_pattern: Vec<Vec<u32>>,
}

/// `used[p][a]` tells whether pattern `p` uses action `a`.
pub fn cost_factors(model: &GroundedModel, used: &[Vec<bool>]) -> CostFactors {
    let users: Vec<u32> = (0..model.actions.len())
        .map(|a| (used.iter().filter(|u| u.get(a).copied().unwrap_or(false)).count() as u32).max(1))
        .collect();
    let l = users.iter().fold(1, |acc, &k| lcm(acc, k));
    let concrete = model.actions.iter().map(|a| a.cost * l).collect();
    let per_pattern = used
        .iter()
        .map(|_| {
            model
                .actions
                .iter()
                .zip(&users)
                .map(|(a, &k)| a.cost * l / k)
                .collect()
        })
        .collect();
    CostFactors {
        lcm: l,
        concrete,
        per_pattern,
    }
}

/// Sum of several databases, as one `h → states` map over concrete states.
#[derive(Debug, Clone)]
pub struct HeuristicTable {
    buckets: BTreeMap<u32, Ref>,
    max_h: u32,
}

impl HeuristicTable {
    pub fn new(buckets: BTreeMap<u32, Ref>) -> Self {
        let max_h = buckets.keys().next_back().copied().unwrap_or(0);
        Self { buckets, max_h }
    }

    /// `h = 0` everywhere; A* then behaves like a forward Dijkstra search.
    pub fn trivial(bdd: &Bdd) -> Self {
        Self::new(BTreeMap::from([(0, bdd.one)]))
    }

    /// Additive combination: every non-empty conjunction of one bucket per
    /// database lands under the sum of their values.
    pub fn from_databases(bdd: &Bdd, databases: &[PatternDatabase]) -> Self {
        let mut buckets = BTreeMap::from([(0, bdd.one)]);
        let mut max_h = 0;
        for db in databases {
            let table = db.table(bdd);
            max_h += table.keys().next_back().copied().unwrap_or(0);
            let mut sum: BTreeMap<u32, Ref> = BTreeMap::new();
            for (&h1, &a) in &buckets {
                for (&h2, &b) in &table {
                    let both = bdd.apply_and(a, b);
                    if bdd.is_zero(both) {
                        continue;
                    }
                    let entry = sum.entry(h1 + h2).or_insert(bdd.zero);
                    *entry = bdd.apply_or(*entry, both);
                }
            }
            buckets = sum;
        }
        info!("Heuristic table has {} buckets, max h = {}", buckets.len(), max_h);
        Self { buckets, max_h }
    }

    pub fn buckets(&self) -> impl Iterator<Item = (u32, Ref)> + '_ {
        self.buckets.iter().map(|(&h, &states)| (h, states))
    }

    pub fn max_h(&self) -> u32 {
        self.max_h
    }

    /// Smallest value whose bucket meets `states`.
    pub fn value(&self, bdd: &Bdd, states: Ref) -> Option<u32> {
        self.buckets()
            .find(|&(_, bucket)| !bdd.is_zero(bdd.apply_and(bucket, states)))
            .map(|(h, _)| h)
    }

    pub fn roots(&self) -> impl Iterator<Item = Ref> + '_ {
        self.buckets.values().copied()
    }
}

/// Partitions an action's effect may change, conditional effects included.
fn written(model: &GroundedModel, effects: &Effects, out: &mut BTreeSet<usize>) {
    out.extend(effects.touched().filter_map(|name| model.locate(name)).map(|(p, _)| p));
    for (_, inner) in &effects.conditional {
        written(model, inner, out);
    }
}

fn writes(model: &GroundedModel, action: &Action) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    written(model, &action.effect.classify_effects(), &mut out);
    out
}

fn reads(model: &GroundedModel, action: &Action) -> BTreeSet<usize> {
    action
        .precondition
        .predicates()
        .into_iter()
        .chain(action.effect.condition_predicates())
        .filter_map(|name| model.locate(name))
        .map(|(p, _)| p)
        .collect()
}

/// The chosen databases and the cost split they were built with.
#[derive(Debug, Clone)]
pub struct Selection {
    pub databases: Vec<PatternDatabase>,
    pub factors: CostFactors,
}

impl Selection {
    pub fn heuristic(&self, bdd: &Bdd) -> HeuristicTable {
        HeuristicTable::from_databases(bdd, &self.databases)
    }
}

pub struct PatternDatabaseBuilder<'a> {
    encoder: &'a StateEncoder,
    model: &'a GroundedModel,
    costs: Option<Vec<u32>>,
}

impl<'a> PatternDatabaseBuilder<'a> {
    pub fn new(encoder: &'a StateEncoder, model: &'a GroundedModel) -> Self {
        Self {
            encoder,
            model,
            costs: None,
        }
    }

    /// Override action costs (indexed like `model.actions`).
    pub fn with_costs(mut self, costs: Vec<u32>) -> Self {
        self.costs = Some(costs);
        self
    }

    /// Backward bucket search from the abstract goal, stopped once `budget` runs out.
    pub fn build(&self, id: usize, pattern: Abstraction, budget: Duration) -> Result<PatternDatabase> {
        let bdd = self.encoder.bdd();
        let mut builder = TransitionBuilder::new(self.encoder, self.model).with_abstraction(pattern.clone());
        if let Some(costs) = &self.costs {
            builder = builder.with_costs(costs.clone());
        }
        let relation = builder.build()?;
        let goal = builder.goal()?;
        let used = builder.used_actions();
        let valid = bdd.apply_and_many(
            pattern
                .kept()
                .map(|p| self.encoder.valid_codes(p))
                .collect::<Result<Vec<_>>>()?,
        );

        let deadline = Deadline::new(bdd, Some(budget));
        let mut open: BTreeMap<u32, Ref> = BTreeMap::from([(0, goal)]);
        let mut buckets = BTreeMap::new();
        let mut reached = bdd.zero;

        while let Some((h, bucket)) = open.pop_first() {
            let mut layer = bdd.apply_diff(bucket, reached);
            if bdd.is_zero(layer) {
                continue;
            }
            reached = bdd.apply_or(reached, layer);
            let mut frontier = layer;
            while relation.has_zero_cost() {
                let pre = bdd.apply_and(relation.preimage(self.encoder, frontier, 0), valid);
                let fresh = bdd.apply_diff(pre, reached);
                if bdd.is_zero(fresh) {
                    break;
                }
                layer = bdd.apply_or(layer, fresh);
                reached = bdd.apply_or(reached, fresh);
                frontier = fresh;
            }
            buckets.insert(h, layer);

            for c in relation.positive_costs() {
                let pre = bdd.apply_and(relation.preimage(self.encoder, layer, c), valid);
                let fresh = bdd.apply_diff(pre, reached);
                if bdd.is_zero(fresh) {
                    continue;
                }
                let entry = open.entry(h + c).or_insert(bdd.zero);
                *entry = bdd.apply_or(*entry, fresh);
            }

            if !open.is_empty() && deadline.exceeded(bdd) {
                warn!("Pattern database {} stopped by its budget after h = {}", id, h);
                break;
            }
        }

        let complete = open.is_empty();
        let max = buckets.keys().next_back().copied().unwrap_or(0);
        let unreached = match open.keys().next() {
            Some(&h) => h,
            None => max + 1,
        };
        info!(
            "Pattern database {} over {:?}: {} buckets, max h = {}, {}",
            id,
            pattern.kept().collect::<Vec<_>>(),
            buckets.len(),
            max,
            if complete { "complete" } else { "partial" }
        );
        Ok(PatternDatabase {
            id,
            pattern,
            buckets,
            valid,
            complete,
            unreached,
            used,
        })
    }

    /// Goal partitions grouped by shared writers; each group seeds one pattern.
    fn seeds(&self) -> Vec<BTreeSet<usize>> {
        let goal: BTreeSet<usize> = self
            .model
            .goal
            .predicates()
            .into_iter()
            .filter_map(|name| self.model.locate(name))
            .map(|(p, _)| p)
            .collect();
        let written: Vec<BTreeSet<usize>> = self.model.actions.iter().map(|a| writes(self.model, a)).collect();

        let mut groups: Vec<BTreeSet<usize>> = Vec::new();
        for p in goal {
            let (linked, mut rest): (Vec<_>, Vec<_>) = groups.into_iter().partition(|group| {
                written
                    .iter()
                    .any(|w| w.contains(&p) && w.iter().any(|q| group.contains(q)))
            });
            let mut merged = BTreeSet::from([p]);
            for group in linked {
                merged.extend(group);
            }
            rest.push(merged);
            groups = rest;
        }
        groups.sort();
        groups
    }

    /// Partitions outside `taken` that an action changing `pattern` reads or writes.
    fn candidates(&self, pattern: &BTreeSet<usize>, taken: &BTreeSet<usize>) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for action in &self.model.actions {
            let w = writes(self.model, action);
            if w.is_disjoint(pattern) {
                continue;
            }
            out.extend(w.into_iter().chain(reads(self.model, action)).filter(|q| !taken.contains(q)));
        }
        out
    }

    /// Greedy selection of disjoint patterns.
    ///
    /// Each goal group grows one partition at a time, taking the candidate
    /// whose database has the highest average value, as long as that average
    /// improves and the budget lasts. With overlapping action use, the final
    /// databases are rebuilt with split costs.
    pub fn select(&self, budget: Duration) -> Result<Selection> {
        let bdd = self.encoder.bdd();
        let n = self.encoder.num_partitions();
        let deadline = Deadline::new(bdd, Some(budget));
        let remaining = |deadline: &Deadline| budget.saturating_sub(deadline.elapsed(bdd));

        let seeds = self.seeds();
        let mut taken: BTreeSet<usize> = seeds.iter().flatten().copied().collect();
        let mut databases = Vec::new();

        for (id, seed) in seeds.into_iter().enumerate() {
            let mut pattern = seed;
            let mut best = self.build(id, Abstraction::pattern(pattern.iter().copied(), n), remaining(&deadline))?;
            let mut best_average = best.average(self.encoder);
            debug!("Seed pattern {:?} has average {:.3}", pattern, best_average);

            while !deadline.exceeded(bdd) {
                let mut winner: Option<(usize, PatternDatabase, f64)> = None;
                for q in self.candidates(&pattern, &taken) {
                    if deadline.exceeded(bdd) {
                        break;
                    }
                    let grown = pattern.iter().copied().chain([q]);
                    let db = self.build(id, Abstraction::pattern(grown, n), remaining(&deadline))?;
                    let average = db.average(self.encoder);
                    debug!("Adding partition {} to {:?} gives average {:.3}", q, pattern, average);
                    if winner.as_ref().map_or(true, |(_, _, a)| average > *a) {
                        winner = Some((q, db, average));
                    }
                }
                match winner {
                    Some((q, db, average)) if average > best_average => {
                        pattern.insert(q);
                        taken.insert(q);
                        best = db;
                        best_average = average;
                    }
                    _ => break,
                }
            }
            info!("Selected pattern {:?} with average {:.3}", pattern, best_average);
            databases.push(best);
        }

        let used: Vec<Vec<bool>> = databases.iter().map(|db| db.used.clone()).collect();
        let factors = cost_factors(self.model, &used);
        if factors.lcm > 1 {
            info!("Splitting action costs over {} patterns, scale {}", databases.len(), factors.lcm);
            databases = self.rebuild_split(databases, &factors, remaining(&deadline))?;
        }
        Ok(Selection { databases, factors })
    }

    /// Rebuild each database with its share of the action costs; all
    /// rebuilds together stay within `budget`.
    fn rebuild_split(
        &self,
        databases: Vec<PatternDatabase>,
        factors: &CostFactors,
        budget: Duration,
    ) -> Result<Vec<PatternDatabase>> {
        let bdd = self.encoder.bdd();
        let deadline = Deadline::new(bdd, Some(budget));
        databases
            .into_iter()
            .zip(&factors.per_pattern)
            .map(|(db, costs)| {
                PatternDatabaseBuilder::new(self.encoder, self.model)
                    .with_costs(costs.clone())
                    .build(db.id, db.pattern, budget.saturating_sub(deadline.elapsed(bdd)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::rc::Rc;

    use test_log::test;

    use super::*;
    use crate::bdd::Bdd;
    use crate::encoding::Frame;
    use crate::expr::Expr;
    use crate::model::Partition;
    use crate::search::astar::AStarSearch;
    use crate::search::fixtures::*;

    const BUDGET: Duration = Duration::from_secs(60);

    fn state(c: &Compiled, members: &[usize]) -> Ref {
        let bdd = c.encoder.bdd();
        bdd.apply_and_many(
            members
                .iter()
                .enumerate()
                .map(|(p, &m)| c.encoder.literal(p, m, Frame::Current).unwrap()),
        )
    }

    /// Every member combination of the model's partitions.
    fn all_states(c: &Compiled) -> Vec<Vec<usize>> {
        let mut states = vec![vec![]];
        for partition in &c.model.partitions {
            states = states
                .into_iter()
                .flat_map(|s| {
                    (0..partition.len()).map(move |m| {
                        let mut s = s.clone();
                        s.push(m);
                        s
                    })
                })
                .collect();
        }
        states
    }

    /// A line of three cells; each move burns the fuel, refuelling costs 5.
    fn fuel() -> GroundedModel {
        let mv = |from: usize, to: usize| {
            action(
                &format!("move.n{}.n{}", from, to),
                1,
                Expr::And(vec![Expr::lit(format!("at.n{}", from)), Expr::lit("fuel.full")]),
                Expr::And(vec![
                    Expr::not(Expr::lit(format!("at.n{}", from))),
                    Expr::lit(format!("at.n{}", to)),
                    Expr::not(Expr::lit("fuel.full")),
                    Expr::lit("fuel.empty"),
                ]),
            )
        };
        GroundedModel::new(
            vec![
                mv(0, 1),
                mv(1, 2),
                action(
                    "refuel",
                    5,
                    Expr::lit("fuel.empty"),
                    Expr::And(vec![Expr::not(Expr::lit("fuel.empty")), Expr::lit("fuel.full")]),
                ),
            ],
            vec!["at.n0".into(), "fuel.full".into()],
            Expr::lit("at.n2"),
            vec![
                Partition::new(["at.n0", "at.n1", "at.n2"]),
                Partition::new(["fuel.full", "fuel.empty"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_full_pattern_is_exact() {
        let c = Compiled::new(keys());
        let builder = PatternDatabaseBuilder::new(&c.encoder, &c.model);
        let db = builder.build(0, Abstraction::concrete(3), BUDGET).unwrap();
        assert!(db.is_complete());
        let table = HeuristicTable::from_databases(c.encoder.bdd(), &[db]);
        assert_eq!(table.value(c.encoder.bdd(), c.init), Some(7));
    }

    /// Optimal cost-to-goal of every explicit state, by relaxing model actions
    /// until nothing changes. Dead ends have no entry.
    fn explicit_distances(model: &GroundedModel, states: &[Vec<usize>]) -> HashMap<Vec<usize>, u32> {
        let to_set = |members: &[usize]| -> HashSet<String> {
            members
                .iter()
                .zip(&model.partitions)
                .map(|(&m, p)| p.members[m].clone())
                .collect()
        };
        let from_set = |set: &HashSet<String>| -> Option<Vec<usize>> {
            model
                .partitions
                .iter()
                .map(|p| p.members.iter().position(|m| set.contains(m)))
                .collect()
        };

        let mut distances: HashMap<Vec<usize>, u32> = states
            .iter()
            .filter(|s| model.goal.evaluate(&to_set(s)))
            .map(|s| (s.clone(), 0))
            .collect();
        loop {
            let mut changed = false;
            for s in states {
                let before = to_set(s);
                for action in &model.actions {
                    if !action.precondition.evaluate(&before) {
                        continue;
                    }
                    let mut after = before.clone();
                    action.effect.classify_effects().apply(&before, &mut after);
                    let Some(d) = from_set(&after).and_then(|t| distances.get(&t).copied()) else {
                        continue;
                    };
                    let candidate = d + action.cost;
                    if distances.get(s).map_or(true, |&old| candidate < old) {
                        distances.insert(s.clone(), candidate);
                        changed = true;
                    }
                }
            }
            if !changed {
                return distances;
            }
        }
    }

    #[test]
    fn test_abstract_values_are_admissible() {
        let c = Compiled::new(keys());
        let bdd = c.encoder.bdd();
        let states = all_states(&c);
        let truth = explicit_distances(&c.model, &states);
        assert_eq!(truth[&vec![0, 0, 0]], 7);

        let builder = PatternDatabaseBuilder::new(&c.encoder, &c.model);
        let exact = builder.build(0, Abstraction::concrete(3), BUDGET).unwrap();
        let exact_table = HeuristicTable::from_databases(bdd, std::slice::from_ref(&exact));
        for members in &states {
            let s = state(&c, members);
            if let Some(&d) = truth.get(members) {
                assert_eq!(exact_table.value(bdd, s), Some(d), "state {:?}", members);
            } else {
                assert!(exact_table.value(bdd, s).unwrap() > exact.max_h(), "dead end {:?}", members);
            }
        }

        for kept in [vec![0], vec![1], vec![2], vec![0, 1], vec![1, 2]] {
            let db = builder.build(1, Abstraction::pattern(kept.clone(), 3), BUDGET).unwrap();
            let table = HeuristicTable::from_databases(bdd, &[db]);
            for members in &states {
                let Some(&d) = truth.get(members) else {
                    continue;
                };
                let h = table.value(bdd, state(&c, members)).unwrap();
                assert!(h <= d, "pattern {:?}, state {:?}: h = {} > {}", kept, members, h, d);
            }
        }
    }

    #[test]
    fn test_disjoint_patterns_add_up() {
        let c = Compiled::new(keys());
        let bdd = c.encoder.bdd();
        let builder = PatternDatabaseBuilder::new(&c.encoder, &c.model);
        let databases: Vec<_> = (0..3)
            .map(|p| builder.build(p, Abstraction::pattern([p], 3), BUDGET).unwrap())
            .collect();
        assert_eq!(
            databases.iter().map(|db| db.max_h()).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );

        let table = HeuristicTable::from_databases(bdd, &databases);
        assert_eq!(table.value(bdd, c.init), Some(7));
        assert_eq!(table.value(bdd, c.goal), Some(0));

        let plan = AStarSearch::new(c.problem(), &table).run().unwrap().plan().cloned().unwrap();
        assert_eq!(plan.cost, 7);
        assert!(plan.satisfies(&c.model, &c.model.goal).unwrap());
    }

    #[test]
    fn test_partial_database_uses_first_open_value() {
        let c = Compiled::new(line(5));
        let bdd = c.encoder.bdd();
        let builder = PatternDatabaseBuilder::new(&c.encoder, &c.model);
        let db = builder.build(0, Abstraction::concrete(1), Duration::ZERO).unwrap();
        assert!(!db.is_complete());
        assert_eq!(db.max_h(), 0);
        assert_eq!(db.unreached_value(), 1);

        let table = HeuristicTable::from_databases(bdd, &[db]);
        assert_eq!(table.value(bdd, c.goal), Some(0));
        assert_eq!(table.value(bdd, c.init), Some(1));
    }

    #[test]
    fn test_average() {
        let c = Compiled::new(line(3));
        let builder = PatternDatabaseBuilder::new(&c.encoder, &c.model);
        let db = builder.build(0, Abstraction::concrete(1), BUDGET).unwrap();
        // Values 2, 1 and 0 for one state each.
        assert!((db.average(&c.encoder) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_save_and_load() {
        let c = Compiled::new(keys());
        let builder = PatternDatabaseBuilder::new(&c.encoder, &c.model);
        let db = builder.build(4, Abstraction::pattern([0, 1], 3), BUDGET).unwrap();

        let dir = std::env::temp_dir().join(format!("bdd-planner-pdb-{}", std::process::id()));
        save_selection(c.encoder.bdd(), &dir, std::slice::from_ref(&db)).unwrap();
        assert!(dir.join("pdb_4").join("abstract_4_0.bdd").exists());
        assert_eq!(fs::read_to_string(dir.join("pdb_4").join("UsedActions.txt")).unwrap(), "11110\n");

        // Loading into the same manager yields the same canonical nodes.
        let loaded = load_selection(&c.encoder, &dir).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].pattern, db.pattern);
        assert_eq!(loaded[0].buckets(), db.buckets());
        assert_eq!(loaded[0].is_complete(), db.is_complete());
        assert_eq!(loaded[0].unreached_value(), db.unreached_value());
        assert_eq!(loaded[0].used_actions(), db.used_actions());

        // A fresh manager reproduces the same values.
        let fresh = Compiled::new(keys());
        let reloaded = PatternDatabase::load(&fresh.encoder, &dir, 4).unwrap();
        let table = HeuristicTable::from_databases(fresh.encoder.bdd(), &[reloaded]);
        let original = HeuristicTable::from_databases(c.encoder.bdd(), &[db]);
        assert_eq!(
            table.value(fresh.encoder.bdd(), fresh.init),
            original.value(c.encoder.bdd(), c.init)
        );

        fs::remove_dir_all(&dir).unwrap();
        assert!(load_selection(&c.encoder, &dir).unwrap().is_none());
    }

    #[test]
    fn test_cost_factors() {
        let model = keys();
        let used = vec![
            vec![true, true, false, false, false],
            vec![true, false, false, true, false],
        ];
        let factors = cost_factors(&model, &used);
        assert_eq!(factors.lcm, 2);
        assert_eq!(factors.concrete, vec![4, 6, 6, 2, 2]);
        assert_eq!(factors.per_pattern[0], vec![2, 6, 6, 2, 2]);
        assert_eq!(factors.per_pattern[1][0], 2);

        let single = cost_factors(&model, &[vec![true; 5]]);
        assert_eq!(single.lcm, 1);
        assert_eq!(single.concrete, vec![2, 3, 3, 1, 1]);
    }

    #[test]
    fn test_split_rebuild_shares_budget() {
        let c = Compiled::new(keys());
        let builder = PatternDatabaseBuilder::new(&c.encoder, &c.model);
        let build = || -> Vec<PatternDatabase> {
            [0, 2]
                .into_iter()
                .enumerate()
                .map(|(id, p)| builder.build(id, Abstraction::pattern([p], 3), BUDGET).unwrap())
                .collect()
        };
        let used = vec![
            vec![true, true, false, false, false],
            vec![true, false, false, true, false],
        ];
        let factors = cost_factors(&c.model, &used);
        assert_eq!(factors.lcm, 2);

        let starved = builder.rebuild_split(build(), &factors, Duration::ZERO).unwrap();
        assert!(starved.iter().all(|db| !db.is_complete()));

        let rebuilt = builder.rebuild_split(build(), &factors, BUDGET).unwrap();
        assert!(rebuilt.iter().all(|db| db.is_complete()));
        // Flipping the light costs 1, scaled by 2.
        assert_eq!(rebuilt[1].max_h(), 2);
    }

    #[test]
    fn test_selection_keeps_goal_partitions_apart() {
        let c = Compiled::new(keys());
        let selection = PatternDatabaseBuilder::new(&c.encoder, &c.model).select(BUDGET).unwrap();
        let patterns: Vec<Vec<usize>> = selection
            .databases
            .iter()
            .map(|db| db.pattern.kept().collect())
            .collect();
        assert_eq!(patterns, vec![vec![0], vec![1], vec![2]]);
        let dbs = &selection.databases;
        assert!(dbs[0].pattern.is_disjoint(&dbs[1].pattern) && dbs[1].pattern.is_disjoint(&dbs[2].pattern));
        assert_eq!(selection.factors.lcm, 1);

        let bdd = c.encoder.bdd();
        assert_eq!(selection.heuristic(bdd).value(bdd, c.init), Some(7));
    }

    #[test]
    fn test_selection_grows_pattern() {
        let c = Compiled::new(fuel());
        let bdd = c.encoder.bdd();
        let builder = PatternDatabaseBuilder::new(&c.encoder, &c.model);

        let position = builder.build(0, Abstraction::pattern([0], 2), BUDGET).unwrap();
        let table = HeuristicTable::from_databases(bdd, &[position]);
        assert_eq!(table.value(bdd, c.init), Some(2));

        let selection = builder.select(BUDGET).unwrap();
        assert_eq!(selection.databases.len(), 1);
        assert_eq!(selection.databases[0].pattern, Abstraction::concrete(2));
        let table = selection.heuristic(bdd);
        assert_eq!(table.value(bdd, c.init), Some(7));

        let plan = AStarSearch::new(c.problem(), &table).run().unwrap().plan().cloned().unwrap();
        assert_eq!(plan.actions, vec!["move.n0.n1", "refuel", "move.n1.n2"]);
        assert_eq!(plan.cost, 7);
    }

    #[test]
    fn test_trivial_table() {
        let bdd = Rc::new(Bdd::default());
        let table = HeuristicTable::trivial(&bdd);
        assert_eq!(table.max_h(), 0);
        assert_eq!(table.value(&bdd, bdd.one), Some(0));
        assert_eq!(table.value(&bdd, bdd.zero), None);
    }
}
