//! Compilation of grounded actions into transition relations.
//!
//! An action's relation is `pre(current) ∧ eff(current, next)`, where the
//! effect part fixes every partition the action does not touch with the
//! frame `next ⇔ current`.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use crate::encoding::{Frame, StateEncoder};
use crate::error::{PlannerError, Result};
use crate::expr::{Effects, Expr};
use crate::model::{Action, GroundedModel};
use crate::reference::Ref;

/// The set of partitions kept in a (possibly abstract) state space.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Abstraction {
    kept: BTreeSet<usize>,
    num_partitions: usize,
}

impl Abstraction {
    /// Keep every partition.
    pub fn concrete(num_partitions: usize) -> Self {
        Self {
            kept: (0..num_partitions).collect(),
            num_partitions,
        }
    }

    /// Keep only the given partitions; all others are dropped.
    pub fn pattern(kept: impl IntoIterator<Item = usize>, num_partitions: usize) -> Self {
        Self {
            kept: kept.into_iter().filter(|&p| p < num_partitions).collect(),
            num_partitions,
        }
    }

    pub fn keeps(&self, partition: usize) -> bool {
        self.kept.contains(&partition)
    }

    pub fn kept(&self) -> impl Iterator<Item = usize> + '_ {
        self.kept.iter().copied()
    }

    pub fn dropped(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_partitions).filter(|p| !self.kept.contains(p))
    }

    pub fn is_concrete(&self) -> bool {
        self.kept.len() == self.num_partitions
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn is_disjoint(&self, other: &Abstraction) -> bool {
        self.kept.is_disjoint(&other.kept)
    }
}

/// Transition relation of one action.
#[derive(Debug, Clone)]
pub struct ActionTransition {
    pub name: String,
    pub relation: Ref,
}

impl ActionTransition {
    pub fn image(&self, encoder: &StateEncoder, from: Ref) -> Ref {
        let bdd = encoder.bdd();
        encoder.to_current(bdd.rel_product(from, self.relation, encoder.current_vars()))
    }

    pub fn preimage(&self, encoder: &StateEncoder, to: Ref) -> Ref {
        let bdd = encoder.bdd();
        bdd.rel_product(encoder.to_next(to), self.relation, encoder.next_vars())
    }
}

/// Per-action relations grouped by cost, never merged across actions.
#[derive(Debug, Clone, Default)]
pub struct TransitionRelation {
    by_cost: BTreeMap<u32, Vec<ActionTransition>>,
}

impl TransitionRelation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cost: u32, name: impl Into<String>, relation: Ref) {
        self.by_cost.entry(cost).or_default().push(ActionTransition {
            name: name.into(),
            relation,
        });
    }

    /// Costs in ascending order.
    pub fn costs(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_cost.keys().copied()
    }

    /// Positive costs in ascending order.
    pub fn positive_costs(&self) -> impl Iterator<Item = u32> + '_ {
        self.costs().filter(|&c| c > 0)
    }

    pub fn actions(&self, cost: u32) -> &[ActionTransition] {
        self.by_cost.get(&cost).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_zero_cost(&self) -> bool {
        !self.actions(0).is_empty()
    }

    pub fn max_cost(&self) -> u32 {
        self.by_cost.keys().next_back().copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ActionTransition)> {
        self.by_cost
            .iter()
            .flat_map(|(&cost, actions)| actions.iter().map(move |a| (cost, a)))
    }

    pub fn len(&self) -> usize {
        self.by_cost.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every relation, for garbage collection.
    pub fn roots(&self) -> Vec<Ref> {
        self.iter().map(|(_, a)| a.relation).collect()
    }

    /// Successors of `from` under all actions of one cost.
    pub fn image(&self, encoder: &StateEncoder, from: Ref, cost: u32) -> Ref {
        let images: Vec<Ref> = self.actions(cost).iter().map(|a| a.image(encoder, from)).collect();
        encoder.bdd().apply_or_many(images)
    }

    /// Predecessors of `to` under all actions of one cost.
    pub fn preimage(&self, encoder: &StateEncoder, to: Ref, cost: u32) -> Ref {
        let images: Vec<Ref> = self.actions(cost).iter().map(|a| a.preimage(encoder, to)).collect();
        encoder.bdd().apply_or_many(images)
    }

    /// Successors of `from` under every action.
    pub fn image_all(&self, encoder: &StateEncoder, from: Ref) -> Ref {
        let images: Vec<Ref> = self.iter().map(|(_, a)| a.image(encoder, from)).collect();
        encoder.bdd().apply_or_many(images)
    }

    pub fn preimage_all(&self, encoder: &StateEncoder, to: Ref) -> Ref {
        let images: Vec<Ref> = self.iter().map(|(_, a)| a.preimage(encoder, to)).collect();
        encoder.bdd().apply_or_many(images)
    }

    pub fn find(&self, name: &str) -> Option<(u32, &ActionTransition)> {
        self.iter().find(|(_, a)| a.name == name)
    }

    /// The same relation with every cost multiplied by `factor`.
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            by_cost: self
                .by_cost
                .iter()
                .map(|(&cost, actions)| (cost * factor, actions.clone()))
                .collect(),
        }
    }
}

/// A `when` effect: states where it may fire or may stay silent, and the
/// next-state literal it sets per partition. Both sets coincide with the
/// condition and its negation unless the condition reads dropped partitions.
struct Context {
    may_fire: Ref,
    may_skip: Ref,
    literals: BTreeMap<usize, Ref>,
}

/// Compiles actions, the initial state and the goal over one abstraction.
pub struct TransitionBuilder<'a> {
    encoder: &'a StateEncoder,
    model: &'a GroundedModel,
    abstraction: Abstraction,
    costs: Option<Vec<u32>>,
}

impl<'a> TransitionBuilder<'a> {
    pub fn new(encoder: &'a StateEncoder, model: &'a GroundedModel) -> Self {
        Self {
            encoder,
            model,
            abstraction: Abstraction::concrete(model.partitions.len()),
            costs: None,
        }
    }

    pub fn with_abstraction(mut self, abstraction: Abstraction) -> Self {
        self.abstraction = abstraction;
        self
    }

    /// Override action costs (indexed like `model.actions`).
    pub fn with_costs(mut self, costs: Vec<u32>) -> Self {
        self.costs = Some(costs);
        self
    }

    pub fn abstraction(&self) -> &Abstraction {
        &self.abstraction
    }

    fn cost(&self, index: usize, action: &Action) -> u32 {
        self.costs
            .as_ref()
            .and_then(|costs| costs.get(index).copied())
            .unwrap_or(action.cost)
    }

    /// Whether the action changes some kept partition.
    pub fn is_used(&self, action: &Action) -> bool {
        fn touches(model: &GroundedModel, abstraction: &Abstraction, effects: &Effects) -> bool {
            effects
                .touched()
                .filter_map(|name| model.locate(name))
                .any(|(p, _)| abstraction.keeps(p))
                || effects
                    .conditional
                    .iter()
                    .any(|(_, inner)| touches(model, abstraction, inner))
        }
        touches(self.model, &self.abstraction, &action.effect.classify_effects())
    }

    pub fn used_actions(&self) -> Vec<bool> {
        self.model.actions.iter().map(|a| self.is_used(a)).collect()
    }

    /// Compile every action into a relation grouped by cost.
    ///
    /// In an abstract space, actions that change no kept partition are left out.
    pub fn build(&self) -> Result<TransitionRelation> {
        info!(
            "Building transition relation for {} actions over {} of {} partitions",
            self.model.actions.len(),
            self.abstraction.kept.len(),
            self.abstraction.num_partitions
        );
        if !self.abstraction.is_concrete() {
            debug!("Dropped partitions: {:?}", self.abstraction.dropped().collect::<Vec<_>>());
        }
        let mut relation = TransitionRelation::new();
        for (index, action) in self.model.actions.iter().enumerate() {
            if !self.abstraction.is_concrete() && !self.is_used(action) {
                continue;
            }
            let t = self.compile(action)?;
            debug!("Action '{}' compiled to {} nodes", action.name, self.encoder.bdd().size(t));
            relation.insert(self.cost(index, action), action.name.clone(), t);
        }
        info!("Transition relation has {} actions", relation.len());
        Ok(relation)
    }

    /// Compile one action into `pre ∧ eff`.
    pub fn compile(&self, action: &Action) -> Result<Ref> {
        let bdd = self.encoder.bdd();
        let pre = self.condition(&action.name, &action.precondition)?;

        let effects = action.effect.classify_effects();
        if let Some(bad) = effects.unsupported.first() {
            return Err(PlannerError::model(&action.name, format!("unsupported effect {}", bad)));
        }
        let normal = self.effect_literals(&action.name, &effects)?;
        let mut contexts = Vec::new();
        self.flatten_conditionals(&action.name, (bdd.one, bdd.zero), &effects.conditional, &mut contexts)?;

        let mut clauses = Vec::new();
        for p in self.abstraction.kept() {
            let conditional: Vec<(&Context, Ref)> = contexts
                .iter()
                .filter_map(|ctx| ctx.literals.get(&p).map(|&lit| (ctx, lit)))
                .collect();
            let clause = match normal.get(&p) {
                Some(_) if !conditional.is_empty() => {
                    return Err(PlannerError::model(
                        &action.name,
                        format!("partition {} has both a normal and a conditional effect", p),
                    ));
                }
                Some(&lit) => lit,
                None if conditional.is_empty() => self.encoder.frame(p),
                None => {
                    let fired = bdd.apply_or_many(
                        conditional
                            .iter()
                            .map(|&(ctx, lit)| bdd.apply_and(ctx.may_fire, lit)),
                    );
                    let none = bdd.apply_and_many(conditional.iter().map(|&(ctx, _)| ctx.may_skip));
                    bdd.apply_or(fired, bdd.apply_and(none, self.encoder.frame(p)))
                }
            };
            clauses.push(clause);
        }

        let eff = bdd.apply_and_many(clauses);
        Ok(bdd.apply_and(pre, eff))
    }

    /// Compile a condition over current variables; dropped partitions impose nothing.
    pub fn condition(&self, owner: &str, expr: &Expr) -> Result<Ref> {
        self.polar_condition(owner, expr, false)
    }

    /// Compile `expr` (or its negation) with negations pushed to the literals,
    /// so that dropped literals relax the condition under either polarity.
    fn polar_condition(&self, owner: &str, expr: &Expr, negated: bool) -> Result<Ref> {
        let bdd = self.encoder.bdd();
        Ok(match expr {
            Expr::Literal(name) => {
                let (p, m) = self.locate(owner, name)?;
                if !self.abstraction.keeps(p) {
                    bdd.one
                } else if negated {
                    -self.encoder.literal(p, m, Frame::Current)?
                } else {
                    self.encoder.literal(p, m, Frame::Current)?
                }
            }
            Expr::And(children) | Expr::Or(children) => {
                let parts = children
                    .iter()
                    .map(|c| self.polar_condition(owner, c, negated))
                    .collect::<Result<Vec<_>>>()?;
                if matches!(expr, Expr::And(_)) != negated {
                    bdd.apply_and_many(parts)
                } else {
                    bdd.apply_or_many(parts)
                }
            }
            Expr::Not(inner) => self.polar_condition(owner, inner, !negated)?,
            Expr::When(..) => {
                return Err(PlannerError::model(owner, format!("conditional in a condition: {}", expr)));
            }
        })
    }

    fn locate(&self, owner: &str, name: &str) -> Result<(usize, usize)> {
        self.model
            .locate(name)
            .ok_or_else(|| PlannerError::model(owner, format!("predicate '{}' is not in any partition", name)))
    }

    /// Next-state literal per kept partition the unconditional part of `effects` touches.
    fn effect_literals(&self, owner: &str, effects: &Effects) -> Result<BTreeMap<usize, Ref>> {
        let mut added: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for name in &effects.add {
            let (p, m) = self.locate(owner, name)?;
            added.entry(p).or_default().push(m);
        }
        for name in &effects.del {
            let (p, _) = self.locate(owner, name)?;
            added.entry(p).or_default();
        }

        let mut literals = BTreeMap::new();
        for (p, members) in added {
            if !self.abstraction.keeps(p) {
                continue;
            }
            let member = match members.as_slice() {
                [m] => *m,
                [] => self.model.partitions[p].absence().ok_or_else(|| {
                    PlannerError::model(
                        owner,
                        format!("delete-only effect on partition {} without a none-of-these member", p),
                    )
                })?,
                _ => {
                    return Err(PlannerError::model(
                        owner,
                        format!("adds {} members of mutually exclusive partition {}", members.len(), p),
                    ));
                }
            };
            literals.insert(p, self.encoder.literal(p, member, Frame::Next)?);
        }
        Ok(literals)
    }

    /// Compile nested `when` effects into contexts, one per `when` with effects.
    fn flatten_conditionals(
        &self,
        owner: &str,
        outer: (Ref, Ref),
        conditional: &[(Expr, Effects)],
        out: &mut Vec<Context>,
    ) -> Result<()> {
        let bdd = self.encoder.bdd();
        let (outer_fire, outer_skip) = outer;
        for (condition, effects) in conditional {
            if let Some(bad) = effects.unsupported.first() {
                return Err(PlannerError::model(owner, format!("unsupported effect {}", bad)));
            }
            let may_fire = bdd.apply_and(outer_fire, self.polar_condition(owner, condition, false)?);
            let may_skip = bdd.apply_or(outer_skip, self.polar_condition(owner, condition, true)?);
            let literals = self.effect_literals(owner, effects)?;
            if !literals.is_empty() {
                out.push(Context {
                    may_fire,
                    may_skip,
                    literals,
                });
            }
            self.flatten_conditionals(owner, (may_fire, may_skip), &effects.conditional, out)?;
        }
        Ok(())
    }

    /// The single initial state; partitions without an initial member take their absence value.
    pub fn initial_state(&self) -> Result<Ref> {
        let mut members: BTreeMap<usize, usize> = BTreeMap::new();
        for name in &self.model.init {
            let (p, m) = self.locate("init", name)?;
            if let Some(other) = members.insert(p, m) {
                return Err(PlannerError::model(
                    "init",
                    format!(
                        "'{}' and '{}' are both true in partition {}",
                        self.model.partitions[p].members[other], name, p
                    ),
                ));
            }
        }
        let mut literals = Vec::new();
        for p in self.abstraction.kept() {
            let m = match members.get(&p) {
                Some(&m) => m,
                None => self.model.partitions[p].absence().ok_or_else(|| {
                    PlannerError::model("init", format!("partition {} has no initial member", p))
                })?,
            };
            literals.push(self.encoder.literal(p, m, Frame::Current)?);
        }
        Ok(self.encoder.bdd().apply_and_many(literals))
    }

    /// Goal states, restricted to valid codes of the kept partitions.
    pub fn goal(&self) -> Result<Ref> {
        let bdd = self.encoder.bdd();
        let goal = self.condition("goal", &self.model.goal)?;
        let valid = self
            .abstraction
            .kept()
            .map(|p| self.encoder.valid_codes(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(bdd.apply_and(goal, bdd.apply_and_many(valid)))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use test_log::test;

    use super::*;
    use crate::bdd::{Bdd, VarSet};
    use crate::encoding::{current_var, next_var};
    use crate::model::Partition;

    fn action(name: &str, cost: u32, pre: Expr, eff: Expr) -> Action {
        Action {
            name: name.to_string(),
            cost,
            precondition: pre,
            effect: eff,
        }
    }

    /// Robot moving between `a`/`b`/`c`, plus an independent lamp.
    fn robot() -> GroundedModel {
        GroundedModel::new(
            vec![
                action(
                    "move.a.b",
                    1,
                    Expr::lit("at.a"),
                    Expr::And(vec![Expr::not(Expr::lit("at.a")), Expr::lit("at.b")]),
                ),
                action(
                    "move.b.c",
                    2,
                    Expr::lit("at.b"),
                    Expr::And(vec![Expr::not(Expr::lit("at.b")), Expr::lit("at.c")]),
                ),
                action("switch", 1, Expr::lit("off"), Expr::And(vec![Expr::not(Expr::lit("off")), Expr::lit("on")])),
            ],
            vec!["at.a".into(), "off".into()],
            Expr::And(vec![Expr::lit("at.c"), Expr::lit("on")]),
            vec![Partition::new(["at.a", "at.b", "at.c"]), Partition::new(["off", "on"])],
        )
        .unwrap()
    }

    fn state(enc: &StateEncoder, members: &[(usize, usize)]) -> Ref {
        enc.bdd().apply_and_many(
            members
                .iter()
                .map(|&(p, m)| enc.literal(p, m, Frame::Current).unwrap()),
        )
    }

    #[test]
    fn test_frame_axiom_for_untouched_partition() {
        let model = robot();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd.clone(), &model.partitions);
        let builder = TransitionBuilder::new(&enc, &model);
        let t = builder.compile(&model.actions[0]).unwrap();

        // Project onto the lamp's bits: exactly the identity relation.
        let robot_vars = VarSet::new(
            enc.layouts()[0]
                .bit_range()
                .flat_map(|b| [current_var(b), next_var(b)]),
        );
        assert_eq!(bdd.exists(t, &robot_vars), enc.frame(1));
    }

    #[test]
    fn test_image_and_preimage() {
        let model = robot();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd.clone(), &model.partitions);
        let builder = TransitionBuilder::new(&enc, &model);
        let relation = builder.build().unwrap();
        assert_eq!(relation.costs().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(relation.len(), 3);

        let init = builder.initial_state().unwrap();
        assert_eq!(init, state(&enc, &[(0, 0), (1, 0)]));

        let succ = relation.image(&enc, init, 1);
        let expected = bdd.apply_or(state(&enc, &[(0, 1), (1, 0)]), state(&enc, &[(0, 0), (1, 1)]));
        assert_eq!(succ, expected);
        assert!(bdd.is_zero(relation.image(&enc, init, 2)));

        let pred = relation.preimage(&enc, state(&enc, &[(0, 2), (1, 1)]), 2);
        assert_eq!(pred, state(&enc, &[(0, 1), (1, 1)]));
    }

    #[test]
    fn test_goal_and_init() {
        let model = robot();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd.clone(), &model.partitions);
        let builder = TransitionBuilder::new(&enc, &model);
        let goal = builder.goal().unwrap();
        assert_eq!(goal, state(&enc, &[(0, 2), (1, 1)]));
        assert!(bdd.is_zero(bdd.apply_and(goal, builder.initial_state().unwrap())));
    }

    #[test]
    fn test_delete_only_sets_absence() {
        let model = GroundedModel::new(
            vec![action("drop", 1, Expr::lit("holding"), Expr::not(Expr::lit("holding")))],
            vec!["holding".into()],
            Expr::not(Expr::lit("holding")),
            vec![Partition::new(["holding"])],
        )
        .unwrap();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd.clone(), &model.partitions);
        let builder = TransitionBuilder::new(&enc, &model);
        let relation = builder.build().unwrap();
        let init = builder.initial_state().unwrap();
        assert_eq!(relation.image(&enc, init, 1), builder.goal().unwrap());
    }

    #[test]
    fn test_conditional_effect() {
        // Pressing toggles the lamp on only when the switch is armed.
        let model = GroundedModel::new(
            vec![action(
                "press",
                1,
                Expr::truth(),
                Expr::when(Expr::lit("armed"), Expr::And(vec![Expr::not(Expr::lit("off")), Expr::lit("on")])),
            )],
            vec!["off".into(), "armed".into()],
            Expr::lit("on"),
            vec![Partition::new(["off", "on"]), Partition::new(["armed", "disarmed"])],
        )
        .unwrap();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd.clone(), &model.partitions);
        let builder = TransitionBuilder::new(&enc, &model);
        let relation = builder.build().unwrap();

        let armed = state(&enc, &[(0, 0), (1, 0)]);
        assert_eq!(relation.image(&enc, armed, 1), state(&enc, &[(0, 1), (1, 0)]));
        let disarmed = state(&enc, &[(0, 0), (1, 1)]);
        assert_eq!(relation.image(&enc, disarmed, 1), disarmed);
    }

    #[test]
    fn test_normal_and_conditional_on_same_partition_is_model_error() {
        let model = GroundedModel::new(
            vec![action(
                "weird",
                1,
                Expr::truth(),
                Expr::And(vec![
                    Expr::lit("on"),
                    Expr::when(Expr::lit("armed"), Expr::lit("off")),
                ]),
            )],
            vec!["off".into(), "armed".into()],
            Expr::lit("on"),
            vec![Partition::new(["off", "on"]), Partition::new(["armed", "disarmed"])],
        )
        .unwrap();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd, &model.partitions);
        match TransitionBuilder::new(&enc, &model).build() {
            Err(PlannerError::Model { entity, message }) => {
                assert_eq!(entity, "weird");
                assert!(message.contains("partition 0"));
            }
            other => panic!("expected a model error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_abstraction_ignores_dropped_partitions() {
        let model = robot();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd.clone(), &model.partitions);
        let builder = TransitionBuilder::new(&enc, &model).with_abstraction(Abstraction::pattern([1], 2));
        assert_eq!(builder.used_actions(), vec![false, false, true]);

        let relation = builder.build().unwrap();
        assert_eq!(relation.len(), 1);
        let init = builder.initial_state().unwrap();
        assert_eq!(init, enc.literal(1, 0, Frame::Current).unwrap());
        assert_eq!(relation.image(&enc, init, 1), builder.goal().unwrap());
    }

    #[test]
    fn test_abstract_condition_may_or_may_not_fire() {
        let model = GroundedModel::new(
            vec![action(
                "press",
                1,
                Expr::not(Expr::And(vec![Expr::lit("disarmed"), Expr::lit("on")])),
                Expr::when(Expr::lit("armed"), Expr::And(vec![Expr::not(Expr::lit("off")), Expr::lit("on")])),
            )],
            vec!["off".into(), "armed".into()],
            Expr::lit("on"),
            vec![Partition::new(["off", "on"]), Partition::new(["armed", "disarmed"])],
        )
        .unwrap();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd.clone(), &model.partitions);
        let builder = TransitionBuilder::new(&enc, &model).with_abstraction(Abstraction::pattern([0], 2));
        let relation = builder.build().unwrap();

        // With the switch dropped, the press may or may not turn the lamp on,
        // and the precondition no longer excludes a lit lamp.
        let off = enc.literal(0, 0, Frame::Current).unwrap();
        let on = enc.literal(0, 1, Frame::Current).unwrap();
        assert_eq!(relation.image(&enc, off, 1), bdd.apply_or(off, on));
        assert_eq!(relation.image(&enc, on, 1), on);
    }

    #[test]
    fn test_cost_override() {
        let model = robot();
        let bdd = Rc::new(Bdd::default());
        let enc = StateEncoder::new(bdd, &model.partitions);
        let relation = TransitionBuilder::new(&enc, &model)
            .with_costs(vec![3, 6, 3])
            .build()
            .unwrap();
        assert_eq!(relation.costs().collect::<Vec<_>>(), vec![3, 6]);
        assert_eq!(relation.find("move.b.c").map(|(c, _)| c), Some(6));
        assert_eq!(relation.max_cost(), 6);

        let scaled = relation.scaled(2);
        assert_eq!(scaled.costs().collect::<Vec<_>>(), vec![6, 12]);
        assert_eq!(scaled.len(), relation.len());
    }
}
