//! Grounded planning model: partitions, actions, initial state and goal.

use std::collections::{HashMap, HashSet};

use log::info;

use crate::error::{PlannerError, Result};
use crate::expr::Expr;

/// Prefix of the synthetic member meaning "no member of this group holds".
pub const ABSENCE_PREFIX: &str = "none-of-these";

/// Ordered group of mutually exclusive predicates.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Partition {
    pub members: Vec<String>,
}

impl Partition {
    pub fn new(members: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Index of the absence member, which is always last.
    pub fn absence(&self) -> Option<usize> {
        match self.members.last() {
            Some(last) if last.starts_with(ABSENCE_PREFIX) => Some(self.members.len() - 1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Action {
    pub name: String,
    pub cost: u32,
    pub precondition: Expr,
    pub effect: Expr,
}

/// Validated grounded model.
///
/// Construction decides once which partitions need an absence value, so the
/// encoding never has to be repaired later.
#[derive(Debug, Clone)]
pub struct GroundedModel {
    pub actions: Vec<Action>,
    pub init: Vec<String>,
    pub goal: Expr,
    pub partitions: Vec<Partition>,
    index: HashMap<String, (usize, usize)>,
}

impl GroundedModel {
    pub fn new(actions: Vec<Action>, init: Vec<String>, goal: Expr, partitions: Vec<Partition>) -> Result<Self> {
        let mut model = Self {
            actions,
            init,
            goal,
            partitions,
            index: HashMap::new(),
        };
        model.reindex()?;
        model.check_predicates()?;
        model.reserve_absence_values();
        model.reindex()?;
        Ok(model)
    }

    fn reindex(&mut self) -> Result<()> {
        self.index.clear();
        for (p, partition) in self.partitions.iter().enumerate() {
            if partition.is_empty() {
                return Err(PlannerError::model(format!("partition {}", p), "empty group"));
            }
            for (m, member) in partition.members.iter().enumerate() {
                if let Some((other, _)) = self.index.insert(member.clone(), (p, m)) {
                    return Err(PlannerError::model(
                        member.clone(),
                        format!("predicate occurs in partitions {} and {}", other, p),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_predicates(&self) -> Result<()> {
        let check = |owner: &str, name: &str| -> Result<()> {
            if self.index.contains_key(name) {
                Ok(())
            } else {
                Err(PlannerError::model(
                    owner,
                    format!("predicate '{}' is not in any partition", name),
                ))
            }
        };
        for action in &self.actions {
            for name in action.precondition.predicates().into_iter().chain(action.effect.predicates()) {
                check(&action.name, name)?;
            }
            let effects = action.effect.classify_effects();
            if let Some(bad) = effects.unsupported.first() {
                return Err(PlannerError::model(&action.name, format!("unsupported effect {}", bad)));
            }
        }
        for name in &self.init {
            check("init", name)?;
        }
        for name in self.goal.predicates() {
            check("goal", name)?;
        }
        Ok(())
    }

    /// Append an absence member to every partition that some effect can leave
    /// without a true member, or that has no member in the initial state.
    fn reserve_absence_values(&mut self) {
        let mut needed: HashSet<usize> = HashSet::new();

        for action in &self.actions {
            let effects = action.effect.classify_effects();
            let mut contexts = vec![(effects.add.clone(), effects.del.clone())];
            let mut stack: Vec<_> = effects.conditional.iter().collect();
            while let Some((_, inner)) = stack.pop() {
                contexts.push((inner.add.clone(), inner.del.clone()));
                stack.extend(inner.conditional.iter());
            }
            for (add, del) in contexts {
                let added: HashSet<usize> = add.iter().filter_map(|a| self.locate(a)).map(|(p, _)| p).collect();
                for (p, _) in del.iter().filter_map(|d| self.locate(d)) {
                    if !added.contains(&p) {
                        needed.insert(p);
                    }
                }
            }
        }

        let initialised: HashSet<usize> = self.init.iter().filter_map(|i| self.locate(i)).map(|(p, _)| p).collect();
        needed.extend((0..self.partitions.len()).filter(|p| !initialised.contains(p)));

        let mut needed: Vec<usize> = needed.into_iter().collect();
        needed.sort_unstable();
        for p in needed {
            if self.partitions[p].absence().is_none() {
                info!("Reserving '{}-{}' in partition {}", ABSENCE_PREFIX, p, p);
                self.partitions[p].members.push(format!("{}-{}", ABSENCE_PREFIX, p));
            }
        }
    }

    /// `(partition, member)` of a predicate.
    pub fn locate(&self, name: &str) -> Option<(usize, usize)> {
        self.index.get(name).copied()
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn is_uniform_cost(&self) -> bool {
        self.actions.windows(2).all(|w| w[0].cost == w[1].cost)
    }

    /// Set every cost to 1 when all costs are equal.
    pub fn normalize_costs(&mut self) -> bool {
        if !self.is_uniform_cost() {
            return false;
        }
        for action in &mut self.actions {
            action.cost = 1;
        }
        true
    }

    pub fn max_cost(&self) -> u32 {
        self.actions.iter().map(|a| a.cost).max().unwrap_or(0)
    }

    /// Reorder partitions; `order[i]` is the old index of the new partition `i`.
    pub fn permute_partitions(&mut self, order: &[usize]) -> Result<()> {
        if order.len() != self.partitions.len() {
            return Err(PlannerError::model(
                "ordering",
                format!("{} entries for {} partitions", order.len(), self.partitions.len()),
            ));
        }
        let mut seen = vec![false; order.len()];
        for &i in order {
            if i >= order.len() || std::mem::replace(&mut seen[i], true) {
                return Err(PlannerError::model("ordering", format!("not a permutation (entry {})", i)));
            }
        }
        self.partitions = order.iter().map(|&i| self.partitions[i].clone()).collect();
        self.reindex()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn action(name: &str, cost: u32, pre: Expr, eff: Expr) -> Action {
        Action {
            name: name.to_string(),
            cost,
            precondition: pre,
            effect: eff,
        }
    }

    #[test]
    fn test_absence_reserved_for_delete_only_group() {
        let model = GroundedModel::new(
            vec![action(
                "drop",
                1,
                Expr::lit("holding"),
                Expr::not(Expr::lit("holding")),
            )],
            vec!["holding".into()],
            Expr::not(Expr::lit("holding")),
            vec![Partition::new(["holding"])],
        )
        .unwrap();
        assert_eq!(model.partitions[0].members, vec!["holding", "none-of-these-0"]);
        assert_eq!(model.partitions[0].absence(), Some(1));
        assert_eq!(model.locate("none-of-these-0"), Some((0, 1)));
    }

    #[test]
    fn test_absence_not_reserved_when_add_in_same_group() {
        let model = GroundedModel::new(
            vec![action(
                "move",
                1,
                Expr::lit("at.a"),
                Expr::And(vec![Expr::not(Expr::lit("at.a")), Expr::lit("at.b")]),
            )],
            vec!["at.a".into()],
            Expr::lit("at.b"),
            vec![Partition::new(["at.a", "at.b"])],
        )
        .unwrap();
        assert_eq!(model.partitions[0].len(), 2);
        assert_eq!(model.partitions[0].absence(), None);
    }

    #[test]
    fn test_absence_reserved_for_uninitialised_group() {
        let model = GroundedModel::new(
            vec![],
            vec!["a".into()],
            Expr::lit("a"),
            vec![Partition::new(["a"]), Partition::new(["b", "c"])],
        )
        .unwrap();
        assert_eq!(model.partitions[1].members, vec!["b", "c", "none-of-these-1"]);
        assert_eq!(model.partitions[0].absence(), None);
    }

    #[test]
    fn test_unknown_predicate_is_model_error() {
        let err = GroundedModel::new(
            vec![action("jump", 1, Expr::lit("ghost"), Expr::lit("a"))],
            vec!["a".into()],
            Expr::lit("a"),
            vec![Partition::new(["a"])],
        )
        .unwrap_err();
        match err {
            PlannerError::Model { entity, message } => {
                assert_eq!(entity, "jump");
                assert!(message.contains("ghost"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_duplicate_member_is_model_error() {
        let err = GroundedModel::new(
            vec![],
            vec!["a".into()],
            Expr::lit("a"),
            vec![Partition::new(["a"]), Partition::new(["a", "b"])],
        );
        assert!(matches!(err, Err(PlannerError::Model { .. })));
    }

    #[test]
    fn test_uniform_cost_normalization() {
        let mut model = GroundedModel::new(
            vec![
                action("x", 5, Expr::truth(), Expr::lit("a")),
                action("y", 5, Expr::truth(), Expr::lit("b")),
            ],
            vec!["a".into()],
            Expr::lit("b"),
            vec![Partition::new(["a", "b"])],
        )
        .unwrap();
        assert!(model.normalize_costs());
        assert!(model.actions.iter().all(|a| a.cost == 1));

        model.actions[0].cost = 3;
        assert!(!model.is_uniform_cost());
        assert!(!model.normalize_costs());
        assert_eq!(model.max_cost(), 3);
    }

    #[test]
    fn test_permute_partitions() {
        let mut model = GroundedModel::new(
            vec![],
            vec!["a".into(), "c".into()],
            Expr::lit("a"),
            vec![Partition::new(["a", "b"]), Partition::new(["c", "d"])],
        )
        .unwrap();
        model.permute_partitions(&[1, 0]).unwrap();
        assert_eq!(model.locate("c"), Some((0, 0)));
        assert_eq!(model.locate("b"), Some((1, 1)));
        assert!(model.permute_partitions(&[0, 0]).is_err());
        assert!(model.permute_partitions(&[0]).is_err());
    }
}
