//! Plans: ordered action names, their output format and explicit replay.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use log::info;

use crate::error::{PlannerError, Result};
use crate::expr::Expr;
use crate::model::GroundedModel;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Plan {
    pub actions: Vec<String>,
    /// Cost in the units of the transition relation that produced the plan.
    pub cost: u32,
}

impl Plan {
    pub fn new(actions: Vec<String>, cost: u32) -> Self {
        Self { actions, cost }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Sum of the model costs of the plan's actions.
    pub fn total_cost(&self, model: &GroundedModel) -> Result<u64> {
        self.actions.iter().try_fold(0u64, |acc, name| {
            let action = model
                .action(name)
                .ok_or_else(|| PlannerError::model(name, "unknown action in plan"))?;
            Ok(acc + action.cost as u64)
        })
    }

    /// Execute the plan on explicit states, starting from the initial state.
    ///
    /// Returns the final state (the set of true predicates).
    pub fn replay(&self, model: &GroundedModel) -> Result<HashSet<String>> {
        let mut state: HashSet<String> = model.init.iter().cloned().collect();
        for (i, name) in self.actions.iter().enumerate() {
            let action = model
                .action(name)
                .ok_or_else(|| PlannerError::model(name, "unknown action in plan"))?;
            if !action.precondition.evaluate(&state) {
                return Err(PlannerError::model(
                    name,
                    format!("precondition does not hold at step {}", i),
                ));
            }
            let before = state.clone();
            action.effect.classify_effects().apply(&before, &mut state);
        }
        Ok(state)
    }

    /// Whether replaying the plan ends in a state satisfying `goal`.
    pub fn satisfies(&self, model: &GroundedModel, goal: &Expr) -> Result<bool> {
        Ok(goal.evaluate(&self.replay(model)?))
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string())?;
        info!("Plan with {} steps written to {}", self.len(), path.display());
        Ok(())
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, name) in self.actions.iter().enumerate() {
            writeln!(f, "{}: ({})", i, name.split('.').collect::<Vec<_>>().join(" "))?;
        }
        Ok(())
    }
}
