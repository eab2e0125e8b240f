//! Grounded precondition and effect expressions.

use std::collections::{BTreeSet, HashSet};
use std::fmt::{Display, Formatter};

/// Expression over grounded predicates.
///
/// `And(vec![])` is true and `Or(vec![])` is false. `When` only appears in effects.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Expr {
    Literal(String),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    When(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn lit(name: impl Into<String>) -> Self {
        Expr::Literal(name.into())
    }

    pub fn not(e: Expr) -> Self {
        Expr::Not(Box::new(e))
    }

    pub fn when(condition: Expr, effect: Expr) -> Self {
        Expr::When(Box::new(condition), Box::new(effect))
    }

    pub fn truth() -> Self {
        Expr::And(Vec::new())
    }

    /// All predicate names occurring in the expression, conditions included.
    pub fn predicates(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_predicates(&mut out);
        out
    }

    /// Predicates read by the `when` conditions of an effect.
    pub fn condition_predicates(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::When(condition, effect) => {
                condition.collect_predicates(out);
                effect.collect_conditions(out);
            }
            Expr::And(children) => {
                for child in children {
                    if matches!(child, Expr::When(..)) {
                        child.collect_conditions(out);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_predicates<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Literal(name) => {
                out.insert(name.as_str());
            }
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.collect_predicates(out);
                }
            }
            Expr::Not(inner) => inner.collect_predicates(out),
            Expr::When(condition, effect) => {
                condition.collect_predicates(out);
                effect.collect_predicates(out);
            }
        }
    }

    /// Split an effect into unconditional add/delete sets and conditional parts.
    ///
    /// Deletes shadowed by an add of the same predicate are dropped.
    pub fn classify_effects(&self) -> Effects {
        let mut effects = Effects::default();
        self.classify_into(&mut effects);
        effects.del.retain(|p| !effects.add.contains(p));
        effects
    }

    fn classify_into(&self, effects: &mut Effects) {
        match self {
            Expr::Literal(name) => {
                if !effects.add.contains(name) {
                    effects.add.push(name.clone());
                }
            }
            Expr::Not(inner) => match inner.as_ref() {
                Expr::Literal(name) => {
                    if !effects.del.contains(name) {
                        effects.del.push(name.clone());
                    }
                }
                other => effects.unsupported.push(Expr::not(other.clone())),
            },
            Expr::And(children) => {
                for child in children {
                    child.classify_into(effects);
                }
            }
            Expr::When(condition, effect) => {
                effects.conditional.push(((**condition).clone(), effect.classify_effects()));
            }
            Expr::Or(_) => effects.unsupported.push(self.clone()),
        }
    }

    /// Evaluate on an explicit state (the set of true predicates).
    ///
    /// A `When` evaluates to its condition.
    pub fn evaluate(&self, state: &HashSet<String>) -> bool {
        match self {
            Expr::Literal(name) => state.contains(name),
            Expr::And(children) => children.iter().all(|c| c.evaluate(state)),
            Expr::Or(children) => children.iter().any(|c| c.evaluate(state)),
            Expr::Not(inner) => !inner.evaluate(state),
            Expr::When(condition, _) => condition.evaluate(state),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(name) => write!(f, "({})", name),
            Expr::And(children) | Expr::Or(children) => {
                let op = if matches!(self, Expr::And(_)) { "and" } else { "or" };
                write!(f, "({}", op)?;
                for child in children {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
            Expr::Not(inner) => write!(f, "(not {})", inner),
            Expr::When(condition, effect) => write!(f, "(when {} {})", condition, effect),
        }
    }
}

/// Classified effect of one action.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Effects {
    pub add: Vec<String>,
    pub del: Vec<String>,
    /// `(condition, effect)` pairs of `when` sub-effects.
    pub conditional: Vec<(Expr, Effects)>,
    /// Sub-expressions that are not valid effects (disjunctions, negated compounds).
    pub unsupported: Vec<Expr>,
}

impl Effects {
    /// Predicates the unconditional part touches.
    pub fn touched(&self) -> impl Iterator<Item = &str> {
        self.add.iter().chain(self.del.iter()).map(String::as_str)
    }

    /// Apply to an explicit state, evaluating conditions on `before`.
    pub fn apply(&self, before: &HashSet<String>, after: &mut HashSet<String>) {
        for p in &self.del {
            after.remove(p);
        }
        for (condition, effect) in &self.conditional {
            if condition.evaluate(before) {
                effect.apply(before, after);
            }
        }
        for p in &self.add {
            after.insert(p.clone());
        }
    }
}
