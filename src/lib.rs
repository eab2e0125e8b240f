//! # bdd-planner: cost-optimal symbolic planning with BDDs
//!
//! The planner reads a grounded planning task, encodes every group of mutually
//! exclusive predicates (a *partition*) into a few Boolean variables, compiles
//! each action into a transition relation, and searches the state space with
//! whole sets of states at a time.
//!
//! ## Pipeline
//!
//! 1. [`pddl`] reads the grounded domain, problem and partition files into a
//!    [`GroundedModel`][crate::model::GroundedModel].
//! 2. [`ordering`] optionally permutes the partitions, which fixes the BDD
//!    variable order.
//! 3. [`encoding`] maps partitions to interleaved current/next variables of one
//!    [`Bdd`][crate::bdd::Bdd] manager.
//! 4. [`transition`] compiles actions, the initial state and the goal;
//!    [`artifacts`] persists or reloads them.
//! 5. One of the engines in [`search`] finds an optimal plan: breadth-first
//!    search for uniform costs, bidirectional Dijkstra search, or A* guided by
//!    [`pdb`] pattern databases.
//! 6. The [`plan`] is written one action per line.
//!
//! ## Example
//!
//! ```rust
//! use bdd_planner::config::SearchConfig;
//! use bdd_planner::expr::Expr;
//! use bdd_planner::model::{Action, GroundedModel, Partition};
//! use bdd_planner::planner::solve;
//!
//! let model = GroundedModel::new(
//!     vec![Action {
//!         name: "move".into(),
//!         cost: 1,
//!         precondition: Expr::lit("P1"),
//!         effect: Expr::And(vec![Expr::not(Expr::lit("P1")), Expr::lit("P2")]),
//!     }],
//!     vec!["P1".into()],
//!     Expr::lit("P2"),
//!     vec![Partition::new(["P1", "P2"])],
//! )?;
//! let outcome = solve(model, &SearchConfig::default())?;
//! assert_eq!(outcome.plan().unwrap().to_string(), "0: (move)\n");
//! # Ok::<(), bdd_planner::error::PlannerError>(())
//! ```
//!
//! ## BDD package
//!
//! [`bdd`] is a manager-centric ROBDD package with complement edges. All
//! operations take `&Bdd` and return lightweight [`Ref`][crate::reference::Ref]
//! handles; nodes are hash-consed in [`table`] and results memoized in
//! [`cache`]. Garbage collection is explicit: callers pass the roots they
//! still need.

pub mod artifacts;
pub mod bdd;
pub mod cache;
pub mod config;
pub mod encoding;
pub mod error;
pub mod expr;
pub mod io;
pub mod model;
pub mod ordering;
pub mod pdb;
pub mod pddl;
pub mod plan;
pub mod planner;
pub mod reference;
pub mod sat;
pub mod search;
pub mod table;
pub mod transition;
pub mod utils;
