//! Run configuration, built once and passed to every engine.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
pub enum Strategy {
    /// Breadth-first search; requires uniform action costs.
    Bfs,
    /// Cost-bucket Dijkstra search.
    Dijkstra,
    /// A* guided by pattern databases.
    Astar,
    /// BFS for uniform costs, Dijkstra otherwise.
    Auto,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
pub enum AbstractionMode {
    None,
    Pdb,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub strategy: Strategy,
    pub bidirectional: bool,
    /// Probe one step in each direction before a bidirectional BFS.
    pub auto_direction: bool,
    /// Go forward-only when the backward probe is this many times slower.
    pub direction_probe_factor: f64,
    pub abstraction: AbstractionMode,
    /// Wall-clock budget for building all pattern databases.
    pub pdb_budget: Duration,
    /// Partition ordering file; written with the identity order if missing.
    pub ordering: Option<PathBuf>,
    /// Directory for persisted BDDs.
    pub artifacts: Option<PathBuf>,
    /// Lower bound of the backward step deadline.
    pub base_timeout: Duration,
    /// Backward steps may take this many times the slowest forward step.
    pub timeout_factor: f64,
    /// Abandon the backward direction after this many steps.
    pub max_backward_steps: Option<usize>,
    /// Node count that triggers the first garbage collection.
    pub gc_threshold: usize,
    /// Node table size in bits.
    pub bdd_size: usize,
    pub output: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            bidirectional: true,
            auto_direction: false,
            direction_probe_factor: 3.0,
            abstraction: AbstractionMode::None,
            pdb_budget: Duration::from_secs(60),
            ordering: None,
            artifacts: None,
            base_timeout: Duration::from_secs(30),
            timeout_factor: 2.5,
            max_backward_steps: None,
            gc_threshold: 1 << 20,
            bdd_size: 20,
            output: PathBuf::from("plan_output"),
        }
    }
}

impl SearchConfig {
    /// Resolve `Auto` against the model's cost structure.
    pub fn effective_strategy(&self, uniform_cost: bool) -> Strategy {
        match self.strategy {
            Strategy::Auto if uniform_cost => Strategy::Bfs,
            Strategy::Auto if self.abstraction == AbstractionMode::Pdb => Strategy::Astar,
            Strategy::Auto => Strategy::Dijkstra,
            Strategy::Bfs if !uniform_cost => Strategy::Dijkstra,
            other => other,
        }
    }

    /// Deadline for one backward step given the slowest forward step so far.
    pub fn step_timeout(&self, max_forward_step: Duration) -> Duration {
        self.base_timeout.max(max_forward_step.mul_f64(self.timeout_factor))
    }
}
