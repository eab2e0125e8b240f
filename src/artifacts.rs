//! Persisted initial state, goal and transition relation.
//!
//! The artifact directory holds:
//!
//! ```text
//! actions.txt                            # `<cost> <name>` per action
//! transitionRelation_<cost>_<index>.bdd  # index counts actions within one cost
//! init.bdd
//! goal.bdd                               # written last; its presence means "resume"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::encoding::StateEncoder;
use crate::error::{PlannerError, Result};
use crate::model::GroundedModel;
use crate::reference::Ref;
use crate::transition::{TransitionBuilder, TransitionRelation};

const MARKER: &str = "goal.bdd";

/// How the run obtains its compiled task, decided once at startup.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Startup {
    /// Compile from the grounded model.
    Fresh,
    /// Reload persisted BDDs.
    Resumed,
}

/// Initial state, goal and relation over the concrete state space.
#[derive(Debug, Clone)]
pub struct CompiledTask {
    pub relation: TransitionRelation,
    pub init: Ref,
    pub goal: Ref,
}

impl CompiledTask {
    pub fn compile(encoder: &StateEncoder, model: &GroundedModel) -> Result<Self> {
        let builder = TransitionBuilder::new(encoder, model);
        Ok(Self {
            relation: builder.build()?,
            init: builder.initial_state()?,
            goal: builder.goal()?,
        })
    }
}

pub struct Artifacts {
    dir: PathBuf,
}

impl Artifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn startup(&self) -> Startup {
        if self.dir.join(MARKER).exists() {
            Startup::Resumed
        } else {
            Startup::Fresh
        }
    }

    fn relation_path(&self, cost: u32, index: usize) -> PathBuf {
        self.dir.join(format!("transitionRelation_{}_{}.bdd", cost, index))
    }

    pub fn save(&self, encoder: &StateEncoder, task: &CompiledTask) -> Result<()> {
        let bdd = encoder.bdd();
        fs::create_dir_all(&self.dir)?;

        let mut listing = String::new();
        for cost in task.relation.costs() {
            for (index, action) in task.relation.actions(cost).iter().enumerate() {
                bdd.save(action.relation, self.relation_path(cost, index))?;
                listing.push_str(&format!("{} {}\n", cost, action.name));
            }
        }
        fs::write(self.dir.join("actions.txt"), listing)?;
        bdd.save(task.init, self.dir.join("init.bdd"))?;
        bdd.save(task.goal, self.dir.join(MARKER))?;

        info!("Saved {} action relations to {}", task.relation.len(), self.dir.display());
        Ok(())
    }

    pub fn load(&self, encoder: &StateEncoder) -> Result<CompiledTask> {
        let bdd = encoder.bdd();
        let listing_path = self.dir.join("actions.txt");
        let listing = fs::read_to_string(&listing_path)?;

        let mut relation = TransitionRelation::new();
        let mut next_index: BTreeMap<u32, usize> = BTreeMap::new();
        for line in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (cost, name) = line
                .split_once(' ')
                .and_then(|(cost, name)| Some((cost.parse::<u32>().ok()?, name)))
                .ok_or_else(|| PlannerError::Parse(format!("{}: invalid line '{}'", listing_path.display(), line)))?;
            let index = next_index.entry(cost).or_insert(0);
            relation.insert(cost, name, bdd.load(self.relation_path(cost, *index))?);
            *index += 1;
        }

        let task = CompiledTask {
            relation,
            init: bdd.load(self.dir.join("init.bdd"))?,
            goal: bdd.load(self.dir.join(MARKER))?,
        };
        info!("Loaded {} action relations from {}", task.relation.len(), self.dir.display());
        Ok(task)
    }

    /// Reload the task when resuming, otherwise compile it and persist it.
    pub fn prepare(&self, encoder: &StateEncoder, model: &GroundedModel) -> Result<(Startup, CompiledTask)> {
        let startup = self.startup();
        let task = match startup {
            Startup::Resumed => self.load(encoder)?,
            Startup::Fresh => {
                let task = CompiledTask::compile(encoder, model)?;
                self.save(encoder, &task)?;
                task
            }
        };
        Ok((startup, task))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use test_log::test;

    use super::*;
    use crate::bdd::Bdd;
    use crate::config::SearchConfig;
    use crate::search::dijkstra::DijkstraSearch;
    use crate::search::fixtures::keys;
    use crate::search::Problem;

    #[test]
    fn test_fresh_then_resumed() {
        let dir = std::env::temp_dir().join(format!("bdd-planner-artifacts-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let artifacts = Artifacts::new(&dir);
        let model = keys();

        let bdd = Rc::new(Bdd::default());
        let encoder = StateEncoder::new(bdd, &model.partitions);
        assert_eq!(artifacts.startup(), Startup::Fresh);
        let (startup, fresh) = artifacts.prepare(&encoder, &model).unwrap();
        assert_eq!(startup, Startup::Fresh);
        assert!(dir.join("transitionRelation_3_1.bdd").exists());
        assert_eq!(artifacts.startup(), Startup::Resumed);

        // A new manager reloads the same task and finds the same plan cost.
        let bdd = Rc::new(Bdd::default());
        let encoder = StateEncoder::new(bdd, &model.partitions);
        let (startup, resumed) = artifacts.prepare(&encoder, &model).unwrap();
        assert_eq!(startup, Startup::Resumed);
        assert_eq!(resumed.relation.len(), fresh.relation.len());
        assert_eq!(
            resumed.relation.find("go.b.a").map(|(cost, _)| cost),
            fresh.relation.find("go.b.a").map(|(cost, _)| cost)
        );

        let config = SearchConfig::default();
        let problem = Problem::new(&encoder, &resumed.relation, resumed.init, resumed.goal);
        let outcome = DijkstraSearch::new(problem, &config).run().unwrap();
        assert_eq!(outcome.plan().map(|p| p.cost), Some(7));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_bad_listing_is_parse_error() {
        let dir = std::env::temp_dir().join(format!("bdd-planner-artifacts-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("actions.txt"), "three go.a.b\n").unwrap();
        let model = keys();
        let encoder = StateEncoder::new(Rc::new(Bdd::default()), &model.partitions);
        assert!(matches!(Artifacts::new(&dir).load(&encoder), Err(PlannerError::Parse(_))));
        fs::remove_dir_all(&dir).unwrap();
    }
}
