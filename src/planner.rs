//! One planning run: ordering, encoding, compilation or reload, then search.

use std::rc::Rc;

use log::info;

use crate::artifacts::{Artifacts, CompiledTask};
use crate::bdd::Bdd;
use crate::config::{AbstractionMode, SearchConfig, Strategy};
use crate::encoding::StateEncoder;
use crate::error::Result;
use crate::model::GroundedModel;
use crate::ordering::VariableOrdering;
use crate::pdb::{self, cost_factors, HeuristicTable, PatternDatabaseBuilder, Selection};
use crate::search::astar::AStarSearch;
use crate::search::bfs::BfsSearch;
use crate::search::dijkstra::DijkstraSearch;
use crate::search::{Problem, SearchOutcome};

pub fn solve(mut model: GroundedModel, config: &SearchConfig) -> Result<SearchOutcome> {
    if let Some(path) = &config.ordering {
        let ordering = VariableOrdering::load_or_init(path, model.partitions.len())?;
        if !ordering.is_identity() {
            model.permute_partitions(ordering.as_slice())?;
        }
    }
    let uniform = model.normalize_costs();

    let bdd = Rc::new(Bdd::new(config.bdd_size));
    bdd.set_gc_threshold(config.gc_threshold);
    let encoder = StateEncoder::new(bdd, &model.partitions);
    info!(
        "Encoded {} partitions into {} state bits",
        encoder.num_partitions(),
        encoder.num_bits()
    );

    let artifacts = config.artifacts.as_ref().map(Artifacts::new);
    let task = match &artifacts {
        Some(artifacts) => {
            let (startup, task) = artifacts.prepare(&encoder, &model)?;
            info!("Startup: {:?} ({})", startup, artifacts.dir().display());
            task
        }
        None => CompiledTask::compile(&encoder, &model)?,
    };

    let strategy = config.effective_strategy(uniform);
    info!("Search strategy: {:?}", strategy);
    let problem = Problem::new(&encoder, &task.relation, task.init, task.goal);

    match strategy {
        Strategy::Bfs => BfsSearch::new(problem, config)?.run(),
        Strategy::Dijkstra | Strategy::Auto => DijkstraSearch::new(problem, config).run(),
        Strategy::Astar => {
            let bdd = encoder.bdd();
            let Some(selection) = select_databases(&encoder, &model, config, artifacts.as_ref())? else {
                let table = HeuristicTable::trivial(bdd);
                return AStarSearch::new(problem, &table).run();
            };
            let table = selection.heuristic(bdd);
            let scale = selection.factors.lcm;
            if scale > 1 {
                let scaled = task.relation.scaled(scale);
                let problem = Problem::new(&encoder, &scaled, task.init, task.goal);
                AStarSearch::new(problem, &table).with_cost_scale(scale).run()
            } else {
                AStarSearch::new(problem, &table).run()
            }
        }
    }
}

/// Pattern databases for A*: reloaded if persisted, otherwise selected and saved.
fn select_databases(
    encoder: &StateEncoder,
    model: &GroundedModel,
    config: &SearchConfig,
    artifacts: Option<&Artifacts>,
) -> Result<Option<Selection>> {
    if config.abstraction == AbstractionMode::None {
        return Ok(None);
    }
    if let Some(artifacts) = artifacts {
        if let Some(databases) = pdb::load_selection(encoder, artifacts.dir())? {
            info!("Reloaded {} pattern databases", databases.len());
            let used: Vec<Vec<bool>> = databases.iter().map(|db| db.used_actions().to_vec()).collect();
            let factors = cost_factors(model, &used);
            return Ok(Some(Selection { databases, factors }));
        }
    }
    let selection = PatternDatabaseBuilder::new(encoder, model).select(config.pdb_budget)?;
    if let Some(artifacts) = artifacts {
        pdb::save_selection(encoder.bdd(), artifacts.dir(), &selection.databases)?;
    }
    Ok(Some(selection))
}
