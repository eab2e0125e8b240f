use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use bdd_planner::config::{AbstractionMode, SearchConfig, Strategy};
use bdd_planner::pddl::read_model;
use bdd_planner::planner::solve;
use bdd_planner::search::SearchOutcome;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Partition file of the grounded task (`<stem>Part.gdl`); the domain and
    /// problem files are found next to it.
    #[arg(value_name = "FILE")]
    problem: PathBuf,

    /// Search engine.
    #[clap(long, value_enum, default_value = "auto")]
    strategy: Strategy,

    /// Search forward only.
    #[clap(long)]
    unidirectional: bool,

    /// Let breadth-first search decide whether to search backward.
    #[clap(long)]
    auto_direction: bool,

    /// Heuristic for A*.
    #[clap(long, value_enum, default_value = "none")]
    abstraction: AbstractionMode,

    /// Time budget for building pattern databases.
    #[clap(long, value_name = "SECONDS", default_value = "60")]
    pdb_budget_secs: u64,

    /// Partition ordering file (written with the identity order if missing).
    #[clap(long, value_name = "FILE")]
    ordering: Option<PathBuf>,

    /// Directory for persisted BDDs; reused on the next run.
    #[clap(long, value_name = "DIR")]
    artifacts: Option<PathBuf>,

    /// Minimum time a backward step may take before that direction is abandoned.
    #[clap(long, value_name = "SECONDS", default_value = "30")]
    timeout_secs: u64,

    /// Backward steps may take this many times the slowest forward step.
    #[clap(long, value_name = "FLOAT", default_value = "2.5")]
    timeout_factor: f64,

    /// Continue forward only after this many backward steps.
    #[clap(long, value_name = "INT")]
    max_backward_steps: Option<usize>,

    /// Node count that triggers garbage collection.
    #[clap(long, value_name = "INT", default_value = "1048576")]
    gc_threshold: usize,

    /// BDD size (in bits, so the actual size is `2^size` nodes).
    #[clap(long, value_name = "INT", default_value = "20")]
    size: usize,

    /// Where to write the plan.
    #[clap(long, value_name = "FILE", default_value = "plan_output")]
    output: PathBuf,

    /// Log debug messages.
    #[clap(short, long)]
    verbose: bool,

    /// Log warnings and errors only.
    #[clap(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn config(&self) -> SearchConfig {
        SearchConfig {
            strategy: self.strategy,
            bidirectional: !self.unidirectional,
            auto_direction: self.auto_direction,
            abstraction: self.abstraction,
            pdb_budget: Duration::from_secs(self.pdb_budget_secs),
            ordering: self.ordering.clone(),
            artifacts: self.artifacts.clone(),
            base_timeout: Duration::from_secs(self.timeout_secs),
            timeout_factor: self.timeout_factor,
            max_backward_steps: self.max_backward_steps,
            gc_threshold: self.gc_threshold,
            bdd_size: self.size,
            output: self.output.clone(),
            ..SearchConfig::default()
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    let level = if args.verbose {
        simplelog::LevelFilter::Debug
    } else if args.quiet {
        simplelog::LevelFilter::Warn
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();
    log::debug!("args = {:?}", args);

    let config = args.config();
    let model = read_model(&args.problem)?;

    match solve(model, &config)? {
        SearchOutcome::Found(plan) => {
            plan.write_to(&config.output)?;
            print!("{}", plan);
            println!("Plan cost: {}, length: {}", plan.cost, plan.len());
        }
        SearchOutcome::Unreachable => {
            println!("No plan: the goal is unreachable");
        }
    }

    println!("Total time: {:.3} s", time_total.elapsed().as_secs_f64());
    Ok(())
}
